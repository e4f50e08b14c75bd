use std::process;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pdf_interceptor::config::{cli, InterceptorConfig};
use pdf_interceptor::host::bridge;

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    let config = InterceptorConfig::from_matches(&matches);

    // RUST_LOG wins; otherwise info, or errors only in quiet mode
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if config.quiet { "error" } else { "info" }));

    // stdout carries protocol frames, so logs go to stderr only
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    info!(
        "Viewer at {}, blocking ruleset {}, {} fetch attempt(s) with {:?} backoff step",
        config.viewer_url, config.ruleset_id, config.max_attempts, config.backoff_step
    );

    if let Err(e) = bridge::run(&config).await {
        error!("PDF interceptor stopped: {}", e);
        process::exit(1);
    }
}
