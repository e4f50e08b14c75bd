use std::env;
use std::time::Duration;

use clap::{Arg, ArgMatches, Command};

use crate::agent::resolver::DEFAULT_CONFIRM_WAIT;
use crate::coordinator::enablement::DEFAULT_RULESET_ID;
use crate::utils::fetcher::{RetryPolicy, DEFAULT_BACKOFF_STEP, DEFAULT_MAX_ATTEMPTS};
use crate::utils::viewer_route::ViewerRoute;

pub const DEFAULT_VIEWER_URL: &str = "chrome-extension://local-pdf-viewer/viewer.html";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptorConfig {
    pub viewer_url: String,
    pub ruleset_id: String,
    pub max_attempts: u32,
    pub backoff_step: Duration,
    pub confirm_wait: Duration,
    pub quiet: bool,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            viewer_url: DEFAULT_VIEWER_URL.to_string(),
            ruleset_id: DEFAULT_RULESET_ID.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_step: DEFAULT_BACKOFF_STEP,
            confirm_wait: DEFAULT_CONFIRM_WAIT,
            quiet: false,
        }
    }
}

impl InterceptorConfig {
    /// Command line first, then environment, then defaults.
    pub fn from_matches(matches: &ArgMatches) -> Self {
        let defaults = Self::default();

        let viewer_url = matches
            .get_one::<String>("viewer-url")
            .cloned()
            .or_else(|| env::var("PDF_VIEWER_URL").ok())
            .unwrap_or(defaults.viewer_url);

        let ruleset_id = matches
            .get_one::<String>("ruleset-id")
            .cloned()
            .or_else(|| env::var("PDF_RULESET_ID").ok())
            .unwrap_or(defaults.ruleset_id);

        let max_attempts = matches
            .get_one::<u32>("max-attempts")
            .copied()
            .unwrap_or(defaults.max_attempts);

        let backoff_step = matches
            .get_one::<u64>("backoff-ms")
            .map(|ms| Duration::from_millis(*ms))
            .unwrap_or(defaults.backoff_step);

        let confirm_wait = matches
            .get_one::<u64>("confirm-wait-ms")
            .map(|ms| Duration::from_millis(*ms))
            .unwrap_or(defaults.confirm_wait);

        Self {
            viewer_url,
            ruleset_id,
            max_attempts,
            backoff_step,
            confirm_wait,
            quiet: matches.get_flag("quiet"),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff_step: self.backoff_step,
        }
    }

    pub fn viewer_route(&self) -> ViewerRoute {
        ViewerRoute::new(self.viewer_url.clone())
    }
}

pub fn cli() -> Command {
    Command::new("pdf-interceptor")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Routes PDF navigations and downloads into a custom viewer")
        .long_about(
            "Long-lived coordinator speaking newline-delimited JSON with the browser host \
            on stdin/stdout. It decides which tabs hold PDFs, answers page agents \
            (getPdfUrl, shouldInjectPdf, fetchPdf) and pushes pdfDetected confirmations.",
        )
        .arg(
            Arg::new("viewer-url")
                .long("viewer-url")
                .value_name("URL")
                .help("Base address of the viewer page [env: PDF_VIEWER_URL]")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("ruleset-id")
                .long("ruleset-id")
                .value_name("ID")
                .help("Declarative blocking ruleset mirrored by the on/off switch [env: PDF_RULESET_ID]")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("max-attempts")
                .long("max-attempts")
                .value_name("N")
                .help("Fetch attempts before giving up")
                .value_parser(clap::value_parser!(u32).range(1..))
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("backoff-ms")
                .long("backoff-ms")
                .value_name("MS")
                .help("Linear backoff step between fetch attempts")
                .value_parser(clap::value_parser!(u64))
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("confirm-wait-ms")
                .long("confirm-wait-ms")
                .value_name("MS")
                .help("How long a page agent waits for confirmation before trusting the URL")
                .value_parser(clap::value_parser!(u64))
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .help("Only log errors")
                .action(clap::ArgAction::SetTrue),
        )
}
