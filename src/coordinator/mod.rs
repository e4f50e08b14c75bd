pub mod detection;
pub mod enablement;
pub mod service;

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::InterceptorConfig;
use crate::host::link::HostLink;
use crate::utils::fetcher::{ByteFetcher, ByteSource};
use detection::Coordinator;
use enablement::EnablementSwitch;
use service::CoordinatorHandle;

/// Builds the coordinator described by `config` and starts its task.
pub fn spawn_with(
    config: &InterceptorConfig,
    source: Arc<dyn ByteSource>,
    host: Arc<dyn HostLink>,
) -> (CoordinatorHandle, JoinHandle<()>) {
    let coordinator = Coordinator::new(
        config.viewer_route(),
        EnablementSwitch::new(config.ruleset_id.clone()),
        ByteFetcher::new(source, config.retry_policy()),
        host,
    );
    service::spawn(coordinator)
}
