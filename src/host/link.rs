use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

use super::types::{AgentPush, Badge, HostCommand};
use crate::utils::source_cache::ContextId;

/// Outbound side of the host: everything the coordinator may ask the browser
/// to do. All calls are fire-and-forget.
pub trait HostLink: Send + Sync {
    /// Best-effort delivery to the page agent of a context. Returns false
    /// when nobody is listening, which is not an error.
    fn notify_agent(&self, context_id: ContextId, push: AgentPush) -> bool;

    fn set_blocking_rules(&self, ruleset_id: &str, active: bool);

    fn set_badge(&self, badge: Badge);

    fn redirect_context(&self, context_id: ContextId, url: &str);

    fn open_viewer_for_download(&self, download_id: u64, viewer_url: &str);
}

/// Host link backed by the stdio bridge: every call becomes an outbound frame.
pub struct StdioHostLink {
    outbound: mpsc::UnboundedSender<HostCommand>,
}

impl StdioHostLink {
    pub fn new(outbound: mpsc::UnboundedSender<HostCommand>) -> Self {
        Self { outbound }
    }

    fn send(&self, command: HostCommand) -> bool {
        match self.outbound.send(command) {
            Ok(()) => true,
            Err(e) => {
                debug!("Host writer gone, dropping {:?}", e.0);
                false
            }
        }
    }
}

impl HostLink for StdioHostLink {
    fn notify_agent(&self, context_id: ContextId, push: AgentPush) -> bool {
        self.send(HostCommand::Push {
            context_id,
            message: push,
        })
    }

    fn set_blocking_rules(&self, ruleset_id: &str, active: bool) {
        let (enable, disable) = if active {
            (vec![ruleset_id.to_string()], Vec::new())
        } else {
            (Vec::new(), vec![ruleset_id.to_string()])
        };
        self.send(HostCommand::SetRulesets { enable, disable });
    }

    fn set_badge(&self, badge: Badge) {
        self.send(HostCommand::SetBadge(badge));
    }

    fn redirect_context(&self, context_id: ContextId, url: &str) {
        self.send(HostCommand::RedirectTab {
            context_id,
            url: url.to_string(),
        });
    }

    fn open_viewer_for_download(&self, download_id: u64, viewer_url: &str) {
        self.send(HostCommand::OpenViewer {
            download_id,
            url: viewer_url.to_string(),
        });
    }
}

/// In-process host. Page agents attach to receive pushes for their context;
/// every other command is recorded for inspection.
#[derive(Default)]
pub struct LocalHost {
    agents: Mutex<HashMap<ContextId, mpsc::UnboundedSender<AgentPush>>>,
    commands: Mutex<Vec<HostCommand>>,
}

impl LocalHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the push channel for a page load. A later attach for the same
    /// context replaces the previous agent.
    pub fn attach(&self, context_id: ContextId) -> mpsc::UnboundedReceiver<AgentPush> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.agents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(context_id, tx);
        rx
    }

    pub fn detach(&self, context_id: ContextId) {
        self.agents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&context_id);
    }

    pub fn commands(&self) -> Vec<HostCommand> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, command: HostCommand) {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command);
    }
}

impl HostLink for LocalHost {
    fn notify_agent(&self, context_id: ContextId, push: AgentPush) -> bool {
        let mut agents = self.agents.lock().unwrap_or_else(PoisonError::into_inner);
        let delivered = agents
            .get(&context_id)
            .map(|tx| tx.send(push.clone()).is_ok())
            .unwrap_or(false);
        if !delivered {
            agents.remove(&context_id);
        }
        self.record(HostCommand::Push {
            context_id,
            message: push,
        });
        delivered
    }

    fn set_blocking_rules(&self, ruleset_id: &str, active: bool) {
        let (enable, disable) = if active {
            (vec![ruleset_id.to_string()], Vec::new())
        } else {
            (Vec::new(), vec![ruleset_id.to_string()])
        };
        self.record(HostCommand::SetRulesets { enable, disable });
    }

    fn set_badge(&self, badge: Badge) {
        self.record(HostCommand::SetBadge(badge));
    }

    fn redirect_context(&self, context_id: ContextId, url: &str) {
        self.record(HostCommand::RedirectTab {
            context_id,
            url: url.to_string(),
        });
    }

    fn open_viewer_for_download(&self, download_id: u64, viewer_url: &str) {
        self.record(HostCommand::OpenViewer {
            download_id,
            url: viewer_url.to_string(),
        });
    }
}
