use tracing::info;

use crate::host::link::HostLink;
use crate::host::types::Badge;

pub const DEFAULT_RULESET_ID: &str = "ruleset_1";

/// Process-wide on/off switch for interception.
///
/// Starts enabled on every process start and is never persisted. Only
/// [`EnablementSwitch::toggle`] can change it, and every change is mirrored
/// into the host's declarative blocking rules before it returns.
#[derive(Debug)]
pub struct EnablementSwitch {
    enabled: bool,
    ruleset_id: String,
}

impl EnablementSwitch {
    pub fn new(ruleset_id: impl Into<String>) -> Self {
        Self {
            enabled: true,
            ruleset_id: ruleset_id.into(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Pushes the current state to the host without changing it.
    pub fn announce(&self, host: &dyn HostLink) {
        self.mirror(host);
    }

    pub fn toggle(&mut self, host: &dyn HostLink) -> bool {
        self.enabled = !self.enabled;
        info!(
            "PDF interception {}",
            if self.enabled { "enabled" } else { "disabled" }
        );
        self.mirror(host);
        self.enabled
    }

    fn mirror(&self, host: &dyn HostLink) {
        host.set_blocking_rules(&self.ruleset_id, self.enabled);
        host.set_badge(badge_for(self.enabled));
    }
}

pub fn badge_for(enabled: bool) -> Badge {
    if enabled {
        Badge {
            text: "ON".to_string(),
            color: "#4CAF50".to_string(),
        }
    } else {
        Badge {
            text: "OFF".to_string(),
            color: "#FF0000".to_string(),
        }
    }
}
