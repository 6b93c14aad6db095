//! Capability negotiation for status reports.
//!
//! The capability set is derived once from configuration at startup and
//! embedded verbatim into every detailed report, so dashboards can tell
//! which surfaces a given agent exposes without probing them.

use crate::config::AgentConfig;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Capability {
    pub name: &'static str,
    pub version: u64,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct CapabilitySet(Vec<Capability>);

impl CapabilitySet {
    pub fn detect(config: &AgentConfig) -> Self {
        Self(vec![
            Capability { name: "reports", version: 2, enabled: true },
            Capability {
                name: "tiered-storage",
                version: config.tiers.len() as u64,
                enabled: true,
            },
            Capability { name: "streaming", version: 1, enabled: config.mqtt.is_some() },
            Capability { name: "bearer", version: 1, enabled: config.bearer_token.is_some() },
        ])
    }

    #[cfg(test)]
    pub fn entries(&self) -> &[Capability] {
        &self.0
    }
}
