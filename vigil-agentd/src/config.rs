use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::warn;

/// One retention/resolution level of the tiered store. Tier 0 holds raw
/// points; each following tier aggregates `grouping` points of the tier
/// before it into one stored point.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TierConf {
    pub grouping: u64,
    #[serde(default)]
    pub disk_quota_bytes: u64,
    #[serde(default)]
    pub max_retention_seconds: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AgentConfig {
    pub listen_port: u16,
    pub data_dir: String,
    pub update_every_seconds: u64,
    pub tiers: Vec<TierConf>,
    pub mqtt: Option<MqttConf>,
    pub bearer_token: Option<String>,
    pub stale_after_seconds: i64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            listen_port: 8080,
            data_dir: "./data".into(),
            update_every_seconds: 1,
            tiers: vec![
                TierConf { grouping: 1, disk_quota_bytes: 0, max_retention_seconds: 0 },
                TierConf { grouping: 60, disk_quota_bytes: 0, max_retention_seconds: 0 },
                TierConf { grouping: 60, disk_quota_bytes: 0, max_retention_seconds: 0 },
            ],
            mqtt: Some(MqttConf { host: "localhost".into(), port: 1883 }),
            bearer_token: None,
            stale_after_seconds: 90,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("at least one storage tier must be configured")]
    NoTiers,
    #[error("update_every_seconds must be >= 1")]
    BadUpdateEvery,
    #[error("tier {0}: grouping must be >= 1")]
    BadGrouping(usize),
    #[error("stale_after_seconds must be >= 1")]
    BadStaleWindow,
}

impl AgentConfig {
    /// Tier spacings must stay monotonically non-decreasing, which holds
    /// exactly when every grouping factor is at least 1.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tiers.is_empty() {
            return Err(ConfigError::NoTiers);
        }
        if self.update_every_seconds < 1 {
            return Err(ConfigError::BadUpdateEvery);
        }
        if let Some(tier) = self.tiers.iter().position(|t| t.grouping < 1) {
            return Err(ConfigError::BadGrouping(tier));
        }
        if self.stale_after_seconds < 1 {
            return Err(ConfigError::BadStaleWindow);
        }
        Ok(())
    }
}

pub async fn load_config() -> AgentConfig {
    let path = std::env::var("VIGIL_CONFIG").unwrap_or_else(|_| "vigil.yaml".into());
    if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        if txt.trim().is_empty() {
            return AgentConfig::default();
        }
        serde_yaml::from_str(&txt).unwrap_or_else(|e| {
            warn!("invalid config {path}: {e}, falling back to defaults");
            AgentConfig::default()
        })
    } else {
        warn!("no {path}, using default config");
        AgentConfig::default()
    }
}
