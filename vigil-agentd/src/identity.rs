//! Agent identity: machine guid, node id and hostname.
//!
//! Both identifiers are generated once and persisted under the data dir,
//! so the agent keeps the same identity across restarts. The report layer
//! treats all three fields as read-only.

use anyhow::{Context, Result};
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AgentIdentity {
    pub machine_guid: String,
    pub node_id: Uuid,
    pub hostname: String,
}

impl AgentIdentity {
    pub fn load_or_create(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("creating data dir {}", data_dir.display()))?;

        let machine_guid = read_or_create(&data_dir.join("machine.guid"))?;
        let node_raw = read_or_create(&data_dir.join("node.id"))?;
        let node_id = Uuid::parse_str(&node_raw)
            .with_context(|| format!("corrupt node.id in {}", data_dir.display()))?;

        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".into());

        Ok(Self { machine_guid, node_id, hostname })
    }
}

fn read_or_create(path: &Path) -> Result<String> {
    if path.exists() {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }
    let fresh = Uuid::new_v4().to_string();
    std::fs::write(path, &fresh).with_context(|| format!("writing {}", path.display()))?;
    Ok(fresh)
}
