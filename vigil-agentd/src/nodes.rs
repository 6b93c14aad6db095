//! Cluster membership registry.
//!
//! Tracks every node this agent knows about, including itself. Peers
//! announce themselves with heartbeat messages over the control-plane
//! link; a sweep task clears the remote-control flag of peers that have
//! gone quiet. The registry hands the report layer a consistent
//! snapshot, never the live map.

use crate::identity::AgentIdentity;
use crate::report::{ClusterMembers, MemberView};
use crate::state::{new_state, Shared};
use serde::Deserialize;
use std::collections::HashMap;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct NodeState {
    pub node_id: String,
    pub hostname: String,
    pub is_self: bool,
    /// Remote-control channel active (peer heartbeating over the link).
    pub receiving: bool,
    /// Peer is actively streaming data to this agent.
    pub sending: bool,
    pub last_seen: OffsetDateTime,
}

pub type NodesMap = HashMap<String, NodeState>;

/// Wire format of `vigil/nodes/heartbeat@v1`.
#[derive(Debug, Deserialize)]
pub struct HeartbeatIn {
    pub node_id: String,
    pub hostname: String,
    pub streaming: bool,
    pub ts: String,
}

#[derive(Clone)]
pub struct NodeRegistry {
    nodes: Shared<NodesMap>,
    self_id: String,
}

impl NodeRegistry {
    pub fn new(identity: &AgentIdentity) -> Self {
        let mut nodes = NodesMap::new();
        nodes.insert(
            identity.machine_guid.clone(),
            NodeState {
                node_id: identity.machine_guid.clone(),
                hostname: identity.hostname.clone(),
                is_self: true,
                receiving: false,
                sending: false,
                last_seen: OffsetDateTime::now_utc(),
            },
        );
        Self { nodes: new_state(nodes), self_id: identity.machine_guid.clone() }
    }

    pub fn apply_heartbeat(&self, hb: HeartbeatIn) {
        if hb.node_id == self.self_id {
            return;
        }
        debug!("heartbeat from {} (sent {})", hb.node_id, hb.ts);
        let now = OffsetDateTime::now_utc();
        let mut nodes = self.nodes.lock();
        let entry = nodes.entry(hb.node_id.clone()).or_insert_with(|| {
            info!("registered peer {} ({})", hb.node_id, hb.hostname);
            NodeState {
                node_id: hb.node_id.clone(),
                hostname: hb.hostname.clone(),
                is_self: false,
                receiving: false,
                sending: false,
                last_seen: now,
            }
        });
        entry.hostname = hb.hostname;
        entry.receiving = true;
        entry.sending = hb.streaming;
        entry.last_seen = now;
    }

    /// Clears the remote-control flag of peers not seen within the
    /// window. Never touches self.
    pub fn sweep_stale(&self, window_seconds: i64) {
        let cutoff = OffsetDateTime::now_utc() - Duration::seconds(window_seconds);
        let mut nodes = self.nodes.lock();
        for node in nodes.values_mut() {
            if !node.is_self && node.receiving && node.last_seen < cutoff {
                debug!("peer {} went stale", node.node_id);
                node.receiving = false;
                node.sending = false;
            }
        }
    }

    /// Consistent copy for API views; callers never see the live map.
    pub fn snapshot(&self) -> Vec<NodeState> {
        self.nodes.lock().values().cloned().collect()
    }

    #[cfg(test)]
    pub fn node_count(&self) -> usize {
        self.nodes.lock().len()
    }
}

impl ClusterMembers for NodeRegistry {
    fn members(&self) -> Vec<MemberView> {
        self.nodes
            .lock()
            .values()
            .map(|n| MemberView {
                is_self: n.is_self,
                receiving: n.receiving,
                sending: n.sending,
            })
            .collect()
    }
}

pub fn spawn_stale_sweeper(registry: NodeRegistry, window_seconds: i64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
        loop {
            interval.tick().await;
            registry.sweep_stale(window_seconds);
        }
    });
}
