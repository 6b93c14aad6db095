//! Control-plane link.
//!
//! Owns the MQTT event loop: peer heartbeats arriving on the broker feed
//! the node registry, and the connection state is tracked so reports can
//! embed it verbatim under `cloud`.

use crate::config::MqttConf;
use crate::nodes::{HeartbeatIn, NodeRegistry};
use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{error, warn};

pub const HEARTBEAT_TOPIC: &str = "vigil/nodes/heartbeat@v1";

/// Snapshot embedded verbatim in the report's `cloud` block.
#[derive(Debug, Clone, Serialize)]
pub struct CloudStatus {
    pub status: String,
    pub reconnects: u32,
    pub since: i64,
}

#[derive(Debug)]
struct LinkState {
    status: String,
    since: i64,
}

#[derive(Clone)]
pub struct LinkTracker {
    state: Arc<Mutex<LinkState>>,
    reconnects: Arc<AtomicU32>,
}

impl LinkTracker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(LinkState {
                status: "connecting".into(),
                since: OffsetDateTime::now_utc().unix_timestamp(),
            })),
            reconnects: Arc::new(AtomicU32::new(0)),
        }
    }

    fn set_status(&self, status: &str) {
        let mut state = self.state.lock();
        if state.status != status {
            state.status = status.to_string();
            state.since = OffsetDateTime::now_utc().unix_timestamp();
        }
    }

    pub fn mark_connected(&self) {
        self.set_status("connected");
    }

    pub fn mark_reconnecting(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        self.set_status("reconnecting");
    }

    /// No broker configured; the link stays off for the process lifetime.
    pub fn mark_disabled(&self) {
        self.set_status("disabled");
    }

    pub fn status(&self) -> CloudStatus {
        let state = self.state.lock();
        CloudStatus {
            status: state.status.clone(),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            since: state.since,
        }
    }
}

impl Default for LinkTracker {
    fn default() -> Self {
        Self::new()
    }
}

pub fn spawn_link(conf: MqttConf, client_id: String, registry: NodeRegistry, tracker: LinkTracker) {
    tokio::spawn(async move {
        let mut opts = MqttOptions::new(client_id, &conf.host, conf.port);
        opts.set_keep_alive(Duration::from_secs(15));
        let (client, mut eventloop) = AsyncClient::new(opts, 10);

        if let Err(e) = client.subscribe(HEARTBEAT_TOPIC, QoS::AtLeastOnce).await {
            error!("subscribe {HEARTBEAT_TOPIC} failed: {e:?}");
            return;
        }

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    tracker.mark_connected();
                }
                Ok(Event::Incoming(Incoming::Publish(p))) if p.topic == HEARTBEAT_TOPIC => {
                    match serde_json::from_slice::<HeartbeatIn>(&p.payload) {
                        Ok(hb) => registry.apply_heartbeat(hb),
                        Err(e) => warn!("invalid heartbeat payload: {e}"),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("link error: {e:?}");
                    tracker.mark_reconnecting();
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_update_snapshot() {
        let tracker = LinkTracker::new();
        assert_eq!(tracker.status().status, "connecting");

        tracker.mark_connected();
        assert_eq!(tracker.status().status, "connected");
        assert_eq!(tracker.status().reconnects, 0);

        tracker.mark_reconnecting();
        tracker.mark_reconnecting();
        let status = tracker.status();
        assert_eq!(status.status, "reconnecting");
        assert_eq!(status.reconnects, 2);
    }

    #[test]
    fn disabled_link_reports_disabled() {
        let tracker = LinkTracker::new();
        tracker.mark_disabled();
        assert_eq!(tracker.status().status, "disabled");
    }
}
