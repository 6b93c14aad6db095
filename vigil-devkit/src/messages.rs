//! Builders for the wire payloads vigil nodes exchange.

use serde_json::{json, Value};

/// Peer heartbeat as published on `vigil/nodes/heartbeat@v1`.
pub fn heartbeat_v1(node_id: &str, hostname: &str, streaming: bool) -> Value {
    json!({
        "node_id": node_id,
        "hostname": hostname,
        "streaming": streaming,
        "ts": "2026-01-01T00:00:00Z",
    })
}
