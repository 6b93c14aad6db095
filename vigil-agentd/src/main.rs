//! vigil-agentd - monitoring agent with tiered time-series storage.
//!
//! Bootstraps every subsystem and serves the status report API:
//! - persistent agent identity (machine guid, node id)
//! - tiered store + background metric collector
//! - cluster membership registry fed by the control-plane link
//! - axum HTTP surface with optional bearer protection

mod buildinfo;
mod capabilities;
mod collector;
mod config;
mod http;
mod identity;
mod link;
mod nodes;
mod report;
mod retention;
mod state;
mod storage;

use crate::buildinfo::BuildInfo;
use crate::capabilities::CapabilitySet;
use crate::http::AppState;
use crate::identity::AgentIdentity;
use crate::link::LinkTracker;
use crate::nodes::NodeRegistry;
use crate::report::ReportBuilder;
use crate::storage::TieredStore;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().init();

    let cfg = config::load_config().await;
    cfg.validate().context("invalid configuration")?;

    let identity = AgentIdentity::load_or_create(Path::new(&cfg.data_dir))
        .context("failed to establish agent identity")?;
    info!("agent {} ({}) starting", identity.machine_guid, identity.hostname);

    let store = Arc::new(TieredStore::open(&cfg).context("failed to open tiered store")?);
    let registry = NodeRegistry::new(&identity);
    let tracker = LinkTracker::new();

    match cfg.mqtt.clone() {
        Some(mqtt) => {
            let client_id = format!("vigil-agent-{}", identity.machine_guid);
            link::spawn_link(mqtt, client_id, registry.clone(), tracker.clone());
        }
        None => {
            info!("no broker configured, control-plane link disabled");
            tracker.mark_disabled();
        }
    }

    nodes::spawn_stale_sweeper(registry.clone(), cfg.stale_after_seconds);
    collector::spawn_collector(store.clone(), cfg.update_every_seconds);

    let report = Arc::new(ReportBuilder::new(
        identity,
        BuildInfo::current(),
        tracker,
        Arc::new(registry.clone()),
        CapabilitySet::detect(&cfg),
        store,
        &cfg,
    ));
    let app_state = AppState {
        report,
        registry,
        bearer_token: cfg.bearer_token.as_deref().map(Arc::from),
    };

    let app = http::build_router(app_state);
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.listen_port));
    info!("agentd listening on http://{addr}");
    let listener = TcpListener::bind(addr).await.context("failed to bind listen port")?;
    axum::serve(listener, app).await.context("HTTP server failed")?;
    Ok(())
}
