//! Status report API.
//!
//! Exposes the v2 report surface over HTTP. `/health` is always open;
//! everything under `/api` is gated by the bearer middleware when a
//! token is configured. Detail handlers time their own assembly and
//! embed the measurement under `timings`.

use crate::nodes::{NodeRegistry, NodeState};
use crate::report::{QueryTimings, ReportBuilder, ReportDocument, ReportOptions};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Clone)]
pub struct AppState {
    pub report: Arc<ReportBuilder>,
    pub registry: NodeRegistry,
    pub bearer_token: Option<Arc<str>>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/v2/agent", get(get_agent))
        .route("/api/v2/info", get(get_info))
        .route("/api/v2/agents", get(get_agents))
        .route("/api/v2/nodes", get(get_nodes))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_bearer))
        .with_state(app_state)
}

#[derive(Serialize)]
struct NodeView {
    node_id: String,
    hostname: String,
    is_self: bool,
    receiving: bool,
    sending: bool,
    last_seen: String,
}

fn to_view(node: &NodeState) -> NodeView {
    NodeView {
        node_id: node.node_id.clone(),
        hostname: node.hostname.clone(),
        is_self: node.is_self,
        receiving: node.receiving,
        sending: node.sending,
        last_seen: node.last_seen.format(&Rfc3339).unwrap_or_default(),
    }
}

async fn require_bearer(
    State(app): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if req.uri().path().starts_with("/health") {
        return Ok(next.run(req).await);
    }

    let Some(expected) = app.bearer_token.as_deref() else {
        // No token configured: the API is deliberately open.
        return Ok(next.run(req).await);
    };

    let ok = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn ms(duration: std::time::Duration) -> f64 {
    duration.as_secs_f64() * 1_000.0
}

// GET /api/v2/agent (identity only - skips tier and member iteration)
async fn get_agent(State(app): State<AppState>) -> Json<ReportDocument> {
    let opts = ReportOptions { include_detail: false, wrap_in_array: false };
    Json(app.report.build(now_unix(), opts, None))
}

// GET /api/v2/info (full single-agent record)
async fn get_info(State(app): State<AppState>) -> Json<ReportDocument> {
    Json(detailed(&app, false))
}

// GET /api/v2/agents (full record, multi-agent shape)
async fn get_agents(State(app): State<AppState>) -> Json<ReportDocument> {
    Json(detailed(&app, true))
}

// GET /api/v2/nodes (cluster member list)
async fn get_nodes(State(app): State<AppState>) -> Json<Vec<NodeView>> {
    let list: Vec<NodeView> = app.registry.snapshot().iter().map(to_view).collect();
    Json(list)
}

fn detailed(app: &AppState, wrap_in_array: bool) -> ReportDocument {
    let received = Instant::now();
    let now = now_unix();
    let routing_ms = ms(received.elapsed());

    let prep = Instant::now();
    let mut record =
        app.report.assemble(now, ReportOptions { include_detail: true, wrap_in_array });
    record.timings = Some(QueryTimings { routing_ms, prep_ms: ms(prep.elapsed()) });
    ReportDocument::new(record, wrap_in_array)
}
