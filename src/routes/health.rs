//! Health and status endpoints
//!
//! - GET /health  - Liveness (always 200 while the process runs)
//! - GET /ready   - Readiness (database reachable, or dev mode)
//! - GET /version - Build information
//! - GET /status  - Node status including ledger configuration

use hyper::{Response, StatusCode};
use serde_json::json;
use std::sync::Arc;

use crate::routes::helpers::{json_response, BoxBody};
use crate::server::AppState;

/// GET /health
pub fn handle_health(state: &Arc<AppState>) -> Response<BoxBody> {
    json_response(
        StatusCode::OK,
        &json!({
            "status": "ok",
            "nodeId": state.args.node_id,
            "uptimeSeconds": state.started_at.elapsed().as_secs(),
        }),
    )
}

/// GET /ready
///
/// Ready once the database is connected. In dev mode the server may run
/// without MongoDB, and reports ready regardless.
pub async fn handle_ready(state: &Arc<AppState>) -> Response<BoxBody> {
    let db_ok = match &state.mongo {
        Some(mongo) => mongo.ping().await.is_ok(),
        None => state.args.dev_mode,
    };

    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    json_response(
        status,
        &json!({
            "ready": db_ok,
            "database": if state.mongo.is_some() { "connected" } else { "disabled" },
        }),
    )
}

/// GET /version
pub fn handle_version() -> Response<BoxBody> {
    json_response(
        StatusCode::OK,
        &json!({
            "version": env!("CARGO_PKG_VERSION"),
            "name": env!("CARGO_PKG_NAME"),
            "gitCommit": env!("GIT_COMMIT_SHORT"),
            "builtAt": env!("BUILD_TIMESTAMP"),
        }),
    )
}

/// GET /status
pub fn handle_status(state: &Arc<AppState>) -> Response<BoxBody> {
    json_response(
        StatusCode::OK,
        &json!({
            "nodeId": state.args.node_id,
            "devMode": state.args.dev_mode,
            "uptimeSeconds": state.started_at.elapsed().as_secs(),
            "database": state.mongo.is_some(),
            "ledger": {
                "url": state.args.ledger_url,
                "channel": state.args.ledger_channel,
                "org": state.args.ledger_org,
            },
        }),
    )
}
