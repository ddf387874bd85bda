//! Top-level request router

use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::debug;

use crate::routes::helpers::{cors_preflight, error_response, BoxBody};
use crate::routes::{self, health};
use crate::server::AppState;

/// Dispatch one request
pub async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> std::result::Result<Response<BoxBody>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("{} {}", method, path);

    // Infrastructure endpoints carry no auth
    let response = match (&method, path.as_str()) {
        (&Method::OPTIONS, _) => cors_preflight(),
        (&Method::GET, "/health") => health::handle_health(&state),
        (&Method::GET, "/ready") => health::handle_ready(&state).await,
        (&Method::GET, "/version") => health::handle_version(),
        (&Method::GET, "/status") => health::handle_status(&state),

        _ if path.starts_with("/auth") => routes::handle_auth_request(req, state)
            .await
            .unwrap_or_else(not_found),

        _ if path.starts_with("/api") => routes::handle_api_request(req, state)
            .await
            .unwrap_or_else(not_found),

        _ => not_found(),
    };

    Ok(response)
}

fn not_found() -> Response<BoxBody> {
    error_response(StatusCode::NOT_FOUND, "Not found", "NOT_FOUND")
}
