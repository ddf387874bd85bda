//! HTTP server
//!
//! Plain hyper accept loop; one spawned task per connection. All handler
//! state hangs off [`AppState`] behind an `Arc`.

mod http;

pub use http::handle_request;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::Args;
use crate::db::mongo::MongoClient;
use crate::ledger::LedgerService;
use crate::types::{Result, TracewayError};

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Absent only in dev mode
    pub mongo: Option<MongoClient>,
    pub ledger: LedgerService,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(args: Args, mongo: Option<MongoClient>, ledger: LedgerService) -> Self {
        Self {
            args,
            mongo,
            ledger,
            started_at: Instant::now(),
        }
    }
}

/// Run the HTTP server until the process is stopped
pub async fn run(state: AppState) -> Result<()> {
    let addr = state.args.listen.clone();
    let state = Arc::new(state);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| TracewayError::Http(format!("Failed to bind {}: {}", addr, e)))?;

    info!("Listening on http://{}", addr);

    loop {
        let (stream, remote) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Accept failed: {}", e);
                continue;
            }
        };

        let io = TokioIo::new(stream);
        let state = Arc::clone(&state);

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let state = Arc::clone(&state);
                async move { handle_request(req, state).await }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                // Client resets and half-closed keep-alives land here
                tracing::debug!(remote = %remote, "Connection error: {}", e);
            }
        });
    }
}
