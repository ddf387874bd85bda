//! Traceway - supply-chain traceability gateway

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use traceway::config::Args;
use traceway::db::MongoClient;
use traceway::ledger::{LedgerClient, LedgerService};
use traceway::server::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("traceway={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Print startup banner
    info!("======================================");
    info!("  Traceway - Traceability Gateway");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!(
        "Mode: {}",
        if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" }
    );
    info!(
        "Ledger: {} (channel {}, org {})",
        args.ledger_url, args.ledger_channel, args.ledger_org
    );

    // Connect to MongoDB; dev mode may run without it
    let mongo = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => Some(client),
        Err(e) if args.dev_mode => {
            warn!("MongoDB unavailable, continuing without it: {}", e);
            None
        }
        Err(e) => {
            error!("MongoDB connection failed: {}", e);
            std::process::exit(1);
        }
    };

    let ledger_client = LedgerClient::new(args.ledger_config())?;
    let ledger = LedgerService::new(Arc::new(ledger_client));

    let state = AppState::new(args, mongo, ledger);
    server::run(state).await?;

    Ok(())
}
