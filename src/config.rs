//! Configuration for Traceway
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use uuid::Uuid;

use crate::types::TracewayError;

/// Traceway - supply-chain traceability gateway
#[derive(Parser, Debug, Clone)]
#[command(name = "traceway")]
#[command(about = "Supply-chain traceability gateway with ledger reconciliation")]
pub struct Args {
    /// Unique node identifier for this gateway instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Base URL of the permissioned-ledger HTTP service (chaincode gateway)
    #[arg(long, env = "LEDGER_URL", default_value = "http://localhost:4000")]
    pub ledger_url: String,

    /// Ledger channel name used in chaincode endpoint paths
    #[arg(long, env = "LEDGER_CHANNEL", default_value = "mychannel")]
    pub ledger_channel: String,

    /// Organization name presented when requesting ledger tokens
    #[arg(long, env = "LEDGER_ORG", default_value = "Org1")]
    pub ledger_org: String,

    /// Timeout for ledger HTTP calls in milliseconds
    ///
    /// A hung ledger must never stall the primary read path; on timeout the
    /// affected records are reported as unverified.
    #[arg(long, env = "LEDGER_TIMEOUT_MS", default_value = "5000")]
    pub ledger_timeout_ms: u64,

    /// Enable development mode (relaxed auth, optional MongoDB/ledger)
    #[arg(long, env = "DEV_MODE")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "traceway")]
    pub mongodb_db: String,

    /// JWT secret for token signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    pub jwt_expiry_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Default page size for list endpoints
    #[arg(long, env = "DEFAULT_PAGE_SIZE", default_value = "20")]
    pub default_page_size: u32,

    /// Maximum page size for list endpoints
    #[arg(long, env = "MAX_PAGE_SIZE", default_value = "100")]
    pub max_page_size: u32,
}

impl Args {
    /// Build the ledger client configuration from these args
    pub fn ledger_config(&self) -> crate::ledger::LedgerConfig {
        crate::ledger::LedgerConfig {
            base_url: self.ledger_url.trim_end_matches('/').to_string(),
            channel: self.ledger_channel.clone(),
            org_name: self.ledger_org.clone(),
            timeout: Duration::from_millis(self.ledger_timeout_ms),
        }
    }

    /// Clamp a requested page size to the configured bounds
    pub fn clamp_page_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), TracewayError> {
        if !self.dev_mode && self.jwt_secret.is_none() {
            return Err(TracewayError::Config(
                "JWT_SECRET is required in production mode".to_string(),
            ));
        }

        if self.ledger_url.is_empty() {
            return Err(TracewayError::Config(
                "LEDGER_URL must not be empty".to_string(),
            ));
        }

        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(TracewayError::Config(
                "DEFAULT_PAGE_SIZE must be between 1 and MAX_PAGE_SIZE".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args::parse_from(["traceway", "--dev-mode"])
    }

    #[test]
    fn test_clamp_page_size() {
        let args = base_args();
        assert_eq!(args.clamp_page_size(None), 20);
        assert_eq!(args.clamp_page_size(Some(50)), 50);
        assert_eq!(args.clamp_page_size(Some(5000)), 100);
        assert_eq!(args.clamp_page_size(Some(0)), 1);
    }

    #[test]
    fn test_ledger_config_strips_trailing_slash() {
        let mut args = base_args();
        args.ledger_url = "http://ledger:4000/".to_string();
        assert_eq!(args.ledger_config().base_url, "http://ledger:4000");
    }

    #[test]
    fn test_validate_requires_jwt_secret_in_production() {
        let mut args = base_args();
        args.dev_mode = false;
        args.jwt_secret = None;
        assert!(args.validate().is_err());

        args.jwt_secret = Some("secret".into());
        assert!(args.validate().is_ok());
    }
}
