//! Shared error and result types

use thiserror::Error;

/// Errors that can occur in traceway
#[derive(Error, Debug)]
pub enum TracewayError {
    /// MongoDB connection or query errors
    #[error("Database error: {0}")]
    Database(String),

    /// HTTP request/body handling errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Authentication and authorization errors
    #[error("Auth error: {0}")]
    Auth(String),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Ledger (chaincode) service errors
    #[error("Ledger error: {0}")]
    Ledger(#[from] crate::ledger::LedgerError),

    /// IO errors (socket bind, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, TracewayError>;
