//! Traceway - supply-chain traceability gateway
//!
//! Companies register products in batches, retailers sell them to customers,
//! and every state-changing action is mirrored to an external permissioned
//! ledger over HTTP. Reads reconcile the local database against the ledger:
//! each record is projected to a canonical field set, hashed with SHA-256,
//! and compared with the digest the ledger stored for it, yielding a
//! tri-state `blockChainVerified` status on every API response.
//!
//! ## Services
//!
//! - **Routes**: REST API for companies, batches, products, and sales
//! - **Ledger**: canonical projection, digest, chaincode client, reconciler
//! - **Auth**: JWT sessions and argon2 credentials backed by MongoDB

pub mod auth;
pub mod config;
pub mod db;
pub mod ledger;
pub mod routes;
pub mod server;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{Result, TracewayError};
