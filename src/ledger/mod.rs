//! Ledger reconciliation protocol
//!
//! The one non-trivial behavior in traceway: every list/detail read
//! recomputes a canonical SHA-256 digest per record and compares it with
//! the digest the external ledger stored at write time, reporting a
//! tri-state `blockChainVerified` status. Writes mirror the fresh digest
//! to the ledger.
//!
//! Facets, in dependency order:
//! - [`projection`]: canonical field sets per entity type
//! - [`digest`]: canonical JSON + SHA-256
//! - [`client`]: HTTP client for the chaincode endpoints
//! - [`reconcile`]: digest join and classification
//! - [`token`]: request-scoped bearer token provisioning

pub mod client;
pub mod digest;
pub mod entity;
pub mod projection;
pub mod reconcile;
pub mod token;

pub use client::{LedgerClient, LedgerConfig, LedgerError};
pub use digest::digest;
pub use entity::EntityKind;
pub use projection::{Projection, ReferenceResolutionError};
pub use reconcile::{classify, reconcile, LedgerRecord, LocalDigest, Reconciled, VerificationStatus};
pub use token::{LedgerIdentity, LedgerToken, TokenState};

use std::sync::Arc;
use tracing::{debug, warn};

/// One record prepared for reconciliation
///
/// `projection` is `None` when the canonical projection could not be built
/// (unresolved reference); the record is still reported, as unverified.
pub struct ProjectedRecord {
    pub id: String,
    pub projection: Option<Projection>,
}

/// Reconciliation outcome for one record, ready to embed in a response
#[derive(Debug, Clone)]
pub struct Verification {
    pub id: String,
    pub hash: Option<String>,
    pub status: VerificationStatus,
}

/// Facade over the reconciliation pipeline
///
/// Stateless apart from the shared HTTP client; every call builds fresh
/// digests and result vectors.
#[derive(Clone)]
pub struct LedgerService {
    client: Arc<LedgerClient>,
}

impl LedgerService {
    pub fn new(client: Arc<LedgerClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &LedgerClient {
        &self.client
    }

    /// Exchange the caller's identity for a request-scoped token
    ///
    /// Always terminates in `Granted` or `Denied`; the caller decides
    /// whether `Denied` degrades (reads) or aborts (writes).
    pub async fn acquire_token(&self, identity: &LedgerIdentity) -> TokenState {
        debug!(user = %identity.user_id, "Requesting ledger token");

        match self.client.request_token(identity).await {
            Ok(token) => TokenState::Granted(token),
            Err(e) => {
                warn!(user = %identity.user_id, error = %e, "Ledger token denied");
                TokenState::Denied(e.to_string())
            }
        }
    }

    /// Reconcile a batch of projected records against the ledger
    ///
    /// One ledger round trip for the whole batch. Degrades instead of
    /// failing: a denied token or an unreachable ledger yields every
    /// record unverified, never an error.
    pub async fn verify_batch(
        &self,
        kind: EntityKind,
        records: Vec<ProjectedRecord>,
        token: &TokenState,
    ) -> Vec<Verification> {
        // Digest whatever projected cleanly; skipped records stay hashless
        let locals: Vec<LocalDigest> = records
            .iter()
            .filter_map(|r| {
                r.projection.as_ref().map(|p| LocalDigest {
                    id: r.id.clone(),
                    hash: digest(p),
                })
            })
            .collect();

        let ledger_records = match token.granted() {
            Some(token) if !locals.is_empty() => {
                let ids: Vec<String> = locals.iter().map(|l| l.id.clone()).collect();
                match self.client.fetch_hashes(kind, &ids, token).await {
                    Ok(records) => records,
                    Err(e) => {
                        warn!(entity = %kind, error = %e, "Ledger fetch failed, reporting records unverified");
                        Vec::new()
                    }
                }
            }
            Some(_) => Vec::new(),
            None => {
                debug!(entity = %kind, "No ledger token for request, skipping reconciliation");
                Vec::new()
            }
        };

        let reconciled = reconcile(&locals, &ledger_records);
        let status_by_id: std::collections::HashMap<&str, VerificationStatus> = reconciled
            .iter()
            .map(|r| (r.id.as_str(), r.status))
            .collect();
        let hash_by_id: std::collections::HashMap<&str, &str> = locals
            .iter()
            .map(|l| (l.id.as_str(), l.hash.as_str()))
            .collect();

        records
            .into_iter()
            .map(|r| Verification {
                status: status_by_id
                    .get(r.id.as_str())
                    .copied()
                    .unwrap_or(VerificationStatus::Unverified),
                hash: hash_by_id.get(r.id.as_str()).map(|h| h.to_string()),
                id: r.id,
            })
            .collect()
    }

    /// Reconcile a single record (detail endpoints)
    pub async fn verify_one(
        &self,
        kind: EntityKind,
        id: String,
        projection: Option<Projection>,
        token: &TokenState,
    ) -> Verification {
        let mut results = self
            .verify_batch(kind, vec![ProjectedRecord { id, projection }], token)
            .await;
        results.remove(0)
    }

    /// Mirror a freshly written record to the ledger
    ///
    /// Invokes the entity's create function with `[id, digest]`. The token
    /// is a hard precondition here; callers must not reach this with a
    /// denied grant.
    pub async fn mirror_write(
        &self,
        kind: EntityKind,
        id: &str,
        projection: &Projection,
        token: &LedgerToken,
    ) -> Result<String, LedgerError> {
        let hash = digest(projection);
        let args = [id.to_string(), hash.clone()];
        self.client
            .invoke(kind, kind.create_fcn(), &args, token)
            .await?;
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn unreachable_service() -> LedgerService {
        // Port 9 (discard) is closed in test environments; connections are
        // refused immediately rather than timing out
        let client = LedgerClient::new(LedgerConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_millis(500),
            ..LedgerConfig::default()
        })
        .unwrap();
        LedgerService::new(Arc::new(client))
    }

    fn sample_projection() -> Projection {
        let mut p = Projection::new();
        p.insert("id", json!("abc123"));
        p.insert("batchNo", json!("B-1"));
        p
    }

    #[tokio::test]
    async fn test_outage_degrades_to_unverified() {
        let service = unreachable_service();
        let token = TokenState::Granted(LedgerToken::new("tok".into()));

        let records = vec![
            ProjectedRecord {
                id: "abc123".into(),
                projection: Some(sample_projection()),
            },
            ProjectedRecord {
                id: "def456".into(),
                projection: Some(sample_projection()),
            },
        ];

        let result = service
            .verify_batch(EntityKind::Batch, records, &token)
            .await;

        assert_eq!(result.len(), 2);
        for v in &result {
            assert_eq!(v.status, VerificationStatus::Unverified);
            // Local digest is still computed and reported
            assert!(v.hash.is_some());
        }
    }

    #[tokio::test]
    async fn test_denied_token_skips_ledger_entirely() {
        let service = unreachable_service();
        let token = TokenState::Denied("upstream 503".into());

        let result = service
            .verify_batch(
                EntityKind::Company,
                vec![ProjectedRecord {
                    id: "abc123".into(),
                    projection: Some(sample_projection()),
                }],
                &token,
            )
            .await;

        assert_eq!(result[0].status, VerificationStatus::Unverified);
    }

    #[tokio::test]
    async fn test_unprojected_record_has_no_hash() {
        let service = unreachable_service();
        let token = TokenState::Granted(LedgerToken::new("tok".into()));

        let result = service
            .verify_one(EntityKind::Product, "abc123".into(), None, &token)
            .await;

        assert_eq!(result.status, VerificationStatus::Unverified);
        assert!(result.hash.is_none());
    }

    #[tokio::test]
    async fn test_token_denied_against_unreachable_endpoint() {
        let service = unreachable_service();
        let identity = LedgerIdentity {
            user_id: "abc123".into(),
            org_name: "Org1".into(),
            company_name: "Acme".into(),
        };

        let state = service.acquire_token(&identity).await;
        assert!(state.is_denied());
    }
}
