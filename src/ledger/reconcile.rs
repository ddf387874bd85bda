//! Reconciliation of local digests against ledger records
//!
//! Pure functions: no I/O, no mutation of inputs, same inputs always yield
//! the same outputs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Tri-state verification status attached to outward-facing records
///
/// Never persisted. The historical API exposed a mix of booleans and
/// strings; this enum is the single representation, serialized as
/// lowercase strings at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    /// Local digest matches the ledger digest
    Verified,
    /// Ledger has no record, a different digest, or was unreachable
    Unverified,
    /// Ledger explicitly reported the record as not yet committed
    Pending,
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationStatus::Verified => write!(f, "verified"),
            VerificationStatus::Unverified => write!(f, "unverified"),
            VerificationStatus::Pending => write!(f, "pending"),
        }
    }
}

/// One `{id, blockHash}` pair from a ledger read response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRecord {
    pub id: String,
    pub block_hash: String,
}

/// A locally computed digest for one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDigest {
    pub id: String,
    pub hash: String,
}

/// A record's reconciliation outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub id: String,
    pub status: VerificationStatus,
}

/// Classify one local digest against the ledger's stored hash, if any
///
/// Hex comparison is lowercase-normalized on both sides; the sentinel
/// `"pending"` is matched case-insensitively after trimming.
pub fn classify(local_hash: &str, ledger_hash: Option<&str>) -> VerificationStatus {
    let Some(ledger_hash) = ledger_hash else {
        return VerificationStatus::Unverified;
    };

    let ledger_hash = ledger_hash.trim();
    if ledger_hash.eq_ignore_ascii_case("pending") {
        return VerificationStatus::Pending;
    }

    if ledger_hash.to_ascii_lowercase() == local_hash.to_ascii_lowercase() {
        VerificationStatus::Verified
    } else {
        VerificationStatus::Unverified
    }
}

/// Join local digests with ledger records by id and classify each
pub fn reconcile(locals: &[LocalDigest], ledger: &[LedgerRecord]) -> Vec<Reconciled> {
    let by_id: HashMap<&str, &str> = ledger
        .iter()
        .map(|r| (r.id.as_str(), r.block_hash.as_str()))
        .collect();

    locals
        .iter()
        .map(|local| Reconciled {
            id: local.id.clone(),
            status: classify(&local.hash, by_id.get(local.id.as_str()).copied()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "f76fb53830b4c9c419d1ff0737726c57ba8a8cf2c558b62bb8ac8788837da1d1";

    #[test]
    fn test_matching_hash_is_verified() {
        assert_eq!(classify(HASH, Some(HASH)), VerificationStatus::Verified);
    }

    #[test]
    fn test_case_is_normalized_before_comparison() {
        let upper = HASH.to_ascii_uppercase();
        assert_eq!(classify(HASH, Some(&upper)), VerificationStatus::Verified);
        assert_eq!(classify(&upper, Some(HASH)), VerificationStatus::Verified);
    }

    #[test]
    fn test_different_hash_is_unverified() {
        let zeros = "0".repeat(64);
        assert_eq!(classify(HASH, Some(&zeros)), VerificationStatus::Unverified);
    }

    #[test]
    fn test_pending_sentinel_variants() {
        for sentinel in ["pending", "PENDING", "Pending", " Pending "] {
            assert_eq!(
                classify(HASH, Some(sentinel)),
                VerificationStatus::Pending,
                "sentinel {sentinel:?}"
            );
        }
    }

    #[test]
    fn test_missing_ledger_record_is_unverified() {
        assert_eq!(classify(HASH, None), VerificationStatus::Unverified);
    }

    #[test]
    fn test_reconcile_joins_by_id() {
        let locals = vec![
            LocalDigest {
                id: "abc123".into(),
                hash: HASH.into(),
            },
            LocalDigest {
                id: "def456".into(),
                hash: HASH.into(),
            },
            LocalDigest {
                id: "ghi789".into(),
                hash: HASH.into(),
            },
        ];
        let ledger = vec![
            LedgerRecord {
                id: "abc123".into(),
                block_hash: HASH.into(),
            },
            LedgerRecord {
                id: "def456".into(),
                block_hash: "pending".into(),
            },
            // no entry for ghi789
        ];

        let result = reconcile(&locals, &ledger);
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].status, VerificationStatus::Verified);
        assert_eq!(result[1].status, VerificationStatus::Pending);
        assert_eq!(result[2].status, VerificationStatus::Unverified);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let locals = vec![LocalDigest {
            id: "abc123".into(),
            hash: HASH.into(),
        }];
        let ledger = vec![LedgerRecord {
            id: "abc123".into(),
            block_hash: HASH.into(),
        }];

        let first = reconcile(&locals, &ledger);
        let second = reconcile(&locals, &ledger);
        assert_eq!(first, second);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&VerificationStatus::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(
            serde_json::to_string(&VerificationStatus::Unverified).unwrap(),
            "\"unverified\""
        );
    }
}
