//! Canonical digest of a projection
//!
//! SHA-256 over the UTF-8 canonical JSON serialization, rendered as
//! lowercase hex. This is an integrity fingerprint for drift detection
//! between the database and the ledger, not a salted commitment.

use sha2::{Digest, Sha256};

use crate::ledger::projection::Projection;

/// Compute the canonical digest of a projection
pub fn digest(projection: &Projection) -> String {
    sha256_hex(projection.canonical_json().as_bytes())
}

/// SHA-256 of raw bytes as lowercase hex
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_vector() {
        // SHA-256 of the canonical serialization of the four fields below,
        // independently computed with sha256sum
        let mut p = Projection::new();
        p.insert("id", json!("abc123"));
        p.insert("batchId", json!("B-1"));
        p.insert("startDate", json!("2024-01-01T00:00:00.000Z"));
        p.insert("endDate", json!("2024-02-01T00:00:00.000Z"));

        assert_eq!(
            p.canonical_json(),
            r#"{"batchId":"B-1","endDate":"2024-02-01T00:00:00.000Z","id":"abc123","startDate":"2024-01-01T00:00:00.000Z"}"#
        );
        assert_eq!(
            digest(&p),
            "f76fb53830b4c9c419d1ff0737726c57ba8a8cf2c558b62bb8ac8788837da1d1"
        );
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let mut forward = Projection::new();
        forward.insert("id", json!("abc123"));
        forward.insert("batchId", json!("B-1"));
        forward.insert("startDate", json!("2024-01-01T00:00:00.000Z"));
        forward.insert("endDate", json!("2024-02-01T00:00:00.000Z"));

        let mut reversed = Projection::new();
        reversed.insert("endDate", json!("2024-02-01T00:00:00.000Z"));
        reversed.insert("startDate", json!("2024-01-01T00:00:00.000Z"));
        reversed.insert("batchId", json!("B-1"));
        reversed.insert("id", json!("abc123"));

        assert_eq!(forward.canonical_json(), reversed.canonical_json());
        assert_eq!(digest(&forward), digest(&reversed));
    }

    #[test]
    fn test_structurally_different_projections_differ() {
        let mut a = Projection::new();
        a.insert("id", json!("abc123"));

        let mut b = Projection::new();
        b.insert("id", json!("abc124"));

        assert_ne!(digest(&a), digest(&b));
    }

    #[test]
    fn test_empty_projection() {
        let empty = Projection::new();
        // SHA-256 of "{}"
        assert_eq!(
            digest(&empty),
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }

    #[test]
    fn test_digest_is_lowercase_hex() {
        let mut p = Projection::new();
        p.insert("id", json!("abc123"));
        let d = digest(&p);
        assert_eq!(d.len(), 64);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
