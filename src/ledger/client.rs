//! HTTP client for the permissioned-ledger (chaincode) service
//!
//! One reqwest client with a bounded timeout, constructed from an explicit
//! `LedgerConfig` so tests can point it at a mock server without touching
//! the environment. Read failures are soft: the caller degrades to
//! unverified. Token acquisition failures are typed separately because the
//! write path treats them as hard errors.

use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::ledger::entity::EntityKind;
use crate::ledger::reconcile::LedgerRecord;
use crate::ledger::token::{LedgerIdentity, LedgerToken};

/// Errors from the ledger client
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The ledger read path failed (network, timeout, non-2xx). Callers
    /// degrade: records are reported unverified, the request still succeeds.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// The token endpoint refused or failed to issue a bearer token.
    /// Hard error on write paths.
    #[error("ledger token acquisition failed: {0}")]
    TokenAcquisition(String),

    /// A write invocation was rejected by the ledger
    #[error("ledger invoke rejected: {0}")]
    InvokeRejected(String),

    /// Client construction failed
    #[error("ledger client construction failed: {0}")]
    Construction(String),
}

/// Ledger endpoint configuration
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Base URL without trailing slash, e.g. "http://ledger:4000"
    pub base_url: String,
    /// Channel name in chaincode paths
    pub channel: String,
    /// Organization name presented when requesting tokens
    pub org_name: String,
    /// Per-call timeout
    pub timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4000".to_string(),
            channel: "mychannel".to_string(),
            org_name: "Org1".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Serialize)]
struct ChaincodeRequest<'a> {
    fcn: &'a str,
    args: &'a [String],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    userid: &'a str,
    org_name: &'a str,
    company_name: &'a str,
}

/// Client for the external ledger HTTP service
pub struct LedgerClient {
    config: LedgerConfig,
    http: reqwest::Client,
}

impl LedgerClient {
    /// Create a new ledger client
    pub fn new(config: LedgerConfig) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LedgerError::Construction(e.to_string()))?;

        Ok(Self { config, http })
    }

    /// Get the client configuration
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    fn chaincode_url(&self, kind: EntityKind) -> String {
        format!(
            "{}/channels/{}/chaincodes/{}",
            self.config.base_url,
            self.config.channel,
            kind.chaincode()
        )
    }

    /// Exchange a caller identity for a request-scoped bearer token
    ///
    /// `POST {base}/users/token` with `{userid, orgName, companyName}`,
    /// expecting `{message: {token}}`.
    pub async fn request_token(
        &self,
        identity: &LedgerIdentity,
    ) -> Result<LedgerToken, LedgerError> {
        let url = format!("{}/users/token", self.config.base_url);
        let body = TokenRequest {
            userid: &identity.user_id,
            org_name: &identity.org_name,
            company_name: &identity.company_name,
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::TokenAcquisition(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LedgerError::TokenAcquisition(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| LedgerError::TokenAcquisition(format!("invalid token response: {e}")))?;

        payload
            .pointer("/message/token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(|t| LedgerToken::new(t.to_string()))
            .ok_or_else(|| {
                LedgerError::TokenAcquisition("token missing from response body".to_string())
            })
    }

    /// Register an identity with the ledger and obtain a token
    ///
    /// `POST {base}/register` expecting `{token}`. Used at signup and for
    /// admin-initiated company status changes.
    pub async fn register_identity(
        &self,
        identity: &LedgerIdentity,
    ) -> Result<LedgerToken, LedgerError> {
        let url = format!("{}/register", self.config.base_url);
        let body = TokenRequest {
            userid: &identity.user_id,
            org_name: &identity.org_name,
            company_name: &identity.company_name,
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::TokenAcquisition(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LedgerError::TokenAcquisition(format!(
                "register endpoint returned {}",
                response.status()
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| LedgerError::TokenAcquisition(format!("invalid register response: {e}")))?;

        payload
            .get("token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(|t| LedgerToken::new(t.to_string()))
            .ok_or_else(|| {
                LedgerError::TokenAcquisition("token missing from register response".to_string())
            })
    }

    /// Fetch the ledger's stored digests for a batch of record ids
    ///
    /// One round trip per reconciliation batch regardless of page size.
    /// A response that deviates from `{result: {result: [...]}}` is "no
    /// ledger data", not an error; only transport-level failures are.
    pub async fn fetch_hashes(
        &self,
        kind: EntityKind,
        ids: &[String],
        token: &LedgerToken,
    ) -> Result<Vec<LedgerRecord>, LedgerError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.chaincode_url(kind);
        let body = ChaincodeRequest {
            fcn: kind.read_fcn(),
            args: ids,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(token.as_str())
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LedgerError::Unavailable(format!(
                "{} returned {}",
                kind,
                response.status()
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| LedgerError::Unavailable(format!("unreadable response: {e}")))?;

        Ok(parse_ledger_records(kind, &payload))
    }

    /// Invoke a chaincode write function
    ///
    /// The acknowledgement body is opaque; only the HTTP status matters.
    pub async fn invoke(
        &self,
        kind: EntityKind,
        fcn: &str,
        args: &[String],
        token: &LedgerToken,
    ) -> Result<(), LedgerError> {
        let url = self.chaincode_url(kind);
        let body = ChaincodeRequest { fcn, args };

        debug!(entity = %kind, fcn, "Invoking chaincode write");

        let response = self
            .http
            .post(&url)
            .bearer_auth(token.as_str())
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LedgerError::InvokeRejected(format!(
                "{} {} returned {}",
                kind,
                fcn,
                response.status()
            )));
        }

        Ok(())
    }
}

/// Extract `{id, blockHash}` pairs from a chaincode read response
///
/// The record identifier key varies by entity type (`BatchID`, `ProductId`,
/// `id`); entries missing either field are skipped.
fn parse_ledger_records(kind: EntityKind, payload: &Value) -> Vec<LedgerRecord> {
    let Some(entries) = payload.pointer("/result/result").and_then(Value::as_array) else {
        warn!(entity = %kind, "Ledger response missing result.result array, treating as no data");
        return Vec::new();
    };

    let id_field = kind.response_id_field();
    entries
        .iter()
        .filter_map(|entry| {
            let id = entry.get(id_field).and_then(Value::as_str)?;
            let block_hash = entry.get("blockHash").and_then(Value::as_str)?;
            Some(LedgerRecord {
                id: id.to_string(),
                block_hash: block_hash.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_nested_result_with_entity_id_key() {
        let payload = json!({
            "result": {
                "result": [
                    { "BatchID": "abc123", "blockHash": "deadbeef" },
                    { "BatchID": "def456", "blockHash": "pending" }
                ]
            }
        });

        let records = parse_ledger_records(EntityKind::Batch, &payload);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "abc123");
        assert_eq!(records[0].block_hash, "deadbeef");
    }

    #[test]
    fn test_parse_company_uses_plain_id_key() {
        let payload = json!({
            "result": { "result": [ { "id": "abc123", "blockHash": "deadbeef" } ] }
        });

        let records = parse_ledger_records(EntityKind::Company, &payload);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "abc123");
    }

    #[test]
    fn test_wrong_id_key_is_skipped() {
        // Product responses keyed "id" instead of "ProductId" yield no join
        let payload = json!({
            "result": { "result": [ { "id": "abc123", "blockHash": "deadbeef" } ] }
        });

        let records = parse_ledger_records(EntityKind::Product, &payload);
        assert!(records.is_empty());
    }

    #[test]
    fn test_missing_nesting_is_no_data() {
        for payload in [
            json!({}),
            json!({ "result": "oops" }),
            json!({ "result": { "result": "not-an-array" } }),
            json!([1, 2, 3]),
        ] {
            assert!(parse_ledger_records(EntityKind::Batch, &payload).is_empty());
        }
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let payload = json!({
            "result": {
                "result": [
                    { "BatchID": "good", "blockHash": "deadbeef" },
                    { "BatchID": "no-hash" },
                    { "blockHash": "no-id" },
                    "not-an-object"
                ]
            }
        });

        let records = parse_ledger_records(EntityKind::Batch, &payload);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "good");
    }
}
