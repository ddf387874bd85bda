//! Shared route plumbing
//!
//! Response builders, JSON body parsing, pagination, and the
//! authentication/token-provisioning steps that run ahead of every
//! `/api/*` handler.

use bson::oid::ObjectId;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::auth::{extract_token_from_header, Claims, JwtValidator};
use crate::ledger::{Projection, Verification};
use crate::server::AppState;
use crate::types::TracewayError;

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .body(full_body(json))
        .unwrap()
}

pub fn error_response(status: StatusCode, error: impl Into<String>, code: &str) -> Response<BoxBody> {
    json_response(
        status,
        &ErrorResponse {
            error: error.into(),
            code: Some(code.to_string()),
        },
    )
}

pub fn cors_preflight() -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .header("Access-Control-Max-Age", "86400")
        .body(empty_body())
        .unwrap()
}

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

/// Largest accepted request body
const MAX_BODY_BYTES: usize = 65536;

pub async fn parse_json_body<T, B>(req: Request<B>) -> Result<T, TracewayError>
where
    T: for<'de> Deserialize<'de>,
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    // Reject declared-oversize bodies before reading a single frame
    if let Some(len) = req
        .headers()
        .get(hyper::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
    {
        if len > MAX_BODY_BYTES as u64 {
            return Err(TracewayError::Http("Request body too large".into()));
        }
    }

    // Limited aborts mid-stream once the cap is crossed, so a chunked body
    // with no Content-Length never accumulates past the limit either
    let bytes = http_body_util::Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| TracewayError::Http(format!("Failed to read body: {}", e)))?
        .to_bytes();

    serde_json::from_slice(&bytes)
        .map_err(|e| TracewayError::Http(format!("Invalid JSON: {}", e)))
}

pub fn get_auth_header(req: &Request<hyper::body::Incoming>) -> Option<&str> {
    req.headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// Build the JWT validator for this deployment
pub fn jwt_validator(state: &AppState) -> Result<JwtValidator, Response<BoxBody>> {
    if state.args.dev_mode {
        Ok(JwtValidator::new_dev())
    } else {
        match &state.args.jwt_secret {
            Some(secret) => JwtValidator::new(secret.clone(), state.args.jwt_expiry_seconds)
                .map_err(|e| {
                    error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        format!("JWT configuration error: {}", e),
                        "CONFIG_ERROR",
                    )
                }),
            None => Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "JWT secret not configured",
                "CONFIG_ERROR",
            )),
        }
    }
}

/// Authenticate a request, returning its claims or a ready error response
pub fn authenticate(
    req: &Request<hyper::body::Incoming>,
    state: &AppState,
) -> Result<Claims, Response<BoxBody>> {
    let jwt = jwt_validator(state)?;

    let header = get_auth_header(req).ok_or_else(|| {
        error_response(
            StatusCode::UNAUTHORIZED,
            "Missing Authorization header",
            "UNAUTHORIZED",
        )
    })?;

    let token = extract_token_from_header(header).ok_or_else(|| {
        error_response(
            StatusCode::UNAUTHORIZED,
            "Malformed Authorization header",
            "UNAUTHORIZED",
        )
    })?;

    let result = jwt.verify_token(token);
    match result.claims {
        Some(claims) if result.valid => Ok(claims),
        _ => Err(error_response(
            StatusCode::UNAUTHORIZED,
            "Invalid or expired token",
            "UNAUTHORIZED",
        )),
    }
}

/// Parse `page` and `limit` query parameters, clamped to configured bounds
pub fn pagination(req: &Request<hyper::body::Incoming>, state: &AppState) -> (u32, u32) {
    let query: HashMap<String, String> = req
        .uri()
        .query()
        .map(|q| {
            q.split('&')
                .filter_map(|pair| {
                    let mut parts = pair.splitn(2, '=');
                    Some((parts.next()?.to_string(), parts.next()?.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();

    let page = query
        .get("page")
        .and_then(|p| p.parse::<u32>().ok())
        .unwrap_or(1)
        .max(1);
    let limit = state.args.clamp_page_size(query.get("limit").and_then(|l| l.parse().ok()));

    (page, limit)
}

/// Parse a 24-character hex id path segment
pub fn parse_object_id(raw: &str) -> Result<ObjectId, Response<BoxBody>> {
    ObjectId::parse_str(raw).map_err(|_| {
        error_response(
            StatusCode::BAD_REQUEST,
            format!("Invalid id: {}", raw),
            "BAD_REQUEST",
        )
    })
}

/// One outward-facing record: its public projection plus reconciliation
/// outcome (`hash` and `blockChainVerified`)
pub fn verified_item(projection: Option<&Projection>, v: &Verification) -> serde_json::Value {
    let mut map = match projection {
        Some(p) => p
            .as_map()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<serde_json::Map<String, serde_json::Value>>(),
        None => {
            let mut m = serde_json::Map::new();
            m.insert("id".to_string(), serde_json::Value::String(v.id.clone()));
            m
        }
    };

    if let Some(hash) = &v.hash {
        map.insert("hash".to_string(), serde_json::Value::String(hash.clone()));
    }
    map.insert(
        "blockChainVerified".to_string(),
        serde_json::Value::String(v.status.to_string()),
    );

    serde_json::Value::Object(map)
}

/// Ledger identity for the authenticated caller
pub fn ledger_identity(claims: &Claims, state: &AppState) -> crate::ledger::LedgerIdentity {
    crate::ledger::LedgerIdentity {
        user_id: claims.sub.clone(),
        org_name: state.args.ledger_org.clone(),
        company_name: claims.company_name.clone(),
    }
}

/// Require a granted ledger token before a write proceeds
///
/// Writes mirror their record to the ledger, so a denied or missing grant
/// aborts before anything is stored locally and before any ledger call.
pub fn require_grant(
    token: &crate::ledger::TokenState,
) -> Result<crate::ledger::LedgerToken, Response<BoxBody>> {
    token.granted().cloned().ok_or_else(|| {
        error_response(
            StatusCode::BAD_GATEWAY,
            "Ledger authorization unavailable",
            "LEDGER_AUTH",
        )
    })
}

/// Resolve a typed collection, mapping failures to ready-made error responses.
pub async fn collection<T>(
    state: &AppState,
    name: &str,
) -> Result<crate::db::mongo::MongoCollection<T>, Response<BoxBody>>
where
    T: serde::Serialize
        + serde::de::DeserializeOwned
        + Unpin
        + Send
        + Sync
        + Default
        + crate::db::mongo::IntoIndexes
        + crate::db::mongo::MutMetadata,
{
    let Some(mongo) = &state.mongo else {
        return Err(error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Database not available",
            "DB_UNAVAILABLE",
        ));
    };

    mongo.collection::<T>(name).await.map_err(|e| {
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Database error: {}", e),
            "DB_ERROR",
        )
    })
}

/// Map a storage error to a 500 response.
pub fn db_error(e: TracewayError) -> Response<BoxBody> {
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Database error: {}", e),
        "DB_ERROR",
    )
}

/// Standard list envelope
#[derive(Serialize)]
pub struct ListResponse {
    pub items: Vec<serde_json::Value>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::VerificationStatus;
    use serde_json::json;

    #[test]
    fn test_verified_item_embeds_hash_and_status() {
        let mut p = Projection::new();
        p.insert("id", json!("abc123"));
        p.insert("batchNo", json!("B-1"));

        let v = Verification {
            id: "abc123".into(),
            hash: Some("deadbeef".into()),
            status: VerificationStatus::Verified,
        };

        let item = verified_item(Some(&p), &v);
        assert_eq!(item["batchNo"], json!("B-1"));
        assert_eq!(item["hash"], json!("deadbeef"));
        assert_eq!(item["blockChainVerified"], json!("verified"));
    }

    #[test]
    fn test_denied_token_aborts_writes() {
        use crate::ledger::{LedgerToken, TokenState};

        // A write with no grant never reaches the store or the ledger
        let denied = require_grant(&TokenState::Denied("enrollment missing".into()));
        let resp = denied.unwrap_err();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let never_asked = require_grant(&TokenState::NotRequested);
        assert!(never_asked.is_err());

        let granted = require_grant(&TokenState::Granted(LedgerToken::new("tok".into())));
        assert_eq!(granted.unwrap().as_str(), "tok");
    }

    #[tokio::test]
    async fn test_oversize_declared_body_is_rejected() {
        let req = Request::builder()
            .method("POST")
            .header("Content-Length", (MAX_BODY_BYTES + 1).to_string())
            .body(Full::new(Bytes::new()))
            .unwrap();

        let result: Result<serde_json::Value, _> = parse_json_body(req).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_oversize_streamed_body_is_rejected() {
        // No Content-Length path: the limit has to hold while collecting
        let req = Request::builder()
            .method("POST")
            .body(Full::new(Bytes::from(vec![b'a'; MAX_BODY_BYTES + 1])))
            .unwrap();

        let result: Result<serde_json::Value, _> = parse_json_body(req).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_body_within_limit_parses() {
        let req = Request::builder()
            .method("POST")
            .body(Full::new(Bytes::from(r#"{"status":"approved"}"#)))
            .unwrap();

        let v: serde_json::Value = parse_json_body(req).await.unwrap();
        assert_eq!(v["status"], json!("approved"));
    }

    #[test]
    fn test_unprojected_item_still_reported() {
        let v = Verification {
            id: "abc123".into(),
            hash: None,
            status: VerificationStatus::Unverified,
        };

        let item = verified_item(None, &v);
        assert_eq!(item["id"], json!("abc123"));
        assert_eq!(item["blockChainVerified"], json!("unverified"));
        assert!(item.get("hash").is_none());
    }
}
