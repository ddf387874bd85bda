//! JWT token generation and validation
//!
//! HS256 tokens carrying the user's identity, role, and permission level.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth::PermissionLevel;
use crate::db::schemas::OrgRole;
use crate::types::TracewayError;

/// Claims embedded in a traceway JWT
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User document id (hex ObjectId)
    pub sub: String,
    /// User identifier (email)
    pub identifier: String,
    /// Display name
    pub display_name: String,
    /// Organization role
    pub org_role: OrgRole,
    /// Company or shop name
    #[serde(default)]
    pub company_name: String,
    /// Permission level granted at login
    pub permission_level: PermissionLevel,
    /// Token version, checked against the user document on sensitive ops
    #[serde(default)]
    pub token_version: i32,
    /// Issued at (unix seconds)
    pub iat: u64,
    /// Expiry (unix seconds)
    pub exp: u64,
}

/// Input for token generation
#[derive(Debug, Clone)]
pub struct TokenInput {
    pub user_id: String,
    pub identifier: String,
    pub display_name: String,
    pub org_role: OrgRole,
    pub company_name: String,
    pub permission_level: PermissionLevel,
    pub token_version: i32,
}

/// Result of verifying a token
#[derive(Debug)]
pub struct TokenValidationResult {
    pub valid: bool,
    pub claims: Option<Claims>,
    pub error: Option<String>,
}

/// JWT generator/validator bound to one signing secret
#[derive(Clone)]
pub struct JwtValidator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_seconds: u64,
}

impl JwtValidator {
    /// Create a validator with the given secret and token lifetime
    pub fn new(secret: String, expiry_seconds: u64) -> Result<Self, TracewayError> {
        if secret.is_empty() {
            return Err(TracewayError::Auth("JWT secret must not be empty".into()));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry_seconds,
        })
    }

    /// Dev-mode validator with a fixed insecure secret
    pub fn new_dev() -> Self {
        Self::new("dev-only-insecure-secret".to_string(), 3600)
            .expect("dev validator construction cannot fail")
    }

    /// Generate a signed token for the given input
    pub fn generate_token(&self, input: TokenInput) -> Result<String, TracewayError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| TracewayError::Auth(format!("Clock error: {e}")))?
            .as_secs();

        let claims = Claims {
            sub: input.user_id,
            identifier: input.identifier,
            display_name: input.display_name,
            org_role: input.org_role,
            company_name: input.company_name,
            permission_level: input.permission_level,
            token_version: input.token_version,
            iat: now,
            exp: now + self.expiry_seconds,
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| TracewayError::Auth(format!("Failed to sign token: {e}")))
    }

    /// Verify a token and extract its claims
    pub fn verify_token(&self, token: &str) -> TokenValidationResult {
        match decode::<Claims>(token, &self.decoding_key, &Validation::default()) {
            Ok(data) => TokenValidationResult {
                valid: true,
                claims: Some(data.claims),
                error: None,
            },
            Err(e) => TokenValidationResult {
                valid: false,
                claims: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Extract a bearer token from an Authorization header value
pub fn extract_token_from_header(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_input() -> TokenInput {
        TokenInput {
            user_id: "64b1f0c2a1b2c3d4e5f60718".to_string(),
            identifier: "maker@example.com".to_string(),
            display_name: "Acme Foods".to_string(),
            org_role: OrgRole::Company,
            company_name: "Acme Foods".to_string(),
            permission_level: PermissionLevel::Authenticated,
            token_version: 1,
        }
    }

    #[test]
    fn test_generate_and_verify() {
        let jwt = JwtValidator::new("test-secret".into(), 3600).unwrap();
        let token = jwt.generate_token(sample_input()).unwrap();

        let result = jwt.verify_token(&token);
        assert!(result.valid);

        let claims = result.claims.unwrap();
        assert_eq!(claims.sub, "64b1f0c2a1b2c3d4e5f60718");
        assert_eq!(claims.org_role, OrgRole::Company);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let jwt = JwtValidator::new("secret-a".into(), 3600).unwrap();
        let other = JwtValidator::new("secret-b".into(), 3600).unwrap();

        let token = jwt.generate_token(sample_input()).unwrap();
        let result = other.verify_token(&token);
        assert!(!result.valid);
        assert!(result.claims.is_none());
    }

    #[test]
    fn test_garbage_token_rejected() {
        let jwt = JwtValidator::new_dev();
        let result = jwt.verify_token("not.a.token");
        assert!(!result.valid);
        assert!(result.error.is_some());
    }

    #[test]
    fn test_extract_token_from_header() {
        assert_eq!(extract_token_from_header("Bearer abc123"), Some("abc123"));
        assert_eq!(extract_token_from_header("bearer abc123"), Some("abc123"));
        assert_eq!(extract_token_from_header("Basic abc123"), None);
        assert_eq!(extract_token_from_header("Bearer "), None);
    }
}
