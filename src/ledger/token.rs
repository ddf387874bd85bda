//! Request-scoped ledger token provisioning
//!
//! Every request that talks to the ledger exchanges the caller's identity
//! for a fresh short-lived bearer token first. Tokens are used once and
//! discarded: no caching, no refresh.

use std::fmt;

/// Identity presented to the ledger token endpoint
#[derive(Debug, Clone)]
pub struct LedgerIdentity {
    /// Local user id (hex ObjectId)
    pub user_id: String,
    /// Organization name for the ledger (network-level org)
    pub org_name: String,
    /// Company or shop name of the caller
    pub company_name: String,
}

/// A short-lived bearer token issued by the ledger
///
/// Request-scoped: fetched at the start of the pipeline, used once,
/// dropped with the request.
#[derive(Clone)]
pub struct LedgerToken(String);

impl LedgerToken {
    pub fn new(token: String) -> Self {
        LedgerToken(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Redact the token value from logs
impl fmt::Debug for LedgerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LedgerToken(..)")
    }
}

/// Provisioning state for one request
///
/// `NotRequested → {Granted, Denied}`. The exchange itself happens inside
/// a single awaited call, so an in-flight state is never observable and
/// carries no variant. Read paths treat `Denied` as "skip reconciliation,
/// everything unverified"; write paths abort on it.
#[derive(Debug, Clone, Default)]
pub enum TokenState {
    #[default]
    NotRequested,
    Granted(LedgerToken),
    Denied(String),
}

impl TokenState {
    pub fn granted(&self) -> Option<&LedgerToken> {
        match self {
            TokenState::Granted(token) => Some(token),
            _ => None,
        }
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, TokenState::Denied(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granted_access() {
        let state = TokenState::Granted(LedgerToken::new("tok".into()));
        assert_eq!(state.granted().unwrap().as_str(), "tok");
        assert!(!state.is_denied());
    }

    #[test]
    fn test_denied_has_no_token() {
        let state = TokenState::Denied("upstream 503".into());
        assert!(state.granted().is_none());
        assert!(state.is_denied());
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = LedgerToken::new("super-secret".into());
        let rendered = format!("{:?}", token);
        assert!(!rendered.contains("super-secret"));
    }
}
