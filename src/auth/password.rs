//! Credential hashing for account records
//!
//! Accounts store a PHC-formatted Argon2id string on `UserDoc`; the salt
//! and cost parameters travel inside the string, so verification needs no
//! out-of-band state and parameters can be raised without migrating
//! existing hashes.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::types::TracewayError;

/// Hash a password into a self-describing PHC string
pub fn hash_password(password: &str) -> Result<String, TracewayError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| TracewayError::Auth(format!("Password hashing failed: {e}")))
}

/// Check a login attempt against the stored PHC string
///
/// A malformed stored hash is an error; a wrong password is `Ok(false)`.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, TracewayError> {
    let parsed = PasswordHash::new(stored)
        .map_err(|e| TracewayError::Auth(format!("Stored password hash is malformed: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_self_describing_argon2id() {
        let hash = hash_password("retail-shop-pass").unwrap();
        assert!(hash.starts_with("$argon2id$"));
    }

    #[test]
    fn test_round_trip_accepts_only_the_right_password() {
        let hash = hash_password("maker-pass-1").unwrap();
        assert!(verify_password("maker-pass-1", &hash).unwrap());
        assert!(!verify_password("maker-pass-2", &hash).unwrap());
    }

    #[test]
    fn test_salts_differ_between_accounts() {
        let a = hash_password("shared-password").unwrap();
        let b = hash_password("shared-password").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("shared-password", &a).unwrap());
        assert!(verify_password("shared-password", &b).unwrap());
    }

    #[test]
    fn test_malformed_stored_hash_is_an_error() {
        assert!(verify_password("anything", "plaintext-from-a-bad-import").is_err());
    }
}
