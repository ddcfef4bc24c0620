//! Password hashing
//!
//! Member passwords are kept as `salt$digest`, both hex encoded, where the
//! digest is SHA-256 over the salt followed by the raw password.

use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;

use super::DomainError;

const SALT_LEN: usize = 16;

/// Salted password digest.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Hash a raw password with a fresh random salt.
    pub fn hash(raw: &str) -> Result<Self, DomainError> {
        if raw.is_empty() {
            return Err(DomainError::validation("password", "must not be empty"));
        }

        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);

        Ok(Self(format!("{}${}", hex::encode(salt), digest(&salt, raw))))
    }

    /// Wrap a value previously produced by [`PasswordHash::hash`].
    pub fn from_stored(stored: String) -> Self {
        Self(stored)
    }

    /// Check a raw password against this digest.
    pub fn verify(&self, raw: &str) -> bool {
        let Some((salt_hex, expected)) = self.0.split_once('$') else {
            return false;
        };
        match hex::decode(salt_hex) {
            Ok(salt) => digest(&salt, raw) == expected,
            Err(_) => false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash([REDACTED])")
    }
}

fn digest(salt: &[u8], raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = PasswordHash::hash("s3cret").unwrap();
        assert!(hash.verify("s3cret"));
        assert!(!hash.verify("S3cret"));
    }

    #[test]
    fn test_salt_differs_per_hash() {
        let a = PasswordHash::hash("same").unwrap();
        let b = PasswordHash::hash("same").unwrap();
        assert_ne!(a, b);
        assert!(a.verify("same") && b.verify("same"));
    }

    #[test]
    fn test_empty_password_rejected() {
        assert!(matches!(
            PasswordHash::hash(""),
            Err(DomainError::Validation { field: "password", .. })
        ));
    }

    #[test]
    fn test_debug_is_redacted() {
        let hash = PasswordHash::hash("s3cret").unwrap();
        assert_eq!(format!("{:?}", hash), "PasswordHash([REDACTED])");
    }

    #[test]
    fn test_malformed_stored_value_never_verifies() {
        let hash = PasswordHash::from_stored("not-a-digest".to_string());
        assert!(!hash.verify("anything"));
    }
}
