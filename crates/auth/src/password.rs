//! Password hashing (argon2) and random password generation.

use argon2::Argon2;
use argon2::password_hash::{self, PasswordHasher, PasswordVerifier, SaltString};
use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum accepted length for a new password.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Length of passwords produced by [`generate_password`].
pub const GENERATED_PASSWORD_LEN: usize = 8;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    HashingFailed(String),
    #[error("stored password hash is invalid: {0}")]
    InvalidHash(String),
}

/// PHC-formatted argon2 hash of a password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn hash(plain: &str) -> Result<Self, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| PasswordError::HashingFailed(e.to_string()))?
            .to_string();
        Ok(Self(hash))
    }

    pub fn verify(&self, plain: &str) -> Result<bool, PasswordError> {
        let parsed = password_hash::PasswordHash::new(&self.0)
            .map_err(|e| PasswordError::InvalidHash(e.to_string()))?;
        Ok(Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }

    pub fn from_hash(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Random alphanumeric password for administrative resets.
pub fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_only_the_original() {
        let hash = PasswordHash::hash("s3cret-pass").unwrap();
        assert!(hash.verify("s3cret-pass").unwrap());
        assert!(!hash.verify("wrong").unwrap());
        assert_ne!(hash.as_str(), "s3cret-pass");
    }

    #[test]
    fn garbage_hash_is_reported() {
        let hash = PasswordHash::from_hash("plaintext".to_string());
        assert!(matches!(hash.verify("plaintext"), Err(PasswordError::InvalidHash(_))));
    }

    #[test]
    fn generated_passwords_are_alphanumeric() {
        let p = generate_password();
        assert_eq!(p.len(), GENERATED_PASSWORD_LEN);
        assert!(p.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
