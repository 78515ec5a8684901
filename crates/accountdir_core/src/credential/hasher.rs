//! Credential hashing collaborator.
//!
//! # Responsibility
//! - Define the hashing seam the directory depends on.
//! - Provide the default Argon2id implementation producing PHC strings.
//!
//! # Invariants
//! - Hashes are salted per call; equal passwords never share a hash string.
//! - Plaintext and hash material never reach logs or error messages.

use crate::model::account::CredentialHash;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Hashing collaborator failure. Carries no credential material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashError(String);

impl HashError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl Display for HashError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "credential hashing failed: {}", self.0)
    }
}

impl Error for HashError {}

/// Computes and checks stored credentials.
pub trait CredentialHasher {
    fn hash(&self, plaintext: &str) -> Result<CredentialHash, HashError>;
    /// Returns `Ok(false)` on mismatch; `Err` only when checking itself failed.
    fn verify(&self, plaintext: &str, stored: &CredentialHash) -> Result<bool, HashError>;
}

/// Argon2 cost parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingSettings {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingSettings {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

/// Argon2id (v0x13) hasher.
pub struct Argon2CredentialHasher {
    context: Argon2<'static>,
}

impl Argon2CredentialHasher {
    pub fn new(settings: &HashingSettings) -> Result<Self, HashError> {
        let params = Params::new(
            settings.memory_kib,
            settings.iterations,
            settings.parallelism,
            None,
        )
        .map_err(|err| HashError::new(format!("invalid argon2 parameters: {err}")))?;
        Ok(Self {
            context: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }
}

impl Default for Argon2CredentialHasher {
    fn default() -> Self {
        Self {
            context: Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::default()),
        }
    }
}

impl CredentialHasher for Argon2CredentialHasher {
    fn hash(&self, plaintext: &str) -> Result<CredentialHash, HashError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .context
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|err| HashError::new(err.to_string()))?;
        Ok(CredentialHash::new(hash.to_string()))
    }

    fn verify(&self, plaintext: &str, stored: &CredentialHash) -> Result<bool, HashError> {
        let parsed = PasswordHash::new(stored.as_str())
            .map_err(|err| HashError::new(format!("could not parse stored hash: {err}")))?;
        match self.context.verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(HashError::new(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Argon2CredentialHasher, CredentialHasher, HashingSettings};
    use crate::model::account::CredentialHash;

    fn cheap_hasher() -> Argon2CredentialHasher {
        Argon2CredentialHasher::new(&HashingSettings {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap()
    }

    #[test]
    fn hash_then_verify() {
        let hasher = cheap_hasher();
        let stored = hasher.hash("s3cret-pass").unwrap();
        assert!(stored.as_str().starts_with("$argon2id$"));
        assert!(hasher.verify("s3cret-pass", &stored).unwrap());
        assert!(!hasher.verify("wrong-pass1", &stored).unwrap());
    }

    #[test]
    fn salts_differ_between_calls() {
        let hasher = cheap_hasher();
        let first = hasher.hash("same-pass1").unwrap();
        let second = hasher.hash("same-pass1").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn unparsable_stored_hash_is_an_error() {
        let hasher = cheap_hasher();
        assert!(hasher
            .verify("anything1", &CredentialHash::new("not-a-phc-string"))
            .is_err());
    }

    #[test]
    fn rejects_invalid_parameters() {
        assert!(Argon2CredentialHasher::new(&HashingSettings {
            memory_kib: 0,
            iterations: 0,
            parallelism: 0,
        })
        .is_err());
    }
}
