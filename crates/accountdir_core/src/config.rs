//! Directory configuration.
//!
//! # Responsibility
//! - Collect tunables for deadlines, password policy, hashing cost and logging.
//! - Load them from JSON documents with per-field defaults.
//!
//! # Invariants
//! - Missing fields fall back to `Default` values.
//! - A zero operation timeout is rejected at load time.

use crate::credential::hasher::HashingSettings;
use crate::credential::policy::PasswordPolicy;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 5_000;

/// Tunables for the account directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Default per-operation budget in milliseconds.
    pub operation_timeout_ms: u64,
    pub password_policy: PasswordPolicy,
    pub hashing: HashingSettings,
    /// File logging; absent means the host owns logging setup.
    pub logging: Option<LoggingConfig>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
            password_policy: PasswordPolicy::default(),
            hashing: HashingSettings::default(),
            logging: None,
        }
    }
}

impl DirectoryConfig {
    /// Parses a JSON config document.
    ///
    /// # Errors
    /// - Returns an error for malformed JSON or unknown value types.
    /// - Returns an error when `operation_timeout_ms` is zero.
    pub fn from_json_str(source: &str) -> Result<Self, String> {
        let config: Self =
            serde_json::from_str(source).map_err(|err| format!("invalid directory config: {err}"))?;
        if config.operation_timeout_ms == 0 {
            return Err("operation_timeout_ms must be greater than zero".to_string());
        }
        Ok(config)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}
