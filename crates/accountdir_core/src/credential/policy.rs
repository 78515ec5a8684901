//! Password strength policy.
//!
//! # Invariants
//! - Malformed input (empty, over-long, control characters) is reported
//!   separately from policy weakness.
//! - All weakness findings are reported together, not just the first one.

use crate::model::account::AccountValidationError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Minimum-strength rules applied to new plaintext passwords.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
    pub require_letter: bool,
    pub require_digit: bool,
    pub require_mixed_case: bool,
    pub require_symbol: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 4096,
            require_letter: true,
            require_digit: true,
            require_mixed_case: false,
            require_symbol: false,
        }
    }
}

/// One unmet strength rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyViolation {
    TooShort { min: usize },
    MissingLetter,
    MissingDigit,
    MissingMixedCase,
    MissingSymbol,
}

impl Display for PolicyViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort { min } => write!(f, "must be at least {min} characters"),
            Self::MissingLetter => write!(f, "must contain a letter"),
            Self::MissingDigit => write!(f, "must contain a digit"),
            Self::MissingMixedCase => write!(f, "must mix upper and lower case"),
            Self::MissingSymbol => write!(f, "must contain a symbol"),
        }
    }
}

/// Why a candidate password was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordRejection {
    Malformed(AccountValidationError),
    Weak(Vec<PolicyViolation>),
}

impl PasswordPolicy {
    /// Checks a candidate plaintext password.
    pub fn check(&self, password: &str) -> Result<(), PasswordRejection> {
        if password.is_empty() {
            return Err(PasswordRejection::Malformed(
                AccountValidationError::EmptyPassword,
            ));
        }
        let length = password.chars().count();
        if length > self.max_length {
            return Err(PasswordRejection::Malformed(
                AccountValidationError::PasswordTooLong {
                    max: self.max_length,
                },
            ));
        }
        if password.chars().any(char::is_control) {
            return Err(PasswordRejection::Malformed(
                AccountValidationError::PasswordControlCharacter,
            ));
        }

        let mut violations = Vec::new();
        if length < self.min_length {
            violations.push(PolicyViolation::TooShort {
                min: self.min_length,
            });
        }
        if self.require_letter && !password.chars().any(char::is_alphabetic) {
            violations.push(PolicyViolation::MissingLetter);
        }
        if self.require_digit && !password.chars().any(|ch| ch.is_ascii_digit()) {
            violations.push(PolicyViolation::MissingDigit);
        }
        if self.require_mixed_case
            && !(password.chars().any(char::is_uppercase)
                && password.chars().any(char::is_lowercase))
        {
            violations.push(PolicyViolation::MissingMixedCase);
        }
        if self.require_symbol
            && !password
                .chars()
                .any(|ch| !ch.is_alphanumeric() && !ch.is_whitespace())
        {
            violations.push(PolicyViolation::MissingSymbol);
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(PasswordRejection::Weak(violations))
        }
    }
}
