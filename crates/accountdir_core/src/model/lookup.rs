//! Closed set of account lookup keys.
//!
//! # Invariants
//! - Only `id`, `username` and `email` are addressable.
//! - Username/email lookups compare canonical forms.
//! - A lookup with an empty value never resolves.

use crate::model::account::{canonicalize, AccountId};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Attribute an account can be looked up by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupKey {
    Id,
    Username,
    Email,
}

impl LookupKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Username => "username",
            Self::Email => "email",
        }
    }
}

impl Display for LookupKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an attribute name is not a lookup key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLookupKey(pub String);

impl Display for UnknownLookupKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unknown lookup attribute `{}`; expected id|username|email",
            self.0
        )
    }
}

impl std::error::Error for UnknownLookupKey {}

impl FromStr for LookupKey {
    type Err = UnknownLookupKey;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "id" => Ok(Self::Id),
            "username" => Ok(Self::Username),
            "email" => Ok(Self::Email),
            _ => Err(UnknownLookupKey(value.to_string())),
        }
    }
}

/// A resolved lookup ready for the storage layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountLookup {
    Id(AccountId),
    /// Canonical username.
    Username(String),
    /// Canonical email.
    Email(String),
}

impl AccountLookup {
    /// Builds a lookup from a key and raw value.
    ///
    /// Returns `None` when the value is empty or, for `id`, not a well-formed
    /// identifier: such lookups cannot match any account.
    pub fn parse(key: LookupKey, value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }
        match key {
            LookupKey::Id => Uuid::parse_str(trimmed).ok().map(Self::Id),
            LookupKey::Username => Some(Self::Username(canonicalize(trimmed))),
            LookupKey::Email => Some(Self::Email(canonicalize(trimmed))),
        }
    }

    pub fn key(&self) -> LookupKey {
        match self {
            Self::Id(_) => LookupKey::Id,
            Self::Username(_) => LookupKey::Username,
            Self::Email(_) => LookupKey::Email,
        }
    }

    pub fn value(&self) -> String {
        match self {
            Self::Id(id) => id.to_string(),
            Self::Username(value) | Self::Email(value) => value.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AccountLookup, LookupKey};
    use uuid::Uuid;

    #[test]
    fn parses_known_keys_case_insensitively() {
        assert_eq!("id".parse::<LookupKey>(), Ok(LookupKey::Id));
        assert_eq!(" Username ".parse::<LookupKey>(), Ok(LookupKey::Username));
        assert_eq!("EMAIL".parse::<LookupKey>(), Ok(LookupKey::Email));
    }

    #[test]
    fn rejects_unknown_key() {
        let err = "password".parse::<LookupKey>().unwrap_err();
        assert!(err.to_string().contains("password"));
    }

    #[test]
    fn empty_or_malformed_values_do_not_resolve() {
        assert!(AccountLookup::parse(LookupKey::Username, "").is_none());
        assert!(AccountLookup::parse(LookupKey::Email, "   ").is_none());
        assert!(AccountLookup::parse(LookupKey::Id, "1").is_none());
    }

    #[test]
    fn canonicalizes_names() {
        assert_eq!(
            AccountLookup::parse(LookupKey::Username, " Alice "),
            Some(AccountLookup::Username("alice".to_string()))
        );
        let id = Uuid::new_v4();
        assert_eq!(
            AccountLookup::parse(LookupKey::Id, &id.to_string()),
            Some(AccountLookup::Id(id))
        );
    }
}
