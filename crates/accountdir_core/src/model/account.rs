//! Account domain model.
//!
//! # Responsibility
//! - Define the canonical account record owned by the directory.
//! - Validate identity and profile fields before persistence.
//!
//! # Invariants
//! - `id` is stable and never reused for another account.
//! - `username` and `email` compare case-insensitively through their
//!   canonical (trimmed, lower-cased) forms.
//! - An enabled account always carries a non-empty credential hash.
//! - Credential material never appears in `Debug` output or serialization.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub const USERNAME_MIN_CHARS: usize = 2;
pub const USERNAME_MAX_CHARS: usize = 64;
pub const EMAIL_MAX_CHARS: usize = 254;
pub const DISPLAY_NAME_MAX_CHARS: usize = 128;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@.]+(\.[^\s@.]+)+$").expect("valid email regex"));

/// Stable identifier used to address one account across operations.
pub type AccountId = Uuid;

/// Opaque stored credential (for example a PHC-formatted password hash).
#[derive(Clone, PartialEq, Eq, Default)]
pub struct CredentialHash(String);

impl CredentialHash {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Debug for CredentialHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialHash(<redacted>)")
    }
}

/// Lifecycle state derived from the `enabled` flag.
///
/// Deletion is a hard removal, so there is no stored deleted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Disabled,
}

/// Canonical persisted identity/credential record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    pub email: String,
    /// Optional profile field shown by presentation layers.
    pub display_name: Option<String>,
    #[serde(skip)]
    pub password_hash: CredentialHash,
    pub enabled: bool,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds, bumped on every persisted change.
    pub updated_at: i64,
}

impl Account {
    /// Creates an enabled account with a generated stable ID.
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: CredentialHash,
    ) -> Self {
        Self::with_id(Uuid::new_v4(), username, email, password_hash)
    }

    /// Creates an enabled account with a caller-provided stable ID.
    ///
    /// Used by import paths where identity already exists externally.
    /// Identity fields are trimmed; nothing else is validated here.
    pub fn with_id(
        id: AccountId,
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: CredentialHash,
    ) -> Self {
        let now = now_epoch_ms();
        Self {
            id,
            username: username.into().trim().to_string(),
            email: email.into().trim().to_string(),
            display_name: None,
            password_hash,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> AccountStatus {
        if self.enabled {
            AccountStatus::Active
        } else {
            AccountStatus::Disabled
        }
    }

    pub fn username_canonical(&self) -> String {
        canonicalize(&self.username)
    }

    pub fn email_canonical(&self) -> String {
        canonicalize(&self.email)
    }

    /// Applies a mutation set in place. Only named fields change.
    pub fn apply_changes(&mut self, changes: &AccountChanges) {
        if let Some(username) = changes.username.as_deref() {
            self.username = username.trim().to_string();
        }
        if let Some(email) = changes.email.as_deref() {
            self.email = email.trim().to_string();
        }
        if let Some(display_name) = changes.display_name.as_ref() {
            self.display_name = display_name
                .as_deref()
                .map(|value| value.trim().to_string());
        }
    }

    /// Validates field formats and the enabled-credential invariant.
    pub fn validate(&self) -> Result<(), AccountValidationError> {
        validate_username(&self.username)?;
        validate_email(&self.email)?;
        if let Some(display_name) = self.display_name.as_deref() {
            validate_display_name(display_name)?;
        }
        if self.enabled && self.password_hash.is_empty() {
            return Err(AccountValidationError::MissingCredential);
        }
        Ok(())
    }
}

/// Mutation set accepted by profile updates.
///
/// `id`, the credential hash and `enabled` are deliberately absent; they
/// change only through dedicated operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    /// `Some(None)` clears the display name.
    pub display_name: Option<Option<String>>,
}

impl AccountChanges {
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_display_name(mut self, display_name: Option<String>) -> Self {
        self.display_name = Some(display_name);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none() && self.display_name.is_none()
    }

    /// Validates only the fields this mutation set names.
    pub fn validate(&self) -> Result<(), AccountValidationError> {
        if let Some(username) = self.username.as_deref() {
            validate_username(username)?;
        }
        if let Some(email) = self.email.as_deref() {
            validate_email(email)?;
        }
        if let Some(Some(display_name)) = self.display_name.as_ref() {
            validate_display_name(display_name)?;
        }
        Ok(())
    }
}

/// Field-format failures for accounts and plaintext credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountValidationError {
    UsernameLength { actual: usize },
    UsernameInvalidCharacter,
    EmptyEmail,
    EmailTooLong { actual: usize },
    MalformedEmail,
    BlankDisplayName,
    DisplayNameTooLong { actual: usize },
    /// Enabled account without a stored credential.
    MissingCredential,
    EmptyPassword,
    PasswordTooLong { max: usize },
    PasswordControlCharacter,
}

impl Display for AccountValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UsernameLength { actual } => write!(
                f,
                "username must be {USERNAME_MIN_CHARS}..={USERNAME_MAX_CHARS} characters, got {actual}"
            ),
            Self::UsernameInvalidCharacter => {
                write!(f, "username must not contain whitespace or control characters")
            }
            Self::EmptyEmail => write!(f, "email must not be empty"),
            Self::EmailTooLong { actual } => write!(
                f,
                "email must be at most {EMAIL_MAX_CHARS} characters, got {actual}"
            ),
            Self::MalformedEmail => write!(f, "email is malformed"),
            Self::BlankDisplayName => write!(f, "display name must not be blank"),
            Self::DisplayNameTooLong { actual } => write!(
                f,
                "display name must be at most {DISPLAY_NAME_MAX_CHARS} characters, got {actual}"
            ),
            Self::MissingCredential => write!(f, "enabled account requires a credential"),
            Self::EmptyPassword => write!(f, "password must not be empty"),
            Self::PasswordTooLong { max } => {
                write!(f, "password must be at most {max} characters")
            }
            Self::PasswordControlCharacter => {
                write!(f, "password must not contain control characters")
            }
        }
    }
}

impl Error for AccountValidationError {}

/// Canonical comparison form for usernames and emails.
pub fn canonicalize(value: &str) -> String {
    value.trim().to_lowercase()
}

pub fn validate_username(value: &str) -> Result<(), AccountValidationError> {
    let trimmed = value.trim();
    let actual = trimmed.chars().count();
    if !(USERNAME_MIN_CHARS..=USERNAME_MAX_CHARS).contains(&actual) {
        return Err(AccountValidationError::UsernameLength { actual });
    }
    if trimmed
        .chars()
        .any(|ch| ch.is_whitespace() || ch.is_control())
    {
        return Err(AccountValidationError::UsernameInvalidCharacter);
    }
    Ok(())
}

pub fn validate_email(value: &str) -> Result<(), AccountValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AccountValidationError::EmptyEmail);
    }
    let actual = trimmed.chars().count();
    if actual > EMAIL_MAX_CHARS {
        return Err(AccountValidationError::EmailTooLong { actual });
    }
    if !EMAIL_RE.is_match(trimmed) {
        return Err(AccountValidationError::MalformedEmail);
    }
    Ok(())
}

pub fn validate_display_name(value: &str) -> Result<(), AccountValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AccountValidationError::BlankDisplayName);
    }
    let actual = trimmed.chars().count();
    if actual > DISPLAY_NAME_MAX_CHARS {
        return Err(AccountValidationError::DisplayNameTooLong { actual });
    }
    Ok(())
}

pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
        })
}
