//! Account directory use-case service.
//!
//! # Responsibility
//! - Provide lookup, listing, update, deletion and credential-change entry
//!   points over an injected account repository.
//! - Validate input and apply the password policy before any storage call.
//! - Translate repository failures into the directory error taxonomy.
//!
//! # Invariants
//! - Service APIs never bypass repository validation/persistence contracts.
//! - Writes are never retried here; failures surface to the caller as-is.
//! - The service keeps no state between calls beyond its collaborators.
//! - Logs carry account ids and error codes only, never usernames, emails,
//!   plaintext passwords or hashes.

use crate::config::DirectoryConfig;
use crate::credential::hasher::{CredentialHasher, HashError};
use crate::credential::policy::{PasswordPolicy, PasswordRejection, PolicyViolation};
use crate::deadline::Deadline;
use crate::model::account::{
    validate_display_name, validate_email, validate_username, Account, AccountChanges,
    AccountId, AccountValidationError,
};
use crate::model::lookup::{AccountLookup, LookupKey};
use crate::repo::account_repo::{AccountListQuery, AccountRepository, RepoError, UniqueField};
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::time::{Duration, Instant};

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Errors surfaced by the account directory.
#[derive(Debug)]
pub enum DirectoryError {
    /// Empty lookup value, or no account matches.
    NotFound { key: LookupKey, value: String },
    /// Attribute name is not one of `id|username|email`.
    InvalidAttribute(String),
    /// Another account already holds the value.
    Conflict(UniqueField),
    ValidationFailed(AccountValidationError),
    WeakCredential(Vec<PolicyViolation>),
    /// Current password did not verify, or the credential changed meanwhile.
    CredentialMismatch,
    Timeout,
    /// Transient infrastructure failure.
    StorageUnavailable(RepoError),
    /// Persisted data failed validation on read.
    CorruptRecord(String),
    Hashing(HashError),
}

impl DirectoryError {
    /// Stable machine-readable code, used in logs and by presentation layers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidAttribute(_) => "invalid_attribute",
            Self::Conflict(_) => "conflict",
            Self::ValidationFailed(_) => "validation_failed",
            Self::WeakCredential(_) => "weak_credential",
            Self::CredentialMismatch => "credential_mismatch",
            Self::Timeout => "timeout",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::CorruptRecord(_) => "corrupt_record",
            Self::Hashing(_) => "hashing_failed",
        }
    }

    /// Whether a caller may safely retry a *read* that failed this way.
    ///
    /// Writes are never blindly retryable.
    pub fn is_retryable_read(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

impl Display for DirectoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { key, value } => write!(
                f,
                "the account with \"{key}\" does not exist for value \"{value}\""
            ),
            Self::InvalidAttribute(name) => write!(
                f,
                "unknown lookup attribute `{name}`; expected id|username|email"
            ),
            Self::Conflict(field) => write!(f, "{field} is already taken"),
            Self::ValidationFailed(err) => write!(f, "{err}"),
            Self::WeakCredential(violations) => {
                write!(f, "password does not meet policy: ")?;
                for (index, violation) in violations.iter().enumerate() {
                    if index > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{violation}")?;
                }
                Ok(())
            }
            Self::CredentialMismatch => write!(f, "current password does not match"),
            Self::Timeout => write!(f, "operation timed out"),
            Self::StorageUnavailable(err) => write!(f, "account storage unavailable: {err}"),
            Self::CorruptRecord(message) => write!(f, "corrupt account record: {message}"),
            Self::Hashing(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DirectoryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ValidationFailed(err) => Some(err),
            Self::StorageUnavailable(err) => Some(err),
            Self::Hashing(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for DirectoryError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound {
                key: LookupKey::Id,
                value: id.to_string(),
            },
            RepoError::Validation(err) => Self::ValidationFailed(err),
            RepoError::Conflict(field) => Self::Conflict(field),
            RepoError::CredentialChanged(_) => Self::CredentialMismatch,
            RepoError::InvalidData(message) => Self::CorruptRecord(message),
            other if other.is_timeout() => Self::Timeout,
            other => Self::StorageUnavailable(other),
        }
    }
}

impl From<AccountValidationError> for DirectoryError {
    fn from(value: AccountValidationError) -> Self {
        Self::ValidationFailed(value)
    }
}

impl From<HashError> for DirectoryError {
    fn from(value: HashError) -> Self {
        Self::Hashing(value)
    }
}

impl From<PasswordRejection> for DirectoryError {
    fn from(value: PasswordRejection) -> Self {
        match value {
            PasswordRejection::Malformed(err) => Self::ValidationFailed(err),
            PasswordRejection::Weak(violations) => Self::WeakCredential(violations),
        }
    }
}

/// Registration request handed over by the registration collaborator.
#[derive(Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    /// Plaintext; hashed before it reaches storage.
    pub password: String,
    pub enabled: bool,
}

impl NewAccount {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            display_name: None,
            password: password.into(),
            enabled: true,
        }
    }
}

impl Debug for NewAccount {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewAccount")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .field("password", &"<redacted>")
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Directory service facade over repository and hashing collaborators.
pub struct AccountDirectory<R: AccountRepository, H: CredentialHasher> {
    repo: R,
    hasher: H,
    policy: PasswordPolicy,
    operation_timeout: Duration,
}

impl<R: AccountRepository, H: CredentialHasher> AccountDirectory<R, H> {
    /// Creates a service from injected collaborators and configuration.
    pub fn new(repo: R, hasher: H, config: &DirectoryConfig) -> Self {
        Self {
            repo,
            hasher,
            policy: config.password_policy.clone(),
            operation_timeout: config.operation_timeout(),
        }
    }

    /// Fresh deadline using the configured operation budget.
    pub fn deadline(&self) -> Deadline {
        Deadline::after(self.operation_timeout)
    }

    /// Finds one account by attribute name (`id`, `username` or `email`).
    ///
    /// # Errors
    /// - `InvalidAttribute` when `attribute` is not a lookup key.
    /// - `NotFound` when `value` is empty or nothing matches.
    pub fn find_by_attribute(
        &self,
        attribute: &str,
        value: &str,
        deadline: Deadline,
    ) -> DirectoryResult<Account> {
        let key = attribute
            .parse::<LookupKey>()
            .map_err(|err| DirectoryError::InvalidAttribute(err.0))?;
        self.find_by(key, value, deadline)
    }

    /// Finds one account by a typed lookup key.
    pub fn find_by(
        &self,
        key: LookupKey,
        value: &str,
        deadline: Deadline,
    ) -> DirectoryResult<Account> {
        let Some(lookup) = AccountLookup::parse(key, value) else {
            return Err(DirectoryError::NotFound {
                key,
                value: value.to_string(),
            });
        };
        self.find(&lookup, deadline)
    }

    /// Finds one account by a resolved lookup.
    pub fn find(&self, lookup: &AccountLookup, deadline: Deadline) -> DirectoryResult<Account> {
        let started_at = Instant::now();
        let result = self
            .repo
            .find_account(lookup, deadline)
            .map_err(DirectoryError::from)
            .and_then(|found| {
                found.ok_or_else(|| DirectoryError::NotFound {
                    key: lookup.key(),
                    value: lookup.value(),
                })
            });
        log_read("account_find", started_at, &result);
        result
    }

    /// Lists every account in stable `created_at, id` order.
    pub fn list_all(&self, deadline: Deadline) -> DirectoryResult<Vec<Account>> {
        self.list(&AccountListQuery::default(), deadline)
    }

    /// Lists accounts with filter and pagination options.
    pub fn list(
        &self,
        query: &AccountListQuery,
        deadline: Deadline,
    ) -> DirectoryResult<Vec<Account>> {
        let started_at = Instant::now();
        let result = self
            .repo
            .list_accounts(query, deadline)
            .map_err(DirectoryError::from);
        log_read("account_list", started_at, &result);
        result
    }

    /// Registers a new account on behalf of the registration collaborator.
    ///
    /// # Errors
    /// - `ValidationFailed` / `WeakCredential` before any storage call.
    /// - `Conflict` when username or email is taken.
    pub fn create_account(
        &self,
        request: &NewAccount,
        deadline: Deadline,
    ) -> DirectoryResult<Account> {
        let started_at = Instant::now();
        let result = self.create_account_inner(request, deadline);
        log_write(
            "account_create",
            result.as_ref().ok().map(|account| account.id),
            started_at,
            &result,
        );
        result
    }

    fn create_account_inner(
        &self,
        request: &NewAccount,
        deadline: Deadline,
    ) -> DirectoryResult<Account> {
        validate_username(&request.username)?;
        validate_email(&request.email)?;
        if let Some(display_name) = request.display_name.as_deref() {
            validate_display_name(display_name)?;
        }
        self.policy.check(&request.password)?;

        let password_hash = self.hasher.hash(&request.password)?;
        let mut account = Account::new(
            request.username.as_str(),
            request.email.as_str(),
            password_hash,
        );
        account.display_name = request
            .display_name
            .as_deref()
            .map(|value| value.trim().to_string());
        account.enabled = request.enabled;

        self.repo.create_account(&account, deadline)?;
        Ok(account)
    }

    /// Applies a mutation set atomically and returns the stored result.
    ///
    /// # Errors
    /// - `ValidationFailed` before any storage call for malformed fields.
    /// - `NotFound`, `Conflict`, `Timeout` from storage.
    pub fn update(
        &self,
        id: AccountId,
        changes: &AccountChanges,
        deadline: Deadline,
    ) -> DirectoryResult<Account> {
        let started_at = Instant::now();
        let result = changes
            .validate()
            .map_err(DirectoryError::from)
            .and_then(|()| {
                if changes.is_empty() {
                    return self.find(&AccountLookup::Id(id), deadline);
                }
                self.repo
                    .update_account(id, changes, deadline)
                    .map_err(DirectoryError::from)
            });
        log_write("account_update", Some(id), started_at, &result);
        result
    }

    /// Removes an account permanently.
    pub fn delete(&self, id: AccountId, deadline: Deadline) -> DirectoryResult<()> {
        let started_at = Instant::now();
        let result = self
            .repo
            .delete_account(id, deadline)
            .map_err(DirectoryError::from);
        log_write("account_delete", Some(id), started_at, &result);
        result
    }

    /// Validates, hashes and installs a new password in one storage write.
    ///
    /// # Errors
    /// - `ValidationFailed` / `WeakCredential` before any storage call.
    /// - `NotFound`, `Timeout` from storage; the old hash stays in place.
    pub fn change_password(
        &self,
        id: AccountId,
        new_password: &str,
        deadline: Deadline,
    ) -> DirectoryResult<Account> {
        let started_at = Instant::now();
        let result = self.replace_password(id, None, new_password, deadline);
        log_write("account_change_password", Some(id), started_at, &result);
        result
    }

    /// Like `change_password`, but requires the current password first.
    ///
    /// The replacement only applies while the stored hash is still the one
    /// `current_password` was verified against.
    ///
    /// # Errors
    /// - `CredentialMismatch` when `current_password` is wrong or the
    ///   credential changed concurrently.
    pub fn change_password_verified(
        &self,
        id: AccountId,
        current_password: &str,
        new_password: &str,
        deadline: Deadline,
    ) -> DirectoryResult<Account> {
        let started_at = Instant::now();
        let result = self.replace_password(id, Some(current_password), new_password, deadline);
        log_write(
            "account_change_password_verified",
            Some(id),
            started_at,
            &result,
        );
        result
    }

    fn replace_password(
        &self,
        id: AccountId,
        current_password: Option<&str>,
        new_password: &str,
        deadline: Deadline,
    ) -> DirectoryResult<Account> {
        self.policy.check(new_password)?;

        let expected_current = match current_password {
            Some(current) => {
                let account = self.find(&AccountLookup::Id(id), deadline)?;
                // A disabled account may hold no credential; nothing can match it.
                if current.is_empty()
                    || account.password_hash.is_empty()
                    || !self.hasher.verify(current, &account.password_hash)?
                {
                    return Err(DirectoryError::CredentialMismatch);
                }
                Some(account.password_hash)
            }
            None => None,
        };

        let new_hash = self.hasher.hash(new_password)?;
        let updated = self.repo.replace_password_hash(
            id,
            &new_hash,
            expected_current.as_ref(),
            deadline,
        )?;
        Ok(updated)
    }

    /// Administrative transition between `Active` and `Disabled`.
    pub fn set_enabled(
        &self,
        id: AccountId,
        enabled: bool,
        deadline: Deadline,
    ) -> DirectoryResult<Account> {
        let started_at = Instant::now();
        let result = self
            .repo
            .set_enabled(id, enabled, deadline)
            .map_err(DirectoryError::from);
        log_write("account_set_enabled", Some(id), started_at, &result);
        result
    }
}

fn log_read<T>(event: &str, started_at: Instant, result: &DirectoryResult<T>) {
    match result {
        Ok(_) => debug!(
            "event={event} module=directory status=ok duration_ms={}",
            started_at.elapsed().as_millis()
        ),
        Err(err) => warn!(
            "event={event} module=directory status=error duration_ms={} error_code={}",
            started_at.elapsed().as_millis(),
            err.code()
        ),
    }
}

fn log_write<T>(
    event: &str,
    account_id: Option<AccountId>,
    started_at: Instant,
    result: &DirectoryResult<T>,
) {
    let account_id = account_id.map_or_else(|| "-".to_string(), |id| id.to_string());
    match result {
        Ok(_) => info!(
            "event={event} module=directory status=ok account_id={account_id} duration_ms={}",
            started_at.elapsed().as_millis()
        ),
        Err(err) => warn!(
            "event={event} module=directory status=error account_id={account_id} duration_ms={} error_code={}",
            started_at.elapsed().as_millis(),
            err.code()
        ),
    }
}
