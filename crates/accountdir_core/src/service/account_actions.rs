//! Account management actions for request-handling callers.
//!
//! # Responsibility
//! - Compose directory calls into the list/show/edit/delete/change-password
//!   flows a user-management front end needs.
//! - Report outcomes as values (notice + follow-up) instead of writing
//!   session flash state or building redirects.
//!
//! # Invariants
//! - Actions that act on "the current user" require an authenticated
//!   identity; its absence is `ActionError::AccessDenied`.
//! - Every action gets a fresh deadline from the directory's budget.
//! - Directory errors pass through unchanged.

use crate::credential::hasher::CredentialHasher;
use crate::model::account::{Account, AccountChanges, AccountId};
use crate::model::lookup::{AccountLookup, LookupKey};
use crate::repo::account_repo::AccountRepository;
use crate::service::account_directory::{AccountDirectory, DirectoryError};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Supplies the identity of the currently authenticated caller.
pub trait IdentitySource {
    /// `None` when nobody is authenticated.
    fn current_account_id(&self) -> Option<AccountId>;
}

impl IdentitySource for Option<AccountId> {
    fn current_account_id(&self) -> Option<AccountId> {
        *self
    }
}

/// Success notice for the caller's notification mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    AccountUpdated,
    AccountDeleted,
    PasswordChanged,
}

impl Notice {
    /// Stable key for message catalogs.
    pub fn key(self) -> &'static str {
        match self {
            Self::AccountUpdated => "account_update",
            Self::AccountDeleted => "account_delete",
            Self::PasswordChanged => "account_password",
        }
    }
}

/// Where the caller should navigate after a successful action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    ShowAccount { username: String },
    AccountList,
}

/// Result of a successful mutating action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub notice: Notice,
    pub follow_up: FollowUp,
    /// The account as stored after the action; `None` after deletion.
    pub account: Option<Account>,
}

#[derive(Debug)]
pub enum ActionError {
    /// No authenticated identity was available.
    AccessDenied,
    Directory(DirectoryError),
}

impl Display for ActionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AccessDenied => write!(f, "this user does not have access to this section"),
            Self::Directory(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ActionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::AccessDenied => None,
            Self::Directory(err) => Some(err),
        }
    }
}

impl From<DirectoryError> for ActionError {
    fn from(value: DirectoryError) -> Self {
        Self::Directory(value)
    }
}

pub type ActionResult<T> = Result<T, ActionError>;

/// Request-level facade borrowing an account directory.
pub struct AccountActions<'d, R: AccountRepository, H: CredentialHasher> {
    directory: &'d AccountDirectory<R, H>,
}

impl<'d, R: AccountRepository, H: CredentialHasher> AccountActions<'d, R, H> {
    pub fn new(directory: &'d AccountDirectory<R, H>) -> Self {
        Self { directory }
    }

    /// All accounts, for an index view.
    pub fn list(&self) -> ActionResult<Vec<Account>> {
        Ok(self.directory.list_all(self.directory.deadline())?)
    }

    /// One account by username.
    pub fn show(&self, username: &str) -> ActionResult<Account> {
        Ok(self
            .directory
            .find_by(LookupKey::Username, username, self.directory.deadline())?)
    }

    /// Applies submitted profile changes to the account named `username`.
    ///
    /// The follow-up points at the account's username *after* the update.
    pub fn edit(&self, username: &str, changes: &AccountChanges) -> ActionResult<ActionOutcome> {
        let deadline = self.directory.deadline();
        let account = self
            .directory
            .find_by(LookupKey::Username, username, deadline)?;
        let updated = self.directory.update(account.id, changes, deadline)?;
        Ok(ActionOutcome {
            notice: Notice::AccountUpdated,
            follow_up: FollowUp::ShowAccount {
                username: updated.username.clone(),
            },
            account: Some(updated),
        })
    }

    /// Deletes the account named `username`.
    pub fn delete(&self, username: &str) -> ActionResult<ActionOutcome> {
        let deadline = self.directory.deadline();
        let account = self
            .directory
            .find_by(LookupKey::Username, username, deadline)?;
        self.directory.delete(account.id, deadline)?;
        Ok(ActionOutcome {
            notice: Notice::AccountDeleted,
            follow_up: FollowUp::AccountList,
            account: None,
        })
    }

    /// The authenticated caller's own account.
    pub fn current_account(&self, identity: &impl IdentitySource) -> ActionResult<Account> {
        let id = identity
            .current_account_id()
            .ok_or(ActionError::AccessDenied)?;
        Ok(self
            .directory
            .find(&AccountLookup::Id(id), self.directory.deadline())?)
    }

    /// Changes the authenticated caller's password after checking the
    /// current one.
    pub fn change_password(
        &self,
        identity: &impl IdentitySource,
        current_password: &str,
        new_password: &str,
    ) -> ActionResult<ActionOutcome> {
        let id = identity
            .current_account_id()
            .ok_or(ActionError::AccessDenied)?;
        let updated = self.directory.change_password_verified(
            id,
            current_password,
            new_password,
            self.directory.deadline(),
        )?;
        Ok(ActionOutcome {
            notice: Notice::PasswordChanged,
            follow_up: FollowUp::ShowAccount {
                username: updated.username.clone(),
            },
            account: Some(updated),
        })
    }
}
