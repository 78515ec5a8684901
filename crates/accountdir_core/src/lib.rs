//! Core domain logic for the account directory.
//! This crate is the single source of truth for account invariants.

pub mod config;
pub mod credential;
pub mod db;
pub mod deadline;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::DirectoryConfig;
pub use credential::hasher::{
    Argon2CredentialHasher, CredentialHasher, HashError, HashingSettings,
};
pub use credential::policy::{PasswordPolicy, PasswordRejection, PolicyViolation};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use deadline::Deadline;
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig};
pub use model::account::{
    Account, AccountChanges, AccountId, AccountStatus, AccountValidationError, CredentialHash,
};
pub use model::lookup::{AccountLookup, LookupKey, UnknownLookupKey};
pub use repo::account_repo::{
    AccountListQuery, AccountRepository, RepoError, RepoResult, SqliteAccountRepository,
    UniqueField,
};
pub use service::account_actions::{
    AccountActions, ActionError, ActionOutcome, ActionResult, FollowUp, IdentitySource, Notice,
};
pub use service::account_directory::{
    AccountDirectory, DirectoryError, DirectoryResult, NewAccount,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
