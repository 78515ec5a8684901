//! Account repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide lookup, listing and write APIs over canonical `accounts` storage.
//! - Keep SQL, locking and deadline handling inside the persistence boundary.
//!
//! # Invariants
//! - Write paths call `Account::validate()` on the merged record before SQL
//!   mutations.
//! - Every write runs in one `BEGIN IMMEDIATE` transaction, so writers on the
//!   same database file (any process) are serialized and a failed write leaves
//!   no partial mutation behind.
//! - Uniqueness is checked inside the write transaction and backed by
//!   `UNIQUE` constraints on the canonical columns.
//! - Post-write reads happen on the writing connection before commit.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::deadline::Deadline;
use crate::model::account::{
    canonicalize, now_epoch_ms, Account, AccountChanges, AccountId, AccountValidationError,
    CredentialHash,
};
use crate::model::lookup::AccountLookup;
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row, Transaction,
    TransactionBehavior,
};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use uuid::Uuid;

const ACCOUNT_SELECT_SQL: &str = "SELECT
    id,
    username,
    email,
    display_name,
    password_hash,
    enabled,
    created_at,
    updated_at
FROM accounts";

const ACCOUNT_COLUMNS: [&str; 10] = [
    "id",
    "username",
    "username_canonical",
    "email",
    "email_canonical",
    "display_name",
    "password_hash",
    "enabled",
    "created_at",
    "updated_at",
];

// SQLite stores the busy timeout as milliseconds in a C int.
const MAX_BUSY_WAIT: Duration = Duration::from_secs(3600);

pub type RepoResult<T> = Result<T, RepoError>;

/// Account attribute guarded by a uniqueness constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Id,
    Username,
    Email,
}

impl UniqueField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Username => "username",
            Self::Email => "email",
        }
    }
}

impl Display for UniqueField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Repository error for account persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(AccountValidationError),
    Db(DbError),
    NotFound(AccountId),
    /// Another account already holds the value.
    Conflict(UniqueField),
    /// Conditional credential write found a different stored hash.
    CredentialChanged(AccountId),
    /// Caller deadline expired before the operation could commit.
    DeadlineExceeded,
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    InvalidData(String),
}

impl RepoError {
    /// Deadline expiry, or lock waiting that ran out of budget.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::DeadlineExceeded => true,
            Self::Db(err) => err.is_busy(),
            _ => false,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "account not found: {id}"),
            Self::Conflict(field) => write!(f, "{field} is already taken"),
            Self::CredentialChanged(id) => {
                write!(f, "stored credential changed concurrently for account {id}")
            }
            Self::DeadlineExceeded => write!(f, "operation deadline exceeded"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "account repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "account repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "account repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted account data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<AccountValidationError> for RepoError {
    fn from(value: AccountValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        if let Some(field) = unique_violation_field(&value) {
            return Self::Conflict(field);
        }
        Self::Db(DbError::Sqlite(value))
    }
}

/// Query options for listing accounts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountListQuery {
    /// Skip disabled accounts when set.
    pub enabled_only: bool,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Repository interface for account storage.
///
/// Every call receives the caller's deadline and fails with
/// `RepoError::DeadlineExceeded` (or a busy `Db` error) instead of blocking
/// past it.
pub trait AccountRepository {
    fn create_account(&self, account: &Account, deadline: Deadline) -> RepoResult<AccountId>;
    fn find_account(
        &self,
        lookup: &AccountLookup,
        deadline: Deadline,
    ) -> RepoResult<Option<Account>>;
    /// Lists accounts ordered by `created_at ASC, id ASC`.
    fn list_accounts(&self, query: &AccountListQuery, deadline: Deadline)
        -> RepoResult<Vec<Account>>;
    fn update_account(
        &self,
        id: AccountId,
        changes: &AccountChanges,
        deadline: Deadline,
    ) -> RepoResult<Account>;
    /// Replaces the stored hash in one statement.
    ///
    /// With `expected_current`, the write only applies while the stored hash
    /// still equals it.
    fn replace_password_hash(
        &self,
        id: AccountId,
        new_hash: &CredentialHash,
        expected_current: Option<&CredentialHash>,
        deadline: Deadline,
    ) -> RepoResult<Account>;
    fn set_enabled(&self, id: AccountId, enabled: bool, deadline: Deadline)
        -> RepoResult<Account>;
    fn delete_account(&self, id: AccountId, deadline: Deadline) -> RepoResult<()>;
}

/// SQLite-backed account repository.
pub struct SqliteAccountRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAccountRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_account_connection_ready(conn)?;
        Ok(Self { conn })
    }

    /// Fails fast on an expired deadline and bounds lock waits by the rest.
    fn arm(&self, deadline: Deadline) -> RepoResult<()> {
        if deadline.is_expired() {
            return Err(RepoError::DeadlineExceeded);
        }
        self.conn
            .busy_timeout(deadline.remaining().min(MAX_BUSY_WAIT))?;
        Ok(())
    }

    fn begin_write(&self, deadline: Deadline) -> RepoResult<Transaction<'conn>> {
        self.arm(deadline)?;
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        Ok(tx)
    }
}

/// Commits unless the deadline ran out; dropping `tx` rolls back.
fn commit_before(tx: Transaction<'_>, deadline: Deadline) -> RepoResult<()> {
    if deadline.is_expired() {
        return Err(RepoError::DeadlineExceeded);
    }
    tx.commit()?;
    Ok(())
}

impl AccountRepository for SqliteAccountRepository<'_> {
    fn create_account(&self, account: &Account, deadline: Deadline) -> RepoResult<AccountId> {
        account.validate()?;

        let tx = self.begin_write(deadline)?;
        ensure_unique(
            &tx,
            account.id,
            &account.username_canonical(),
            &account.email_canonical(),
        )?;
        tx.execute(
            "INSERT INTO accounts (
                id,
                username,
                username_canonical,
                email,
                email_canonical,
                display_name,
                password_hash,
                enabled,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10);",
            params![
                account.id.to_string(),
                account.username.as_str(),
                account.username_canonical(),
                account.email.as_str(),
                account.email_canonical(),
                account.display_name.as_deref(),
                account.password_hash.as_str(),
                bool_to_int(account.enabled),
                account.created_at,
                account.updated_at,
            ],
        )?;
        commit_before(tx, deadline)?;

        Ok(account.id)
    }

    fn find_account(
        &self,
        lookup: &AccountLookup,
        deadline: Deadline,
    ) -> RepoResult<Option<Account>> {
        self.arm(deadline)?;

        let (column, value) = match lookup {
            AccountLookup::Id(id) => ("id", id.to_string()),
            AccountLookup::Username(value) => ("username_canonical", canonicalize(value)),
            AccountLookup::Email(value) => ("email_canonical", canonicalize(value)),
        };
        let mut stmt = self
            .conn
            .prepare(&format!("{ACCOUNT_SELECT_SQL} WHERE {column} = ?1;"))?;
        let mut rows = stmt.query([value])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_account_row(row)?));
        }

        Ok(None)
    }

    fn list_accounts(
        &self,
        query: &AccountListQuery,
        deadline: Deadline,
    ) -> RepoResult<Vec<Account>> {
        self.arm(deadline)?;

        let mut sql = format!("{ACCOUNT_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if query.enabled_only {
            sql.push_str(" AND enabled = 1");
        }

        sql.push_str(" ORDER BY created_at ASC, id ASC");

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut accounts = Vec::new();
        while let Some(row) = rows.next()? {
            accounts.push(parse_account_row(row)?);
        }

        Ok(accounts)
    }

    fn update_account(
        &self,
        id: AccountId,
        changes: &AccountChanges,
        deadline: Deadline,
    ) -> RepoResult<Account> {
        changes.validate()?;

        let tx = self.begin_write(deadline)?;
        let mut account = load_account(&tx, id)?.ok_or(RepoError::NotFound(id))?;
        account.apply_changes(changes);
        account.validate()?;
        let username_canonical = account.username_canonical();
        let email_canonical = account.email_canonical();
        ensure_unique(&tx, id, &username_canonical, &email_canonical)?;

        tx.execute(
            "UPDATE accounts
             SET
                username = ?2,
                username_canonical = ?3,
                email = ?4,
                email_canonical = ?5,
                display_name = ?6,
                updated_at = ?7
             WHERE id = ?1;",
            params![
                id.to_string(),
                account.username.as_str(),
                username_canonical,
                account.email.as_str(),
                email_canonical,
                account.display_name.as_deref(),
                next_updated_at(account.updated_at),
            ],
        )?;

        let updated = read_back(&tx, id, "updated account missing in read-back")?;
        commit_before(tx, deadline)?;
        Ok(updated)
    }

    fn replace_password_hash(
        &self,
        id: AccountId,
        new_hash: &CredentialHash,
        expected_current: Option<&CredentialHash>,
        deadline: Deadline,
    ) -> RepoResult<Account> {
        if new_hash.is_empty() {
            return Err(RepoError::Validation(
                AccountValidationError::MissingCredential,
            ));
        }

        let tx = self.begin_write(deadline)?;
        let changed = tx.execute(
            "UPDATE accounts
             SET
                password_hash = ?2,
                updated_at = MAX(updated_at + 1, ?3)
             WHERE id = ?1
               AND (?4 IS NULL OR password_hash = ?4);",
            params![
                id.to_string(),
                new_hash.as_str(),
                now_epoch_ms(),
                expected_current.map(CredentialHash::as_str),
            ],
        )?;

        if changed == 0 {
            return Err(if account_exists(&tx, id)? {
                RepoError::CredentialChanged(id)
            } else {
                RepoError::NotFound(id)
            });
        }

        let updated = read_back(&tx, id, "account missing after credential replacement")?;
        commit_before(tx, deadline)?;
        Ok(updated)
    }

    fn set_enabled(
        &self,
        id: AccountId,
        enabled: bool,
        deadline: Deadline,
    ) -> RepoResult<Account> {
        let tx = self.begin_write(deadline)?;
        let mut account = load_account(&tx, id)?.ok_or(RepoError::NotFound(id))?;
        account.enabled = enabled;
        account.validate()?;

        tx.execute(
            "UPDATE accounts
             SET
                enabled = ?2,
                updated_at = ?3
             WHERE id = ?1;",
            params![
                id.to_string(),
                bool_to_int(enabled),
                next_updated_at(account.updated_at),
            ],
        )?;

        let updated = read_back(&tx, id, "account missing after status change")?;
        commit_before(tx, deadline)?;
        Ok(updated)
    }

    fn delete_account(&self, id: AccountId, deadline: Deadline) -> RepoResult<()> {
        let tx = self.begin_write(deadline)?;
        let changed = tx.execute("DELETE FROM accounts WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        commit_before(tx, deadline)?;
        Ok(())
    }
}

fn load_account(conn: &Connection, id: AccountId) -> RepoResult<Option<Account>> {
    let mut stmt = conn.prepare(&format!("{ACCOUNT_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_account_row(row)?));
    }
    Ok(None)
}

fn read_back(conn: &Connection, id: AccountId, context: &str) -> RepoResult<Account> {
    load_account(conn, id)?.ok_or_else(|| RepoError::InvalidData(context.to_string()))
}

fn account_exists(conn: &Connection, id: AccountId) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM accounts WHERE id = ?1);",
        [id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn ensure_unique(
    conn: &Connection,
    id: AccountId,
    username_canonical: &str,
    email_canonical: &str,
) -> RepoResult<()> {
    let id_text = id.to_string();
    for (field, column, value) in [
        (UniqueField::Username, "username_canonical", username_canonical),
        (UniqueField::Email, "email_canonical", email_canonical),
    ] {
        let holder: Option<String> = conn
            .query_row(
                &format!("SELECT id FROM accounts WHERE {column} = ?1 AND id != ?2 LIMIT 1;"),
                params![value, id_text.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        if holder.is_some() {
            return Err(RepoError::Conflict(field));
        }
    }
    Ok(())
}

fn parse_account_row(row: &Row<'_>) -> RepoResult<Account> {
    let id_text: String = row.get("id")?;
    let id = Uuid::parse_str(&id_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{id_text}` in accounts.id"))
    })?;

    let enabled = match row.get::<_, i64>("enabled")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid enabled value `{other}` in accounts.enabled"
            )));
        }
    };

    let account = Account {
        id,
        username: row.get("username")?,
        email: row.get("email")?,
        display_name: row.get("display_name")?,
        password_hash: CredentialHash::new(row.get::<_, String>("password_hash")?),
        enabled,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };
    account.validate().map_err(|err| {
        RepoError::InvalidData(format!("account {id} failed validation: {err}"))
    })?;
    Ok(account)
}

/// Keeps `updated_at` strictly increasing even when the clock stalls.
fn next_updated_at(previous: i64) -> i64 {
    now_epoch_ms().max(previous.saturating_add(1))
}

fn unique_violation_field(err: &rusqlite::Error) -> Option<UniqueField> {
    let rusqlite::Error::SqliteFailure(failure, Some(message)) = err else {
        return None;
    };
    if failure.code != ErrorCode::ConstraintViolation
        || !message.starts_with("UNIQUE constraint failed")
    {
        return None;
    }
    if message.contains("accounts.username_canonical") {
        Some(UniqueField::Username)
    } else if message.contains("accounts.email_canonical") {
        Some(UniqueField::Email)
    } else if message.contains("accounts.id") {
        Some(UniqueField::Id)
    } else {
        None
    }
}

fn ensure_account_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "accounts")? {
        return Err(RepoError::MissingRequiredTable("accounts"));
    }

    for column in ACCOUNT_COLUMNS {
        if !table_has_column(conn, "accounts", column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: "accounts",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
