use accountdir_core::db::open_db_in_memory;
use accountdir_core::{
    Account, AccountChanges, AccountListQuery, AccountLookup, AccountRepository,
    CredentialHash, Deadline, RepoError, SqliteAccountRepository, UniqueField,
};
use rusqlite::Connection;
use std::time::Duration;
use uuid::Uuid;

fn deadline() -> Deadline {
    Deadline::after(Duration::from_secs(5))
}

fn account(username: &str, email: &str) -> Account {
    Account::new(username, email, CredentialHash::new("stored-hash"))
}

#[test]
fn create_and_find_by_every_key() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteAccountRepository::try_new(&conn).unwrap();

    let alice = account("Alice", "Alice@X.com");
    let id = repo.create_account(&alice, deadline()).unwrap();
    assert_eq!(id, alice.id);

    let by_id = repo
        .find_account(&AccountLookup::Id(id), deadline())
        .unwrap()
        .unwrap();
    assert_eq!(by_id, alice);

    let by_username = repo
        .find_account(&AccountLookup::Username("alice".to_string()), deadline())
        .unwrap()
        .unwrap();
    assert_eq!(by_username.id, id);
    assert_eq!(by_username.username, "Alice");

    let by_email = repo
        .find_account(&AccountLookup::Email("alice@x.com".to_string()), deadline())
        .unwrap()
        .unwrap();
    assert_eq!(by_email.id, id);
    assert_eq!(by_email.password_hash, CredentialHash::new("stored-hash"));
}

#[test]
fn find_missing_returns_none() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteAccountRepository::try_new(&conn).unwrap();

    let found = repo
        .find_account(&AccountLookup::Id(Uuid::new_v4()), deadline())
        .unwrap();
    assert!(found.is_none());
}

#[test]
fn create_rejects_case_insensitive_duplicates() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteAccountRepository::try_new(&conn).unwrap();
    repo.create_account(&account("alice", "alice@x.com"), deadline())
        .unwrap();

    let err = repo
        .create_account(&account("ALICE", "other@x.com"), deadline())
        .unwrap_err();
    assert!(matches!(err, RepoError::Conflict(UniqueField::Username)));

    let err = repo
        .create_account(&account("bob", "Alice@X.COM"), deadline())
        .unwrap_err();
    assert!(matches!(err, RepoError::Conflict(UniqueField::Email)));
}

#[test]
fn imported_account_reusing_an_id_conflicts_on_id() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteAccountRepository::try_new(&conn).unwrap();
    let alice = account("alice", "alice@x.com");
    repo.create_account(&alice, deadline()).unwrap();

    let imported = Account::with_id(
        alice.id,
        "bob",
        "bob@x.com",
        CredentialHash::new("imported-hash"),
    );
    let err = repo.create_account(&imported, deadline()).unwrap_err();
    assert!(matches!(err, RepoError::Conflict(UniqueField::Id)));

    assert!(repo
        .find_account(&AccountLookup::Username("bob".to_string()), deadline())
        .unwrap()
        .is_none());
    let stored = repo
        .find_account(&AccountLookup::Id(alice.id), deadline())
        .unwrap()
        .unwrap();
    assert_eq!(stored, alice);
}

#[test]
fn create_rejects_invalid_account_before_sql() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteAccountRepository::try_new(&conn).unwrap();

    let err = repo
        .create_account(&account("a", "not-an-email"), deadline())
        .unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
    assert!(repo
        .list_accounts(&AccountListQuery::default(), deadline())
        .unwrap()
        .is_empty());
}

#[test]
fn update_applies_only_named_fields_and_bumps_updated_at() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteAccountRepository::try_new(&conn).unwrap();
    let mut alice = account("alice", "alice@x.com");
    alice.display_name = Some("Alice A.".to_string());
    repo.create_account(&alice, deadline()).unwrap();

    let updated = repo
        .update_account(
            alice.id,
            &AccountChanges::default().with_email("alice@new.com"),
            deadline(),
        )
        .unwrap();
    assert_eq!(updated.username, "alice");
    assert_eq!(updated.email, "alice@new.com");
    assert_eq!(updated.display_name.as_deref(), Some("Alice A."));
    assert_eq!(updated.password_hash, alice.password_hash);
    assert!(updated.updated_at > alice.updated_at);

    let cleared = repo
        .update_account(
            alice.id,
            &AccountChanges::default().with_display_name(None),
            deadline(),
        )
        .unwrap();
    assert_eq!(cleared.display_name, None);
}

#[test]
fn update_may_keep_own_username_with_different_case() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteAccountRepository::try_new(&conn).unwrap();
    let alice = account("alice", "alice@x.com");
    repo.create_account(&alice, deadline()).unwrap();

    let updated = repo
        .update_account(
            alice.id,
            &AccountChanges::default().with_username("Alice"),
            deadline(),
        )
        .unwrap();
    assert_eq!(updated.username, "Alice");
}

#[test]
fn update_conflict_leaves_both_accounts_unchanged() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteAccountRepository::try_new(&conn).unwrap();
    let alice = account("alice", "alice@x.com");
    let bob = account("bob", "bob@x.com");
    repo.create_account(&alice, deadline()).unwrap();
    repo.create_account(&bob, deadline()).unwrap();

    let err = repo
        .update_account(
            bob.id,
            &AccountChanges::default()
                .with_username("bobby")
                .with_email("ALICE@x.com"),
            deadline(),
        )
        .unwrap_err();
    assert!(matches!(err, RepoError::Conflict(UniqueField::Email)));

    let stored_bob = repo
        .find_account(&AccountLookup::Id(bob.id), deadline())
        .unwrap()
        .unwrap();
    assert_eq!(stored_bob, bob);
    let stored_alice = repo
        .find_account(&AccountLookup::Id(alice.id), deadline())
        .unwrap()
        .unwrap();
    assert_eq!(stored_alice, alice);
}

#[test]
fn update_missing_account_returns_not_found() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteAccountRepository::try_new(&conn).unwrap();
    let id = Uuid::new_v4();

    let err = repo
        .update_account(id, &AccountChanges::default().with_email("x@y.com"), deadline())
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound(missing) if missing == id));
}

#[test]
fn list_orders_by_creation_and_paginates() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteAccountRepository::try_new(&conn).unwrap();

    let mut created = Vec::new();
    for (index, name) in ["carol", "alice", "bob"].iter().enumerate() {
        let mut item = account(name, &format!("{name}@x.com"));
        item.created_at = 1_000 + index as i64;
        item.updated_at = item.created_at;
        repo.create_account(&item, deadline()).unwrap();
        created.push(item.id);
    }

    let all = repo
        .list_accounts(&AccountListQuery::default(), deadline())
        .unwrap();
    let ids: Vec<Uuid> = all.iter().map(|item| item.id).collect();
    assert_eq!(ids, created);

    let page = repo
        .list_accounts(
            &AccountListQuery {
                limit: Some(1),
                offset: 1,
                ..AccountListQuery::default()
            },
            deadline(),
        )
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, created[1]);

    let tail = repo
        .list_accounts(
            &AccountListQuery {
                offset: 2,
                ..AccountListQuery::default()
            },
            deadline(),
        )
        .unwrap();
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].id, created[2]);
}

#[test]
fn list_enabled_only_skips_disabled_accounts() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteAccountRepository::try_new(&conn).unwrap();
    let alice = account("alice", "alice@x.com");
    let bob = account("bob", "bob@x.com");
    repo.create_account(&alice, deadline()).unwrap();
    repo.create_account(&bob, deadline()).unwrap();

    let disabled = repo.set_enabled(bob.id, false, deadline()).unwrap();
    assert!(!disabled.enabled);

    let enabled = repo
        .list_accounts(
            &AccountListQuery {
                enabled_only: true,
                ..AccountListQuery::default()
            },
            deadline(),
        )
        .unwrap();
    assert_eq!(enabled.len(), 1);
    assert_eq!(enabled[0].id, alice.id);
}

#[test]
fn replace_password_hash_with_expected_current_is_conditional() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteAccountRepository::try_new(&conn).unwrap();
    let alice = account("alice", "alice@x.com");
    repo.create_account(&alice, deadline()).unwrap();

    let stale = CredentialHash::new("not-the-stored-hash");
    let err = repo
        .replace_password_hash(
            alice.id,
            &CredentialHash::new("next"),
            Some(&stale),
            deadline(),
        )
        .unwrap_err();
    assert!(matches!(err, RepoError::CredentialChanged(id) if id == alice.id));

    let updated = repo
        .replace_password_hash(
            alice.id,
            &CredentialHash::new("next"),
            Some(&alice.password_hash),
            deadline(),
        )
        .unwrap();
    assert_eq!(updated.password_hash, CredentialHash::new("next"));
    assert!(updated.updated_at > alice.updated_at);
}

#[test]
fn replace_password_hash_rejects_empty_and_missing() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteAccountRepository::try_new(&conn).unwrap();

    let err = repo
        .replace_password_hash(Uuid::new_v4(), &CredentialHash::default(), None, deadline())
        .unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));

    let err = repo
        .replace_password_hash(Uuid::new_v4(), &CredentialHash::new("h"), None, deadline())
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound(_)));
}

#[test]
fn delete_removes_account_for_every_key() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteAccountRepository::try_new(&conn).unwrap();
    let alice = account("alice", "alice@x.com");
    repo.create_account(&alice, deadline()).unwrap();

    repo.delete_account(alice.id, deadline()).unwrap();

    for lookup in [
        AccountLookup::Id(alice.id),
        AccountLookup::Username("alice".to_string()),
        AccountLookup::Email("alice@x.com".to_string()),
    ] {
        assert!(repo.find_account(&lookup, deadline()).unwrap().is_none());
    }
    let err = repo.delete_account(alice.id, deadline()).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(_)));

    // Freed identifiers can be reused.
    repo.create_account(&account("alice", "alice@x.com"), deadline())
        .unwrap();
}

#[test]
fn expired_deadline_fails_without_touching_storage() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteAccountRepository::try_new(&conn).unwrap();
    let expired = Deadline::after(Duration::ZERO);

    let err = repo
        .create_account(&account("alice", "alice@x.com"), expired)
        .unwrap_err();
    assert!(matches!(err, RepoError::DeadlineExceeded));
    assert!(err.is_timeout());
    assert!(repo
        .list_accounts(&AccountListQuery::default(), deadline())
        .unwrap()
        .is_empty());
}

#[test]
fn corrupt_rows_are_reported_as_invalid_data() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteAccountRepository::try_new(&conn).unwrap();
    conn.execute(
        "INSERT INTO accounts (
            id, username, username_canonical, email, email_canonical,
            display_name, password_hash, enabled, created_at, updated_at
        ) VALUES ('not-a-uuid', 'alice', 'alice', 'alice@x.com', 'alice@x.com', NULL, 'h', 1, 1, 1);",
        [],
    )
    .unwrap();

    let err = repo
        .find_account(&AccountLookup::Username("alice".to_string()), deadline())
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)));
}

#[test]
fn try_new_rejects_uninitialized_connection() {
    let conn = Connection::open_in_memory().unwrap();
    let err = SqliteAccountRepository::try_new(&conn)
        .err()
        .expect("uninitialized connection should be rejected");
    assert!(matches!(
        err,
        RepoError::UninitializedConnection {
            actual_version: 0,
            ..
        }
    ));
}

#[test]
fn try_new_rejects_missing_table_and_column() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch("DROP TABLE accounts;").unwrap();
    let err = SqliteAccountRepository::try_new(&conn)
        .err()
        .expect("missing table should be rejected");
    assert!(matches!(err, RepoError::MissingRequiredTable("accounts")));

    let conn = open_db_in_memory().unwrap();
    conn.execute_batch("ALTER TABLE accounts DROP COLUMN display_name;")
        .unwrap();
    let err = SqliteAccountRepository::try_new(&conn)
        .err()
        .expect("missing column should be rejected");
    assert!(matches!(
        err,
        RepoError::MissingRequiredColumn {
            table: "accounts",
            column: "display_name"
        }
    ));
}
