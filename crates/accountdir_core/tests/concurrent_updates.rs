use accountdir_core::db::open_db;
use accountdir_core::{
    AccountChanges, AccountDirectory, CredentialHash, CredentialHasher, DirectoryConfig,
    DirectoryError, HashError, LookupKey, NewAccount, SqliteAccountRepository, UniqueField,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

const WORKERS: usize = 6;
const ROUNDS: usize = 10;

struct PlainHasher;

impl CredentialHasher for PlainHasher {
    fn hash(&self, plaintext: &str) -> Result<CredentialHash, HashError> {
        Ok(CredentialHash::new(format!("plain:{plaintext}")))
    }

    fn verify(&self, plaintext: &str, stored: &CredentialHash) -> Result<bool, HashError> {
        Ok(stored.as_str() == format!("plain:{plaintext}"))
    }
}

/// Raises the flag when dropped, including during unwinding.
struct RaiseOnDrop<'a>(&'a AtomicBool);

impl Drop for RaiseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

fn with_directory<T>(
    path: &Path,
    f: impl FnOnce(&AccountDirectory<SqliteAccountRepository<'_>, PlainHasher>) -> T,
) -> T {
    let conn = open_db(path).unwrap();
    let repo = SqliteAccountRepository::try_new(&conn).unwrap();
    let directory = AccountDirectory::new(repo, PlainHasher, &DirectoryConfig::default());
    f(&directory)
}

#[test]
fn concurrent_updates_never_mix_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("accounts.db");
    let id = with_directory(&path, |directory| {
        directory
            .create_account(
                &NewAccount::new("seed", "seed@x.com", "passw0rd"),
                directory.deadline(),
            )
            .unwrap()
            .id
    });

    std::thread::scope(|scope| {
        for worker in 0..WORKERS {
            let path = path.as_path();
            scope.spawn(move || {
                with_directory(path, |directory| {
                    for round in 0..ROUNDS {
                        let name = format!("w{worker}r{round}");
                        directory
                            .update(
                                id,
                                &AccountChanges::default()
                                    .with_username(name.as_str())
                                    .with_email(format!("{name}@x.com")),
                                directory.deadline(),
                            )
                            .unwrap();
                    }
                });
            });
        }
    });

    with_directory(&path, |directory| {
        let stored = directory
            .find_by(LookupKey::Id, &id.to_string(), directory.deadline())
            .unwrap();
        assert_eq!(stored.email, format!("{}@x.com", stored.username));
        assert_eq!(directory.list_all(directory.deadline()).unwrap().len(), 1);
    });
}

#[test]
fn reads_during_updates_never_observe_partial_changes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("accounts.db");
    let id = with_directory(&path, |directory| {
        directory
            .create_account(
                &NewAccount::new("seed", "seed@x.com", "passw0rd"),
                directory.deadline(),
            )
            .unwrap()
            .id
    });
    let writers_done = AtomicBool::new(false);

    let reads = std::thread::scope(|scope| {
        let reader = scope.spawn(|| {
            with_directory(&path, |directory| {
                let mut reads = 0usize;
                while !writers_done.load(Ordering::Acquire) {
                    let seen = directory
                        .find_by(LookupKey::Id, &id.to_string(), directory.deadline())
                        .unwrap();
                    assert_eq!(seen.email, format!("{}@x.com", seen.username));
                    reads += 1;
                }
                reads
            })
        });

        let done = RaiseOnDrop(&writers_done);
        with_directory(&path, |directory| {
            for round in 0..WORKERS * ROUNDS {
                let name = format!("r{round}");
                directory
                    .update(
                        id,
                        &AccountChanges::default()
                            .with_username(name.as_str())
                            .with_email(format!("{name}@x.com")),
                        directory.deadline(),
                    )
                    .unwrap();
            }
        });
        drop(done);
        reader.join().unwrap()
    });

    assert!(reads > 0);
}

#[test]
fn racing_registrations_for_one_username_admit_exactly_one() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("accounts.db");
    drop(open_db(&path).unwrap());

    let results: Vec<Result<(), DirectoryError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..WORKERS)
            .map(|worker| {
                let path = path.as_path();
                scope.spawn(move || {
                    with_directory(path, |directory| {
                        directory
                            .create_account(
                                &NewAccount::new(
                                    "contested",
                                    format!("c{worker}@x.com"),
                                    "passw0rd",
                                ),
                                directory.deadline(),
                            )
                            .map(|_| ())
                    })
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    let admitted = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(admitted, 1);
    assert!(results.iter().all(|result| match result {
        Ok(()) => true,
        Err(err) => matches!(err, DirectoryError::Conflict(UniqueField::Username)),
    }));

    with_directory(&path, |directory| {
        assert_eq!(directory.list_all(directory.deadline()).unwrap().len(), 1);
    });
}
