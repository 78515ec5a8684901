//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the account storage contract used by the directory service.
//! - Isolate SQLite query, locking and transaction details from orchestration.
//!
//! # Invariants
//! - Repository writes enforce `Account::validate()` before persistence.
//! - Repository APIs return semantic errors (`NotFound`, `Conflict`) in
//!   addition to DB transport errors.

pub mod account_repo;
