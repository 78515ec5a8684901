//! Account domain model.
//!
//! # Responsibility
//! - Define the canonical account record and its mutation set.
//! - Define the closed set of lookup keys.
//!
//! # Invariants
//! - Every account is identified by a stable `AccountId`.
//! - Deletion is a hard removal; there are no tombstones.

pub mod account;
pub mod lookup;
