//! Credential policy and hashing.
//!
//! # Responsibility
//! - Decide whether a new plaintext password is acceptable.
//! - Turn accepted passwords into opaque stored credentials.

pub mod hasher;
pub mod policy;
