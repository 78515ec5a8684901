//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository and credential collaborators into directory APIs.
//! - Keep request-handling callers decoupled from storage details.

pub mod account_actions;
pub mod account_directory;
