//! Caller-supplied operation deadlines.
//!
//! Deadlines use the monotonic clock, so wall-clock adjustments never extend
//! or shorten an operation's budget.

use std::time::{Duration, Instant};

/// Point in time after which an operation must give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline {
    expires_at: Instant,
}

impl Deadline {
    /// Deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            expires_at: now.checked_add(timeout).unwrap_or(now + Duration::from_secs(86_400)),
        }
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}
