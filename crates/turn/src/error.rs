// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Named, caller-matchable failure conditions distinguished from opaque
/// store-layer failures (which stay as plain `anyhow::Error`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnError {
    /// `wait` or `hold` was interrupted before the lock was granted.
    Cancelled,
    /// A pub/sub payload did not match the presence-key pattern.
    MalformedPresenceKey(String),
    /// `reset`/`status` observed a resource with no dispenser/indicator.
    NoSuchQueue(String),
    /// `reset` observed a resource still in use after a bump.
    InUse { resource: String, size: i64 },
    /// `reset`'s optimistic-concurrency transaction was aborted by a
    /// concurrent writer.
    ActivityDetected(String),
}

impl fmt::Display for TurnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::MalformedPresenceKey(key) => write!(f, "malformed presence key: {key:?}"),
            Self::NoSuchQueue(resource) => write!(f, "No such queue: {resource:?}."),
            Self::InUse { resource, size } => {
                write!(f, "\"{resource}\" is in use by {size} user(s).")
            }
            Self::ActivityDetected(resource) => {
                write!(f, "Activity detected for {resource:?}.")
            }
        }
    }
}

impl std::error::Error for TurnError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
