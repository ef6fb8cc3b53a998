// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic naming of per-resource keys and pub/sub channels.

/// Prefix shared by every key and channel this crate touches in the store.
pub const PREFIX: &str = "turn";

/// Key and channel names for a single resource, plus the machinery to
/// parse a serial number back out of a presence key.
#[derive(Debug, Clone)]
pub struct Keys {
    pub resource: String,
    pub dispenser: String,
    pub indicator: String,
    pub internal: String,
    pub external: String,
}

impl Keys {
    pub fn new(resource: impl Into<String>) -> Self {
        let resource = resource.into();
        Self {
            dispenser: format!("{PREFIX}:{resource}:dispenser"),
            indicator: format!("{PREFIX}:{resource}:indicator"),
            internal: format!("{PREFIX}:{resource}:internal"),
            external: format!("{PREFIX}:{resource}:external"),
            resource,
        }
    }

    /// Presence key for a given serial of this resource.
    pub fn key(&self, serial: u64) -> String {
        format!("{PREFIX}:{}:serial:{serial}", self.resource)
    }

    /// Extract the serial number from one of this resource's presence keys.
    pub fn number(&self, key: &str) -> Option<u64> {
        let prefix = format!("{PREFIX}:{}:serial:", self.resource);
        key.strip_prefix(&prefix)?.parse().ok()
    }

    /// Dispenser key wildcard pattern usable for `scan`-style discovery
    /// (`turn:*:dispenser`).
    pub fn dispenser_wildcard() -> &'static str {
        "turn:*:dispenser"
    }

    /// Extract the resource name out of a dispenser key produced by a scan
    /// matching [`dispenser_wildcard`]. Returns `None` for anything that
    /// does not fit the `turn:<resource>:dispenser` shape.
    pub fn resource_from_dispenser_key(key: &str) -> Option<&str> {
        key.strip_prefix("turn:")?.strip_suffix(":dispenser")
    }
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;
