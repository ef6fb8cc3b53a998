// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The backing-store capabilities required by the core (§6.2): integer
//! atomic increment, multi-key conditional set, multi-key get, TTL'd keys,
//! pub/sub with a timed receive, and a watch-then-commit optimistic
//! transaction.
//!
//! `Store` and `Subscription` are object-safe traits with manually boxed
//! futures, the same convention this codebase already uses for `Backend`
//! and `Detector` rather than pulling in `async-trait`.

pub mod memory;
pub mod nats;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub use memory::MemoryStore;
pub use nats::NatsStore;

/// A future boxed for use in an object-safe trait method.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A message received off a subscription, or the subscribe acknowledgment
/// that precedes the first real message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Confirms the subscribe request went through; carries no payload.
    SubscribeAck,
    /// A published message on one of the subscribed channels.
    Message { channel: String, payload: String },
}

/// Outcome of the watch-then-commit optimistic transaction used by `reset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionResult {
    /// The watched key was unchanged; the operation committed.
    Committed,
    /// A concurrent writer touched the watched key; nothing was changed.
    Aborted,
}

/// A snapshot of a key's version, taken by [`Store::watch`] and redeemed by
/// [`Store::commit_delete`]. Opaque to callers; backends are free to encode
/// whatever they need (a KV revision number, a generation counter, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchToken {
    pub(crate) key: String,
    pub(crate) version: u64,
}

/// A subscription to one or more pub/sub channels.
pub trait Subscription: Send {
    /// Block for up to `timeout` waiting for the next frame. Returns `None`
    /// on timeout.
    fn receive(&mut self, timeout: Duration) -> BoxFuture<'_, Option<Frame>>;

    /// Unsubscribe. Idempotent.
    fn close(&mut self) -> BoxFuture<'_, ()>;
}

/// The backing-store capabilities required by the core.
pub trait Store: Send + Sync {
    /// Atomically increment the integer at `key` (creating it at 0 first if
    /// absent) and return the post-increment value.
    fn incr<'a>(&'a self, key: &'a str) -> BoxFuture<'a, anyhow::Result<i64>>;

    /// Set every pair in `pairs` only if *none* of the keys already exist.
    /// Returns whether the set was actually performed (`false` means at
    /// least one key was already present and nothing was changed).
    fn msetnx<'a>(&'a self, pairs: &'a [(&'a str, &'a str)]) -> BoxFuture<'a, anyhow::Result<bool>>;

    /// Fetch the current values of `keys`, `None` for absent ones, in order.
    fn mget<'a>(&'a self, keys: &'a [&'a str]) -> BoxFuture<'a, anyhow::Result<Vec<Option<String>>>>;

    /// Unconditionally set `key` to `value`.
    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFuture<'a, anyhow::Result<()>>;

    /// Unconditionally set `key` to `value` with the given TTL.
    fn set_with_ttl<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, anyhow::Result<()>>;

    /// Refresh the TTL on an existing key without changing its value.
    fn expire<'a>(&'a self, key: &'a str, ttl: Duration) -> BoxFuture<'a, anyhow::Result<()>>;

    /// Delete `keys`. Absent keys are not an error.
    fn delete<'a>(&'a self, keys: &'a [&'a str]) -> BoxFuture<'a, anyhow::Result<()>>;

    /// Publish `payload` on `channel`.
    fn publish<'a>(&'a self, channel: &'a str, payload: &'a str) -> BoxFuture<'a, anyhow::Result<()>>;

    /// Subscribe to one or more channels.
    fn subscribe<'a>(
        &'a self,
        channels: &'a [&'a str],
    ) -> BoxFuture<'a, anyhow::Result<Box<dyn Subscription>>>;

    /// Scan for keys matching a `turn:*:dispenser`-shaped wildcard, used by
    /// tools to discover all currently known resources. The wildcard is
    /// always [`crate::keys::Keys::dispenser_wildcard`]; backends translate
    /// it to their native scan/list mechanism.
    fn scan_dispensers<'a>(&'a self) -> BoxFuture<'a, anyhow::Result<Vec<String>>>;

    /// Begin an optimistic-concurrency transaction: snapshot the current
    /// version of `key` (absent counts as a version, same as present).
    fn watch<'a>(&'a self, key: &'a str) -> BoxFuture<'a, anyhow::Result<WatchToken>>;

    /// Delete `delete_keys`, but only if the watched key's version still
    /// matches `token`. This is the commit half of the watch-then-delete
    /// sequence `reset` uses to avoid racing a brand-new drawer.
    fn commit_delete<'a>(
        &'a self,
        token: WatchToken,
        delete_keys: &'a [&'a str],
    ) -> BoxFuture<'a, anyhow::Result<TransactionResult>>;
}
