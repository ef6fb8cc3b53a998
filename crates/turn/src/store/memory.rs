// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process fake [`Store`], used by unit and property tests instead of a
//! running NATS server. Single `tokio::sync::Mutex` over the whole state;
//! channels are modeled with `tokio::sync::broadcast`; TTLs use
//! `tokio::time::Instant` so tests are deterministic under
//! `tokio::time::pause()`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;

use super::{BoxFuture, Frame, Store, Subscription, TransactionResult, WatchToken};

const CHANNEL_CAPACITY: usize = 1024;

struct Inner {
    values: HashMap<String, String>,
    versions: HashMap<String, u64>,
    expirations: HashMap<String, Instant>,
    next_version: u64,
}

impl Inner {
    fn is_live(&self, key: &str) -> bool {
        if !self.values.contains_key(key) {
            return false;
        }
        match self.expirations.get(key) {
            Some(deadline) => Instant::now() < *deadline,
            None => true,
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        if self.is_live(key) {
            self.values.get(key).cloned()
        } else {
            None
        }
    }

    fn bump(&mut self, key: &str) {
        self.next_version += 1;
        self.versions.insert(key.to_owned(), self.next_version);
    }

    fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }
}

/// In-memory fake of the backing store, suitable for unit tests.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    channel: broadcast::Sender<(String, String)>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (channel, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(Inner {
                values: HashMap::new(),
                versions: HashMap::new(),
                expirations: HashMap::new(),
                next_version: 0,
            }),
            channel,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a prior access panicked mid-mutation; the
        // fake is only used in single-process tests, so recovering the
        // guard is preferable to cascading the panic into every caller.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Store for MemoryStore {
    fn incr<'a>(&'a self, key: &'a str) -> BoxFuture<'a, anyhow::Result<i64>> {
        Box::pin(async move {
            let mut inner = self.lock();
            let current: i64 = match inner.get(key) {
                Some(v) => v.parse()?,
                None => 0,
            };
            let next = current + 1;
            inner.values.insert(key.to_owned(), next.to_string());
            inner.expirations.remove(key);
            inner.bump(key);
            Ok(next)
        })
    }

    fn msetnx<'a>(&'a self, pairs: &'a [(&'a str, &'a str)]) -> BoxFuture<'a, anyhow::Result<bool>> {
        Box::pin(async move {
            let mut inner = self.lock();
            if pairs.iter().any(|(k, _)| inner.is_live(k)) {
                return Ok(false);
            }
            for (k, v) in pairs {
                inner.values.insert((*k).to_owned(), (*v).to_owned());
                inner.expirations.remove(*k);
                inner.bump(k);
            }
            Ok(true)
        })
    }

    fn mget<'a>(&'a self, keys: &'a [&'a str]) -> BoxFuture<'a, anyhow::Result<Vec<Option<String>>>> {
        Box::pin(async move {
            let inner = self.lock();
            Ok(keys.iter().map(|k| inner.get(k)).collect())
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let mut inner = self.lock();
            inner.values.insert(key.to_owned(), value.to_owned());
            inner.expirations.remove(key);
            inner.bump(key);
            Ok(())
        })
    }

    fn set_with_ttl<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let mut inner = self.lock();
            inner.values.insert(key.to_owned(), value.to_owned());
            inner.expirations.insert(key.to_owned(), Instant::now() + ttl);
            inner.bump(key);
            Ok(())
        })
    }

    fn expire<'a>(&'a self, key: &'a str, ttl: Duration) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let mut inner = self.lock();
            if inner.is_live(key) {
                inner.expirations.insert(key.to_owned(), Instant::now() + ttl);
            }
            Ok(())
        })
    }

    fn delete<'a>(&'a self, keys: &'a [&'a str]) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let mut inner = self.lock();
            for key in keys {
                inner.values.remove(*key);
                inner.expirations.remove(*key);
                inner.bump(key);
            }
            Ok(())
        })
    }

    fn publish<'a>(&'a self, channel: &'a str, payload: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            // No receivers is not an error: published events may have no
            // subscribers, same as a real pub/sub channel.
            let _ = self.channel.send((channel.to_owned(), payload.to_owned()));
            Ok(())
        })
    }

    fn subscribe<'a>(
        &'a self,
        channels: &'a [&'a str],
    ) -> BoxFuture<'a, anyhow::Result<Box<dyn Subscription>>> {
        let channels: Vec<String> = channels.iter().map(|c| (*c).to_owned()).collect();
        Box::pin(async move {
            let sub: Box<dyn Subscription> = Box::new(MemorySubscription {
                receiver: self.channel.subscribe(),
                channels,
                acked: false,
            });
            Ok(sub)
        })
    }

    fn scan_dispensers<'a>(&'a self) -> BoxFuture<'a, anyhow::Result<Vec<String>>> {
        Box::pin(async move {
            let inner = self.lock();
            let mut found: Vec<String> = inner
                .values
                .keys()
                .filter(|k| inner.is_live(k))
                .filter(|k| k.starts_with("turn:") && k.ends_with(":dispenser"))
                .cloned()
                .collect();
            found.sort();
            Ok(found)
        })
    }

    fn watch<'a>(&'a self, key: &'a str) -> BoxFuture<'a, anyhow::Result<WatchToken>> {
        Box::pin(async move {
            let inner = self.lock();
            Ok(WatchToken { key: key.to_owned(), version: inner.version(key) })
        })
    }

    fn commit_delete<'a>(
        &'a self,
        token: WatchToken,
        delete_keys: &'a [&'a str],
    ) -> BoxFuture<'a, anyhow::Result<TransactionResult>> {
        Box::pin(async move {
            let mut inner = self.lock();
            if inner.version(&token.key) != token.version {
                return Ok(TransactionResult::Aborted);
            }
            for key in delete_keys {
                inner.values.remove(*key);
                inner.expirations.remove(*key);
                inner.bump(key);
            }
            Ok(TransactionResult::Committed)
        })
    }
}

struct MemorySubscription {
    receiver: broadcast::Receiver<(String, String)>,
    channels: Vec<String>,
    acked: bool,
}

impl Subscription for MemorySubscription {
    fn receive(&mut self, timeout: Duration) -> BoxFuture<'_, Option<Frame>> {
        Box::pin(async move {
            if !self.acked {
                self.acked = true;
                return Some(Frame::SubscribeAck);
            }

            let deadline = Instant::now() + timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return None;
                }
                match tokio::time::timeout(remaining, self.receiver.recv()).await {
                    Err(_elapsed) => return None,
                    Ok(Err(broadcast::error::RecvError::Closed)) => return None,
                    Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                    Ok(Ok((channel, payload))) => {
                        if self.channels.iter().any(|c| c == &channel) {
                            return Some(Frame::Message { channel, payload });
                        }
                        continue;
                    }
                }
            }
        })
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {})
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
