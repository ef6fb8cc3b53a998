// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scoped acquisition: draw a serial, wait for it, run the caller's
//! critical section, and release on every exit path — including a panic,
//! which is caught so the indicator still advances for other waiters.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::queue::{Outcome, Queue};
use crate::store::nats::NatsAuth;
use crate::store::{NatsStore, Store};

type StoreCache = Mutex<HashMap<String, Arc<dyn Store>>>;

fn store_cache() -> &'static StoreCache {
    static CACHE: OnceLock<StoreCache> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Returns a `NatsStore` shared by every caller with equal connection
/// parameters, connecting lazily on first use. `MemoryStore` is never
/// memoized; it is constructed directly by callers (tests).
pub async fn shared_nats_store(url: &str, prefix: &str, auth: NatsAuth) -> anyhow::Result<Arc<dyn Store>> {
    let cache_key = format!("{url}|{prefix}|{:?}", auth.token);

    {
        let cache = match store_cache().lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(store) = cache.get(&cache_key) {
            return Ok(store.clone());
        }
    }

    let store: Arc<dyn Store> = Arc::new(NatsStore::connect(url, prefix, auth).await?);
    let mut cache = match store_cache().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    Ok(cache.entry(cache_key).or_insert(store).clone())
}

/// Draws a serial for `resource`, waits for its turn, runs
/// `critical_section`, and releases — on success, on a returned error, on a
/// panic, or on cancellation via `cancel`.
pub async fn hold<F, Fut, T>(
    store: Arc<dyn Store>,
    resource: &str,
    label: &str,
    ttl: Duration,
    patience: Duration,
    cancel: &CancellationToken,
    critical_section: F,
) -> anyhow::Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut queue = Queue::open(store, resource).await?;
    let (serial, keeper) = queue.draw(label, ttl).await?;

    if let Err(err) = queue.wait(serial, patience, cancel).await {
        queue.release(serial, label, Outcome::Crashed, keeper).await?;
        queue.close().await;
        return Err(err);
    }

    let outcome = AssertUnwindSafe(critical_section()).catch_unwind().await;
    let (result, release_outcome) = match outcome {
        Ok(Ok(value)) => (Ok(value), Outcome::Completed),
        Ok(Err(err)) => (Err(err), Outcome::Crashed),
        Err(panic) => (Err(anyhow::anyhow!(panic_message(&*panic))), Outcome::Crashed),
    };

    queue.release(serial, label, release_outcome, keeper).await?;
    queue.close().await;
    result
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("critical section panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("critical section panicked: {s}")
    } else {
        "critical section panicked".to_owned()
    }
}

#[cfg(test)]
#[path = "locker_tests.rs"]
mod tests;
