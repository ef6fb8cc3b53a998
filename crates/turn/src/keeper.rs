// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Keeps a presence key alive in the store for as long as a holder occupies
//! its turn. Mirrors `poller`'s `tokio::select!` + `CancellationToken`
//! shutdown shape rather than spawning a raw OS thread.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::store::Store;

const MIN_TTL: Duration = Duration::from_secs(2);

/// Background task refreshing a presence key's TTL until told to stop.
pub struct Keeper {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Keeper {
    /// Write `key=label` with a TTL of `max(ttl, 2s)` and spawn the
    /// refresh loop. The write happens synchronously so that by the time
    /// this returns, presence is observable.
    pub async fn start(
        store: Arc<dyn Store>,
        key: String,
        label: String,
        ttl: Duration,
    ) -> anyhow::Result<Self> {
        let ttl = ttl.max(MIN_TTL);
        store.set_with_ttl(&key, &label, ttl).await?;

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let refresh_every = ttl - Duration::from_secs(1);
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = tokio::time::sleep(refresh_every) => {}
                }
                if task_cancel.is_cancelled() {
                    break;
                }
                if let Err(err) = store.expire(&key, ttl).await {
                    tracing::debug!(%key, %err, "keeper refresh failed");
                }
            }
            let _ = store.delete(&[&key]).await;
        });

        Ok(Self { cancel, handle: Some(handle) })
    }

    /// Signal shutdown and wait for the key to be deleted. Idempotent.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Keeper {
    fn drop(&mut self) {
        // Best-effort: a dropped-without-close Keeper still stops refreshing,
        // presence then expires on its own within the TTL (§4.3 invariant).
        self.cancel.cancel();
    }
}

#[cfg(test)]
#[path = "keeper_tests.rs"]
mod tests;
