// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-resource state machine: draw a serial, wait for it to become
//! current, release it, and the bump recovery used by both a patient
//! waiter and the reset tool.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::TurnError;
use crate::keeper::Keeper;
use crate::keys::Keys;
use crate::store::{Frame, Store, Subscription};

/// How a held serial was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The critical section ran to completion.
    Completed,
    /// The critical section returned an error, panicked, or was cancelled.
    Crashed,
}

/// A resource's dispenser/indicator queue, bound to a subscription on its
/// internal channel.
pub struct Queue {
    store: Arc<dyn Store>,
    keys: Keys,
    subscription: Box<dyn Subscription>,
}

impl Queue {
    /// Open the queue for `resource`, subscribing to its internal channel
    /// before any state-changing call can be issued.
    pub async fn open(store: Arc<dyn Store>, resource: impl Into<String>) -> anyhow::Result<Self> {
        let keys = Keys::new(resource);
        let mut subscription = store.subscribe(&[&keys.internal]).await?;
        // Consume the subscribe acknowledgment up front so `wait`'s loop
        // only ever sees real messages.
        subscription.receive(Duration::from_secs(0)).await;
        Ok(Self { store, keys, subscription })
    }

    /// Bootstraps the dispenser/indicator if absent, then issues the next
    /// serial and starts its presence keeper.
    pub async fn draw(&self, label: &str, ttl: Duration) -> anyhow::Result<(u64, Keeper)> {
        self.store.msetnx(&[(self.keys.dispenser.as_str(), "0"), (self.keys.indicator.as_str(), "1")]).await?;
        let serial = self.store.incr(&self.keys.dispenser).await? as u64;

        self.message(&format!("{serial} assigned to \"{label}\"")).await?;
        let keeper = Keeper::start(self.store.clone(), self.keys.key(serial), label.to_owned(), ttl).await?;
        Ok((serial, keeper))
    }

    /// Blocks until the indicator equals `serial`, bumping on every
    /// `patience` timeout. Cancellable via `cancel`.
    pub async fn wait(
        &mut self,
        serial: u64,
        patience: Duration,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        if self.read_indicator().await? == serial {
            self.message(&format!("{serial} started")).await?;
            return Ok(());
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(TurnError::Cancelled.into()),
                frame = self.subscription.receive(patience) => {
                    match frame {
                        None => {
                            self.message(&format!("{serial} bumps")).await?;
                            self.bump().await?;
                        }
                        Some(Frame::SubscribeAck) => continue,
                        Some(Frame::Message { payload, .. }) => {
                            if self.keys.number(&payload) == Some(serial) {
                                self.message(&format!("{serial} started")).await?;
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }
    }

    /// Stops the keeper, publishes the outcome trace, and advances the
    /// indicator past `serial`.
    pub async fn release(&self, serial: u64, label: &str, outcome: Outcome, keeper: Keeper) -> anyhow::Result<()> {
        keeper.close().await;
        match outcome {
            Outcome::Completed => self.message(&format!("{serial} completed by \"{label}\"")).await?,
            Outcome::Crashed => self.message(&format!("{serial} crashed!")).await?,
        }
        let next = serial + 1;
        self.store.set(&self.keys.indicator, &next.to_string()).await?;
        self.announce(next).await?;
        Ok(())
    }

    /// Recomputes the indicator from observed presence and announces it,
    /// even when unchanged. Returns the (possibly unchanged) indicator.
    pub async fn bump(&self) -> anyhow::Result<u64> {
        let values = self.store.mget(&[&self.keys.indicator, &self.keys.dispenser]).await?;
        let indicator: i64 = values[0].as_deref().unwrap_or("1").parse()?;
        let dispenser: i64 = values[1].as_deref().unwrap_or("0").parse()?;

        let presence_keys: Vec<String> = (indicator..=dispenser).map(|n| self.keys.key(n as u64)).collect();
        let presence_refs: Vec<&str> = presence_keys.iter().map(String::as_str).collect();
        let presence = self.store.mget(&presence_refs).await?;

        let next = (indicator..=dispenser)
            .zip(presence)
            .find(|(_, value)| value.is_some())
            .map(|(n, _)| n)
            .unwrap_or(dispenser + 1);

        if next != indicator {
            self.store.set(&self.keys.indicator, &next.to_string()).await?;
        }
        self.announce(next as u64).await?;
        Ok(next as u64)
    }

    /// Unsubscribe from the internal channel. Idempotent.
    pub async fn close(&mut self) {
        self.subscription.close().await;
    }

    pub fn resource(&self) -> &str {
        &self.keys.resource
    }

    pub fn keys(&self) -> &Keys {
        &self.keys
    }

    async fn read_indicator(&self) -> anyhow::Result<u64> {
        let values = self.store.mget(&[&self.keys.indicator]).await?;
        match &values[0] {
            Some(v) => Ok(v.parse()?),
            None => Ok(0),
        }
    }

    async fn announce(&self, serial: u64) -> anyhow::Result<()> {
        self.store.publish(&self.keys.internal, &self.keys.key(serial)).await?;
        self.message(&format!("{serial} granted")).await
    }

    /// Publish a human-readable trace on the external channel.
    pub async fn message(&self, text: &str) -> anyhow::Result<()> {
        self.store.publish(&self.keys.external, &format!("{}: {text}", self.keys.resource)).await
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
