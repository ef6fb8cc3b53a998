// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Production [`Store`] backend built on NATS: core NATS `publish`/
//! `subscribe` serve the internal/external channels, a JetStream KV bucket
//! holds the dispenser/indicator/presence keys.
//!
//! JetStream KV has no native per-entry TTL (only a bucket-wide `max_age`),
//! so presence TTLs are modeled with a small JSON envelope carrying an
//! `expires_at` timestamp; any read that observes an expired envelope
//! treats the key as absent and fires a best-effort purge. See DESIGN.md
//! for why this is an accepted simplification rather than a gap.

use std::time::Duration;

use async_nats::jetstream::kv;
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use super::{BoxFuture, Frame, Store, Subscription, TransactionResult, WatchToken};

/// Authentication options for connecting to NATS.
#[derive(Debug, Default, Clone)]
pub struct NatsAuth {
    pub token: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// JSON envelope stored for every key, carrying an optional expiry.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at_unix_ms: Option<u64>,
}

const TOMBSTONE: &str = "\0tombstone";

fn now_unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Production backend: core NATS pub/sub plus a JetStream KV bucket.
pub struct NatsStore {
    client: async_nats::Client,
    kv: kv::Store,
}

impl NatsStore {
    /// Connect to `url`, authenticate per `auth`, and ensure the `{prefix}-state`
    /// KV bucket exists.
    pub async fn connect(url: &str, prefix: &str, auth: NatsAuth) -> anyhow::Result<Self> {
        let mut opts = async_nats::ConnectOptions::new().retry_on_initial_connect();
        if let Some(token) = auth.token {
            opts = opts.token(token);
        } else if let Some(user) = auth.user {
            opts = opts.user_and_password(user, auth.password.unwrap_or_default());
        }
        let client = opts.connect(url).await?;
        let jetstream = async_nats::jetstream::new(client.clone());

        let bucket = format!("{prefix}-state");
        let kv = match jetstream.get_key_value(&bucket).await {
            Ok(store) => store,
            Err(_) => {
                jetstream
                    .create_key_value(async_nats::jetstream::kv::Config {
                        bucket: bucket.clone(),
                        history: 1,
                        ..Default::default()
                    })
                    .await?
            }
        };

        Ok(Self { client, kv })
    }

    async fn get_envelope(&self, key: &str) -> anyhow::Result<Option<(Envelope, u64)>> {
        let Some(entry) = self.kv.entry(key).await? else {
            return Ok(None);
        };
        if entry.operation == kv::Operation::Delete || entry.operation == kv::Operation::Purge {
            return Ok(None);
        }
        let envelope: Envelope = serde_json::from_slice(&entry.value)?;
        if let Some(deadline) = envelope.expires_at_unix_ms {
            if now_unix_ms() >= deadline {
                let _ = self.kv.purge(key).await;
                return Ok(None);
            }
        }
        Ok(Some((envelope, entry.revision)))
    }
}

impl Store for NatsStore {
    fn incr<'a>(&'a self, key: &'a str) -> BoxFuture<'a, anyhow::Result<i64>> {
        Box::pin(async move {
            loop {
                let current = self.get_envelope(key).await?;
                let (value, revision): (i64, Option<u64>) = match &current {
                    Some((env, rev)) => (env.value.parse()?, Some(*rev)),
                    None => (0, None),
                };
                let next = value + 1;
                let payload = serde_json::to_vec(&Envelope {
                    value: next.to_string(),
                    expires_at_unix_ms: None,
                })?;
                let result = match revision {
                    Some(rev) => self.kv.update(key, payload.into(), rev).await.map(|_| ()),
                    None => self.kv.create(key, payload.into()).await.map(|_| ()),
                };
                match result {
                    Ok(()) => return Ok(next),
                    Err(_) => continue, // lost the CAS race, retry
                }
            }
        })
    }

    fn msetnx<'a>(&'a self, pairs: &'a [(&'a str, &'a str)]) -> BoxFuture<'a, anyhow::Result<bool>> {
        Box::pin(async move {
            let Some((first_key, first_value)) = pairs.first() else {
                return Ok(true);
            };
            let payload = serde_json::to_vec(&Envelope {
                value: (*first_value).to_owned(),
                expires_at_unix_ms: None,
            })?;
            if self.kv.create(*first_key, payload.into()).await.is_err() {
                // Already initialized by a previous drawer; per the dispenser/
                // indicator lifecycle invariant, the rest exist too.
                return Ok(false);
            }
            for (key, value) in &pairs[1..] {
                let payload = serde_json::to_vec(&Envelope {
                    value: (*value).to_owned(),
                    expires_at_unix_ms: None,
                })?;
                // Best effort: under the protocol's own invariants this key
                // cannot already exist once we won the first create.
                self.kv.create(*key, payload.into()).await?;
            }
            Ok(true)
        })
    }

    fn mget<'a>(&'a self, keys: &'a [&'a str]) -> BoxFuture<'a, anyhow::Result<Vec<Option<String>>>> {
        Box::pin(async move {
            let mut out = Vec::with_capacity(keys.len());
            for key in keys {
                out.push(self.get_envelope(key).await?.map(|(env, _)| env.value));
            }
            Ok(out)
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let payload =
                serde_json::to_vec(&Envelope { value: value.to_owned(), expires_at_unix_ms: None })?;
            self.kv.put(key, payload.into()).await?;
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
            let expires_at_unix_ms = Some(now_unix_ms() + ttl.as_millis() as u64);
            let payload =
                serde_json::to_vec(&Envelope { value: value.to_owned(), expires_at_unix_ms })?;
            self.kv.put(key, payload.into()).await?;
            Ok(())
        })
    }

    fn expire<'a>(&'a self, key: &'a str, ttl: Duration) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let Some((mut env, _)) = self.get_envelope(key).await? else {
                return Ok(()); // refreshing a TTL on an absent key is a no-op
            };
            env.expires_at_unix_ms = Some(now_unix_ms() + ttl.as_millis() as u64);
            let payload = serde_json::to_vec(&env)?;
            self.kv.put(key, payload.into()).await?;
            Ok(())
        })
    }

    fn delete<'a>(&'a self, keys: &'a [&'a str]) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            for key in keys {
                let _ = self.kv.purge(*key).await;
            }
            Ok(())
        })
    }

    fn publish<'a>(&'a self, channel: &'a str, payload: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.client.publish(channel.to_owned(), payload.to_owned().into()).await?;
            Ok(())
        })
    }

    fn subscribe<'a>(
        &'a self,
        channels: &'a [&'a str],
    ) -> BoxFuture<'a, anyhow::Result<Box<dyn Subscription>>> {
        Box::pin(async move {
            let mut subs = Vec::with_capacity(channels.len());
            for channel in channels {
                subs.push(self.client.subscribe((*channel).to_owned()).await?);
            }
            let sub: Box<dyn Subscription> = Box::new(NatsSubscription {
                merged: Box::pin(stream::select_all(
                    subs.into_iter().map(|s| s.boxed()).collect::<Vec<_>>(),
                )),
                acked: false,
            });
            Ok(sub)
        })
    }

    fn scan_dispensers<'a>(&'a self) -> BoxFuture<'a, anyhow::Result<Vec<String>>> {
        Box::pin(async move {
            let mut keys = self.kv.keys().await?;
            let mut found = Vec::new();
            while let Some(key) = keys.next().await {
                let key = key?;
                if key.starts_with("turn:") && key.ends_with(":dispenser") {
                    found.push(key);
                }
            }
            found.sort();
            Ok(found)
        })
    }

    fn watch<'a>(&'a self, key: &'a str) -> BoxFuture<'a, anyhow::Result<WatchToken>> {
        Box::pin(async move {
            let revision = self.get_envelope(key).await?.map(|(_, rev)| rev).unwrap_or(0);
            Ok(WatchToken { key: key.to_owned(), version: revision })
        })
    }

    fn commit_delete<'a>(
        &'a self,
        token: WatchToken,
        delete_keys: &'a [&'a str],
    ) -> BoxFuture<'a, anyhow::Result<TransactionResult>> {
        Box::pin(async move {
            let tombstone = serde_json::to_vec(&Envelope {
                value: TOMBSTONE.to_owned(),
                expires_at_unix_ms: None,
            })?;
            let guard_result = if token.version == 0 {
                self.kv.create(&token.key, tombstone.into()).await.map(|_| ())
            } else {
                self.kv.update(&token.key, tombstone.into(), token.version).await.map(|_| ())
            };
            if guard_result.is_err() {
                return Ok(TransactionResult::Aborted);
            }
            for key in delete_keys {
                let _ = self.kv.purge(*key).await;
            }
            Ok(TransactionResult::Committed)
        })
    }
}

struct NatsSubscription {
    merged: std::pin::Pin<
        Box<dyn futures_util::Stream<Item = async_nats::Message> + Send>,
    >,
    acked: bool,
}

impl Subscription for NatsSubscription {
    fn receive(&mut self, timeout: Duration) -> BoxFuture<'_, Option<Frame>> {
        Box::pin(async move {
            // async-nats confirms the subscription before `subscribe()` returns,
            // so the first call here synthesizes the ack the wait loop expects.
            if !self.acked {
                self.acked = true;
                return Some(Frame::SubscribeAck);
            }
            match tokio::time::timeout(timeout, self.merged.next()).await {
                Ok(Some(msg)) => {
                    let payload = String::from_utf8_lossy(&msg.payload).into_owned();
                    Some(Frame::Message { channel: msg.subject.to_string(), payload })
                }
                Ok(None) | Err(_) => None,
            }
        })
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {})
    }
}
