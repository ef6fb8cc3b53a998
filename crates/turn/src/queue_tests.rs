// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::*;
use crate::store::MemoryStore;

fn ttl() -> Duration {
    Duration::from_secs(60)
}

#[tokio::test]
async fn single_holder_draws_waits_and_releases() -> anyhow::Result<()> {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let mut queue = Queue::open(store.clone(), "r").await?;

    let (serial, keeper) = queue.draw("solo", ttl()).await?;
    assert_eq!(serial, 1);

    queue.wait(serial, Duration::from_secs(5), &CancellationToken::new()).await?;
    queue.release(serial, "solo", Outcome::Completed, keeper).await?;

    let values = store.mget(&["turn:r:indicator", "turn:r:dispenser"]).await?;
    assert_eq!(values, vec![Some("2".into()), Some("1".into())]);
    Ok(())
}

#[tokio::test]
async fn second_waiter_is_blocked_until_first_releases() -> anyhow::Result<()> {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let mut first = Queue::open(store.clone(), "r").await?;
    let mut second = Queue::open(store.clone(), "r").await?;

    let (serial_a, keeper_a) = first.draw("A", ttl()).await?;
    let (serial_b, _keeper_b) = second.draw("B", ttl()).await?;
    assert_eq!((serial_a, serial_b), (1, 2));

    first.wait(serial_a, Duration::from_secs(5), &CancellationToken::new()).await?;

    let cancel = CancellationToken::new();
    let waiting = tokio::spawn(async move {
        second.wait(serial_b, Duration::from_secs(5), &cancel).await.map(|_| second)
    });

    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    assert!(!waiting.is_finished(), "B must not be granted before A releases");

    first.release(serial_a, "A", Outcome::Completed, keeper_a).await?;
    let mut second = waiting.await??;
    second.close().await;
    Ok(())
}

#[tokio::test]
async fn bump_skips_a_dead_holder_with_no_presence() -> anyhow::Result<()> {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let queue = Queue::open(store.clone(), "r").await?;

    let (serial, _keeper) = queue.draw("ghost", ttl()).await?;
    assert_eq!(serial, 1);
    // Simulate a crash that never tore down presence via a graceful close:
    // the process just vanished and its TTL already lapsed.
    store.delete(&[&queue.keys().key(serial)]).await?;

    let next = queue.bump().await?;
    assert_eq!(next, 2); // dispenser is 1, nobody live, so indicator moves past it
    let values = store.mget(&["turn:r:indicator"]).await?;
    assert_eq!(values, vec![Some("2".into())]);
    Ok(())
}

#[tokio::test]
async fn bump_picks_the_smallest_live_serial() -> anyhow::Result<()> {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let queue = Queue::open(store.clone(), "r").await?;

    let (s1, _k1) = queue.draw("one", ttl()).await?;
    let (s2, _k2) = queue.draw("two", ttl()).await?;
    let (s3, k3) = queue.draw("three", ttl()).await?;
    assert_eq!((s1, s2, s3), (1, 2, 3));

    store.delete(&[&queue.keys().key(s1)]).await?;
    store.delete(&[&queue.keys().key(s2)]).await?;

    let next = queue.bump().await?;
    assert_eq!(next, 3);
    k3.close().await;
    Ok(())
}

#[tokio::test]
async fn wait_is_cancellable() -> anyhow::Result<()> {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let mut first = Queue::open(store.clone(), "r").await?;
    let mut second = Queue::open(store.clone(), "r").await?;

    let (serial_a, _keeper_a) = first.draw("A", ttl()).await?;
    let (serial_b, _keeper_b) = second.draw("B", ttl()).await?;
    first.wait(serial_a, Duration::from_secs(5), &CancellationToken::new()).await?;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = second.wait(serial_b, Duration::from_secs(5), &cancel).await.unwrap_err();
    assert_eq!(err.downcast::<TurnError>()?, TurnError::Cancelled);
    Ok(())
}
