// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

#[tokio::test]
async fn incr_creates_and_increments() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    assert_eq!(store.incr("k").await?, 1);
    assert_eq!(store.incr("k").await?, 2);
    Ok(())
}

#[tokio::test]
async fn msetnx_only_when_absent() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    assert!(store.msetnx(&[("a", "0"), ("b", "1")]).await?);
    assert_eq!(store.mget(&["a", "b"]).await?, vec![Some("0".into()), Some("1".into())]);

    // Second call is a no-op: keys already present.
    assert!(!store.msetnx(&[("a", "99"), ("c", "2")]).await?);
    assert_eq!(store.mget(&["a", "c"]).await?, vec![Some("0".into()), None]);
    Ok(())
}

#[tokio::test]
async fn ttl_expiry_under_paused_clock() -> anyhow::Result<()> {
    tokio::time::pause();
    let store = MemoryStore::new();
    store.set_with_ttl("p", "label", Duration::from_secs(2)).await?;
    assert_eq!(store.mget(&["p"]).await?, vec![Some("label".into())]);

    tokio::time::advance(Duration::from_secs(3)).await;
    assert_eq!(store.mget(&["p"]).await?, vec![None]);
    Ok(())
}

#[tokio::test]
async fn expire_refreshes_ttl() -> anyhow::Result<()> {
    tokio::time::pause();
    let store = MemoryStore::new();
    store.set_with_ttl("p", "label", Duration::from_secs(2)).await?;
    tokio::time::advance(Duration::from_millis(1_900)).await;
    store.expire("p", Duration::from_secs(2)).await?;
    tokio::time::advance(Duration::from_millis(1_900)).await;
    assert_eq!(store.mget(&["p"]).await?, vec![Some("label".into())]);
    Ok(())
}

#[tokio::test]
async fn watch_commit_delete_roundtrip() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    store.set("d", "3").await?;
    store.set("i", "1").await?;

    let token = store.watch("d").await?;
    let result = store.commit_delete(token, &["d", "i"]).await?;
    assert_eq!(result, TransactionResult::Committed);
    assert_eq!(store.mget(&["d", "i"]).await?, vec![None, None]);
    Ok(())
}

#[tokio::test]
async fn watch_aborts_on_concurrent_write() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    store.set("d", "3").await?;

    let token = store.watch("d").await?;
    store.incr("d").await?; // concurrent writer touches the watched key
    let result = store.commit_delete(token, &["d"]).await?;
    assert_eq!(result, TransactionResult::Aborted);
    assert_eq!(store.mget(&["d"]).await?, vec![Some("4".into())]);
    Ok(())
}

#[tokio::test]
async fn publish_subscribe_acks_then_delivers() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    let mut sub = store.subscribe(&["ch"]).await?;

    let first = sub.receive(Duration::from_millis(50)).await;
    assert_eq!(first, Some(Frame::SubscribeAck));

    store.publish("ch", "hello").await?;
    let second = sub.receive(Duration::from_millis(50)).await;
    assert_eq!(second, Some(Frame::Message { channel: "ch".into(), payload: "hello".into() }));
    Ok(())
}

#[tokio::test]
async fn subscribe_ignores_other_channels() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    let mut sub = store.subscribe(&["a"]).await?;
    let _ = sub.receive(Duration::from_millis(10)).await; // ack

    store.publish("b", "irrelevant").await?;
    let frame = sub.receive(Duration::from_millis(20)).await;
    assert_eq!(frame, None);
    Ok(())
}

#[tokio::test]
async fn scan_dispensers_lists_only_live_ones() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    store.set("turn:r1:dispenser", "1").await?;
    store.set("turn:r2:dispenser", "1").await?;
    store.set("turn:r1:indicator", "1").await?;

    let mut found = store.scan_dispensers().await?;
    found.sort();
    assert_eq!(found, vec!["turn:r1:dispenser".to_owned(), "turn:r2:dispenser".to_owned()]);
    Ok(())
}
