// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator-facing commands: `follow`, `reset`, `status`, `lock_hold`.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::TurnError;
use crate::keys::Keys;
use crate::locker;
use crate::queue::Queue;
use crate::store::{Frame, Store};

const SEPARATOR: &str = "------------------------------------------------------------";

/// Discover every resource currently known to the store, by scanning for
/// its dispenser keys.
pub async fn find_resources(store: &dyn Store) -> anyhow::Result<Vec<String>> {
    let keys = store.scan_dispensers().await?;
    Ok(keys.iter().filter_map(|k| Keys::resource_from_dispenser_key(k)).map(str::to_owned).collect())
}

/// Subscribe to the external channels of `resources` (or every known
/// resource when empty) and invoke `on_message` for each payload received,
/// until `cancel` fires. Returns immediately if there is nothing to follow.
pub async fn follow(
    store: Arc<dyn Store>,
    resources: Vec<String>,
    cancel: &CancellationToken,
    mut on_message: impl FnMut(&str),
) -> anyhow::Result<()> {
    let resources = if resources.is_empty() { find_resources(store.as_ref()).await? } else { resources };
    if resources.is_empty() {
        return Ok(());
    }

    let channels: Vec<String> = resources.iter().map(|r| Keys::new(r).external).collect();
    let channel_refs: Vec<&str> = channels.iter().map(String::as_str).collect();
    let mut subscription = store.subscribe(&channel_refs).await?;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            frame = subscription.receive(Duration::from_secs(3600)) => {
                match frame {
                    Some(Frame::Message { payload, .. }) => on_message(&payload),
                    Some(Frame::SubscribeAck) => continue,
                    None => continue, // patient re-poll; followers never time out on their own
                }
            }
        }
    }
}

/// Outcome of resetting a single resource, for callers that want to report
/// results without parsing display strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetOutcome {
    Reset,
    NoSuchQueue,
    InUse { size: i64 },
    ActivityDetected,
}

/// Remove the dispenser/indicator for each idle resource in `resources`
/// (or every known resource when empty).
pub async fn reset(store: Arc<dyn Store>, resources: Vec<String>) -> anyhow::Result<Vec<(String, ResetOutcome)>> {
    let resources = if resources.is_empty() { find_resources(store.as_ref()).await? } else { resources };

    let mut report = Vec::with_capacity(resources.len());
    for resource in resources {
        let keys = Keys::new(&resource);
        let values = store.mget(&[&keys.indicator, &keys.dispenser]).await?;
        let (indicator, dispenser) = match (&values[0], &values[1]) {
            (Some(i), Some(d)) => (i.parse::<i64>()?, d.parse::<i64>()?),
            _ => {
                report.push((resource, ResetOutcome::NoSuchQueue));
                continue;
            }
        };

        let mut size = dispenser - indicator + 1;
        if size > 0 {
            let queue = Queue::open(store.clone(), &resource).await?;
            queue.message("Reset tool bumps.").await?;
            let new_indicator = queue.bump().await? as i64;
            size = dispenser - new_indicator + 1;
        }
        if size > 0 {
            report.push((resource, ResetOutcome::InUse { size }));
            continue;
        }

        let token = store.watch(&keys.dispenser).await?;
        let result = store.commit_delete(token, &[&keys.dispenser, &keys.indicator]).await?;
        match result {
            crate::store::TransactionResult::Committed => report.push((resource, ResetOutcome::Reset)),
            crate::store::TransactionResult::Aborted => {
                report.push((resource, ResetOutcome::ActivityDetected))
            }
        }
    }
    Ok(report)
}

/// Render a `reset` report line the way the CLI prints it.
pub fn describe_reset_outcome(resource: &str, outcome: &ResetOutcome) -> String {
    match outcome {
        ResetOutcome::Reset => format!("\"{resource}\": reset."),
        ResetOutcome::NoSuchQueue => TurnError::NoSuchQueue(resource.to_owned()).to_string(),
        ResetOutcome::InUse { size } => {
            TurnError::InUse { resource: resource.to_owned(), size: *size }.to_string()
        }
        ResetOutcome::ActivityDetected => TurnError::ActivityDetected(resource.to_owned()).to_string(),
    }
}

/// One resource's status block: header plus (label, serial) rows sorted by
/// serial.
pub struct ResourceStatus {
    pub resource: String,
    pub indicator: i64,
    pub holders: Vec<(String, u64)>,
}

/// Per-resource detail report for `resources`.
pub async fn status(store: &dyn Store, resources: &[String]) -> anyhow::Result<Vec<ResourceStatus>> {
    let mut out = Vec::with_capacity(resources.len());
    for resource in resources {
        let keys = Keys::new(resource);
        let values = store.mget(&[&keys.indicator, &keys.dispenser]).await?;
        let (Some(indicator_raw), Some(dispenser_raw)) = (&values[0], &values[1]) else {
            continue;
        };
        let indicator: i64 = indicator_raw.parse()?;
        let dispenser: i64 = dispenser_raw.parse()?;

        // Every outstanding serial lies in [indicator, dispenser]; a fetched
        // multi-get over that range is exact, unlike probing past dispenser.
        let presence_keys: Vec<String> = (indicator.max(1)..=dispenser).map(|n| keys.key(n as u64)).collect();
        let presence_refs: Vec<&str> = presence_keys.iter().map(String::as_str).collect();
        let presence = store.mget(&presence_refs).await?;

        let mut holders: Vec<(String, u64)> = (indicator.max(1)..=dispenser)
            .zip(presence)
            .filter_map(|(n, label)| label.map(|label| (label, n as u64)))
            .collect();
        holders.sort_by_key(|(_, serial)| *serial);
        out.push(ResourceStatus { resource: resource.clone(), indicator, holders });
    }
    Ok(out)
}

/// Summary line (resource, queue size) for every known resource, sorted by
/// size descending.
pub async fn status_summary(store: &dyn Store) -> anyhow::Result<Vec<(String, i64)>> {
    let resources = find_resources(store).await?;
    let mut sizes = Vec::with_capacity(resources.len());
    for resource in &resources {
        let keys = Keys::new(resource);
        let values = store.mget(&[&keys.dispenser, &keys.indicator]).await?;
        if let (Some(d), Some(i)) = (&values[0], &values[1]) {
            let size = d.parse::<i64>()? - i.parse::<i64>()? + 1;
            sizes.push((resource.clone(), size));
        }
    }
    sizes.sort_by(|a, b| b.1.cmp(&a.1));
    Ok(sizes)
}

/// Holds `resource` indefinitely (e.g. for maintenance) until `cancel`
/// fires, then releases.
pub async fn lock_hold(
    store: Arc<dyn Store>,
    resource: &str,
    label: &str,
    ttl: Duration,
    patience: Duration,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let wait_cancel = cancel.clone();
    locker::hold(store, resource, label, ttl, patience, &wait_cancel, move || async move {
        cancel.cancelled().await;
        Ok(())
    })
    .await
}

#[cfg(test)]
#[path = "tools_tests.rs"]
mod tests;
