// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `turn` binary against a NATS
//! server. Skipped when no server is reachable (see `nats_available`).

use std::time::Duration;

use turn_specs::{nats_available, TurnProcess};

const TIMEOUT: Duration = Duration::from_secs(10);

fn unique_prefix(label: &str) -> String {
    format!("turn-spec-{}-{label}", std::process::id())
}

#[tokio::test]
async fn reset_on_never_used_resource_reports_no_such_queue() -> anyhow::Result<()> {
    if !nats_available().await {
        eprintln!("skipping: no NATS server reachable at TURN_SPEC_NATS_URL");
        return Ok(());
    }

    let prefix = unique_prefix("reset-unused");
    let process = TurnProcess::spawn(&prefix, &["reset", "never-used-resource"])?;
    let stdout = process.wait_with_stdout(TIMEOUT)?;
    assert!(stdout.contains("No such queue"), "unexpected output: {stdout}");
    Ok(())
}

#[tokio::test]
async fn status_with_no_resources_prints_only_the_header() -> anyhow::Result<()> {
    if !nats_available().await {
        eprintln!("skipping: no NATS server reachable at TURN_SPEC_NATS_URL");
        return Ok(());
    }

    let prefix = unique_prefix("status-empty");
    let process = TurnProcess::spawn(&prefix, &["status"])?;
    let stdout = process.wait_with_stdout(TIMEOUT)?;
    assert!(stdout.contains("Resource"), "unexpected output: {stdout}");
    assert!(stdout.contains("Queue size"), "unexpected output: {stdout}");
    Ok(())
}
