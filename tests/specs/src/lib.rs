// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `turn` binary as a subprocess against a NATS server
//! named by `TURN_SPEC_NATS_URL` (default `nats://127.0.0.1:4222`). Tests
//! skip themselves when that server isn't reachable, since these specs
//! exercise the real `NatsStore` backend rather than `MemoryStore`.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

/// The NATS URL these specs target.
pub fn nats_url() -> String {
    std::env::var("TURN_SPEC_NATS_URL").unwrap_or_else(|_| "nats://127.0.0.1:4222".to_owned())
}

/// `true` if a NATS server is reachable at [`nats_url`]. Tests call this
/// first and return early when it's `false` rather than failing CI runs
/// that have no NATS fixture available.
pub async fn nats_available() -> bool {
    tokio::time::timeout(Duration::from_millis(500), async_nats::connect(nats_url()).await)
        .await
        .ok()
        .and_then(|r| r.ok())
        .is_some()
}

/// Resolve the path to the compiled `turn` binary.
pub fn turn_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("turn")
}

/// A running `turn` process that is killed on drop.
pub struct TurnProcess {
    child: Child,
}

impl TurnProcess {
    /// Spawn `turn <subcommand args...>` against [`nats_url`], using a
    /// resource prefix unique to this test run so concurrent specs don't
    /// collide.
    pub fn spawn(prefix: &str, args: &[&str]) -> anyhow::Result<Self> {
        let binary = turn_binary();
        anyhow::ensure!(binary.exists(), "turn binary not found at {}", binary.display());

        let mut full_args = vec!["--nats-url".to_owned(), nats_url(), "--prefix".to_owned(), prefix.to_owned()];
        full_args.extend(args.iter().map(|s| s.to_string()));

        let child = Command::new(&binary)
            .args(&full_args)
            .env("TURN_LOG_FORMAT", "text")
            .env("TURN_LOG_LEVEL", "warn")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(Self { child })
    }

    /// Read all of stdout after the process exits (or is killed).
    pub fn wait_with_stdout(mut self, timeout: Duration) -> anyhow::Result<String> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if let Some(_status) = self.child.try_wait()? {
                break;
            }
            if std::time::Instant::now() > deadline {
                anyhow::bail!("turn process did not exit within {timeout:?}");
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        let output = self.child.wait_with_output()?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Drop for TurnProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
