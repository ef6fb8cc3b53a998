// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI configuration and subcommand surface.

use std::time::Duration;

use clap::{Parser, Subcommand};

/// Fair, FIFO, mutually-exclusive distributed lock service built on NATS.
#[derive(Debug, Parser)]
#[command(name = "turn", version, about)]
pub struct Config {
    /// NATS server URL.
    #[arg(long, env = "TURN_NATS_URL", default_value = "nats://127.0.0.1:4222")]
    pub nats_url: String,

    /// NATS auth token.
    #[arg(long, env = "TURN_NATS_TOKEN")]
    pub nats_token: Option<String>,

    /// NATS username, used with --nats-password if no token is set.
    #[arg(long, env = "TURN_NATS_USER")]
    pub nats_user: Option<String>,

    /// NATS password, paired with --nats-user.
    #[arg(long, env = "TURN_NATS_PASSWORD")]
    pub nats_password: Option<String>,

    /// Subject and KV bucket prefix.
    #[arg(long, env = "TURN_PREFIX", default_value = "turn")]
    pub prefix: String,

    /// Log format (json or text).
    #[arg(long, env = "TURN_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "TURN_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Follow trace messages for one or more resources (default: all).
    Follow {
        resources: Vec<String>,
    },
    /// Lock one or more resources until interrupted (maintenance mode).
    Lock {
        resources: Vec<String>,
        /// Label attached to the held presence key.
        #[arg(long, default_value = "lock tool")]
        label: String,
        /// Presence TTL in seconds.
        #[arg(long, default_value_t = 60)]
        ttl: u64,
        /// Seconds to wait before bumping a stalled indicator.
        #[arg(long, default_value_t = 60)]
        patience: u64,
    },
    /// Remove dispenser/indicator state for idle resources (default: all).
    Reset {
        resources: Vec<String>,
    },
    /// Print status for one or more resources, or a summary for all.
    Status {
        resources: Vec<String>,
    },
}

impl Config {
    /// Validate flags that `clap` cannot express declaratively.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !matches!(self.log_format.as_str(), "json" | "text") {
            anyhow::bail!("--log-format must be 'json' or 'text', got {:?}", self.log_format);
        }
        if self.nats_password.is_some() && self.nats_user.is_none() {
            anyhow::bail!("--nats-password requires --nats-user");
        }
        Ok(())
    }
}

impl Commands {
    pub fn lock_ttl(&self) -> Duration {
        match self {
            Commands::Lock { ttl, .. } => Duration::from_secs(*ttl),
            _ => Duration::from_secs(60),
        }
    }

    pub fn lock_patience(&self) -> Duration {
        match self {
            Commands::Lock { patience, .. } => Duration::from_secs(*patience),
            _ => Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
