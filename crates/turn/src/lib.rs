// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod config;
pub mod error;
pub mod keeper;
pub mod keys;
pub mod locker;
pub mod queue;
pub mod store;
pub mod tools;

use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging from config. Uses `try_init` so it's safe to
/// call more than once (e.g. from tests).
pub fn init_tracing(config: &config::Config) {
    use tracing_subscriber::fmt;

    let filter = if std::env::var("RUST_LOG").is_err() && config.log_level == "info" {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    } else {
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}
