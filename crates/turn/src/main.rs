// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::error;

use turn::config::{Commands, Config};
use turn::store::nats::NatsAuth;
use turn::{locker, tools};

const SEPARATOR: &str = "------------------------------------------------------------";

#[tokio::main]
async fn main() {
    let config = Config::parse();

    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    turn::init_tracing(&config);

    match run(config).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            error!("fatal: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let auth = NatsAuth {
        token: config.nats_token.clone(),
        user: config.nats_user.clone(),
        password: config.nats_password.clone(),
    };
    let store = locker::shared_nats_store(&config.nats_url, &config.prefix, auth).await?;
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    let ttl = config.command.lock_ttl();
    let patience = config.command.lock_patience();
    match config.command {
        Commands::Follow { resources } => run_follow(store, resources, &cancel).await,
        Commands::Lock { resources, label, .. } => run_lock(store, resources, label, ttl, patience, &cancel).await,
        Commands::Reset { resources } => run_reset(store, resources).await,
        Commands::Status { resources } => run_status(store, resources).await,
    }
}

async fn run_follow(store: Arc<dyn turn::store::Store>, resources: Vec<String>, cancel: &CancellationToken) -> anyhow::Result<()> {
    tools::follow(store, resources, cancel, |payload| println!("{payload}")).await
}

async fn run_lock(
    store: Arc<dyn turn::store::Store>,
    resources: Vec<String>,
    label: String,
    ttl: std::time::Duration,
    patience: std::time::Duration,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let resources = if resources.is_empty() { tools::find_resources(store.as_ref()).await? } else { resources };
    if resources.is_empty() {
        return Ok(());
    }

    let mut handles = Vec::with_capacity(resources.len());
    for resource in resources {
        let store = store.clone();
        let label = label.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            println!("{resource}: acquiring");
            let result = tools::lock_hold(store, &resource, &label, ttl, patience, cancel).await;
            match &result {
                Ok(()) => println!("{resource}: released"),
                Err(e) => println!("{resource}: canceled ({e})"),
            }
            result
        }));
    }

    for handle in handles {
        handle.await??;
    }
    Ok(())
}

async fn run_reset(store: Arc<dyn turn::store::Store>, resources: Vec<String>) -> anyhow::Result<()> {
    let report = tools::reset(store, resources).await?;
    for (resource, outcome) in report {
        println!("{}", tools::describe_reset_outcome(&resource, &outcome));
    }
    Ok(())
}

async fn run_status(store: Arc<dyn turn::store::Store>, resources: Vec<String>) -> anyhow::Result<()> {
    if resources.is_empty() {
        let summary = tools::status_summary(store.as_ref()).await?;
        println!("{:<50}{:>10}", "Resource", "Queue size");
        println!("{SEPARATOR}");
        for (resource, size) in summary {
            println!("{resource:<50}{size:>10}");
        }
        return Ok(());
    }

    for (loop_index, report) in tools::status(store.as_ref(), &resources).await?.into_iter().enumerate() {
        if loop_index > 0 {
            println!();
        }
        println!("{:<50}{:>10}", report.resource, report.indicator);
        println!("{SEPARATOR}");
        for (label, serial) in report.holders {
            println!("{label:<50}{serial:>10}");
        }
    }
    Ok(())
}
