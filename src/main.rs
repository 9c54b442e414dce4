//! Gauge Core daemon
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌────────────────┐
//! │  Config  │───▶│ Postgres │───▶│ Reconciliation │
//! │  (YAML)  │    │ (schema) │    │     sweep      │
//! └──────────┘    └──────────┘    └────────────────┘
//!                       │
//!                       ▼
//!                 ┌──────────┐
//!                 │  Audit   │
//!                 │  worker  │
//!                 └──────────┘
//! ```
//!
//! Usage: `gauge_core [--env <name>]` loads `config/<name>.yaml` (default `dev`).

use std::sync::Arc;

use anyhow::Context;

use gauge_core::audit;
use gauge_core::config::AppConfig;
use gauge_core::db::{Database, schema};
use gauge_core::logging::init_logging;
use gauge_core::GaugeCore;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config =
        AppConfig::load(&env).with_context(|| format!("loading config/{}.yaml", env))?;
    let _log_guard = init_logging(&app_config);

    tracing::info!(
        git_hash = env!("GIT_HASH"),
        "Starting Gauge Core in {} mode",
        env
    );

    let db = Database::connect(&app_config.database)
        .await
        .context("connecting to PostgreSQL")?;
    db.health_check().await.context("database health check")?;
    schema::init_schema(db.pool())
        .await
        .context("initializing schema")?;

    let (sink, audit_worker) = audit::channel(app_config.audit.channel_capacity);
    let audit_handle = tokio::spawn(audit_worker.run());

    let core = GaugeCore::new(db, &app_config, Arc::new(sink));

    if app_config.reconciliation.enabled {
        let worker = core.reconciliation_worker(&app_config);
        tokio::select! {
            _ = worker.run() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
            }
        }
    } else {
        tracing::info!("Reconciliation disabled; waiting for shutdown");
        tokio::signal::ctrl_c().await.context("waiting for shutdown")?;
    }

    // Dropping the core drops the last audit sender; the worker drains and exits
    drop(core);
    if let Err(e) = audit_handle.await {
        tracing::warn!(error = %e, "Audit worker did not stop cleanly");
    }

    tracing::info!("Gauge Core stopped");
    Ok(())
}
