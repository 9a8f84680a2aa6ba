//! One-shot deletion run configured from the environment.
//!
//! Ctrl-C requests a cooperative stop; the call in flight completes first.
//!
//! # Environment variables
//! | Var                      | Default    |
//! |--------------------------|------------|
//! | `PRUNE_SERVER`           | required   |
//! | `PRUNE_DATASET_ID`       | required   |
//! | `PRUNE_FROM`             | required   |
//! | `PRUNE_TO`               | required   |
//! | `PRUNE_THRESHOLD`        | required   |
//! | `PRUNE_THRESHOLD_SIGN`   | `+`        |
//! | `PRUNE_DELAY_MS`         | `1000`     |
//!
//! Times are `dd.MM.yyyy HH:mm` or Unix milliseconds.

use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::{error, info, warn};

use deletion_engine::request::{DEFAULT_DELAY_MS, DEFAULT_SIGN};
use deletion_engine::{DeletionEngine, HttpGateway, RawFields, RunStatus, StartError};

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("deletion_engine=info".parse()?),
        )
        .json()
        .init();

    let raw = RawFields {
        server: env_or("PRUNE_SERVER", ""),
        dataset_id: env_or("PRUNE_DATASET_ID", ""),
        window_start: env_or("PRUNE_FROM", ""),
        window_end: env_or("PRUNE_TO", ""),
        threshold: env_or("PRUNE_THRESHOLD", ""),
        threshold_sign: env_or("PRUNE_THRESHOLD_SIGN", DEFAULT_SIGN),
        delay_ms: env_or("PRUNE_DELAY_MS", DEFAULT_DELAY_MS),
    };

    let engine = Arc::new(DeletionEngine::new(Arc::new(HttpGateway::new())));

    let handle = match engine.start(&raw) {
        Ok(h) => h,
        Err(StartError::Invalid(errors)) => {
            for e in &errors.0 {
                error!(field = %e.field, reason = e.reason, "invalid input");
            }
            bail!("input validation failed: {errors}");
        }
        Err(e) => return Err(e.into()),
    };

    let stopper = Arc::clone(&engine);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current call");
            stopper.stop();
        }
    });

    let outcome = handle.outcome().await?;
    info!(
        status = %outcome.status,
        deleted = outcome.deleted_count,
        "run ended"
    );

    if outcome.status == RunStatus::Failed {
        bail!(
            "run failed after {} deletions: {}",
            outcome.deleted_count,
            outcome.error.unwrap_or_default()
        );
    }
    Ok(())
}
