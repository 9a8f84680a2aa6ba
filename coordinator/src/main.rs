//! Coordinator service — HTTP control surface for deletion runs.
//!
//! Accepts run input as JSON, starts and stops runs on the deletion engine,
//! and exposes the current run state, the last outcome and a rolling event
//! log. Only one run is active at a time.
//!
//! # Configuration
//! | Env var                           | Default         |
//! |-----------------------------------|-----------------|
//! | `COORDINATOR_ADDR`                | `0.0.0.0:8080`  |
//! | `COORDINATOR_EVENT_LOG_CAPACITY`  | `500`           |

mod event_log;
mod handlers;
mod models;

use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use deletion_engine::{DeletionEngine, HttpGateway};
use tower_http::trace::TraceLayer;
use tracing::info;

use event_log::{spawn_collector, EventLog};

// ------------------------------------------------------------------ //
//  Shared application state                                           //
// ------------------------------------------------------------------ //

/// Shared state injected into every Axum handler via `State`.
pub struct AppState {
    pub engine: Arc<DeletionEngine>,
    /// Recent engine events and the last finished run.
    pub events: Arc<EventLog>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/runs", post(handlers::start_run))
        .route("/runs/stop", post(handlers::stop_run))
        .route("/runs/current", get(handlers::current_run))
        .route("/runs/last", get(handlers::last_run))
        .route("/runs/events", get(handlers::run_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ------------------------------------------------------------------ //
//  Entry point                                                        //
// ------------------------------------------------------------------ //

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("coordinator=info".parse()?)
                .add_directive("deletion_engine=info".parse()?),
        )
        .json()
        .init();

    let capacity: usize = std::env::var("COORDINATOR_EVENT_LOG_CAPACITY")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(500);

    let engine = Arc::new(DeletionEngine::new(Arc::new(HttpGateway::new())));
    let events = Arc::new(EventLog::new(capacity));
    spawn_collector(engine.subscribe(), Arc::clone(&events));

    let state = Arc::new(AppState { engine, events });

    let bind_addr = std::env::var("COORDINATOR_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = bind_addr, capacity, "coordinator listening");

    axum::serve(listener, router(state)).await?;

    Ok(())
}
