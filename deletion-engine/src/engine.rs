//! Deletion loop engine.
//!
//! One run at a time executes on a dedicated tokio task. Each cycle fetches
//! the window's extreme point, deletes it when it crosses the threshold, then
//! sleeps for the configured delay. A run ends when the extreme no longer
//! crosses the threshold, when a gateway call fails, or when a stop request
//! is observed at the top of a cycle or after the delay. Calls already in
//! flight are never interrupted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::events::{EngineEvent, EventLevel, RunEvent, RunOutcome, RunSnapshot, RunStatus};
use crate::gateway::DataGateway;
use crate::request::{DeletionRequest, ExtremePoint, RawFields};
use crate::validate::{validate, ValidationErrors};

const EVENT_CHANNEL_CAPACITY: usize = 256;

// ------------------------------------------------------------------ //
//  Errors                                                             //
// ------------------------------------------------------------------ //

#[derive(Debug, Error)]
pub enum StartError {
    #[error("invalid input: {0}")]
    Invalid(#[from] ValidationErrors),
    #[error("a deletion run is already active")]
    AlreadyRunning,
}

// ------------------------------------------------------------------ //
//  Engine                                                             //
// ------------------------------------------------------------------ //

/// Owns the single-run guard and the event/snapshot channels.
pub struct DeletionEngine {
    gateway: Arc<dyn DataGateway>,
    events: broadcast::Sender<RunEvent>,
    snapshots: Arc<watch::Sender<RunSnapshot>>,
    active: Arc<AtomicBool>,
    cancel: Mutex<Option<CancellationToken>>,
}

/// Handle to a started run.
pub struct RunHandle {
    pub run_id: Uuid,
    join: JoinHandle<RunOutcome>,
}

impl RunHandle {
    /// Wait for the run to reach a terminal state.
    pub async fn outcome(self) -> Result<RunOutcome, JoinError> {
        self.join.await
    }
}

impl DeletionEngine {
    pub fn new(gateway: Arc<dyn DataGateway>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (snapshots, _) = watch::channel(RunSnapshot::idle());
        Self {
            gateway,
            events,
            snapshots: Arc::new(snapshots),
            active: Arc::new(AtomicBool::new(false)),
            cancel: Mutex::new(None),
        }
    }

    /// Validate operator input and start a run.
    pub fn start(&self, raw: &RawFields) -> Result<RunHandle, StartError> {
        let request = validate(raw).inspect_err(|e| {
            warn!(error = %e, "rejected run input");
        })?;
        self.start_request(request)
    }

    /// Start a run from an already validated request.
    pub fn start_request(&self, request: DeletionRequest) -> Result<RunHandle, StartError> {
        let token = CancellationToken::new();
        {
            // `stop` reads `active` under this lock, so it never sees the new
            // run paired with the previous token.
            let mut slot = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
            if self
                .active
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                warn!("start refused: run already active");
                return Err(StartError::AlreadyRunning);
            }
            *slot = Some(token.clone());
        }

        let run_id = Uuid::new_v4();
        let worker = Worker {
            run_id,
            request,
            gateway: Arc::clone(&self.gateway),
            events: self.events.clone(),
            snapshots: Arc::clone(&self.snapshots),
            cancel: token,
            state: RunState::default(),
            started_at: Utc::now(),
        };
        let active = Arc::clone(&self.active);

        info!(%run_id, "deletion run starting");
        let join = tokio::spawn(async move {
            let mut worker = worker;
            let outcome = worker.run().await;
            worker.finish(&outcome);
            active.store(false, Ordering::SeqCst);
            outcome
        });

        Ok(RunHandle { run_id, join })
    }

    /// Request cooperative cancellation of the active run.
    ///
    /// Returns `false` when no run is active. Repeated calls are harmless.
    pub fn stop(&self) -> bool {
        let guard = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.active.load(Ordering::SeqCst) {
            return false;
        }
        match guard.as_ref() {
            Some(token) => {
                if !token.is_cancelled() {
                    info!("stop requested");
                }
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Subscribe to progress events and final outcomes of future runs.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    pub fn watch_snapshots(&self) -> watch::Receiver<RunSnapshot> {
        self.snapshots.subscribe()
    }

    /// Current run state. A running run with a pending stop reports `Stopping`.
    pub fn snapshot(&self) -> RunSnapshot {
        let mut snap = self.snapshots.borrow().clone();
        if snap.status == RunStatus::Running && self.stop_pending() {
            snap.status = RunStatus::Stopping;
        }
        snap
    }

    fn stop_pending(&self) -> bool {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

// ------------------------------------------------------------------ //
//  Worker                                                             //
// ------------------------------------------------------------------ //

#[derive(Debug, Default)]
struct RunState {
    status: Option<RunStatus>,
    deleted_count: u64,
    last_point: Option<ExtremePoint>,
    error: Option<String>,
}

struct Worker {
    run_id: Uuid,
    request: DeletionRequest,
    gateway: Arc<dyn DataGateway>,
    events: broadcast::Sender<RunEvent>,
    snapshots: Arc<watch::Sender<RunSnapshot>>,
    cancel: CancellationToken,
    state: RunState,
    started_at: DateTime<Utc>,
}

impl Worker {
    async fn run(&mut self) -> RunOutcome {
        self.set_status(RunStatus::Running);

        self.emit(EventLevel::Info, "Starting deletion run".to_string());
        self.emit(EventLevel::Info, format!("Using URL: {}", self.request.fetch_url()));
        self.emit(EventLevel::Info, format!("Threshold: {}", self.request.threshold));
        self.emit(
            EventLevel::Info,
            format!("Inter-cycle delay: {}ms", self.request.inter_cycle_delay.as_millis()),
        );

        let status = self.cycle_until_done().await;
        self.set_status(status);

        self.emit(
            EventLevel::Info,
            format!("Total points deleted: {}", self.state.deleted_count),
        );

        RunOutcome {
            run_id: self.run_id,
            status,
            deleted_count: self.state.deleted_count,
            last_point: self.state.last_point,
            error: self.state.error.clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }

    async fn cycle_until_done(&mut self) -> RunStatus {
        loop {
            if self.cancel.is_cancelled() {
                self.emit(EventLevel::Warning, "Run stopped by operator".to_string());
                return RunStatus::Stopped;
            }

            let point = match self.gateway.fetch_extreme(&self.request).await {
                Ok(p) => p,
                Err(e) => {
                    self.emit(EventLevel::Error, format!("Fetching extreme failed: {e}"));
                    self.state.error = Some(e.to_string());
                    return RunStatus::Failed;
                }
            };
            self.state.last_point = Some(point);
            self.publish();

            self.emit(
                EventLevel::Info,
                format!(
                    "Current extreme: {} at {}, threshold: {}",
                    point.value, point.timestamp_ms, self.request.threshold
                ),
            );

            if !self.request.threshold.is_exceeded_by(point.value) {
                self.emit(
                    EventLevel::Info,
                    "No values beyond the threshold remain; run complete".to_string(),
                );
                return RunStatus::Completed;
            }

            self.emit(
                EventLevel::Warning,
                format!("Value beyond threshold: [{}, {}]", point.timestamp_ms, point.value),
            );

            if let Err(e) = self.gateway.delete_at(&self.request, point.timestamp_ms).await {
                self.emit(
                    EventLevel::Error,
                    format!("Deleting point {} failed: {e}; aborting run", point.timestamp_ms),
                );
                self.state.error = Some(e.to_string());
                return RunStatus::Failed;
            }

            self.state.deleted_count += 1;
            self.publish();
            self.emit(
                EventLevel::Success,
                format!("Deleted point at {}", point.timestamp_ms),
            );

            tokio::select! {
                _ = self.cancel.cancelled() => {}
                _ = tokio::time::sleep(self.request.inter_cycle_delay) => {}
            }
        }
    }

    fn set_status(&mut self, status: RunStatus) {
        self.state.status = Some(status);
        self.publish();
    }

    fn publish(&self) {
        self.snapshots.send_replace(RunSnapshot {
            run_id: Some(self.run_id),
            status: self.state.status.unwrap_or(RunStatus::Idle),
            deleted_count: self.state.deleted_count,
            last_point: self.state.last_point,
        });
    }

    fn emit(&self, level: EventLevel, message: String) {
        let run_id = self.run_id;
        match level {
            EventLevel::Info => info!(%run_id, "{message}"),
            EventLevel::Success => info!(%run_id, outcome = "success", "{message}"),
            EventLevel::Warning => warn!(%run_id, "{message}"),
            EventLevel::Error => error!(%run_id, "{message}"),
        }
        // No subscribers is fine.
        let _ = self.events.send(RunEvent::Log(EngineEvent {
            run_id,
            level,
            message,
            timestamp: Utc::now(),
        }));
    }

    fn finish(&self, outcome: &RunOutcome) {
        info!(
            run_id = %outcome.run_id,
            status = %outcome.status,
            deleted = outcome.deleted_count,
            "deletion run finished"
        );
        let _ = self.events.send(RunEvent::Finished(outcome.clone()));
    }
}

// ------------------------------------------------------------------ //
//  Tests                                                              //
// ------------------------------------------------------------------ //
