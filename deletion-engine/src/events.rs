//! Run status, progress events and outcomes published by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::request::ExtremePoint;

// ------------------------------------------------------------------ //
//  Status                                                             //
// ------------------------------------------------------------------ //

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Idle,
    Running,
    /// Stop requested; the in-flight call is still completing.
    Stopping,
    Completed,
    Failed,
    Stopped,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Idle      => "idle",
            RunStatus::Running   => "running",
            RunStatus::Stopping  => "stopping",
            RunStatus::Completed => "completed",
            RunStatus::Failed    => "failed",
            RunStatus::Stopped   => "stopped",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ------------------------------------------------------------------ //
//  Events                                                             //
// ------------------------------------------------------------------ //

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Info,
    Warning,
    Error,
    Success,
}

/// One human-readable progress line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEvent {
    pub run_id: Uuid,
    pub level: EventLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Final report of a run. Emitted exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub deleted_count: u64,
    pub last_point: Option<ExtremePoint>,
    /// Cause of a `Failed` run.
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunEvent {
    Log(EngineEvent),
    Finished(RunOutcome),
}

// ------------------------------------------------------------------ //
//  Snapshots                                                          //
// ------------------------------------------------------------------ //

/// Read-only view of the engine's run state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: Option<Uuid>,
    pub status: RunStatus,
    pub deleted_count: u64,
    pub last_point: Option<ExtremePoint>,
}

impl RunSnapshot {
    pub fn idle() -> Self {
        Self {
            run_id: None,
            status: RunStatus::Idle,
            deleted_count: 0,
            last_point: None,
        }
    }
}

impl Default for RunSnapshot {
    fn default() -> Self {
        Self::idle()
    }
}
