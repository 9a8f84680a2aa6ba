//! HTTP request/response models for the coordinator's REST API.
//!
//! Run input is accepted as [`deletion_engine::RawFields`] unchanged.

use deletion_engine::{RunStatus, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_EVENT_LIMIT: usize = 100;

// ------------------------------------------------------------------ //
//  Inbound (client → coordinator)                                     //
// ------------------------------------------------------------------ //

/// Query string for `GET /runs/events`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_EVENT_LIMIT
}

// ------------------------------------------------------------------ //
//  Outbound (coordinator → client)                                    //
// ------------------------------------------------------------------ //

/// Response for an accepted `POST /runs`.
#[derive(Debug, Serialize)]
pub struct RunStarted {
    pub run_id: Uuid,
    pub status: RunStatus,
}

/// Response for a rejected `POST /runs`.
#[derive(Debug, Serialize)]
pub struct InvalidInput {
    pub errors: Vec<ValidationError>,
}

/// Response for `POST /runs/stop`.
#[derive(Debug, Serialize)]
pub struct StopResult {
    /// Whether a run was active and has been asked to stop.
    pub stopping: bool,
}
