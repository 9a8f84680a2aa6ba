//! Run request types: raw operator input and the validated request.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::threshold::Threshold;

pub const DEFAULT_SIGN: &str = "+";
pub const DEFAULT_DELAY_MS: &str = "1000";

// ------------------------------------------------------------------ //
//  Raw input                                                          //
// ------------------------------------------------------------------ //

/// Operator input exactly as typed; validated by [`crate::validate::validate`].
///
/// Missing text fields deserialize as empty so the validator names them.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RawFields {
    pub server: String,
    pub dataset_id: String,
    pub window_start: String,
    pub window_end: String,
    pub threshold: String,
    #[serde(default = "default_sign")]
    pub threshold_sign: String,
    #[serde(default = "default_delay")]
    pub delay_ms: String,
}

fn default_sign() -> String {
    DEFAULT_SIGN.to_string()
}

fn default_delay() -> String {
    DEFAULT_DELAY_MS.to_string()
}

// ------------------------------------------------------------------ //
//  Validated request                                                  //
// ------------------------------------------------------------------ //

/// Dataset identifier: the parsed UUID plus the text the operator entered.
///
/// The entered text is what goes on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetId {
    pub uuid: Uuid,
    text: String,
}

impl DatasetId {
    pub(crate) fn new(uuid: Uuid, text: &str) -> Self {
        Self { uuid, text: text.to_string() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl std::fmt::Display for DatasetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// An immutable, fully validated deletion run request.
#[derive(Debug, Clone, PartialEq)]
pub struct DeletionRequest {
    /// Host (optionally with port) without scheme or trailing slash.
    pub server: String,
    pub dataset_id: DatasetId,
    /// Window start, Unix milliseconds.
    pub window_start: i64,
    /// Window end, Unix milliseconds.
    pub window_end: i64,
    pub threshold: Threshold,
    pub inter_cycle_delay: Duration,
}

impl DeletionRequest {
    /// `http://{server}/data/{uuid}.json`
    pub fn resource_url(&self) -> String {
        format!("http://{}/data/{}.json", self.server, self.dataset_id)
    }

    /// URL returning the current extreme for the configured window.
    pub fn fetch_url(&self) -> String {
        format!(
            "{}?from={}&to={}",
            self.resource_url(),
            self.window_start,
            self.window_end
        )
    }

    /// URL deleting the single point stored at `timestamp_ms`.
    pub fn delete_url(&self, timestamp_ms: i64) -> String {
        format!("{}?operation=delete&ts={}", self.resource_url(), timestamp_ms)
    }
}

/// The extreme point reported for a window by one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtremePoint {
    pub timestamp_ms: i64,
    pub value: f64,
}

// ------------------------------------------------------------------ //
//  Tests                                                              //
// ------------------------------------------------------------------ //
