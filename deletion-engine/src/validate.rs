//! Operator input validation.
//!
//! Raw strings are parsed field by field into a [`DeletionRequest`]. Every
//! field is checked and all failures are reported together; a request is only
//! produced when nothing failed.

use std::sync::OnceLock;
use std::time::Duration;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::request::{DatasetId, DeletionRequest, RawFields};
use crate::threshold::{Sign, Threshold};

const DATE_TIME_FORMAT: &str = "%d.%m.%Y %H:%M";

// ------------------------------------------------------------------ //
//  Errors                                                             //
// ------------------------------------------------------------------ //

/// The input field a validation failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Server,
    DatasetId,
    WindowStart,
    WindowEnd,
    Threshold,
    ThresholdSign,
    DelayMs,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Server        => "server",
            Field::DatasetId     => "dataset_id",
            Field::WindowStart   => "window_start",
            Field::WindowEnd     => "window_end",
            Field::Threshold     => "threshold",
            Field::ThresholdSign => "threshold_sign",
            Field::DelayMs       => "delay_ms",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: Field,
    pub reason: &'static str,
}

/// Non-empty set of field failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", join(.0))]
pub struct ValidationErrors(pub Vec<ValidationError>);

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

const BAD_SERVER: &str =
    "invalid server address; enter an IP or domain without scheme or trailing slash";
const BAD_UUID: &str = "invalid UUID; expected xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx";
const BAD_TIME: &str = "invalid time; use dd.MM.yyyy HH:mm or a UNIX timestamp in milliseconds";
const BAD_THRESHOLD: &str = "invalid threshold; use xxx.xx or a whole number";
const BAD_SIGN: &str = "invalid threshold sign; use + or -";
const BAD_DELAY: &str = "invalid delay; use a positive number of milliseconds";

// ------------------------------------------------------------------ //
//  Patterns                                                           //
// ------------------------------------------------------------------ //

fn ipv4_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Start-anchored only: "host:port" and "host/path" suffixes pass.
    RE.get_or_init(|| {
        Regex::new(r"^[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\b").expect("static regex")
    })
}

fn domain() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]{2,6}$")
            .expect("static regex")
    })
}

fn uuid_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
        )
        .expect("static regex")
    })
}

fn decimal_two_places() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]+\.[0-9]{2}$").expect("static regex"))
}

fn is_all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

// ------------------------------------------------------------------ //
//  Field parsers                                                      //
// ------------------------------------------------------------------ //

pub fn parse_server(raw: &str) -> Option<String> {
    let server = raw.trim();
    if server.is_empty() || server.ends_with('/') {
        return None;
    }
    if ipv4_prefix().is_match(server) || domain().is_match(server) {
        Some(server.to_string())
    } else {
        None
    }
}

/// Shape check followed by a parse whose canonical text must round-trip.
pub fn parse_dataset_id(raw: &str) -> Option<DatasetId> {
    let text = raw.trim();
    if !uuid_shape().is_match(text) {
        return None;
    }
    let uuid = Uuid::parse_str(text).ok()?;
    if uuid.hyphenated().to_string() != text.to_lowercase() {
        return None;
    }
    Some(DatasetId::new(uuid, text))
}

/// All-digit input is taken as milliseconds verbatim; otherwise
/// `dd.MM.yyyy HH:mm` is read as a UTC wall-clock time.
pub fn parse_timestamp(raw: &str) -> Option<i64> {
    let value = raw.trim();
    if is_all_digits(value) {
        return value.parse::<i64>().ok();
    }
    let dt = NaiveDateTime::parse_from_str(value, DATE_TIME_FORMAT).ok()?;
    dt.and_utc().timestamp().checked_mul(1000)
}

/// Normalise a threshold magnitude to two decimal places.
pub fn normalize_threshold(raw: &str) -> Option<String> {
    let value = raw.trim();
    if decimal_two_places().is_match(value) {
        Some(value.to_string())
    } else if is_all_digits(value) {
        Some(format!("{value}.00"))
    } else {
        None
    }
}

pub fn parse_delay(raw: &str) -> Option<Duration> {
    let value = raw.trim();
    if !is_all_digits(value) {
        return None;
    }
    match value.parse::<u64>() {
        Ok(ms) if ms > 0 => Some(Duration::from_millis(ms)),
        _ => None,
    }
}

// ------------------------------------------------------------------ //
//  Request validation                                                 //
// ------------------------------------------------------------------ //

/// Validate every field of `raw`, returning the request or all failures.
pub fn validate(raw: &RawFields) -> Result<DeletionRequest, ValidationErrors> {
    let mut errors = Vec::new();
    let mut check = |field: Field, reason: &'static str, ok: bool| {
        if !ok {
            errors.push(ValidationError { field, reason });
        }
    };

    let server = parse_server(&raw.server);
    check(Field::Server, BAD_SERVER, server.is_some());

    let dataset_id = parse_dataset_id(&raw.dataset_id);
    check(Field::DatasetId, BAD_UUID, dataset_id.is_some());

    let window_start = parse_timestamp(&raw.window_start);
    check(Field::WindowStart, BAD_TIME, window_start.is_some());

    let window_end = parse_timestamp(&raw.window_end);
    check(Field::WindowEnd, BAD_TIME, window_end.is_some());

    let magnitude = normalize_threshold(&raw.threshold);
    check(Field::Threshold, BAD_THRESHOLD, magnitude.is_some());

    let sign = Sign::from_selector(&raw.threshold_sign);
    check(Field::ThresholdSign, BAD_SIGN, sign.is_some());

    let delay = parse_delay(&raw.delay_ms);
    check(Field::DelayMs, BAD_DELAY, delay.is_some());

    let threshold = match (magnitude, sign) {
        (Some(m), Some(s)) => {
            let t = Threshold::from_magnitude(&m, s);
            check(Field::Threshold, BAD_THRESHOLD, t.is_some());
            t
        }
        _ => None,
    };

    match (server, dataset_id, window_start, window_end, threshold, delay) {
        (
            Some(server),
            Some(dataset_id),
            Some(window_start),
            Some(window_end),
            Some(threshold),
            Some(inter_cycle_delay),
        ) if errors.is_empty() => {
            Ok(DeletionRequest {
                server,
                dataset_id,
                window_start,
                window_end,
                threshold,
                inter_cycle_delay,
            })
        }
        _ => Err(ValidationErrors(errors)),
    }
}

// ------------------------------------------------------------------ //
//  Tests                                                              //
// ------------------------------------------------------------------ //
