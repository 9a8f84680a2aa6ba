//! DataGateway trait and implementations.
//!
//! The gateway fetches the current extreme point of a window and deletes a
//! single point by timestamp. Both calls are issued against the middleware's
//! `/data/<uuid>.json` resource.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::request::{DeletionRequest, ExtremePoint};

// ------------------------------------------------------------------ //
//  Errors                                                             //
// ------------------------------------------------------------------ //

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Transport-level failure: connect, DNS, timeout, reset.
    #[error("server unreachable: {0}")]
    Unreachable(String),
    /// A response arrived but did not carry the expected data.
    #[error("invalid or missing data: {0}")]
    MalformedOrAbsent(String),
    /// The delete request was answered with a non-success status.
    #[error("delete rejected: HTTP {status}")]
    Rejected { status: u16 },
}

// ------------------------------------------------------------------ //
//  Trait                                                              //
// ------------------------------------------------------------------ //

/// Remote time-series operations used by the deletion loop.
#[async_trait]
pub trait DataGateway: Send + Sync {
    /// Current extreme point within the request's window.
    async fn fetch_extreme(&self, request: &DeletionRequest)
        -> Result<ExtremePoint, GatewayError>;

    /// Delete the point stored at exactly `timestamp_ms`.
    async fn delete_at(&self, request: &DeletionRequest, timestamp_ms: i64)
        -> Result<(), GatewayError>;
}

// ------------------------------------------------------------------ //
//  Response parsing                                                   //
// ------------------------------------------------------------------ //

/// Extract `data.max = [timestamp, value]` from a fetch response body.
///
/// The value may be a JSON number or a numeric string.
pub fn parse_extreme(body: &Value) -> Result<ExtremePoint, GatewayError> {
    let max = body
        .get("data")
        .and_then(|d| d.get("max"))
        .ok_or_else(|| GatewayError::MalformedOrAbsent("response has no data.max".into()))?;

    let pair = match max.as_array() {
        Some(items) if items.len() >= 2 => items,
        _ => {
            return Err(GatewayError::MalformedOrAbsent(format!(
                "data.max is not a [timestamp, value] pair: {max}"
            )))
        }
    };

    let timestamp_ms = pair[0]
        .as_i64()
        .or_else(|| pair[0].as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
        .ok_or_else(|| {
            GatewayError::MalformedOrAbsent(format!("invalid timestamp in data.max: {}", pair[0]))
        })?;

    let value = match &pair[1] {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| {
        GatewayError::MalformedOrAbsent(format!("invalid value in data.max: {}", pair[1]))
    })?;

    Ok(ExtremePoint { timestamp_ms, value })
}

// ------------------------------------------------------------------ //
//  HttpGateway (production)                                           //
// ------------------------------------------------------------------ //

/// Gateway speaking plain HTTP to the middleware via `reqwest`.
///
/// Transport timeouts are the client defaults.
#[derive(Debug, Clone, Default)]
pub struct HttpGateway {
    http: reqwest::Client,
}

impl HttpGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl DataGateway for HttpGateway {
    async fn fetch_extreme(
        &self,
        request: &DeletionRequest,
    ) -> Result<ExtremePoint, GatewayError> {
        let url = request.fetch_url();
        debug!(%url, "fetching extreme");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(GatewayError::MalformedOrAbsent(format!(
                "fetch returned HTTP {}",
                status.as_u16()
            )));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| GatewayError::MalformedOrAbsent(format!("unreadable body: {e}")))?;

        parse_extreme(&body)
    }

    async fn delete_at(
        &self,
        request: &DeletionRequest,
        timestamp_ms: i64,
    ) -> Result<(), GatewayError> {
        let url = request.delete_url(timestamp_ms);
        debug!(%url, "deleting point");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(GatewayError::Rejected { status: status.as_u16() });
        }
        Ok(())
    }
}

// ------------------------------------------------------------------ //
//  FakeGateway (for tests)                                            //
// ------------------------------------------------------------------ //

/// Scripted in-memory gateway.
///
/// Fetches pop from a queue and fail once it is exhausted. Deletes pop from
/// their own queue and succeed once it is exhausted. When a delete gate is
/// installed every delete waits for a permit before answering.
#[derive(Debug, Default, Clone)]
pub struct FakeGateway {
    fetches: Arc<Mutex<VecDeque<Result<ExtremePoint, GatewayError>>>>,
    deletes: Arc<Mutex<VecDeque<Result<(), GatewayError>>>>,
    deleted: Arc<Mutex<Vec<i64>>>,
    fetch_calls: Arc<AtomicUsize>,
    delete_calls: Arc<AtomicUsize>,
    delete_gate: Option<Arc<Semaphore>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful fetch result.
    pub fn push_point(self, timestamp_ms: i64, value: f64) -> Self {
        self.push_fetch(Ok(ExtremePoint { timestamp_ms, value }))
    }

    pub fn push_fetch(self, result: Result<ExtremePoint, GatewayError>) -> Self {
        self.fetches.lock().unwrap().push_back(result);
        self
    }

    pub fn push_delete(self, result: Result<(), GatewayError>) -> Self {
        self.deletes.lock().unwrap().push_back(result);
        self
    }

    /// Make deletes block until a permit is added to `gate`.
    pub fn with_delete_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.delete_gate = Some(gate);
        self
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Timestamps successfully deleted, in order.
    pub fn deleted(&self) -> Vec<i64> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl DataGateway for FakeGateway {
    async fn fetch_extreme(&self, _: &DeletionRequest) -> Result<ExtremePoint, GatewayError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::MalformedOrAbsent("no scripted fetch".into())))
    }

    async fn delete_at(&self, _: &DeletionRequest, timestamp_ms: i64) -> Result<(), GatewayError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.delete_gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        let result = self.deletes.lock().unwrap().pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            self.deleted.lock().unwrap().push(timestamp_ms);
        }
        result
    }
}

// ------------------------------------------------------------------ //
//  Tests                                                              //
// ------------------------------------------------------------------ //

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use axum::{
        extract::{Path, Query, State},
        http::StatusCode,
        routing::get,
        Json, Router,
    };
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::request::DatasetId;
    use crate::threshold::{Sign, Threshold};

    const DATASET: &str = "550e8400-e29b-41d4-a716-446655440000";

    type Seen = Arc<Mutex<Vec<(String, HashMap<String, String>)>>>;

    /// Stand-in middleware answering every `/data/:file` call with a fixed
    /// status and body, recording the path segment and query it received.
    #[derive(Clone)]
    struct Middleware {
        status: StatusCode,
        body: Value,
        seen: Seen,
    }

    async fn data(
        State(mw): State<Middleware>,
        Path(file): Path<String>,
        Query(query): Query<HashMap<String, String>>,
    ) -> (StatusCode, Json<Value>) {
        mw.seen.lock().unwrap().push((file, query));
        (mw.status, Json(mw.body.clone()))
    }

    async fn spawn_middleware(status: StatusCode, body: Value) -> (String, Seen) {
        let seen: Seen = Arc::default();
        let app = Router::new()
            .route("/data/:file", get(data))
            .with_state(Middleware { status, body, seen: Arc::clone(&seen) });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr.to_string(), seen)
    }

    fn request_for(server: &str) -> DeletionRequest {
        DeletionRequest {
            server: server.to_string(),
            dataset_id: DatasetId::new(Uuid::parse_str(DATASET).unwrap(), DATASET),
            window_start: 1_746_057_600_000,
            window_end: 1_746_144_000_000,
            threshold: Threshold::from_magnitude("100.00", Sign::Plus).unwrap(),
            inter_cycle_delay: Duration::from_millis(200),
        }
    }

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[tokio::test]
    async fn http_fetch_sends_window_and_parses_extreme() {
        let body = json!({"version": "0.3", "data": {"max": [1_746_100_000_000_i64, 150.5]}});
        let (server, seen) = spawn_middleware(StatusCode::OK, body).await;

        let point = HttpGateway::new().fetch_extreme(&request_for(&server)).await.unwrap();

        assert_eq!(point, ExtremePoint { timestamp_ms: 1_746_100_000_000, value: 150.5 });
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, format!("{DATASET}.json"));
        assert_eq!(
            seen[0].1,
            query(&[("from", "1746057600000"), ("to", "1746144000000")])
        );
    }

    #[tokio::test]
    async fn http_fetch_error_status_is_malformed_with_status() {
        let (server, _) = spawn_middleware(StatusCode::INTERNAL_SERVER_ERROR, json!({})).await;

        let err = HttpGateway::new().fetch_extreme(&request_for(&server)).await.unwrap_err();

        match err {
            GatewayError::MalformedOrAbsent(msg) => assert!(msg.contains("500"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_fetch_without_data_is_malformed() {
        let (server, _) = spawn_middleware(StatusCode::OK, json!({"version": "0.3"})).await;

        let err = HttpGateway::new().fetch_extreme(&request_for(&server)).await.unwrap_err();

        assert!(matches!(err, GatewayError::MalformedOrAbsent(_)), "{err:?}");
    }

    #[tokio::test]
    async fn http_delete_sends_operation_and_timestamp() {
        let (server, seen) = spawn_middleware(StatusCode::OK, json!({"rows": 1})).await;

        HttpGateway::new()
            .delete_at(&request_for(&server), 1_746_100_000_000)
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, format!("{DATASET}.json"));
        assert_eq!(
            seen[0].1,
            query(&[("operation", "delete"), ("ts", "1746100000000")])
        );
    }

    #[tokio::test]
    async fn http_delete_error_status_is_rejected() {
        let (server, _) = spawn_middleware(StatusCode::INTERNAL_SERVER_ERROR, json!({})).await;

        let err = HttpGateway::new()
            .delete_at(&request_for(&server), 1)
            .await
            .unwrap_err();

        assert_eq!(err, GatewayError::Rejected { status: 500 });
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = listener.local_addr().unwrap().to_string();
        drop(listener);

        let gw = HttpGateway::new();
        let fetch = gw.fetch_extreme(&request_for(&server)).await.unwrap_err();
        let delete = gw.delete_at(&request_for(&server), 1).await.unwrap_err();

        assert!(matches!(fetch, GatewayError::Unreachable(_)), "{fetch:?}");
        assert!(matches!(delete, GatewayError::Unreachable(_)), "{delete:?}");
    }

    #[test]
    fn parses_numeric_pair() {
        let p = parse_extreme(&json!({"data": {"max": [1714600000000_i64, 31250.5]}})).unwrap();
        assert_eq!(p, ExtremePoint { timestamp_ms: 1_714_600_000_000, value: 31250.5 });
    }

    #[test]
    fn parses_string_value_and_float_timestamp() {
        let p = parse_extreme(&json!({"data": {"max": [1714600000000.0, "-6000.25"]}})).unwrap();
        assert_eq!(p.timestamp_ms, 1_714_600_000_000);
        assert_eq!(p.value, -6000.25);
    }

    #[test]
    fn tolerates_extra_fields_and_elements() {
        let body = json!({
            "version": "0.3",
            "data": {"uuid": "x", "min": [1, 0.0], "max": [5, 9.0, 1], "tuples": []}
        });
        assert_eq!(parse_extreme(&body).unwrap().value, 9.0);
    }

    #[test]
    fn missing_data_is_malformed() {
        assert!(matches!(
            parse_extreme(&json!({"version": "0.3"})),
            Err(GatewayError::MalformedOrAbsent(_))
        ));
        assert!(matches!(
            parse_extreme(&json!({"data": {"min": [1, 2]}})),
            Err(GatewayError::MalformedOrAbsent(_))
        ));
    }

    #[test]
    fn bad_pair_is_malformed() {
        for body in [
            json!({"data": {"max": null}}),
            json!({"data": {"max": [1]}}),
            json!({"data": {"max": ["soon", 1.0]}}),
            json!({"data": {"max": [1.5, 1.0]}}),
            json!({"data": {"max": [1, "high"]}}),
            json!({"data": {"max": [1, null]}}),
        ] {
            assert!(
                matches!(parse_extreme(&body), Err(GatewayError::MalformedOrAbsent(_))),
                "{body} should be malformed"
            );
        }
    }

    #[test]
    fn error_messages_name_the_cause() {
        assert_eq!(
            GatewayError::Rejected { status: 503 }.to_string(),
            "delete rejected: HTTP 503"
        );
        assert!(GatewayError::Unreachable("connection refused".into())
            .to_string()
            .contains("connection refused"));
    }
}
