//! Axum HTTP handlers for the coordinator service.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use deletion_engine::{RawFields, RunStatus, StartError};
use tracing::{info, warn};

use crate::{
    models::{EventsQuery, InvalidInput, RunStarted, StopResult},
    AppState,
};

// ------------------------------------------------------------------ //
//  Run control                                                        //
// ------------------------------------------------------------------ //

/// POST /runs
pub async fn start_run(
    State(state): State<Arc<AppState>>,
    Json(raw): Json<RawFields>,
) -> impl IntoResponse {
    match state.engine.start(&raw) {
        Ok(handle) => {
            info!(run_id = %handle.run_id, "run accepted");
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!(RunStarted {
                    run_id: handle.run_id,
                    status: RunStatus::Running,
                })),
            )
        }
        Err(StartError::Invalid(errors)) => {
            warn!(error = %errors, "run input rejected");
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!(InvalidInput { errors: errors.0 })),
            )
        }
        Err(e @ StartError::AlreadyRunning) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
    }
}

/// POST /runs/stop
pub async fn stop_run(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stopping = state.engine.stop();
    (StatusCode::OK, Json(StopResult { stopping }))
}

// ------------------------------------------------------------------ //
//  Run status                                                         //
// ------------------------------------------------------------------ //

/// GET /runs/current
pub async fn current_run(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.engine.snapshot()))
}

/// GET /runs/last
pub async fn last_run(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.events.last_outcome() {
        Some(outcome) => (StatusCode::OK, Json(serde_json::json!(outcome))),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "no run has finished yet"})),
        ),
    }
}

/// GET /runs/events?limit=N
pub async fn run_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> impl IntoResponse {
    (StatusCode::OK, Json(state.events.recent(query.limit)))
}

// ------------------------------------------------------------------ //
//  Health                                                             //
// ------------------------------------------------------------------ //

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}

// ------------------------------------------------------------------ //
//  Tests                                                              //
// ------------------------------------------------------------------ //

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::Request,
        Router,
    };
    use deletion_engine::{DeletionEngine, FakeGateway};
    use serde_json::{json, Value};
    use tokio::sync::Semaphore;
    use tower::ServiceExt;

    use super::*;
    use crate::event_log::{spawn_collector, EventLog};
    use crate::router;

    fn app(gw: FakeGateway) -> (Router, Arc<AppState>) {
        let engine = Arc::new(DeletionEngine::new(Arc::new(gw)));
        let events = Arc::new(EventLog::new(50));
        spawn_collector(engine.subscribe(), Arc::clone(&events));
        let state = Arc::new(AppState { engine, events });
        (router(Arc::clone(&state)), state)
    }

    fn run_body(threshold: &str) -> Value {
        json!({
            "server": "192.168.1.100",
            "dataset_id": "550e8400-e29b-41d4-a716-446655440000",
            "window_start": "01.05.2025 00:00",
            "window_end": "1746144000000",
            "threshold": threshold,
            "delay_ms": "200"
        })
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (app, _) = app(FakeGateway::new());
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn invalid_input_returns_field_errors() {
        let (app, state) = app(FakeGateway::new());
        let mut body = run_body("12.5");
        body["server"] = json!("example.com/");

        let (status, resp) = send(&app, "POST", "/runs", Some(body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let fields: Vec<&str> = resp["errors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["field"].as_str().unwrap())
            .collect();
        assert_eq!(fields, vec!["server", "threshold"]);
        assert!(!state.engine.is_running());
    }

    #[tokio::test]
    async fn missing_field_is_reported_by_name() {
        let (app, state) = app(FakeGateway::new());
        let mut body = run_body("100");
        body.as_object_mut().unwrap().remove("threshold");

        let (status, resp) = send(&app, "POST", "/runs", Some(body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let errors = resp["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["field"], "threshold");
        assert!(!state.engine.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn run_completes_and_is_reported() {
        let gw = FakeGateway::new().push_point(1, 150.0).push_point(2, 10.0);
        let (app, _) = app(gw.clone());

        let (status, resp) = send(&app, "POST", "/runs", Some(run_body("100"))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(resp["status"], "running");

        tokio::time::sleep(Duration::from_secs(1)).await;

        let (status, last) = send(&app, "GET", "/runs/last", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(last["status"], "completed");
        assert_eq!(last["deleted_count"], 1);
        assert_eq!(last["run_id"], resp["run_id"]);

        let (_, current) = send(&app, "GET", "/runs/current", None).await;
        assert_eq!(current["status"], "completed");

        let (_, events) = send(&app, "GET", "/runs/events?limit=1", None).await;
        let events = events.as_array().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["message"], "Total points deleted: 1");
        assert_eq!(gw.deleted(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_conflicts_and_stop_ends_run() {
        let gate = Arc::new(Semaphore::new(0));
        let gw = FakeGateway::new()
            .push_point(1, 150.0)
            .with_delete_gate(Arc::clone(&gate));
        let (app, _) = app(gw);

        let (status, _) = send(&app, "POST", "/runs", Some(run_body("100"))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let (status, _) = send(&app, "POST", "/runs", Some(run_body("100"))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, stop) = send(&app, "POST", "/runs/stop", None).await;
        assert_eq!(stop["stopping"], true);
        let (_, current) = send(&app, "GET", "/runs/current", None).await;
        assert_eq!(current["status"], "stopping");

        gate.add_permits(1);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let (_, last) = send(&app, "GET", "/runs/last", None).await;
        assert_eq!(last["status"], "stopped");
        assert_eq!(last["deleted_count"], 1);

        let (_, stop) = send(&app, "POST", "/runs/stop", None).await;
        assert_eq!(stop["stopping"], false);
    }

    #[tokio::test]
    async fn last_run_is_404_before_any_run() {
        let (app, _) = app(FakeGateway::new());
        let (status, _) = send(&app, "GET", "/runs/last", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
