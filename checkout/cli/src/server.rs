//! HTTP endpoint for checkout reports.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use checkout_lib::{CheckoutError, CheckoutRecorder, CheckoutReport, SinkHandle, TransactionLog};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared state for request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    recorder: CheckoutRecorder,
    sink: SinkHandle,
}

impl AppState {
    pub fn new(log: Arc<TransactionLog>, sink: SinkHandle) -> Self {
        Self {
            recorder: CheckoutRecorder::new(log),
            sink,
        }
    }
}

/// Errors returned to HTTP clients as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{}", describe_rejection(.0))]
    BadJson(#[from] JsonRejection),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),
}

fn describe_rejection(rejection: &JsonRejection) -> String {
    match rejection {
        JsonRejection::JsonDataError(e) => format!("Missing or invalid field: {}", e.body_text()),
        other => format!("Request must be JSON: {}", other.body_text()),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadJson(_) => StatusCode::BAD_REQUEST,
            Self::Checkout(CheckoutError::InvalidTimestamp { .. }) => StatusCode::BAD_REQUEST,
            Self::Checkout(CheckoutError::Lock) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WriteResponse {
    status: &'static str,
    position: usize,
    queue_length: u64,
    wait_duration_seconds: i64,
}

/// Builds the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/write", post(write_checkout))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Records a checkout, queues its row for the sink, and answers with the
/// estimate. The sink write happens in the background.
async fn write_checkout(
    State(state): State<AppState>,
    payload: Result<Json<CheckoutReport>, JsonRejection>,
) -> Result<Json<WriteResponse>, ApiError> {
    let Json(report) = payload?;

    let (completion, row) = state
        .recorder
        .record_report(&report)
        .inspect_err(|e| warn!(terminal = %report.terminal_id, error = %e, "rejected checkout"))?;

    if !state.sink.submit(row) {
        warn!(
            terminal = %report.terminal_id,
            position = completion.position,
            "row not queued for sink"
        );
    }

    info!(
        terminal = %report.terminal_id,
        position = completion.position,
        queue_length = completion.queue_length,
        wait_duration_seconds = completion.wait_duration_seconds,
        "checkout recorded"
    );

    Ok(Json(WriteResponse {
        status: "success",
        position: completion.position,
        queue_length: completion.queue_length,
        wait_duration_seconds: completion.wait_duration_seconds,
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn stats(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let transactions = state.recorder.log().len()?;
    Ok(Json(json!({ "transactions": transactions })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use checkout_lib::{MemorySink, SheetRow, SinkWorker};
    use serde_json::Value;
    use tokio::task::JoinHandle;
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        log: Arc<TransactionLog>,
        sink: MemorySink,
        worker: JoinHandle<usize>,
    }

    fn harness() -> Harness {
        let log = Arc::new(TransactionLog::new());
        let sink = MemorySink::new();
        let (handle, worker) = SinkWorker::spawn(sink.clone(), 64);
        let app = router(AppState::new(Arc::clone(&log), handle));
        Harness {
            app,
            log,
            sink,
            worker,
        }
    }

    impl Harness {
        /// Drops the router (and its sink handle) and waits for the worker.
        async fn finish(self) -> Vec<SheetRow> {
            drop(self.app);
            self.worker.await.unwrap();
            self.sink.rows()
        }
    }

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/write")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn checkout(terminal: &str, start: &str, end: &str) -> String {
        json!({
            "terminalId": terminal,
            "startTime": format!("2024-05-01T{start}"),
            "endTime": format!("2024-05-01T{end}"),
            "endStatus": "completed",
            "totalItems": 5,
        })
        .to_string()
    }

    #[tokio::test]
    async fn write_returns_estimate_and_queues_row() {
        let h = harness();

        let (status, body) = send(&h.app, post_json(&checkout("till-1", "10:00:00", "10:00:30"))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["position"], 1);
        assert_eq!(body["queueLength"], 0);
        assert_eq!(body["waitDurationSeconds"], 30);

        let rows = h.finish().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].terminal_id, "till-1");
        assert_eq!(rows[0].end_status.as_deref(), Some("completed"));
        assert_eq!(rows[0].total_items, Some(5));
    }

    #[tokio::test]
    async fn write_estimates_out_of_order_history() {
        let h = harness();

        for end in ["10:00:10", "10:00:20", "10:00:05"] {
            let (status, _) = send(&h.app, post_json(&checkout("till-1", "10:00:00", end))).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (_, body) = send(&h.app, post_json(&checkout("till-2", "10:00:15", "10:00:50"))).await;

        assert_eq!(body["position"], 4);
        assert_eq!(body["queueLength"], 1);
    }

    #[tokio::test]
    async fn write_accepts_numeric_terminal_id() {
        let h = harness();
        let body = r#"{"terminalId": 3, "startTime": "2024-05-01 10:00:00", "endTime": "2024-05-01 10:00:09"}"#;

        let (status, _) = send(&h.app, post_json(body)).await;
        assert_eq!(status, StatusCode::OK);

        let rows = h.finish().await;
        assert_eq!(rows[0].terminal_id, "3");
        assert_eq!(rows[0].end_status, None);
    }

    #[tokio::test]
    async fn write_rejects_non_json_body() {
        let h = harness();
        let request = Request::builder()
            .method("POST")
            .uri("/write")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("terminal=1"))
            .unwrap();

        let (status, body) = send(&h.app, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Request must be JSON"));
        assert!(h.log.is_empty().unwrap());
    }

    #[tokio::test]
    async fn write_rejects_missing_fields() {
        let h = harness();

        let (status, body) = send(&h.app, post_json(r#"{"terminalId": "till-1"}"#)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error = body["error"].as_str().unwrap();
        assert!(error.starts_with("Missing or invalid field"));
        assert!(error.contains("startTime"));
        assert!(h.log.is_empty().unwrap());
    }

    #[tokio::test]
    async fn write_rejects_json_syntax_errors() {
        let h = harness();

        let (status, body) = send(&h.app, post_json(r#"{"terminalId": "#)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Request must be JSON"));
        assert!(h.log.is_empty().unwrap());
    }

    #[tokio::test]
    async fn write_rejects_malformed_timestamp_without_appending() {
        let h = harness();

        let body = json!({
            "terminalId": "till-1",
            "startTime": "half past ten",
            "endTime": "2024-05-01T10:00:30",
        })
        .to_string();
        let (status, body) = send(&h.app, post_json(&body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("startTime"));
        assert!(h.log.is_empty().unwrap());
        assert!(h.finish().await.is_empty());
    }

    #[tokio::test]
    async fn write_reports_negative_duration() {
        let h = harness();

        let (status, body) = send(&h.app, post_json(&checkout("till-1", "10:00:30", "10:00:00"))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["waitDurationSeconds"], -30);
    }

    #[tokio::test]
    async fn health_and_stats() {
        let h = harness();
        send(&h.app, post_json(&checkout("till-1", "10:00:00", "10:00:30"))).await;

        let health = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(&h.app, health).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let stats = Request::builder().uri("/stats").body(Body::empty()).unwrap();
        let (status, body) = send(&h.app, stats).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["transactions"], 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_get_gapless_positions() {
        let h = harness();

        let tasks: Vec<_> = (0..50)
            .map(|i| {
                let app = h.app.clone();
                tokio::spawn(async move {
                    let body = checkout(&format!("till-{i}"), "10:00:00", "10:00:30");
                    let (_, body) = send(&app, post_json(&body)).await;
                    body["position"].as_u64().unwrap()
                })
            })
            .collect();

        let mut positions = Vec::new();
        for task in tasks {
            positions.push(task.await.unwrap());
        }
        positions.sort_unstable();

        assert_eq!(positions, (1..=50).collect::<Vec<u64>>());
        assert_eq!(h.finish().await.len(), 50);
    }
}
