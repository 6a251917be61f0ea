// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP ingress: the point-of-sale front end posts receipts here.
//
// `POST /print` only queues; delivery happens on a background drain pass so
// the till never waits on the printer.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use quittung_core::error::QuittungError;
use quittung_print::{PrinterMonitor, QueueEngine};

use super::validator::validate_print_data;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<QueueEngine>,
    pub monitor: Arc<PrinterMonitor>,
    /// Reject malformed requests instead of queueing them.
    pub validate: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/print", post(print))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn print(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(mut payload) = body.map_err(|rejection| {
        warn!(error = %rejection, "rejected print request body");
        ApiError::bad_request(rejection.body_text())
    })?;

    if state.validate {
        validate_print_data(&mut payload)?;
    }

    let job_id = state.engine.enqueue(payload);
    info!(job_id = %job_id, queue_length = state.engine.queue_length(), "received print job");

    // The job is already queued in memory; a failed write is retried by the
    // next checkpoint.
    if let Err(e) = state.engine.persist().await {
        error!(error = %e, "failed to persist queue after enqueue");
    }

    let engine = Arc::clone(&state.engine);
    tokio::spawn(async move {
        engine.drain().await;
    });

    Ok(Json(json!({ "status": "Print job enqueued" })))
}

async fn healthz(State(state): State<AppState>) -> Json<Value> {
    let printer = state.monitor.check().await;
    Json(json!({
        "status": "OK",
        "printer": printer,
        "queueLength": state.engine.queue_length(),
    }))
}

/// An error rendered as `{"error": message}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<QuittungError> for ApiError {
    fn from(err: QuittungError) -> Self {
        match err {
            QuittungError::Validation(message) => {
                warn!(error = %message, "print request failed validation");
                Self::bad_request(message)
            }
            other => {
                error!(error = %other, "unhandled error");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "Internal server error".into(),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, header};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use quittung_core::error::Result;
    use quittung_core::types::PrintJob;
    use quittung_print::store::MemoryStore;
    use quittung_print::{DeliveryPort, PrinterInterface, RetryConfig};

    #[derive(Default)]
    struct RecordingPort {
        printed: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl DeliveryPort for RecordingPort {
        async fn attempt_delivery(&self, job: &PrintJob) -> Result<()> {
            self.printed.lock().unwrap().push(job.payload.clone());
            Ok(())
        }
    }

    struct Harness {
        state: AppState,
        port: Arc<RecordingPort>,
        store: Arc<MemoryStore>,
    }

    fn harness(validate: bool) -> Harness {
        let port = Arc::new(RecordingPort::default());
        let store = Arc::new(MemoryStore::new());
        let retry = RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        };
        let engine = Arc::new(QueueEngine::new(port.clone(), store.clone(), retry));
        let monitor = Arc::new(PrinterMonitor::new(
            PrinterInterface::Spooler { name: "Receipts".into() },
            Duration::from_secs(1),
        ));
        Harness {
            state: AppState { engine, monitor, validate },
            port,
            store,
        }
    }

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/print")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn print_enqueues_persists_and_drains() {
        let h = harness(false);
        let response = router(h.state.clone())
            .oneshot(post_json(r#"{"customerName":"Ayesha","totalAmount":12}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "status": "Print job enqueued" }));
        assert!(h.store.save_count() >= 1);

        for _ in 0..200 {
            if !h.port.printed.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let printed = h.port.printed.lock().unwrap().clone();
        assert_eq!(printed, vec![json!({ "customerName": "Ayesha", "totalAmount": 12 })]);
    }

    #[tokio::test]
    async fn malformed_json_is_rejected() {
        let h = harness(false);
        let response = router(h.state.clone())
            .oneshot(post_json("{not json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());
        assert_eq!(h.state.engine.queue_length(), 0);
        assert_eq!(h.store.save_count(), 0);
    }

    #[tokio::test]
    async fn validation_failure_is_reported_and_not_queued() {
        let h = harness(true);
        let response = router(h.state.clone())
            .oneshot(post_json(r#"{"items":[]}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await, json!({ "error": "No items provided" }));
        assert_eq!(h.store.save_count(), 0);
        assert!(h.port.printed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn validated_payload_carries_computed_total() {
        let h = harness(true);
        let response = router(h.state.clone())
            .oneshot(post_json(r#"{"items":[{"name":"Tea","price":"2.5"}]}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let saved = h.store.saved_queue().unwrap_or_default();
        let printed = h.port.printed.lock().unwrap().clone();
        let payload = saved
            .first()
            .map(|job| job.payload.clone())
            .or_else(|| printed.first().cloned())
            .expect("job was saved or printed");
        assert_eq!(payload["computedTotal"], json!(2.5));
        assert_eq!(payload["items"][0]["price"], json!(2.5));
    }

    #[tokio::test]
    async fn healthz_reports_printer_and_queue() {
        let h = harness(false);
        h.state.engine.enqueue(json!({ "customerName": "queued" }));

        let response = router(h.state.clone())
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "status": "OK", "printer": "spooler", "queueLength": 1 })
        );
    }

    #[test]
    fn internal_errors_are_opaque() {
        let response = ApiError::from(QuittungError::Store("disk full".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
