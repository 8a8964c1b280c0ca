//! Webhook router.

use std::sync::Arc;

use a3s_enrich_core::error::EnrichError;
use a3s_enrich_core::event::NotificationBatch;
use a3s_enrich_runtime::Pipeline;
use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;

/// Largest notification body accepted, in bytes.
pub const DEFAULT_BODY_LIMIT: usize = 10 * 1024 * 1024;

/// State shared by every request. Read-only.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    body_limit: usize,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }
}

/// Build an `axum::Router` with all routes for the service.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", post(notifications))
        .route("/notifications", post(notifications))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Accept a notification batch and run every event through the pipeline.
///
/// Answers 200 once all events were attempted, whatever their outcome.
/// Only an unreadable body (500) or an undecodable one (400) is reported to
/// the caller.
async fn notifications(State(state): State<AppState>, body: Body) -> StatusCode {
    let bytes = match axum::body::to_bytes(body, state.body_limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let error = EnrichError::BodyReadFailed(e.to_string());
            tracing::error!(error = %error, "Failed to read notification body");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    let batch = match NotificationBatch::from_slice(&bytes) {
        Ok(batch) => batch,
        Err(error) => {
            tracing::warn!(error = %error, size = bytes.len(), "Rejected notification body");
            return StatusCode::BAD_REQUEST;
        }
    };

    tracing::debug!(events = batch.events.len(), "Notification received");
    state.pipeline.process_batch(&batch).await;

    StatusCode::OK
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
