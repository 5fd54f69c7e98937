//! HTTP surface: health probe and webhook ingestion

pub mod health;
pub mod webhooks;

use crate::error::{AppError, AppErrorKind, ExternalError};
use crate::webhooks::engine::WebhookEngine;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<WebhookEngine>,
    pub environment: Arc<str>,
    /// Acknowledge unrecognized webhook event types instead of rejecting them
    pub ack_unknown_events: bool,
}

impl AppState {
    pub fn new(engine: Arc<WebhookEngine>, environment: impl Into<Arc<str>>) -> Self {
        Self {
            engine,
            environment: environment.into(),
            ack_unknown_events: false,
        }
    }

    pub fn with_ack_unknown_events(mut self, ack: bool) -> Self {
        self.ack_unknown_events = ack;
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/webhooks", post(webhooks::receive_webhook))
        .route("/webhooks/:gateway", post(webhooks::receive_gateway_webhook))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        if self.is_not_found() {
            return StatusCode::NOT_FOUND;
        }
        match &self.kind {
            AppErrorKind::Authorization(_) => StatusCode::UNAUTHORIZED,
            AppErrorKind::Validation(_) => StatusCode::BAD_REQUEST,
            AppErrorKind::Webhook(_) => StatusCode::BAD_REQUEST,
            AppErrorKind::RateLimit(_) => StatusCode::TOO_MANY_REQUESTS,
            AppErrorKind::Domain(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppErrorKind::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppErrorKind::External(ExternalError::DeadlineExceeded) => StatusCode::GATEWAY_TIMEOUT,
            AppErrorKind::External(ExternalError::Cancelled) => StatusCode::SERVICE_UNAVAILABLE,
            AppErrorKind::External(ExternalError::PaymentProvider { .. }) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
