//! Webhook routes
//!
//! Every route funnels into [`WebhookEngine::process`]; routes differ only in
//! where the signature is read from and how success is acknowledged.

use axum::{
    body::Bytes,
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use http::{HeaderMap, StatusCode};
use serde_json::json;
use tracing::{info, warn};

use crate::api::AppState;
use crate::error::AppError;
use crate::payments::context::RequestContext;
use crate::payments::types::GatewayKind;
use crate::webhooks::engine::WebhookOutcome;

/// Header probe order for the generic route
const SIGNATURE_HEADERS: [(GatewayKind, &str); 4] = [
    (GatewayKind::Stripe, "stripe-signature"),
    (GatewayKind::PayPal, "paypal-transmission-sig"),
    (GatewayKind::Adyen, "adyen-hmac-signature"),
    (GatewayKind::Mock, "x-mock-signature"),
];

/// Literal body Adyen expects on a successful notification
pub const ADYEN_ACK_BODY: &str = "[accepted]";

pub fn signature_header(kind: GatewayKind) -> &'static str {
    SIGNATURE_HEADERS
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, header)| *header)
        .unwrap_or("x-mock-signature")
}

/// Generic route: the first provider signature header present wins
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = SIGNATURE_HEADERS
        .iter()
        .find_map(|(_, header)| header_value(&headers, header));
    let kind = state.engine.gateway().gateway_type();
    ingest(&state, &headers, kind, signature, &body).await
}

/// Dedicated route for one provider; reads only that provider's header
pub async fn receive_gateway_webhook(
    State(state): State<AppState>,
    Path(gateway): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let configured = state.engine.gateway().gateway_type();
    let kind = match gateway.parse::<GatewayKind>() {
        Ok(kind) if kind == configured => kind,
        _ => {
            warn!("Webhook for unconfigured gateway: path={}", gateway);
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("gateway not configured: {}", gateway) })),
            )
                .into_response();
        }
    };

    let signature = header_value(&headers, signature_header(kind));
    ingest(&state, &headers, kind, signature, &body).await
}

async fn ingest(
    state: &AppState,
    headers: &HeaderMap,
    kind: GatewayKind,
    signature: Option<&str>,
    body: &[u8],
) -> Response {
    let mut ctx = RequestContext::background();
    if let Some(request_id) = header_value(headers, "x-request-id") {
        ctx = ctx.with_request_id(request_id);
    }

    match state.engine.process(&ctx, body, signature).await {
        Ok(outcome) => {
            if let WebhookOutcome::HandlerFailed { event_id, .. } = &outcome {
                info!(
                    "Acknowledging webhook despite handler failure: id={}, request_id={}",
                    event_id,
                    ctx.request_id()
                );
            }
            acknowledge(kind, outcome.event_id())
        }
        Err(e) if e.is_unknown_event() && state.ack_unknown_events => {
            info!(
                "Acknowledging unknown webhook event: error={}, request_id={}",
                e,
                ctx.request_id()
            );
            acknowledge(kind, "")
        }
        Err(e) => reject(e),
    }
}

fn acknowledge(kind: GatewayKind, event_id: &str) -> Response {
    match kind {
        GatewayKind::Adyen => (StatusCode::OK, ADYEN_ACK_BODY).into_response(),
        _ => (
            StatusCode::OK,
            Json(json!({ "received": true, "event_id": event_id })),
        )
            .into_response(),
    }
}

fn reject(err: AppError) -> Response {
    warn!("Webhook rejected: error={}", err);
    err.into_response()
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
}
