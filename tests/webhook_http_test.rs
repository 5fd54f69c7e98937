//! Webhook routes driven through the axum router without a listener

#![cfg(feature = "server")]

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use gateway_orchestrator::api::{self, webhooks::ADYEN_ACK_BODY, AppState};
use gateway_orchestrator::payments::providers::mock::sign_payload;
use gateway_orchestrator::payments::providers::{MockGateway, MockGatewayConfig};
use gateway_orchestrator::payments::rate_limit::RateLimiter;
use gateway_orchestrator::payments::service::{PaymentService, PaymentServiceConfig};
use gateway_orchestrator::payments::types::GatewayKind;
use gateway_orchestrator::webhooks::engine::WebhookEngine;
use gateway_orchestrator::webhooks::events::{EventType, WebhookEvent};
use gateway_orchestrator::AppResult;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "whsec_mock";

struct Harness {
    app: Router,
    calls: Arc<AtomicUsize>,
}

async fn harness(gateway_type: GatewayKind, ack_unknown_events: bool) -> Harness {
    let gateway = Arc::new(MockGateway::new(MockGatewayConfig {
        gateway_type,
        ..Default::default()
    }));
    let service = Arc::new(PaymentService::new(
        gateway,
        RateLimiter::disabled(),
        PaymentServiceConfig::default(),
    ));

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    service
        .register_handler(
            EventType::PaymentSucceeded,
            Arc::new(move |_: &WebhookEvent| -> AppResult<()> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .await;

    let engine = Arc::new(WebhookEngine::new(service));
    let state = AppState::new(engine, "development").with_ack_unknown_events(ack_unknown_events);
    Harness {
        app: api::router(state),
        calls,
    }
}

fn body(id: &str, event_type: &str) -> Vec<u8> {
    serde_json::json!({ "id": id, "type": event_type, "data": { "object": "pi_1" } })
        .to_string()
        .into_bytes()
}

fn post(uri: &str, header: Option<(&str, String)>, payload: Vec<u8>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some((name, value)) = header {
        builder = builder.header(name, value);
    }
    builder.body(Body::from(payload)).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn test_valid_signature_is_acknowledged() {
    let h = harness(GatewayKind::Mock, false).await;
    let payload = body("evt_ok", "payment_intent.succeeded");
    let signature = sign_payload(SECRET, &payload);

    let (status, text) = send(
        &h.app,
        post("/webhooks/mock", Some(("X-Mock-Signature", signature)), payload),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("evt_ok"));
    assert_eq!(h.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_bad_signature_is_unauthorized() {
    let h = harness(GatewayKind::Mock, false).await;
    let payload = body("evt_bad", "payment_intent.succeeded");

    let (status, _) = send(
        &h.app,
        post("/webhooks", Some(("X-Mock-Signature", "0".repeat(64))), payload.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&h.app, post("/webhooks", None, payload)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(h.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unparsable_and_unknown_payloads() {
    let h = harness(GatewayKind::Mock, false).await;

    let garbage = b"not json".to_vec();
    let signature = sign_payload(SECRET, &garbage);
    let (status, _) = send(
        &h.app,
        post("/webhooks", Some(("X-Mock-Signature", signature)), garbage),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unknown = body("evt_unknown", "invoice.paid");
    let signature = sign_payload(SECRET, &unknown);
    let (status, _) = send(
        &h.app,
        post("/webhooks", Some(("X-Mock-Signature", signature)), unknown),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_events_can_be_acknowledged() {
    let h = harness(GatewayKind::Mock, true).await;
    let unknown = body("evt_unknown", "invoice.paid");
    let signature = sign_payload(SECRET, &unknown);
    let (status, _) = send(
        &h.app,
        post("/webhooks", Some(("X-Mock-Signature", signature)), unknown),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_duplicate_delivery_invokes_handler_once() {
    let h = harness(GatewayKind::Mock, false).await;
    let payload = body("evt_twice", "payment_intent.succeeded");
    let signature = sign_payload(SECRET, &payload);

    for _ in 0..3 {
        let (status, _) = send(
            &h.app,
            post(
                "/webhooks",
                Some(("X-Mock-Signature", signature.clone())),
                payload.clone(),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(h.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_non_post_is_method_not_allowed() {
    let h = harness(GatewayKind::Mock, false).await;
    let request = Request::builder()
        .method(Method::GET)
        .uri("/webhooks")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_adyen_acknowledgement_body() {
    let h = harness(GatewayKind::Adyen, false).await;
    let payload = body("evt_adyen", "payment_intent.succeeded");
    let signature = sign_payload(SECRET, &payload);

    let (status, text) = send(
        &h.app,
        post("/webhooks/adyen", Some(("Adyen-Hmac-Signature", signature)), payload),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, ADYEN_ACK_BODY);
}

#[tokio::test]
async fn test_unconfigured_gateway_path_is_not_found() {
    let h = harness(GatewayKind::Mock, false).await;
    let payload = body("evt_x", "payment_intent.succeeded");
    let signature = sign_payload(SECRET, &payload);

    let (status, _) = send(
        &h.app,
        post("/webhooks/stripe", Some(("Stripe-Signature", signature.clone())), payload.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &h.app,
        post("/webhooks/square", Some(("X-Mock-Signature", signature)), payload),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_reports_gateway() {
    let h = harness(GatewayKind::Mock, false).await;
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, text) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["gateway"], "Mock");
    assert_eq!(json["gateway_type"], "mock");
    assert_eq!(json["gateway_healthy"], true);
}
