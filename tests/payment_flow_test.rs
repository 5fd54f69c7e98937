//! End-to-end payment flows through the orchestration service and the mock gateway

use gateway_orchestrator::payments::providers::mock::{
    DECLINED_PAYMENT_METHOD, EXPIRED_PAYMENT_METHOD, SCA_PAYMENT_METHOD,
};
use gateway_orchestrator::payments::providers::{GatewayRegistry, MockGateway, MockGatewayConfig};
use gateway_orchestrator::payments::rate_limit::{RateLimitConfig, RateLimiter};
use gateway_orchestrator::payments::service::{PaymentService, PaymentServiceConfig};
use gateway_orchestrator::payments::types::{
    CaptureMethod, ConfirmPaymentIntentRequest, CreateCustomerRequest, CreatePaymentIntentRequest,
    CreateRefundRequest, PaymentIntentStatus, RefundStatus,
};
use gateway_orchestrator::payments::{Currency, Money, RequestContext};
use std::sync::Arc;
use std::time::Duration;

fn service(rate_limit: RateLimitConfig) -> PaymentService {
    let registry =
        GatewayRegistry::new().register(Arc::new(MockGateway::new(MockGatewayConfig::default())));
    let gateway = registry.select("mock").unwrap();
    PaymentService::new(gateway, RateLimiter::new(rate_limit), PaymentServiceConfig::default())
}

fn intent_request(customer_id: &str, amount: i64) -> CreatePaymentIntentRequest {
    CreatePaymentIntentRequest {
        customer_id: Some(customer_id.to_string()),
        amount,
        currency: "USD".to_string(),
        ..Default::default()
    }
}

fn confirm_with(payment_method_id: &str) -> ConfirmPaymentIntentRequest {
    ConfirmPaymentIntentRequest {
        payment_method_id: Some(payment_method_id.to_string()),
        return_url: Some("https://shop.example/return".to_string()),
    }
}

#[tokio::test]
async fn test_charge_then_partial_refund() {
    let service = service(RateLimitConfig::default());
    let ctx = RequestContext::background();

    let customer = service
        .create_customer(
            &ctx,
            CreateCustomerRequest {
                email: "ada@example.com".to_string(),
                name: Some("Ada".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let intent = service
        .create_payment_intent(&ctx, intent_request(&customer.id, 10_000))
        .await
        .unwrap();
    assert_eq!(intent.status, PaymentIntentStatus::RequiresPaymentMethod);

    let intent = service
        .confirm_payment_intent(&ctx, &intent.id, confirm_with("pm_card_visa"))
        .await
        .unwrap();
    assert_eq!(intent.status, PaymentIntentStatus::Succeeded);
    assert_eq!(intent.captured_amount, Money::new(10_000, Currency::USD));

    let refund = service
        .create_refund(
            &ctx,
            CreateRefundRequest {
                payment_intent_id: intent.id.clone(),
                amount: 5_000,
                currency: "USD".to_string(),
                reason: Some("requested_by_customer".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(refund.status, RefundStatus::Succeeded);

    let intent = service.get_payment_intent(&ctx, &intent.id).await.unwrap();
    assert_eq!(intent.refundable_amount(), Money::new(5_000, Currency::USD));
    assert_eq!(intent.refundable_amount().to_string(), "50.00 USD");

    // Over-refunding the remainder is a domain error
    let err = service
        .create_refund(
            &ctx,
            CreateRefundRequest {
                payment_intent_id: intent.id.clone(),
                amount: 5_001,
                currency: "USD".to_string(),
                reason: None,
            },
        )
        .await
        .unwrap_err();
    assert!(!err.is_validation());

    let fetched = service.get_refund(&ctx, &refund.id).await.unwrap();
    assert_eq!(fetched, refund);
}

#[tokio::test]
async fn test_manual_capture() {
    let service = service(RateLimitConfig::default());
    let ctx = RequestContext::background();

    let intent = service
        .create_payment_intent(
            &ctx,
            CreatePaymentIntentRequest {
                capture_method: CaptureMethod::Manual,
                ..intent_request("cus_manual", 8_000)
            },
        )
        .await
        .unwrap();
    let intent = service
        .confirm_payment_intent(&ctx, &intent.id, confirm_with("pm_card_visa"))
        .await
        .unwrap();
    assert_eq!(intent.status, PaymentIntentStatus::Processing);

    let intent = service
        .capture_payment_intent(&ctx, &intent.id, Some((6_000, "USD")))
        .await
        .unwrap();
    assert_eq!(intent.status, PaymentIntentStatus::Succeeded);
    assert_eq!(intent.captured_amount, Money::new(6_000, Currency::USD));
    assert_eq!(intent.refundable_amount(), Money::new(6_000, Currency::USD));
}

#[tokio::test]
async fn test_sca_flow() {
    let service = service(RateLimitConfig::default());
    let ctx = RequestContext::background();

    let intent = service
        .create_payment_intent(&ctx, intent_request("cus_sca", 4_200))
        .await
        .unwrap();
    let intent = service
        .confirm_payment_intent(&ctx, &intent.id, confirm_with(SCA_PAYMENT_METHOD))
        .await
        .unwrap();
    assert_eq!(intent.status, PaymentIntentStatus::RequiresAction);
    assert!(intent.requires_sca);

    let challenge = service.start_authentication(&ctx, &intent.id).await.unwrap();
    assert!(!challenge.is_empty());
    assert_eq!(challenge.payment_intent_id, intent.id);
    assert_eq!(challenge.redirect_url, intent.sca_redirect_url);

    // Confirming again after the redirect completes the payment
    let intent = service
        .confirm_payment_intent(&ctx, &intent.id, ConfirmPaymentIntentRequest::default())
        .await
        .unwrap();
    assert_eq!(intent.status, PaymentIntentStatus::Succeeded);
    assert!(service
        .start_authentication(&ctx, &intent.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_card_failures() {
    let service = service(RateLimitConfig::default());
    let ctx = RequestContext::background();

    let intent = service
        .create_payment_intent(&ctx, intent_request("cus_fail", 1_000))
        .await
        .unwrap();
    assert!(service
        .confirm_payment_intent(&ctx, &intent.id, confirm_with(EXPIRED_PAYMENT_METHOD))
        .await
        .is_err());

    let intent = service
        .confirm_payment_intent(&ctx, &intent.id, confirm_with(DECLINED_PAYMENT_METHOD))
        .await
        .unwrap();
    assert_eq!(intent.status, PaymentIntentStatus::Failed);
    assert!(intent.failure_reason.is_some());
}

#[tokio::test]
async fn test_rate_limit_rejects_before_gateway() {
    let service = service(RateLimitConfig {
        enabled: true,
        max_payments_per_hour: 2,
        max_refunds_per_day: 100,
    });
    let ctx = RequestContext::background();

    for _ in 0..2 {
        service
            .create_payment_intent(&ctx, intent_request("cus_busy", 1_000))
            .await
            .unwrap();
    }
    let err = service
        .create_payment_intent(&ctx, intent_request("cus_busy", 1_000))
        .await
        .unwrap_err();
    assert!(err.is_rate_limited());
    assert_eq!(service.rate_limiter().payments_in_window("cus_busy").await, 2);
}

#[tokio::test]
async fn test_cancelled_context_stops_calls() {
    let service = service(RateLimitConfig::default());
    let (ctx, handle) = RequestContext::with_cancel();
    handle.cancel();

    let err = service
        .create_customer(
            &ctx,
            CreateCustomerRequest {
                email: "late@example.com".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(!err.is_validation());

    let ctx = RequestContext::background().with_timeout(Duration::from_secs(5));
    assert!(service.get_customer(&ctx, "cus_missing").await.unwrap_err().is_not_found());
}
