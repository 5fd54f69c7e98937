//! Payment orchestration service
//!
//! Validates requests, applies admission control, delegates to the configured
//! gateway adapter, and dispatches normalized webhook events to registered
//! handlers. Validation and rate errors are raised before any adapter call.
//! Conversion quotes go through the same amount checks as payments.

use crate::error::{AppResult, ValidationError};
use crate::payments::context::RequestContext;
use crate::payments::money::{Currency, Money};
use crate::payments::rate_limit::RateLimiter;
use crate::payments::sca::{ScaChallenge, ScaCoordinator};
use crate::payments::traits::{EventHandler, PaymentGateway};
use crate::payments::types::{
    ConfirmPaymentIntentRequest, CreateCustomerRequest, CreatePaymentIntentRequest,
    CreateRefundRequest, Customer, PaymentIntent, PaymentMethod, Refund, UpdateCustomerRequest,
};
use crate::quotes::{ConversionQuote, ExchangeRate, QuoteEngine, QuoteRequest};
use crate::webhooks::events::{EventType, WebhookEvent};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Rate limiter key for intents created without a customer
pub const ANONYMOUS_CUSTOMER_KEY: &str = "anonymous";

#[derive(Debug, Clone)]
pub struct PaymentServiceConfig {
    /// Smallest accepted amount, in major units
    pub min_amount: Decimal,
    /// Largest accepted amount, in major units
    pub max_amount: Decimal,
    pub supported_currencies: Vec<Currency>,
}

impl Default for PaymentServiceConfig {
    fn default() -> Self {
        Self {
            min_amount: Decimal::new(50, 2),
            max_amount: Decimal::new(99_999_999, 2),
            supported_currencies: vec![Currency::USD, Currency::EUR, Currency::GBP, Currency::JPY],
        }
    }
}

pub struct PaymentService {
    gateway: Arc<dyn PaymentGateway>,
    rate_limiter: RateLimiter,
    sca: ScaCoordinator,
    config: PaymentServiceConfig,
    quotes: QuoteEngine,
    handlers: RwLock<HashMap<EventType, Arc<dyn EventHandler>>>,
}

impl PaymentService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        rate_limiter: RateLimiter,
        config: PaymentServiceConfig,
    ) -> Self {
        info!(
            "Payment service using gateway: name={}, type={}",
            gateway.name(),
            gateway.gateway_type()
        );
        Self {
            gateway,
            rate_limiter,
            sca: ScaCoordinator::new(),
            config,
            quotes: QuoteEngine::default(),
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_quote_engine(mut self, quotes: QuoteEngine) -> Self {
        self.quotes = quotes;
        self
    }

    pub fn gateway(&self) -> &Arc<dyn PaymentGateway> {
        &self.gateway
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn quote_engine(&self) -> &QuoteEngine {
        &self.quotes
    }

    /// Check currency support and amount bounds
    pub fn validate_amount(&self, amount: i64, currency: &str) -> AppResult<Money> {
        let currency: Currency = currency.parse()?;
        if !self.config.supported_currencies.contains(&currency) {
            return Err(ValidationError::UnsupportedCurrency {
                currency: currency.to_string(),
            }
            .into());
        }

        let money = Money::new(amount, currency);
        let major = money.to_major();
        if major < self.config.min_amount {
            return Err(ValidationError::AmountTooSmall {
                amount: money.to_string(),
                minimum: format!("{} {}", self.config.min_amount, currency),
            }
            .into());
        }
        if major > self.config.max_amount {
            return Err(ValidationError::AmountTooLarge {
                amount: money.to_string(),
                maximum: format!("{} {}", self.config.max_amount, currency),
            }
            .into());
        }
        Ok(money)
    }

    // Quotes

    /// Price a fiat-to-crypto conversion; the fiat side must pass [`Self::validate_amount`]
    pub fn quote_conversion(
        &self,
        request: QuoteRequest,
        rate: ExchangeRate,
        fee: Money,
    ) -> AppResult<ConversionQuote> {
        self.validate_amount(request.fiat.amount, request.fiat.currency.code())?;
        let quote = self.quotes.quote(request, rate, fee)?;
        info!(
            "Conversion quote issued: id={}, fiat={}, asset={}, expires_at={}",
            quote.id, quote.fiat, quote.crypto_asset, quote.expires_at
        );
        Ok(quote)
    }

    // Customers

    pub async fn create_customer(
        &self,
        ctx: &RequestContext,
        request: CreateCustomerRequest,
    ) -> AppResult<Customer> {
        if request.email.trim().is_empty() {
            return Err(ValidationError::InvalidRequest {
                message: "customer email is required".to_string(),
            }
            .into());
        }
        ctx.run(self.gateway.create_customer(ctx, request)).await
    }

    pub async fn get_customer(&self, ctx: &RequestContext, customer_id: &str) -> AppResult<Customer> {
        require_id("customer_id", customer_id)?;
        ctx.run(self.gateway.get_customer(ctx, customer_id)).await
    }

    pub async fn update_customer(
        &self,
        ctx: &RequestContext,
        customer_id: &str,
        request: UpdateCustomerRequest,
    ) -> AppResult<Customer> {
        require_id("customer_id", customer_id)?;
        ctx.run(self.gateway.update_customer(ctx, customer_id, request))
            .await
    }

    pub async fn delete_customer(&self, ctx: &RequestContext, customer_id: &str) -> AppResult<()> {
        require_id("customer_id", customer_id)?;
        ctx.run(self.gateway.delete_customer(ctx, customer_id)).await
    }

    // Payment methods

    pub async fn attach_payment_method(
        &self,
        ctx: &RequestContext,
        payment_method_id: &str,
        customer_id: &str,
    ) -> AppResult<PaymentMethod> {
        require_id("payment_method_id", payment_method_id)?;
        require_id("customer_id", customer_id)?;
        ctx.run(
            self.gateway
                .attach_payment_method(ctx, payment_method_id, customer_id),
        )
        .await
    }

    pub async fn detach_payment_method(
        &self,
        ctx: &RequestContext,
        payment_method_id: &str,
    ) -> AppResult<PaymentMethod> {
        require_id("payment_method_id", payment_method_id)?;
        ctx.run(self.gateway.detach_payment_method(ctx, payment_method_id))
            .await
    }

    pub async fn list_payment_methods(
        &self,
        ctx: &RequestContext,
        customer_id: &str,
    ) -> AppResult<Vec<PaymentMethod>> {
        require_id("customer_id", customer_id)?;
        ctx.run(self.gateway.list_payment_methods(ctx, customer_id))
            .await
    }

    // Payment intents

    /// Validate, admit per customer, then create through the gateway
    pub async fn create_payment_intent(
        &self,
        ctx: &RequestContext,
        request: CreatePaymentIntentRequest,
    ) -> AppResult<PaymentIntent> {
        let amount = self.validate_amount(request.amount, &request.currency)?;
        let customer_key = request
            .customer_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(ANONYMOUS_CUSTOMER_KEY);
        self.rate_limiter.check_payment(customer_key).await?;

        info!(
            "Creating payment intent: amount={}, customer={}, gateway={}",
            amount,
            customer_key,
            self.gateway.gateway_type()
        );
        ctx.run(self.gateway.create_payment_intent(ctx, request))
            .await
    }

    pub async fn get_payment_intent(
        &self,
        ctx: &RequestContext,
        payment_intent_id: &str,
    ) -> AppResult<PaymentIntent> {
        require_id("payment_intent_id", payment_intent_id)?;
        ctx.run(self.gateway.get_payment_intent(ctx, payment_intent_id))
            .await
    }

    pub async fn confirm_payment_intent(
        &self,
        ctx: &RequestContext,
        payment_intent_id: &str,
        request: ConfirmPaymentIntentRequest,
    ) -> AppResult<PaymentIntent> {
        require_id("payment_intent_id", payment_intent_id)?;
        let intent = ctx
            .run(
                self.gateway
                    .confirm_payment_intent(ctx, payment_intent_id, request),
            )
            .await?;
        info!(
            "Payment intent confirmed: id={}, status={}",
            intent.id, intent.status
        );
        Ok(intent)
    }

    pub async fn cancel_payment_intent(
        &self,
        ctx: &RequestContext,
        payment_intent_id: &str,
    ) -> AppResult<PaymentIntent> {
        require_id("payment_intent_id", payment_intent_id)?;
        ctx.run(self.gateway.cancel_payment_intent(ctx, payment_intent_id))
            .await
    }

    pub async fn capture_payment_intent(
        &self,
        ctx: &RequestContext,
        payment_intent_id: &str,
        amount: Option<(i64, &str)>,
    ) -> AppResult<PaymentIntent> {
        require_id("payment_intent_id", payment_intent_id)?;
        let amount = amount
            .map(|(value, currency)| self.validate_amount(value, currency))
            .transpose()?;
        ctx.run(
            self.gateway
                .capture_payment_intent(ctx, payment_intent_id, amount),
        )
        .await
    }

    /// SCA challenge for an intent; empty when no authentication is pending
    pub async fn start_authentication(
        &self,
        ctx: &RequestContext,
        payment_intent_id: &str,
    ) -> AppResult<ScaChallenge> {
        let intent = self.get_payment_intent(ctx, payment_intent_id).await?;
        Ok(self.sca.challenge_for(&intent))
    }

    // Refunds

    /// Validate, admit against the global refund budget, then refund through the gateway
    pub async fn create_refund(
        &self,
        ctx: &RequestContext,
        request: CreateRefundRequest,
    ) -> AppResult<Refund> {
        require_id("payment_intent_id", &request.payment_intent_id)?;
        let amount = self.validate_amount(request.amount, &request.currency)?;
        self.rate_limiter.check_refund().await?;

        info!(
            "Creating refund: intent={}, amount={}",
            request.payment_intent_id, amount
        );
        ctx.run(self.gateway.create_refund(ctx, request)).await
    }

    pub async fn get_refund(&self, ctx: &RequestContext, refund_id: &str) -> AppResult<Refund> {
        require_id("refund_id", refund_id)?;
        ctx.run(self.gateway.get_refund(ctx, refund_id)).await
    }

    // Event handlers

    /// Install `handler` for `event_type`, replacing any previous one
    pub async fn register_handler(&self, event_type: EventType, handler: Arc<dyn EventHandler>) {
        let previous = self.handlers.write().await.insert(event_type, handler);
        if previous.is_some() {
            info!("Replaced webhook handler: event_type={}", event_type);
        } else {
            info!("Registered webhook handler: event_type={}", event_type);
        }
    }

    pub async fn unregister_handler(&self, event_type: EventType) -> bool {
        let removed = self.handlers.write().await.remove(&event_type).is_some();
        if removed {
            info!("Unregistered webhook handler: event_type={}", event_type);
        }
        removed
    }

    pub async fn has_handler(&self, event_type: EventType) -> bool {
        self.handlers.read().await.contains_key(&event_type)
    }

    /// Invoke the handler for the event's type; events nobody handles are a no-op
    pub async fn handle_event(&self, ctx: &RequestContext, event: &WebhookEvent) -> AppResult<()> {
        let handler = self.handlers.read().await.get(&event.event_type).cloned();
        match handler {
            Some(handler) => {
                debug!(
                    "Dispatching webhook event: id={}, type={}",
                    event.id, event.event_type
                );
                handler.handle(ctx, event).await.map_err(|e| {
                    warn!(
                        "Webhook handler failed: id={}, type={}, error={}",
                        event.id, event.event_type, e
                    );
                    e
                })
            }
            None => {
                debug!(
                    "No handler registered for webhook event: id={}, type={}",
                    event.id, event.event_type
                );
                Ok(())
            }
        }
    }
}

fn require_id(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::InvalidRequest {
            message: format!("{} is required", field),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::providers::{MockGateway, MockGatewayConfig};
    use crate::payments::rate_limit::RateLimitConfig;
    use crate::payments::types::GatewayKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn service_with_limits(max_payments: u32, max_refunds: u32) -> PaymentService {
        PaymentService::new(
            Arc::new(MockGateway::new(MockGatewayConfig::default())),
            RateLimiter::new(RateLimitConfig {
                enabled: true,
                max_payments_per_hour: max_payments,
                max_refunds_per_day: max_refunds,
            }),
            PaymentServiceConfig::default(),
        )
    }

    fn intent_request(customer: &str, amount: i64, currency: &str) -> CreatePaymentIntentRequest {
        CreatePaymentIntentRequest {
            customer_id: Some(customer.to_string()),
            amount,
            currency: currency.to_string(),
            ..Default::default()
        }
    }

    fn event(event_type: EventType) -> WebhookEvent {
        WebhookEvent::new("evt_test", event_type, GatewayKind::Mock, serde_json::json!({}))
    }

    #[tokio::test]
    async fn test_validation_rejects_bounds_and_currency() {
        let service = service_with_limits(10, 10);
        let ctx = RequestContext::background();

        let err = service
            .create_payment_intent(&ctx, intent_request("cus", 10, "USD"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.kind,
            crate::error::AppErrorKind::Validation(ValidationError::AmountTooSmall { .. })
        ));

        let err = service
            .create_payment_intent(&ctx, intent_request("cus", 1_000_000_000_00, "USD"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.kind,
            crate::error::AppErrorKind::Validation(ValidationError::AmountTooLarge { .. })
        ));

        // Known currency but not enabled for this service
        let err = service
            .create_payment_intent(&ctx, intent_request("cus", 10_000, "NGN"))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = service
            .create_payment_intent(&ctx, intent_request("cus", 10_000, "ZZZ"))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_validation_failures_do_not_consume_rate_budget() {
        let service = service_with_limits(1, 10);
        let ctx = RequestContext::background();
        for _ in 0..3 {
            assert!(service
                .create_payment_intent(&ctx, intent_request("cus", 1, "USD"))
                .await
                .is_err());
        }
        assert!(service
            .create_payment_intent(&ctx, intent_request("cus", 5_000, "USD"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_payment_rate_limit_per_customer() {
        let service = service_with_limits(2, 10);
        let ctx = RequestContext::background();
        for _ in 0..2 {
            service
                .create_payment_intent(&ctx, intent_request("cus_a", 5_000, "USD"))
                .await
                .unwrap();
        }
        let err = service
            .create_payment_intent(&ctx, intent_request("cus_a", 5_000, "USD"))
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());

        assert!(service
            .create_payment_intent(&ctx, intent_request("cus_b", 5_000, "USD"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_handler_registry_replace_and_unregister() {
        let service = service_with_limits(10, 10);
        let ctx = RequestContext::background();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = first.clone();
        service
            .register_handler(
                EventType::PaymentSucceeded,
                Arc::new(move |_: &WebhookEvent| -> AppResult<()> {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .await;
        service
            .handle_event(&ctx, &event(EventType::PaymentSucceeded))
            .await
            .unwrap();

        let counter = second.clone();
        service
            .register_handler(
                EventType::PaymentSucceeded,
                Arc::new(move |_: &WebhookEvent| -> AppResult<()> {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .await;
        service
            .handle_event(&ctx, &event(EventType::PaymentSucceeded))
            .await
            .unwrap();

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);

        assert!(service.unregister_handler(EventType::PaymentSucceeded).await);
        assert!(!service.unregister_handler(EventType::PaymentSucceeded).await);
        service
            .handle_event(&ctx, &event(EventType::PaymentSucceeded))
            .await
            .unwrap();
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unmatched_event_is_noop() {
        let service = service_with_limits(10, 10);
        let ctx = RequestContext::background();
        assert!(!service.has_handler(EventType::DisputeClosed).await);
        assert!(service
            .handle_event(&ctx, &event(EventType::DisputeClosed))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_handler_error_propagates() {
        let service = service_with_limits(10, 10);
        let ctx = RequestContext::background();
        service
            .register_handler(
                EventType::DisputeCreated,
                Arc::new(|_: &WebhookEvent| -> AppResult<()> {
                    Err(crate::error::AppError::invalid_request("boom"))
                }),
            )
            .await;
        assert!(service
            .handle_event(&ctx, &event(EventType::DisputeCreated))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_start_authentication() {
        let service = service_with_limits(10, 10);
        let ctx = RequestContext::background();
        let intent = service
            .create_payment_intent(&ctx, intent_request("cus", 2_500, "EUR"))
            .await
            .unwrap();
        assert!(service
            .start_authentication(&ctx, &intent.id)
            .await
            .unwrap()
            .is_empty());

        service
            .confirm_payment_intent(
                &ctx,
                &intent.id,
                ConfirmPaymentIntentRequest {
                    payment_method_id: Some(crate::payments::providers::mock::SCA_PAYMENT_METHOD.to_string()),
                    return_url: None,
                },
            )
            .await
            .unwrap();
        let challenge = service.start_authentication(&ctx, &intent.id).await.unwrap();
        assert_eq!(challenge.id, format!("sca_{}", intent.id));
        assert!(challenge.redirect_url.is_some());
    }

    #[tokio::test]
    async fn test_refund_rate_limit_is_global() {
        let service = service_with_limits(10, 1);
        let ctx = RequestContext::background();
        let intent = service
            .create_payment_intent(&ctx, intent_request("cus", 10_000, "USD"))
            .await
            .unwrap();
        service
            .confirm_payment_intent(&ctx, &intent.id, Default::default())
            .await
            .unwrap();

        let refund = |amount| CreateRefundRequest {
            payment_intent_id: intent.id.clone(),
            amount,
            currency: "USD".to_string(),
            reason: None,
        };
        service.create_refund(&ctx, refund(1_000)).await.unwrap();
        let err = service.create_refund(&ctx, refund(1_000)).await.unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn test_missing_ids_fail_fast() {
        let service = service_with_limits(10, 10);
        let ctx = RequestContext::background();
        assert!(service.get_payment_intent(&ctx, " ").await.unwrap_err().is_validation());
        assert!(service.get_refund(&ctx, "").await.unwrap_err().is_validation());
    }

    fn exchange_rate(timestamp: chrono::DateTime<chrono::Utc>) -> ExchangeRate {
        ExchangeRate {
            rate: rust_decimal_macros::dec!(0.5),
            source: "aggregator".to_string(),
            strategy: "spot".to_string(),
            timestamp,
            confidence: 0.9,
            sources: vec![],
        }
    }

    fn quote_request(amount: i64, currency: Currency) -> QuoteRequest {
        QuoteRequest {
            fiat: Money::new(amount, currency),
            crypto_asset: "USDC".to_string(),
            destination_address: "GBXKMSP3ALICE4WALLET7DESTINATION2QUOTE".to_string(),
        }
    }

    #[test]
    fn test_quote_uses_configured_validity() {
        let service = service_with_limits(10, 10).with_quote_engine(QuoteEngine::new(120));
        assert_eq!(service.quote_engine().validity(), chrono::Duration::seconds(120));

        // A future-dated rate pins the expiry independently of the clock
        let rated_at = chrono::Utc::now() + chrono::Duration::hours(1);
        let quote = service
            .quote_conversion(
                quote_request(10_000, Currency::USD),
                exchange_rate(rated_at),
                Money::new(100, Currency::USD),
            )
            .unwrap();
        assert_eq!(quote.expires_at, rated_at + chrono::Duration::seconds(120));
        assert_eq!(quote.crypto_amount, rust_decimal_macros::dec!(198));
    }

    #[test]
    fn test_quote_applies_amount_validation() {
        let service = service_with_limits(10, 10);
        let now = chrono::Utc::now();

        let err = service
            .quote_conversion(
                quote_request(10_000, Currency::CAD),
                exchange_rate(now),
                Money::zero(Currency::CAD),
            )
            .unwrap_err();
        assert!(matches!(
            err.kind,
            crate::error::AppErrorKind::Validation(ValidationError::UnsupportedCurrency { .. })
        ));

        let err = service
            .quote_conversion(
                quote_request(10, Currency::USD),
                exchange_rate(now),
                Money::zero(Currency::USD),
            )
            .unwrap_err();
        assert!(matches!(
            err.kind,
            crate::error::AppErrorKind::Validation(ValidationError::AmountTooSmall { .. })
        ));
    }
}
