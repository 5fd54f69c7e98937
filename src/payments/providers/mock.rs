//! In-memory payment gateway
//!
//! A complete, provider-free implementation of the capability interface. It backs
//! the `mock` gateway tag in development and drives the test suites.
//!
//! Well-known payment method tokens simulate provider behaviour on confirm:
//! `pm_card_3ds` requires SCA, `pm_card_expired` and `pm_card_declined` fail, and
//! `pm_card_discover` is rejected as an unsupported brand. Any other token succeeds.

use crate::error::{AppError, AppResult, AuthorizationError, DomainError, WebhookError};
use crate::payments::context::RequestContext;
use crate::payments::money::{Currency, Money};
use crate::payments::traits::PaymentGateway;
use crate::payments::types::{
    CaptureMethod, CardBrand, CardDetails, ConfirmPaymentIntentRequest, CreateCustomerRequest,
    CreatePaymentIntentRequest, CreateRefundRequest, Customer, GatewayKind, PaymentIntent,
    PaymentIntentStatus, PaymentMethod, PaymentMethodType, Refund, RefundStatus,
    UpdateCustomerRequest,
};
use crate::webhooks::events::{EventType, WebhookEvent};
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{info, warn};

type HmacSha256 = Hmac<Sha256>;

pub const SCA_PAYMENT_METHOD: &str = "pm_card_3ds";
pub const EXPIRED_PAYMENT_METHOD: &str = "pm_card_expired";
pub const DECLINED_PAYMENT_METHOD: &str = "pm_card_declined";
pub const UNSUPPORTED_BRAND_PAYMENT_METHOD: &str = "pm_card_discover";
/// Vaulted token the processor no longer honours
pub const EXPIRED_TOKEN_PAYMENT_METHOD: &str = "pm_token_expired";

/// Mock gateway configuration
#[derive(Debug, Clone)]
pub struct MockGatewayConfig {
    /// Shared secret for webhook HMAC-SHA256 signatures
    pub webhook_secret: String,
    /// Base URL for simulated SCA redirects
    pub redirect_base_url: String,
    /// Tag the adapter reports, so it can stand in for a real processor
    pub gateway_type: GatewayKind,
}

impl Default for MockGatewayConfig {
    fn default() -> Self {
        Self {
            webhook_secret: "whsec_mock".to_string(),
            redirect_base_url: "https://mock-gateway.local/3ds".to_string(),
            gateway_type: GatewayKind::Mock,
        }
    }
}

#[derive(Default)]
struct MockState {
    customers: HashMap<String, Customer>,
    payment_methods: HashMap<String, PaymentMethod>,
    intents: HashMap<String, PaymentIntent>,
    refunds: HashMap<String, Refund>,
}

pub struct MockGateway {
    config: MockGatewayConfig,
    state: RwLock<MockState>,
    closed: AtomicBool,
}

impl MockGateway {
    pub fn new(config: MockGatewayConfig) -> Self {
        Self {
            config,
            state: RwLock::new(MockState::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// Sign `payload` the way the mock provider signs its notifications
    pub fn sign(&self, payload: &[u8]) -> String {
        sign_payload(&self.config.webhook_secret, payload)
    }

    fn new_id(prefix: &str) -> String {
        format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
    }

    fn ensure_open(&self, ctx: &RequestContext) -> AppResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AppError::provider(self.name(), "gateway has been closed"));
        }
        ctx.check()
    }

    fn card_for_token(token: &str) -> CardDetails {
        let now = Utc::now();
        let (brand, exp_year) = match token {
            EXPIRED_PAYMENT_METHOD => (CardBrand::Visa, now.year() - 1),
            UNSUPPORTED_BRAND_PAYMENT_METHOD => (CardBrand::Discover, now.year() + 3),
            _ => (CardBrand::Visa, now.year() + 3),
        };
        CardDetails {
            brand,
            last4: "4242".to_string(),
            exp_month: 12,
            exp_year,
        }
    }

    fn settle(intent: &mut PaymentIntent) -> AppResult<()> {
        match intent.capture_method {
            CaptureMethod::Automatic => intent.capture(None),
            CaptureMethod::Manual => intent.transition(PaymentIntentStatus::Processing, "confirm"),
        }
    }
}

/// Hex HMAC-SHA256 of `payload` under `secret`
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_customer(
        &self,
        ctx: &RequestContext,
        request: CreateCustomerRequest,
    ) -> AppResult<Customer> {
        self.ensure_open(ctx)?;
        if request.email.trim().is_empty() {
            return Err(AppError::invalid_request("customer email is required"));
        }

        let now = Utc::now();
        let customer = Customer {
            id: Self::new_id("cus"),
            email: request.email,
            name: request.name,
            phone: request.phone,
            address: request.address,
            default_payment_method: None,
            metadata: request.metadata,
            created_at: now,
            updated_at: now,
        };

        info!("Mock customer created: id={}", customer.id);
        self.state
            .write()
            .await
            .customers
            .insert(customer.id.clone(), customer.clone());
        Ok(customer)
    }

    async fn get_customer(&self, ctx: &RequestContext, customer_id: &str) -> AppResult<Customer> {
        self.ensure_open(ctx)?;
        self.state
            .read()
            .await
            .customers
            .get(customer_id)
            .cloned()
            .ok_or_else(|| {
                DomainError::CustomerNotFound {
                    id: customer_id.to_string(),
                }
                .into()
            })
    }

    async fn update_customer(
        &self,
        ctx: &RequestContext,
        customer_id: &str,
        request: UpdateCustomerRequest,
    ) -> AppResult<Customer> {
        self.ensure_open(ctx)?;
        let mut state = self.state.write().await;
        if let Some(pm_id) = &request.default_payment_method {
            let owned = state
                .payment_methods
                .get(pm_id)
                .is_some_and(|pm| pm.customer_id.as_deref() == Some(customer_id));
            if !owned {
                return Err(DomainError::PaymentMethodNotFound { id: pm_id.clone() }.into());
            }
        }

        let customer = state.customers.get_mut(customer_id).ok_or_else(|| {
            AppError::from(DomainError::CustomerNotFound {
                id: customer_id.to_string(),
            })
        })?;

        if let Some(email) = request.email {
            customer.email = email;
        }
        if request.name.is_some() {
            customer.name = request.name;
        }
        if request.phone.is_some() {
            customer.phone = request.phone;
        }
        if request.address.is_some() {
            customer.address = request.address;
        }
        if request.default_payment_method.is_some() {
            customer.default_payment_method = request.default_payment_method;
        }
        if let Some(metadata) = request.metadata {
            customer.metadata = metadata;
        }
        customer.updated_at = Utc::now();

        info!("Mock customer updated: id={}", customer_id);
        Ok(customer.clone())
    }

    async fn delete_customer(&self, ctx: &RequestContext, customer_id: &str) -> AppResult<()> {
        self.ensure_open(ctx)?;
        let mut state = self.state.write().await;
        if state.customers.remove(customer_id).is_none() {
            return Err(DomainError::CustomerNotFound {
                id: customer_id.to_string(),
            }
            .into());
        }
        state
            .payment_methods
            .retain(|_, pm| pm.customer_id.as_deref() != Some(customer_id));

        info!("Mock customer deleted: id={}", customer_id);
        Ok(())
    }

    async fn attach_payment_method(
        &self,
        ctx: &RequestContext,
        payment_method_id: &str,
        customer_id: &str,
    ) -> AppResult<PaymentMethod> {
        self.ensure_open(ctx)?;
        if !payment_method_id.starts_with("pm_") {
            return Err(DomainError::InvalidToken.into());
        }
        if payment_method_id == EXPIRED_TOKEN_PAYMENT_METHOD {
            return Err(DomainError::TokenExpired.into());
        }

        let mut state = self.state.write().await;
        if !state.customers.contains_key(customer_id) {
            return Err(DomainError::CustomerNotFound {
                id: customer_id.to_string(),
            }
            .into());
        }

        let payment_method = PaymentMethod {
            id: payment_method_id.to_string(),
            customer_id: Some(customer_id.to_string()),
            method_type: PaymentMethodType::Card,
            card: Some(Self::card_for_token(payment_method_id)),
            created_at: Utc::now(),
        };
        state
            .payment_methods
            .insert(payment_method.id.clone(), payment_method.clone());

        info!(
            "Mock payment method attached: id={}, customer={}",
            payment_method_id, customer_id
        );
        Ok(payment_method)
    }

    async fn detach_payment_method(
        &self,
        ctx: &RequestContext,
        payment_method_id: &str,
    ) -> AppResult<PaymentMethod> {
        self.ensure_open(ctx)?;
        let mut state = self.state.write().await;
        let mut payment_method = state
            .payment_methods
            .remove(payment_method_id)
            .ok_or_else(|| {
                AppError::from(DomainError::PaymentMethodNotFound {
                    id: payment_method_id.to_string(),
                })
            })?;

        if let Some(owner) = payment_method.customer_id.take() {
            if let Some(customer) = state.customers.get_mut(&owner) {
                if customer.default_payment_method.as_deref() == Some(payment_method_id) {
                    customer.default_payment_method = None;
                }
            }
        }

        info!("Mock payment method detached: id={}", payment_method_id);
        Ok(payment_method)
    }

    async fn list_payment_methods(
        &self,
        ctx: &RequestContext,
        customer_id: &str,
    ) -> AppResult<Vec<PaymentMethod>> {
        self.ensure_open(ctx)?;
        let state = self.state.read().await;
        if !state.customers.contains_key(customer_id) {
            return Err(DomainError::CustomerNotFound {
                id: customer_id.to_string(),
            }
            .into());
        }

        let mut methods: Vec<PaymentMethod> = state
            .payment_methods
            .values()
            .filter(|pm| pm.customer_id.as_deref() == Some(customer_id))
            .cloned()
            .collect();
        methods.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(methods)
    }

    async fn create_payment_intent(
        &self,
        ctx: &RequestContext,
        request: CreatePaymentIntentRequest,
    ) -> AppResult<PaymentIntent> {
        self.ensure_open(ctx)?;
        let currency: Currency = request.currency.parse()?;
        let mut intent = PaymentIntent::new(
            Self::new_id("pi"),
            self.config.gateway_type,
            Money::new(request.amount, currency),
        );
        intent.customer_id = request.customer_id;
        intent.payment_method_id = request.payment_method_id;
        intent.capture_method = request.capture_method;
        intent.description = request.description;
        intent.metadata = request.metadata;

        info!(
            "Mock payment intent created: id={}, amount={}",
            intent.id, intent.amount
        );
        self.state
            .write()
            .await
            .intents
            .insert(intent.id.clone(), intent.clone());
        Ok(intent)
    }

    async fn get_payment_intent(
        &self,
        ctx: &RequestContext,
        payment_intent_id: &str,
    ) -> AppResult<PaymentIntent> {
        self.ensure_open(ctx)?;
        self.state
            .read()
            .await
            .intents
            .get(payment_intent_id)
            .cloned()
            .ok_or_else(|| {
                DomainError::PaymentIntentNotFound {
                    id: payment_intent_id.to_string(),
                }
                .into()
            })
    }

    async fn confirm_payment_intent(
        &self,
        ctx: &RequestContext,
        payment_intent_id: &str,
        request: ConfirmPaymentIntentRequest,
    ) -> AppResult<PaymentIntent> {
        self.ensure_open(ctx)?;
        let mut state = self.state.write().await;
        let intent = state.intents.get_mut(payment_intent_id).ok_or_else(|| {
            AppError::from(DomainError::PaymentIntentNotFound {
                id: payment_intent_id.to_string(),
            })
        })?;

        if intent.status.is_terminal() {
            return Err(DomainError::InvalidIntentState {
                status: intent.status.to_string(),
                action: "confirm".to_string(),
            }
            .into());
        }

        // A second confirm after the redirect completes the authentication
        if intent.status == PaymentIntentStatus::RequiresAction {
            if let Some(pm_id) = request.payment_method_id {
                intent.payment_method_id = Some(pm_id);
            }
            intent.requires_sca = false;
            Self::settle(intent)?;
            info!(
                "Mock payment intent authenticated: id={}, status={}",
                intent.id, intent.status
            );
            return Ok(intent.clone());
        }

        // Rejections leave the intent untouched
        let token = request
            .payment_method_id
            .or_else(|| intent.payment_method_id.clone())
            .unwrap_or_default();
        let card = Self::card_for_token(&token);
        match token.as_str() {
            EXPIRED_PAYMENT_METHOD if card.is_expired_at(Utc::now()) => {
                warn!("Mock confirm rejected: id={}, card expired", intent.id);
                return Err(DomainError::CardExpired.into());
            }
            EXPIRED_TOKEN_PAYMENT_METHOD => {
                warn!("Mock confirm rejected: id={}, token expired", intent.id);
                return Err(DomainError::TokenExpired.into());
            }
            UNSUPPORTED_BRAND_PAYMENT_METHOD => {
                return Err(DomainError::UnsupportedCardBrand {
                    brand: "discover".to_string(),
                }
                .into());
            }
            _ => {}
        }
        if !token.is_empty() {
            intent.payment_method_id = Some(token.clone());
        }

        match token.as_str() {
            DECLINED_PAYMENT_METHOD => {
                intent.transition(PaymentIntentStatus::Failed, "confirm")?;
                intent.failure_reason = Some(DomainError::CardDeclined.to_string());
            }
            SCA_PAYMENT_METHOD => {
                intent.transition(PaymentIntentStatus::RequiresAction, "confirm")?;
                intent.requires_sca = true;
                intent.sca_redirect_url = Some(format!(
                    "{}/{}?return_url={}",
                    self.config.redirect_base_url,
                    intent.id,
                    request.return_url.unwrap_or_default()
                ));
            }
            _ => Self::settle(intent)?,
        }

        info!(
            "Mock payment intent confirmed: id={}, status={}",
            intent.id, intent.status
        );
        Ok(intent.clone())
    }

    async fn cancel_payment_intent(
        &self,
        ctx: &RequestContext,
        payment_intent_id: &str,
    ) -> AppResult<PaymentIntent> {
        self.ensure_open(ctx)?;
        let mut state = self.state.write().await;
        let intent = state.intents.get_mut(payment_intent_id).ok_or_else(|| {
            AppError::from(DomainError::PaymentIntentNotFound {
                id: payment_intent_id.to_string(),
            })
        })?;
        intent.transition(PaymentIntentStatus::Canceled, "cancel")?;

        info!("Mock payment intent canceled: id={}", payment_intent_id);
        Ok(intent.clone())
    }

    async fn capture_payment_intent(
        &self,
        ctx: &RequestContext,
        payment_intent_id: &str,
        amount: Option<Money>,
    ) -> AppResult<PaymentIntent> {
        self.ensure_open(ctx)?;
        let mut state = self.state.write().await;
        let intent = state.intents.get_mut(payment_intent_id).ok_or_else(|| {
            AppError::from(DomainError::PaymentIntentNotFound {
                id: payment_intent_id.to_string(),
            })
        })?;
        if intent.status != PaymentIntentStatus::Processing {
            return Err(DomainError::InvalidIntentState {
                status: intent.status.to_string(),
                action: "capture".to_string(),
            }
            .into());
        }
        intent.capture(amount)?;

        info!(
            "Mock payment intent captured: id={}, captured={}",
            intent.id, intent.captured_amount
        );
        Ok(intent.clone())
    }

    async fn create_refund(
        &self,
        ctx: &RequestContext,
        request: CreateRefundRequest,
    ) -> AppResult<Refund> {
        self.ensure_open(ctx)?;
        let currency: Currency = request.currency.parse()?;
        let amount = Money::new(request.amount, currency);

        let mut state = self.state.write().await;
        let intent = state
            .intents
            .get_mut(&request.payment_intent_id)
            .ok_or_else(|| {
                AppError::from(DomainError::PaymentIntentNotFound {
                    id: request.payment_intent_id.clone(),
                })
            })?;
        if !intent.can_refund() {
            return Err(DomainError::InvalidIntentState {
                status: intent.status.to_string(),
                action: "refund".to_string(),
            }
            .into());
        }
        intent.apply_refund(&amount)?;

        let mut refund = Refund {
            id: Self::new_id("re"),
            payment_intent_id: request.payment_intent_id,
            amount,
            status: RefundStatus::Pending,
            reason: request.reason,
            failure_reason: None,
            created_at: Utc::now(),
        };
        refund.transition(RefundStatus::Succeeded, None)?;

        info!(
            "Mock refund created: id={}, intent={}, amount={}",
            refund.id, refund.payment_intent_id, refund.amount
        );
        state.refunds.insert(refund.id.clone(), refund.clone());
        Ok(refund)
    }

    async fn get_refund(&self, ctx: &RequestContext, refund_id: &str) -> AppResult<Refund> {
        self.ensure_open(ctx)?;
        self.state
            .read()
            .await
            .refunds
            .get(refund_id)
            .cloned()
            .ok_or_else(|| {
                DomainError::RefundNotFound {
                    id: refund_id.to_string(),
                }
                .into()
            })
    }

    fn validate_webhook(&self, payload: &[u8], signature: &str) -> AppResult<()> {
        let computed_signature = self.sign(payload);
        let provided_signature = signature.trim();

        if computed_signature.len() != provided_signature.len() {
            return Err(AuthorizationError::InvalidWebhookSignature.into());
        }

        // Constant-time comparison
        let diff = computed_signature
            .as_bytes()
            .iter()
            .zip(provided_signature.as_bytes().iter())
            .fold(0, |acc, (a, b)| acc | (a ^ b));
        if diff != 0 {
            return Err(AuthorizationError::InvalidWebhookSignature.into());
        }
        Ok(())
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> AppResult<WebhookEvent> {
        let notification: MockNotification =
            serde_json::from_slice(payload).map_err(|e| WebhookError::MalformedPayload {
                message: e.to_string(),
            })?;

        let event_type = match notification.event_type.as_str() {
            "payment_intent.succeeded" => EventType::PaymentSucceeded,
            "payment_intent.payment_failed" => EventType::PaymentFailed,
            "charge.refunded" => EventType::ChargeRefunded,
            "charge.dispute.created" => EventType::DisputeCreated,
            "charge.dispute.updated" => EventType::DisputeUpdated,
            "charge.dispute.closed" => EventType::DisputeClosed,
            other => {
                return Err(WebhookError::UnknownEvent {
                    event_type: other.to_string(),
                }
                .into())
            }
        };

        let id = notification
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| WebhookEvent::synthesize_id(payload));
        Ok(WebhookEvent::new(
            id,
            event_type,
            self.config.gateway_type,
            notification.data,
        ))
    }

    fn name(&self) -> &str {
        "Mock"
    }

    fn gateway_type(&self) -> GatewayKind {
        self.config.gateway_type
    }

    async fn is_healthy(&self, ctx: &RequestContext) -> bool {
        !self.closed.load(Ordering::SeqCst) && !ctx.is_cancelled()
    }

    async fn close(&self) -> AppResult<()> {
        info!("Closing mock gateway");
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// Mock notification envelope
#[derive(Debug, Deserialize)]
struct MockNotification {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: serde_json::Value,
}
