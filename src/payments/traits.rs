//! Payment gateway trait definitions
//!
//! Defines the capability interface that every processor adapter must implement,
//! and the handler interface webhook consumers register with the service.

use crate::error::AppResult;
use crate::payments::context::RequestContext;
use crate::payments::types::{
    ConfirmPaymentIntentRequest, CreateCustomerRequest, CreatePaymentIntentRequest,
    CreateRefundRequest, Customer, GatewayKind, PaymentIntent, PaymentMethod, Refund,
    UpdateCustomerRequest,
};
use crate::payments::money::Money;
use crate::webhooks::events::WebhookEvent;
use async_trait::async_trait;

/// Trait for payment gateway adapters
///
/// All processors (Stripe, PayPal, Adyen, the in-memory mock) implement this trait.
/// The orchestration layer is written against it alone and never branches on the
/// concrete adapter type.
///
/// Every call receives the caller's [`RequestContext`] and must give up when it is
/// cancelled or its deadline passes. Adapters must translate provider-native
/// failures into [`crate::error::AppError`] kinds before returning.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a customer record with the provider
    async fn create_customer(
        &self,
        ctx: &RequestContext,
        request: CreateCustomerRequest,
    ) -> AppResult<Customer>;

    /// Fetch a customer by provider identifier
    async fn get_customer(&self, ctx: &RequestContext, customer_id: &str) -> AppResult<Customer>;

    /// Apply a partial update to a customer
    async fn update_customer(
        &self,
        ctx: &RequestContext,
        customer_id: &str,
        request: UpdateCustomerRequest,
    ) -> AppResult<Customer>;

    /// Delete a customer and detach everything it owns
    async fn delete_customer(&self, ctx: &RequestContext, customer_id: &str) -> AppResult<()>;

    /// Attach a tokenized payment method to a customer
    ///
    /// # Arguments
    /// * `payment_method_id` - Token produced by the provider's client-side SDK
    /// * `customer_id` - Customer that will own the method
    async fn attach_payment_method(
        &self,
        ctx: &RequestContext,
        payment_method_id: &str,
        customer_id: &str,
    ) -> AppResult<PaymentMethod>;

    /// Detach a payment method from whichever customer owns it
    async fn detach_payment_method(
        &self,
        ctx: &RequestContext,
        payment_method_id: &str,
    ) -> AppResult<PaymentMethod>;

    /// List the payment methods attached to a customer
    async fn list_payment_methods(
        &self,
        ctx: &RequestContext,
        customer_id: &str,
    ) -> AppResult<Vec<PaymentMethod>>;

    /// Create a payment intent in `requires_payment_method`
    ///
    /// The request has already been validated and admitted by the orchestration
    /// service when this is called.
    async fn create_payment_intent(
        &self,
        ctx: &RequestContext,
        request: CreatePaymentIntentRequest,
    ) -> AppResult<PaymentIntent>;

    /// Fetch a payment intent by provider identifier
    async fn get_payment_intent(
        &self,
        ctx: &RequestContext,
        payment_intent_id: &str,
    ) -> AppResult<PaymentIntent>;

    /// Confirm a payment intent
    ///
    /// # Returns
    /// * `PaymentIntent` - In `requires_action` when the provider demands SCA,
    ///   otherwise `processing`, `succeeded` or `failed`
    async fn confirm_payment_intent(
        &self,
        ctx: &RequestContext,
        payment_intent_id: &str,
        request: ConfirmPaymentIntentRequest,
    ) -> AppResult<PaymentIntent>;

    /// Cancel a payment intent that has not reached a terminal status
    async fn cancel_payment_intent(
        &self,
        ctx: &RequestContext,
        payment_intent_id: &str,
    ) -> AppResult<PaymentIntent>;

    /// Capture authorized funds; `None` captures the full amount
    async fn capture_payment_intent(
        &self,
        ctx: &RequestContext,
        payment_intent_id: &str,
        amount: Option<Money>,
    ) -> AppResult<PaymentIntent>;

    /// Refund captured funds from a payment intent
    async fn create_refund(&self, ctx: &RequestContext, request: CreateRefundRequest)
        -> AppResult<Refund>;

    /// Fetch a refund by provider identifier
    async fn get_refund(&self, ctx: &RequestContext, refund_id: &str) -> AppResult<Refund>;

    /// Validate webhook signature
    ///
    /// Verifies that a webhook request is authentic and came from the provider.
    ///
    /// # Arguments
    /// * `payload` - Raw webhook payload body
    /// * `signature` - Signature from the provider's webhook header
    fn validate_webhook(&self, payload: &[u8], signature: &str) -> AppResult<()>;

    /// Map a provider payload onto the normalized event model
    ///
    /// Unrecognized provider event types fail with an unknown-event error.
    fn parse_webhook_event(&self, payload: &[u8]) -> AppResult<WebhookEvent>;

    /// Human-readable adapter name
    fn name(&self) -> &str;

    /// Gateway tag this adapter serves
    fn gateway_type(&self) -> GatewayKind;

    /// Liveness probe against the provider
    async fn is_healthy(&self, ctx: &RequestContext) -> bool;

    /// Release provider resources (connections, cached credentials)
    async fn close(&self) -> AppResult<()>;
}

/// Consumer of normalized webhook events
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, ctx: &RequestContext, event: &WebhookEvent) -> AppResult<()>;
}

#[async_trait]
impl<F> EventHandler for F
where
    F: Fn(&WebhookEvent) -> AppResult<()> + Send + Sync,
{
    async fn handle(&self, _ctx: &RequestContext, event: &WebhookEvent) -> AppResult<()> {
        self(event)
    }
}
