//! Webhook ingestion pipeline
//!
//! verify -> parse -> claim -> dispatch -> mark processed. A handler failure
//! releases the claim so the provider's retry can dispatch again, and is
//! reported out of band instead of being surfaced to the provider. A dispatch
//! that never finishes (dropped request, panic) releases the claim as well.

use crate::error::{AppError, AppResult, AuthorizationError};
use crate::payments::context::RequestContext;
use crate::payments::service::PaymentService;
use crate::payments::traits::PaymentGateway;
use crate::webhooks::events::WebhookEvent;
use crate::webhooks::idempotency::IdempotencyIndex;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Sink for handler failures on events that were already acknowledged
pub trait FailureReporter: Send + Sync {
    fn report(&self, event: &WebhookEvent, error: &AppError);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingFailureReporter;

impl FailureReporter for TracingFailureReporter {
    fn report(&self, event: &WebhookEvent, err: &AppError) {
        error!(
            "Webhook handler failed after acknowledgement: id={}, type={}, gateway={}, error={}",
            event.id, event.event_type, event.gateway, err
        );
    }
}

#[derive(Debug)]
pub enum WebhookOutcome {
    /// Dispatched and recorded
    Processed(WebhookEvent),
    /// Seen before, or being dispatched by a concurrent delivery
    Duplicate { event_id: String },
    /// Handler returned an error; the identifier stays unrecorded
    HandlerFailed { event_id: String, error: AppError },
}

impl WebhookOutcome {
    pub fn event_id(&self) -> &str {
        match self {
            WebhookOutcome::Processed(event) => &event.id,
            WebhookOutcome::Duplicate { event_id } => event_id,
            WebhookOutcome::HandlerFailed { event_id, .. } => event_id,
        }
    }
}

pub struct WebhookEngine {
    service: Arc<PaymentService>,
    index: IdempotencyIndex,
    verify_signatures: bool,
    reporter: Arc<dyn FailureReporter>,
}

impl WebhookEngine {
    pub fn new(service: Arc<PaymentService>) -> Self {
        Self {
            service,
            index: IdempotencyIndex::default(),
            verify_signatures: true,
            reporter: Arc::new(TracingFailureReporter),
        }
    }

    pub fn with_index(mut self, index: IdempotencyIndex) -> Self {
        self.index = index;
        self
    }

    /// Skipping verification is only meant for local development
    pub fn with_signature_verification(mut self, enabled: bool) -> Self {
        self.verify_signatures = enabled;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn FailureReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn gateway(&self) -> &Arc<dyn PaymentGateway> {
        self.service.gateway()
    }

    pub fn index(&self) -> &IdempotencyIndex {
        &self.index
    }

    /// Authenticate the raw payload against the configured gateway's scheme
    pub fn verify(&self, payload: &[u8], signature: Option<&str>) -> AppResult<()> {
        if !self.verify_signatures {
            return Ok(());
        }
        let signature = signature
            .filter(|s| !s.trim().is_empty())
            .ok_or(AuthorizationError::MissingWebhookSignature)?;
        self.gateway().validate_webhook(payload, signature)
    }

    /// Run one delivery through the pipeline
    ///
    /// Errors are returned only for verification and parse failures, which the
    /// caller turns into rejections. Everything after the event is known ends in
    /// an outcome the caller acknowledges.
    pub async fn process(
        &self,
        ctx: &RequestContext,
        payload: &[u8],
        signature: Option<&str>,
    ) -> AppResult<WebhookOutcome> {
        if let Err(e) = self.verify(payload, signature) {
            warn!(
                "Webhook signature rejected: gateway={}, error={}",
                self.gateway().gateway_type(),
                e
            );
            return Err(e);
        }

        let event = self.gateway().parse_webhook_event(payload)?;

        let claim = match self.index.claim(&event.id) {
            Ok(claim) => claim,
            Err(_) => {
                info!(
                    "Duplicate webhook event skipped: id={}, type={}",
                    event.id, event.event_type
                );
                return Ok(WebhookOutcome::Duplicate { event_id: event.id });
            }
        };

        // Dropping `claim` on any path but commit releases it, including when this
        // future is dropped mid-dispatch or the handler panics
        match self.service.handle_event(ctx, &event).await {
            Ok(()) => {
                claim.commit();
                info!(
                    "Webhook event processed: id={}, type={}",
                    event.id, event.event_type
                );
                Ok(WebhookOutcome::Processed(event))
            }
            Err(e) => {
                drop(claim);
                self.reporter.report(&event, &e);
                Ok(WebhookOutcome::HandlerFailed {
                    event_id: event.id,
                    error: e,
                })
            }
        }
    }
}
