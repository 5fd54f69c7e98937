//! Application error taxonomy
//!
//! Adapters translate provider-native failures into these kinds before they
//! reach the orchestration layer. Nothing above the capability interface ever
//! sees a provider-specific error shape.

use std::fmt;
use thiserror::Error;

/// Result type used across the crate
pub type AppResult<T> = Result<T, AppError>;

/// Gateway selection and wiring problems
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("no payment gateway is configured for '{gateway}'")]
    GatewayNotConfigured { gateway: String },

    #[error("unsupported payment gateway '{gateway}'")]
    UnsupportedGateway { gateway: String },
}

/// Request validation failures, raised before any adapter call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unsupported currency '{currency}'")]
    UnsupportedCurrency { currency: String },

    #[error("amount {amount} is below the minimum of {minimum}")]
    AmountTooSmall { amount: String, minimum: String },

    #[error("amount {amount} exceeds the maximum of {maximum}")]
    AmountTooLarge { amount: String, maximum: String },

    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: String, right: String },

    #[error("arithmetic overflow on {currency} amount")]
    AmountOverflow { currency: String },

    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
}

/// Business-rule failures reported by adapters or the domain model
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("card has expired")]
    CardExpired,

    #[error("card was declined")]
    CardDeclined,

    #[error("unsupported card brand '{brand}'")]
    UnsupportedCardBrand { brand: String },

    #[error("payment token is invalid")]
    InvalidToken,

    #[error("payment token has expired")]
    TokenExpired,

    #[error("customer '{id}' not found")]
    CustomerNotFound { id: String },

    #[error("payment method '{id}' not found")]
    PaymentMethodNotFound { id: String },

    #[error("payment intent '{id}' not found")]
    PaymentIntentNotFound { id: String },

    #[error("refund '{id}' not found")]
    RefundNotFound { id: String },

    #[error("cannot {action} a payment intent in status '{status}'")]
    InvalidIntentState { status: String, action: String },

    #[error("refund of {requested} exceeds refundable amount {refundable}")]
    RefundExceedsRefundable { requested: String, refundable: String },

    #[error("refund '{id}' is already in terminal status '{status}'")]
    RefundFinalized { id: String, status: String },
}

/// Webhook authenticity failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("webhook signature is invalid")]
    InvalidWebhookSignature,

    #[error("webhook signature header is missing")]
    MissingWebhookSignature,
}

/// Admission control rejections
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("payment rate limit exceeded for '{key}': {limit} per hour")]
    PaymentsExceeded { key: String, limit: u32 },

    #[error("refund rate limit exceeded: {limit} per day")]
    RefundsExceeded { limit: u32 },
}

/// Inbound notification parsing failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("unknown webhook event type '{event_type}'")]
    UnknownEvent { event_type: String },

    #[error("malformed webhook payload: {message}")]
    MalformedPayload { message: String },
}

/// Failures outside the core: provider transport and caller cancellation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExternalError {
    #[error("{provider} error: {message}")]
    PaymentProvider {
        provider: String,
        message: String,
        is_retryable: bool,
    },

    #[error("operation cancelled by caller")]
    Cancelled,

    #[error("caller deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AppErrorKind {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
    #[error(transparent)]
    RateLimit(#[from] RateLimitError),
    #[error(transparent)]
    Webhook(#[from] WebhookError),
    #[error(transparent)]
    External(#[from] ExternalError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub context: Option<String>,
}

impl AppError {
    pub fn new(kind: impl Into<AppErrorKind>) -> Self {
        Self {
            kind: kind.into(),
            context: None,
        }
    }

    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ValidationError::InvalidRequest {
            message: message.into(),
        })
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ExternalError::PaymentProvider {
            provider: provider.into(),
            message: message.into(),
            is_retryable: false,
        })
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self.kind, AppErrorKind::Configuration(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.kind, AppErrorKind::Validation(_))
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self.kind, AppErrorKind::RateLimit(_))
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self.kind, AppErrorKind::Authorization(_))
    }

    pub fn is_unknown_event(&self) -> bool {
        matches!(
            self.kind,
            AppErrorKind::Webhook(WebhookError::UnknownEvent { .. })
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self.kind,
            AppErrorKind::Domain(
                DomainError::CustomerNotFound { .. }
                    | DomainError::PaymentMethodNotFound { .. }
                    | DomainError::PaymentIntentNotFound { .. }
                    | DomainError::RefundNotFound { .. }
            )
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            AppErrorKind::External(ExternalError::PaymentProvider {
                is_retryable: true,
                ..
            })
        )
    }
}

macro_rules! impl_from_branch {
    ($($branch:ty),* $(,)?) => {
        $(
            impl From<$branch> for AppError {
                fn from(err: $branch) -> Self {
                    AppError::new(err)
                }
            }
        )*
    };
}

impl_from_branch!(
    ConfigurationError,
    ValidationError,
    DomainError,
    AuthorizationError,
    RateLimitError,
    WebhookError,
    ExternalError,
);

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = &self.context {
            write!(f, "{} ({})", self.kind, context)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

impl std::error::Error for AppError {}
