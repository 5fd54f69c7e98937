//! Payment domain records
//!
//! Plain value objects shared by the orchestration layer and every gateway
//! adapter. Adapters populate them from provider responses.

use crate::error::{AppResult, ConfigurationError, DomainError, ValidationError};
use crate::payments::money::{Currency, Money};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Tag identifying which processor an adapter or event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    Stripe,
    PayPal,
    Adyen,
    Mock,
}

impl GatewayKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayKind::Stripe => "stripe",
            GatewayKind::PayPal => "paypal",
            GatewayKind::Adyen => "adyen",
            GatewayKind::Mock => "mock",
        }
    }
}

impl fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GatewayKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stripe" => Ok(GatewayKind::Stripe),
            "paypal" => Ok(GatewayKind::PayPal),
            "adyen" => Ok(GatewayKind::Adyen),
            "mock" => Ok(GatewayKind::Mock),
            "" => Err(ConfigurationError::GatewayNotConfigured {
                gateway: String::new(),
            }),
            other => Err(ConfigurationError::UnsupportedGateway {
                gateway: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<Address>,
    pub default_payment_method: Option<String>,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateCustomerRequest {
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<Address>,
    pub metadata: HashMap<String, String>,
}

/// Partial update; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCustomerRequest {
    pub email: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<Address>,
    pub default_payment_method: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardBrand {
    Visa,
    Mastercard,
    Amex,
    Discover,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDetails {
    pub brand: CardBrand,
    pub last4: String,
    pub exp_month: u32,
    pub exp_year: i32,
}

impl CardDetails {
    /// A card is valid through the last day of its expiry month
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        use chrono::Datelike;
        let (year, month) = (now.year(), now.month());
        self.exp_year < year || (self.exp_year == year && self.exp_month < month)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodType {
    Card,
    Wallet,
    BankAccount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: String,
    pub customer_id: Option<String>,
    pub method_type: PaymentMethodType,
    pub card: Option<CardDetails>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMethod {
    #[default]
    Automatic,
    Manual,
}

/// Payment intent lifecycle
///
/// `requires_payment_method -> requires_action -> processing -> succeeded | failed | canceled`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    RequiresPaymentMethod,
    RequiresAction,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl PaymentIntentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentIntentStatus::Succeeded
                | PaymentIntentStatus::Failed
                | PaymentIntentStatus::Canceled
        )
    }

    pub fn can_transition_to(&self, next: PaymentIntentStatus) -> bool {
        use PaymentIntentStatus::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (RequiresPaymentMethod, RequiresAction | Processing | Succeeded | Failed | Canceled) => {
                true
            }
            (RequiresAction, Processing | Succeeded | Failed | Canceled) => true,
            (Processing, Succeeded | Failed | Canceled) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentIntentStatus::RequiresPaymentMethod => "requires_payment_method",
            PaymentIntentStatus::RequiresAction => "requires_action",
            PaymentIntentStatus::Processing => "processing",
            PaymentIntentStatus::Succeeded => "succeeded",
            PaymentIntentStatus::Failed => "failed",
            PaymentIntentStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for PaymentIntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub gateway: GatewayKind,
    pub customer_id: Option<String>,
    pub payment_method_id: Option<String>,
    pub amount: Money,
    pub captured_amount: Money,
    pub refunded_amount: Money,
    pub status: PaymentIntentStatus,
    pub capture_method: CaptureMethod,
    pub requires_sca: bool,
    pub sca_redirect_url: Option<String>,
    pub failure_reason: Option<String>,
    pub description: Option<String>,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentIntent {
    pub fn new(id: impl Into<String>, gateway: GatewayKind, amount: Money) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            gateway,
            customer_id: None,
            payment_method_id: None,
            amount,
            captured_amount: Money::zero(amount.currency),
            refunded_amount: Money::zero(amount.currency),
            status: PaymentIntentStatus::RequiresPaymentMethod,
            capture_method: CaptureMethod::Automatic,
            requires_sca: false,
            sca_redirect_url: None,
            failure_reason: None,
            description: None,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn currency(&self) -> Currency {
        self.amount.currency
    }

    /// `captured - refunded`, floored at zero
    pub fn refundable_amount(&self) -> Money {
        match self.captured_amount.sub(&self.refunded_amount) {
            Ok(remaining) if remaining.amount > 0 => remaining,
            _ => Money::zero(self.currency()),
        }
    }

    pub fn can_refund(&self) -> bool {
        self.status == PaymentIntentStatus::Succeeded && self.refundable_amount().is_positive()
    }

    /// Move to `next`, refusing transitions out of a terminal status
    pub fn transition(&mut self, next: PaymentIntentStatus, action: &str) -> AppResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidIntentState {
                status: self.status.to_string(),
                action: action.to_string(),
            }
            .into());
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Capture `amount` (or the full requested amount) and settle the intent
    pub fn capture(&mut self, amount: Option<Money>) -> AppResult<()> {
        let amount = amount.unwrap_or(self.amount);
        let uncaptured = self.amount.sub(&amount)?;
        if !amount.is_positive() || uncaptured.amount < 0 {
            return Err(ValidationError::InvalidRequest {
                message: format!("capture amount {} must be within {}", amount, self.amount),
            }
            .into());
        }
        self.transition(PaymentIntentStatus::Succeeded, "capture")?;
        self.captured_amount = amount;
        Ok(())
    }

    /// Record a refund against the captured funds
    pub fn apply_refund(&mut self, amount: &Money) -> AppResult<()> {
        if self.status != PaymentIntentStatus::Succeeded {
            return Err(DomainError::InvalidIntentState {
                status: self.status.to_string(),
                action: "refund".to_string(),
            }
            .into());
        }
        let refundable = self.refundable_amount();
        let remaining = refundable.sub(amount)?;
        if remaining.amount < 0 {
            return Err(DomainError::RefundExceedsRefundable {
                requested: amount.to_string(),
                refundable: refundable.to_string(),
            }
            .into());
        }
        self.refunded_amount = self.refunded_amount.add(amount)?;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreatePaymentIntentRequest {
    pub customer_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub payment_method_id: Option<String>,
    pub capture_method: CaptureMethod,
    pub description: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfirmPaymentIntentRequest {
    pub payment_method_id: Option<String>,
    pub return_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Succeeded,
    Failed,
}

impl RefundStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RefundStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Pending => "pending",
            RefundStatus::Succeeded => "succeeded",
            RefundStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    pub payment_intent_id: String,
    pub amount: Money,
    pub status: RefundStatus,
    pub reason: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Refund {
    /// Refunds are frozen once they reach `succeeded` or `failed`
    pub fn transition(&mut self, next: RefundStatus, failure_reason: Option<String>) -> AppResult<()> {
        if self.status.is_terminal() {
            return Err(DomainError::RefundFinalized {
                id: self.id.clone(),
                status: self.status.as_str().to_string(),
            }
            .into());
        }
        self.status = next;
        self.failure_reason = failure_reason;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateRefundRequest {
    pub payment_intent_id: String,
    pub amount: i64,
    pub currency: String,
    pub reason: Option<String>,
}
