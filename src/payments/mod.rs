//! Payment gateway orchestration
//!
//! This module provides a unified interface over card processors (Stripe, PayPal,
//! Adyen, and an in-memory mock) so callers never branch on the concrete gateway.

pub mod context;
pub mod money;
pub mod providers;
pub mod rate_limit;
pub mod sca;
pub mod service;
pub mod traits;
pub mod types;

pub use context::{CancelHandle, RequestContext};
pub use money::{Currency, Money};
pub use providers::GatewayRegistry;
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use service::{PaymentService, PaymentServiceConfig};
pub use traits::{EventHandler, PaymentGateway};
pub use types::GatewayKind;
