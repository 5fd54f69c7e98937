//! Webhook ingestion: normalized events, idempotency, and the processing pipeline

pub mod engine;
pub mod events;
pub mod idempotency;

pub use engine::{FailureReporter, TracingFailureReporter, WebhookEngine, WebhookOutcome};
pub use events::{EventType, WebhookEvent};
pub use idempotency::{Claim, ClaimGuard, IdempotencyIndex};
