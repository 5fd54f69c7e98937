//! Gateway-agnostic payment orchestration
//!
//! A capability interface over card processors, a webhook ingestion engine with
//! idempotent dispatch, sliding-window admission control, SCA challenges, and
//! deterministic conversion quotes.

pub mod config;
pub mod error;
pub mod payments;
pub mod quotes;
pub mod webhooks;

#[cfg(feature = "server")]
pub mod api;

pub use error::{AppError, AppErrorKind, AppResult};
