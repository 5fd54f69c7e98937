//! Sliding-window admission control
//!
//! Payments are limited per customer key over a rolling hour, refunds globally
//! over a rolling day. Each key keeps the timestamps of its admitted calls; a
//! call is admitted when fewer than `limit` of them fall inside the window.
//! Keys whose windows have drained are swept out during payment checks, at
//! most once per [`SWEEP_INTERVAL_SECS`].

use crate::error::{AppResult, RateLimitError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Minimum spacing between sweeps of drained payment keys
pub const SWEEP_INTERVAL_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Per customer key, rolling hour; 0 disables the check
    pub max_payments_per_hour: u32,
    /// Global, rolling day; 0 disables the check
    pub max_refunds_per_day: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_payments_per_hour: 100,
            max_refunds_per_day: 1000,
        }
    }
}

#[derive(Debug, Default)]
struct PaymentWindows {
    keys: HashMap<String, VecDeque<DateTime<Utc>>>,
    last_sweep: Option<DateTime<Utc>>,
}

impl PaymentWindows {
    fn sweep_due(&self, now: DateTime<Utc>) -> bool {
        self.last_sweep
            .map_or(true, |at| now - at >= Duration::seconds(SWEEP_INTERVAL_SECS))
    }

    /// Drop every key with no timestamp left inside the window ending at `now`
    fn sweep(&mut self, window: Duration, now: DateTime<Utc>) {
        let cutoff = now - window;
        let before = self.keys.len();
        self.keys
            .retain(|_, timestamps| timestamps.back().is_some_and(|last| *last > cutoff));
        self.last_sweep = Some(now);

        let evicted = before - self.keys.len();
        if evicted > 0 {
            debug!("Evicted {} idle payment rate limit keys", evicted);
        }
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    payments: RwLock<PaymentWindows>,
    refunds: RwLock<VecDeque<DateTime<Utc>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            payments: RwLock::new(PaymentWindows::default()),
            refunds: RwLock::new(VecDeque::new()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(RateLimitConfig {
            enabled: false,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Admit one payment for `customer_key` or fail with a rate-limit error
    pub async fn check_payment(&self, customer_key: &str) -> AppResult<()> {
        self.check_payment_at(customer_key, Utc::now()).await
    }

    /// Admit one refund against the global budget
    pub async fn check_refund(&self) -> AppResult<()> {
        self.check_refund_at(Utc::now()).await
    }

    pub(crate) async fn check_payment_at(&self, customer_key: &str, now: DateTime<Utc>) -> AppResult<()> {
        let limit = self.config.max_payments_per_hour;
        if !self.config.enabled || limit == 0 {
            return Ok(());
        }

        let window = Duration::hours(1);
        let mut payments = self.payments.write().await;
        if payments.sweep_due(now) {
            payments.sweep(window, now);
        }
        let timestamps = payments.keys.entry(customer_key.to_string()).or_default();
        if admit(timestamps, limit, window, now) {
            return Ok(());
        }

        warn!(
            "Payment rate limit exceeded: key={}, limit={}/hour",
            customer_key, limit
        );
        Err(RateLimitError::PaymentsExceeded {
            key: customer_key.to_string(),
            limit,
        }
        .into())
    }

    pub(crate) async fn check_refund_at(&self, now: DateTime<Utc>) -> AppResult<()> {
        let limit = self.config.max_refunds_per_day;
        if !self.config.enabled || limit == 0 {
            return Ok(());
        }

        let mut refunds = self.refunds.write().await;
        if admit(&mut refunds, limit, Duration::days(1), now) {
            return Ok(());
        }

        warn!("Global refund rate limit exceeded: limit={}/day", limit);
        Err(RateLimitError::RefundsExceeded { limit }.into())
    }

    /// Calls admitted for `customer_key` inside the current hour
    pub async fn payments_in_window(&self, customer_key: &str) -> usize {
        let cutoff = Utc::now() - Duration::hours(1);
        let payments = self.payments.read().await;
        payments
            .keys
            .get(customer_key)
            .map(|window| window.iter().filter(|at| **at > cutoff).count())
            .unwrap_or(0)
    }

    /// Customer keys currently tracked, drained or not
    pub async fn tracked_keys(&self) -> usize {
        self.payments.read().await.keys.len()
    }
}

/// Evict timestamps older than `window` and record `now` if there is room
fn admit(
    timestamps: &mut VecDeque<DateTime<Utc>>,
    limit: u32,
    window: Duration,
    now: DateTime<Utc>,
) -> bool {
    let cutoff = now - window;
    while timestamps.front().is_some_and(|at| *at <= cutoff) {
        timestamps.pop_front();
    }
    if timestamps.len() >= limit as usize {
        return false;
    }
    timestamps.push_back(now);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_payments: u32, max_refunds: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            enabled: true,
            max_payments_per_hour: max_payments,
            max_refunds_per_day: max_refunds,
        })
    }

    #[tokio::test]
    async fn test_third_payment_in_window_is_rejected() {
        let limiter = limiter(2, 10);
        assert!(limiter.check_payment("cus_a").await.is_ok());
        assert!(limiter.check_payment("cus_a").await.is_ok());

        let err = limiter.check_payment("cus_a").await.unwrap_err();
        assert!(err.is_rate_limited());

        // Other customers have their own window
        assert!(limiter.check_payment("cus_b").await.is_ok());
    }

    #[tokio::test]
    async fn test_window_slides() {
        let limiter = limiter(2, 10);
        let start = Utc::now();
        limiter.check_payment_at("cus", start).await.unwrap();
        limiter
            .check_payment_at("cus", start + Duration::minutes(30))
            .await
            .unwrap();
        assert!(limiter
            .check_payment_at("cus", start + Duration::minutes(59))
            .await
            .is_err());

        // First call falls out of the window
        assert!(limiter
            .check_payment_at("cus", start + Duration::minutes(61))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_refunds_are_global() {
        let limiter = limiter(10, 1);
        let start = Utc::now();
        assert!(limiter.check_refund_at(start).await.is_ok());
        assert!(limiter.check_refund_at(start).await.unwrap_err().is_rate_limited());
        assert!(limiter
            .check_refund_at(start + Duration::days(1) + Duration::seconds(1))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_disabled_never_rejects() {
        let limiter = RateLimiter::new(RateLimitConfig {
            enabled: false,
            max_payments_per_hour: 1,
            max_refunds_per_day: 1,
        });
        for _ in 0..50 {
            assert!(limiter.check_payment("cus").await.is_ok());
            assert!(limiter.check_refund().await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_drained_keys_are_swept_on_write() {
        let limiter = limiter(5, 5);
        let old = Utc::now() - Duration::days(2);
        for i in 0..10_000 {
            limiter
                .check_payment_at(&format!("cus_{}", i), old)
                .await
                .unwrap();
        }
        assert_eq!(limiter.tracked_keys().await, 10_000);

        limiter.check_payment("fresh").await.unwrap();
        assert_eq!(limiter.tracked_keys().await, 1);
        assert_eq!(limiter.payments_in_window("fresh").await, 1);
    }

    #[tokio::test]
    async fn test_sweep_is_spaced_and_keeps_live_keys() {
        let limiter = limiter(5, 5);
        let start = Utc::now();
        limiter.check_payment_at("a", start).await.unwrap();
        let swept = start + Duration::minutes(59) + Duration::seconds(30);
        limiter.check_payment_at("b", swept).await.unwrap();
        assert_eq!(limiter.tracked_keys().await, 2);

        // "a" has drained, but the previous sweep ran 40 seconds ago
        let soon = start + Duration::minutes(60) + Duration::seconds(10);
        limiter.check_payment_at("c", soon).await.unwrap();
        assert_eq!(limiter.tracked_keys().await, 3);

        let due = swept + Duration::seconds(SWEEP_INTERVAL_SECS);
        limiter.check_payment_at("d", due).await.unwrap();
        assert_eq!(limiter.tracked_keys().await, 3);
        assert_eq!(limiter.payments_in_window("a").await, 0);
        assert_eq!(limiter.payments.read().await.last_sweep, Some(due));
    }
}
