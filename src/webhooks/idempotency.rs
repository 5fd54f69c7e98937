//! In-memory webhook idempotency index
//!
//! Maps event identifiers to the time they were first seen. An identifier is
//! claimed under the write lock before dispatch, so two concurrent deliveries of
//! the same event can never both dispatch. A claim is either promoted to
//! processed (dispatch succeeded) or released (dispatch failed, was dropped or
//! panicked; retry allowed).
//!
//! In-flight claims carry a short lease separate from the processed retention,
//! so a claim whose owner vanished without releasing it stops suppressing
//! retries once the lease runs out.
//!
//! The map sits behind a `std::sync::RwLock`: no critical section awaits, and
//! [`ClaimGuard`] must be able to release from `Drop`.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

/// How long processed identifiers suppress re-dispatch
pub const DEFAULT_RETENTION_HOURS: i64 = 24;

/// How long an unreleased in-flight claim blocks other deliveries
pub const DEFAULT_IN_FLIGHT_LEASE_SECS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    InFlight,
    Processed,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    first_seen: DateTime<Utc>,
    state: EntryState,
}

/// Outcome of trying to claim an identifier for dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// Caller owns the dispatch and must `mark_processed` or `release`
    Acquired,
    /// Already processed inside the retention window
    AlreadyProcessed,
    /// Another delivery of the same identifier is dispatching right now
    InFlight,
}

/// Owned in-flight claim
///
/// Dropping the guard without calling [`ClaimGuard::commit`] releases the
/// claim, whether the dispatch failed, panicked or its future was dropped.
#[derive(Debug)]
pub struct ClaimGuard<'a> {
    index: &'a IdempotencyIndex,
    event_id: String,
    claimed_at: DateTime<Utc>,
    committed: bool,
}

impl ClaimGuard<'_> {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    /// Promote the claim to processed
    pub fn commit(mut self) {
        self.committed = true;
        self.index.mark_processed(&self.event_id);
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if self.index.release_claim(&self.event_id, self.claimed_at) {
            debug!("Released webhook claim: id={}", self.event_id);
        }
    }
}

#[derive(Debug)]
pub struct IdempotencyIndex {
    entries: RwLock<HashMap<String, Entry>>,
    retention: Duration,
    in_flight_lease: Duration,
}

impl Default for IdempotencyIndex {
    fn default() -> Self {
        Self::new(Duration::hours(DEFAULT_RETENTION_HOURS))
    }
}

impl IdempotencyIndex {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            retention,
            in_flight_lease: Duration::seconds(DEFAULT_IN_FLIGHT_LEASE_SECS).min(retention),
        }
    }

    pub fn with_in_flight_lease(mut self, lease: Duration) -> Self {
        self.in_flight_lease = lease;
        self
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn in_flight_lease(&self) -> Duration {
        self.in_flight_lease
    }

    /// Read-only lookup; many verifications can run this in parallel
    pub fn is_processed(&self, event_id: &str) -> bool {
        matches!(
            self.read().get(event_id),
            Some(Entry {
                state: EntryState::Processed,
                ..
            })
        )
    }

    pub fn try_claim(&self, event_id: &str) -> Claim {
        self.try_claim_at(event_id, Utc::now())
    }

    pub(crate) fn try_claim_at(&self, event_id: &str, now: DateTime<Utc>) -> Claim {
        // Fast path under the shared lock: retries of processed events are the common case
        if let Some(claim) = self.read().get(event_id).and_then(|e| self.held(e, now)) {
            return claim;
        }

        let mut entries = self.write();
        if let Some(claim) = entries.get(event_id).and_then(|e| self.held(e, now)) {
            return claim;
        }
        if let Some(stale) = entries.get(event_id) {
            if stale.state == EntryState::InFlight {
                warn!(
                    "Reclaiming webhook claim past its lease: id={}, claimed_at={}",
                    event_id, stale.first_seen
                );
            }
        }
        entries.insert(
            event_id.to_string(),
            Entry {
                first_seen: now,
                state: EntryState::InFlight,
            },
        );
        Claim::Acquired
    }

    /// Claim an identifier and hand back a guard that owns it
    ///
    /// Returns the blocking [`Claim`] when the identifier is processed or in flight.
    pub fn claim(&self, event_id: &str) -> Result<ClaimGuard<'_>, Claim> {
        self.claim_at(event_id, Utc::now())
    }

    pub(crate) fn claim_at(
        &self,
        event_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ClaimGuard<'_>, Claim> {
        match self.try_claim_at(event_id, now) {
            Claim::Acquired => Ok(ClaimGuard {
                index: self,
                event_id: event_id.to_string(),
                claimed_at: now,
                committed: false,
            }),
            blocked => Err(blocked),
        }
    }

    /// Record a successful dispatch and evict everything past its window
    pub fn mark_processed(&self, event_id: &str) {
        self.mark_processed_at(event_id, Utc::now())
    }

    pub(crate) fn mark_processed_at(&self, event_id: &str, now: DateTime<Utc>) {
        let mut entries = self.write();
        let first_seen = entries
            .get(event_id)
            .map(|entry| entry.first_seen)
            .unwrap_or(now);
        entries.insert(
            event_id.to_string(),
            Entry {
                first_seen,
                state: EntryState::Processed,
            },
        );

        let before = entries.len();
        entries.retain(|_, entry| !self.is_stale(entry, now));
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!("Evicted {} expired webhook idempotency entries", evicted);
        }
    }

    /// Drop an in-flight claim so a later retry can dispatch again
    pub fn release(&self, event_id: &str) {
        let mut entries = self.write();
        if let Some(Entry {
            state: EntryState::InFlight,
            ..
        }) = entries.get(event_id)
        {
            entries.remove(event_id);
        }
    }

    /// Release only the claim taken at `claimed_at`; a newer claim that took
    /// over after the lease ran out is left alone
    fn release_claim(&self, event_id: &str, claimed_at: DateTime<Utc>) -> bool {
        let mut entries = self.write();
        match entries.get(event_id) {
            Some(Entry {
                state: EntryState::InFlight,
                first_seen,
            }) if *first_seen == claimed_at => {
                entries.remove(event_id);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn held(&self, entry: &Entry, now: DateTime<Utc>) -> Option<Claim> {
        if self.is_stale(entry, now) {
            return None;
        }
        Some(match entry.state {
            EntryState::Processed => Claim::AlreadyProcessed,
            EntryState::InFlight => Claim::InFlight,
        })
    }

    fn is_stale(&self, entry: &Entry, now: DateTime<Utc>) -> bool {
        let window = match entry.state {
            EntryState::InFlight => self.in_flight_lease,
            EntryState::Processed => self.retention,
        };
        now - entry.first_seen >= window
    }

    // No critical section can panic, so a poisoned map is still consistent
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}
