//! Per-entity alert rate limiting.
//!
//! [`CooldownGate`] tracks when each entity last had an alert delivered and
//! refuses new dispatches until the window has strictly elapsed. Only
//! successful deliveries consume the window: a caller reserves the entity
//! with [`CooldownGate::try_acquire`], and either commits the returned
//! [`CooldownPermit`] after a successful send or drops it to release the
//! reservation untouched.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::types::Timestamp;

/// Default minimum interval between two delivered alerts for one entity.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(1800); // 30 minutes

#[derive(Debug, Default)]
struct CooldownEntry {
    last_alert: Option<Timestamp>,
    /// A permit for this entity is outstanding.
    in_flight: bool,
}

/// Process-wide cooldown state, keyed by entity name.
///
/// Intended to be shared behind an `Arc` by every alert pipeline task.
#[derive(Debug)]
pub struct CooldownGate {
    window: Duration,
    entries: Mutex<HashMap<String, CooldownEntry>>,
}

impl CooldownGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether a dispatch for `entity` would be permitted at `now`.
    pub fn may_dispatch(&self, entity: &str, now: Timestamp) -> bool {
        self.entries()
            .get(entity)
            .map_or(true, |entry| !entry.in_flight && self.window_elapsed(entry, now))
    }

    /// Atomically check the window and reserve `entity` for one dispatch.
    ///
    /// Returns `None` if the entity is still cooling down or another
    /// dispatch for it is in flight.
    pub fn try_acquire(&self, entity: &str, now: Timestamp) -> Option<CooldownPermit<'_>> {
        let mut entries = self.entries();
        let entry = entries.entry(entity.to_string()).or_default();
        if entry.in_flight || !self.window_elapsed(entry, now) {
            return None;
        }
        entry.in_flight = true;

        Some(CooldownPermit {
            gate: self,
            entity: entity.to_string(),
            committed: false,
        })
    }

    /// Record a successful dispatch for `entity` at `now`.
    pub fn record_dispatch(&self, entity: &str, now: Timestamp) {
        self.entries()
            .entry(entity.to_string())
            .or_default()
            .last_alert = Some(now);
    }

    /// Forget everything about `entity`, as if it had never alerted.
    ///
    /// Returns `true` if an entry was removed.
    pub fn reset(&self, entity: &str) -> bool {
        let removed = self.entries().remove(entity).is_some();
        if removed {
            tracing::info!(entity, "Cooldown reset");
        }
        removed
    }

    /// Snapshot of the cooldown state of `entity` at `now`.
    pub fn status(&self, entity: &str, now: Timestamp) -> CooldownStatus {
        let entries = self.entries();
        let entry = entries.get(entity);
        let last_alert_time = entry.and_then(|e| e.last_alert);
        let in_flight = entry.is_some_and(|e| e.in_flight);

        let time_elapsed = last_alert_time.map(|last| elapsed(last, now));
        let time_remaining = time_elapsed
            .map(|e| self.window.saturating_sub(e))
            .unwrap_or(Duration::ZERO);
        let in_cooldown = time_elapsed.is_some_and(|e| e <= self.window);

        CooldownStatus {
            entity: entity.to_string(),
            in_cooldown,
            last_alert_time,
            time_elapsed,
            time_remaining,
            can_send_alert: !in_cooldown && !in_flight,
        }
    }

    fn window_elapsed(&self, entry: &CooldownEntry, now: Timestamp) -> bool {
        entry
            .last_alert
            .map_or(true, |last| elapsed(last, now) > self.window)
    }

    /// Clear the reservation on `entity`, recording a dispatch if one happened.
    fn release(&self, entity: &str, dispatched_at: Option<Timestamp>) {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(entity) else {
            // Reset while in flight; only a delivered alert recreates the entry.
            if let Some(at) = dispatched_at {
                entries.insert(
                    entity.to_string(),
                    CooldownEntry {
                        last_alert: Some(at),
                        in_flight: false,
                    },
                );
            }
            return;
        };

        entry.in_flight = false;
        if dispatched_at.is_some() {
            entry.last_alert = dispatched_at;
        }
        if entry.last_alert.is_none() {
            entries.remove(entity);
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CooldownEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CooldownGate {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

/// Time since `last`; a clock that went backwards counts as zero.
fn elapsed(last: Timestamp, now: Timestamp) -> Duration {
    now.signed_duration_since(last)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

// ---------------------------------------------------------------------------
// CooldownPermit
// ---------------------------------------------------------------------------

/// Exclusive reservation of one entity for one dispatch.
///
/// Dropping the permit without calling [`commit`](Self::commit) releases the
/// reservation and leaves the cooldown timestamp untouched.
#[must_use = "dropping the permit immediately releases the reservation"]
#[derive(Debug)]
pub struct CooldownPermit<'a> {
    gate: &'a CooldownGate,
    entity: String,
    committed: bool,
}

impl CooldownPermit<'_> {
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Record a successful dispatch at `now` and release the reservation.
    pub fn commit(mut self, now: Timestamp) {
        self.committed = true;
        self.gate.release(&self.entity, Some(now));
    }
}

impl Drop for CooldownPermit<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.gate.release(&self.entity, None);
        }
    }
}

// ---------------------------------------------------------------------------
// CooldownStatus
// ---------------------------------------------------------------------------

/// Operator-facing view of one entity's cooldown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CooldownStatus {
    pub entity: String,
    /// Dispatch would be blocked by the window (boundary inclusive).
    pub in_cooldown: bool,
    pub last_alert_time: Option<Timestamp>,
    #[serde(rename = "time_elapsed_secs", serialize_with = "secs_opt")]
    pub time_elapsed: Option<Duration>,
    #[serde(rename = "time_remaining_secs", serialize_with = "secs")]
    pub time_remaining: Duration,
    pub can_send_alert: bool,
}

fn secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

fn secs_opt<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => s.serialize_some(&d.as_secs_f64()),
        None => s.serialize_none(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
