//! Snooze gate: operator-initiated suppression with a lazily expiring deadline

use crate::clock::deadline_after;
use std::time::{Duration, Instant};

/// Deadline-based manual suppression
///
/// # Example
///
/// ```
/// use warden_core_resilience::SnoozeGate;
/// use std::time::{Duration, Instant};
///
/// let mut gate = SnoozeGate::new();
/// let now = Instant::now();
/// gate.snooze(now, Duration::from_secs(3600));
/// assert!(gate.is_active(now));
/// assert!(!gate.is_active(now + Duration::from_secs(3600)));
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct SnoozeGate {
    deadline: Option<Instant>,
}

impl SnoozeGate {
    /// Gate with no deadline
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress until `now + duration`, replacing any previous deadline.
    ///
    /// A zero duration ends an active snooze immediately. Durations too large
    /// for an `Instant` saturate to a far-future deadline.
    pub fn snooze(&mut self, now: Instant, duration: Duration) -> Instant {
        let deadline = deadline_after(now, duration);
        self.deadline = Some(deadline);
        deadline
    }

    /// `true` while `now` is before the deadline
    pub fn is_active(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now < deadline)
    }

    /// Time left, `None` once the deadline has passed
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .filter(|deadline| now < *deadline)
            .map(|deadline| deadline - now)
    }

    /// Stored deadline, expired or not
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}
