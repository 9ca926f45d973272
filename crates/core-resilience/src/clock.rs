//! Injectable time source
//!
//! All deadline arithmetic in the watchdog reads "now" from a [`Clock`] and all
//! suspension points go through [`Clock::sleep`]. Production code uses
//! [`SystemClock`]; tests use [`ManualClock`], whose `sleep` advances virtual
//! time and returns immediately.

use async_trait::async_trait;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Longest span a deadline is ever pushed into the future (about a century)
pub const MAX_DEADLINE_HORIZON: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// `now + duration`, saturating instead of overflowing.
///
/// Spans beyond [`MAX_DEADLINE_HORIZON`] are clipped to it, and the span keeps
/// halving until the platform's `Instant` can represent the result.
///
/// # Example
///
/// ```
/// use warden_core_resilience::clock::deadline_after;
/// use std::time::{Duration, Instant};
///
/// let now = Instant::now();
/// assert_eq!(deadline_after(now, Duration::from_secs(60)), now + Duration::from_secs(60));
/// assert!(deadline_after(now, Duration::MAX) > now);
/// ```
pub fn deadline_after(now: Instant, duration: Duration) -> Instant {
    let mut span = duration.min(MAX_DEADLINE_HORIZON);
    loop {
        if let Some(deadline) = now.checked_add(span) {
            return deadline;
        }
        span /= 2;
    }
}

/// Source of monotonic time and suspension
#[async_trait]
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current monotonic instant
    fn now(&self) -> Instant;

    /// Suspend the calling task for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock backed implementation using `tokio::time`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a clock backed by the runtime timer
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Manually driven clock for deterministic tests
///
/// Time only moves when [`ManualClock::advance`] or [`Clock::sleep`] is called.
///
/// # Example
///
/// ```
/// use warden_core_resilience::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// let start = clock.now();
/// clock.advance(Duration::from_secs(90));
/// assert_eq!(clock.now() - start, Duration::from_secs(90));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Start virtual time at the real `Instant::now()`
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move virtual time forward, stopping at [`MAX_DEADLINE_HORIZON`]
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset = offset.saturating_add(by).min(MAX_DEADLINE_HORIZON);
    }

    /// Total virtual time elapsed since construction
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        deadline_after(self.origin, self.elapsed())
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        // Let other tasks observe the new time before we continue.
        tokio::task::yield_now().await;
    }
}
