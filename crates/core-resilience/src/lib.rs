//! Warden Core Resilience: Pure-logic guard primitives
//!
//! # Overview
//!
//! Building blocks for the uplink watchdog that carry no knowledge of
//! networks, relays or messaging providers:
//!
//! - **Clock**: the single injectable time source (system or manual)
//! - **Reboot Rate Limiter**: sliding window over physical reboots with a lazily
//!   expiring pause deadline
//! - **Snooze Gate**: operator-initiated suppression deadline, same expiry policy
//! - **Ring Buffer**: bounded, drop-oldest history of recent records
//!
//! # Key Principles
//!
//! Every time-dependent operation takes `now` as an argument (or reads it from a
//! [`Clock`]), so callers can drive the state machines deterministically in tests.
//! Deadlines are never actively cleared; they expire by comparison.
//!
//! ```text
//!   power cycle ──> RebootRateLimiter::record_and_check(now)
//!                          │
//!                  count >= threshold?
//!                          │ yes
//!                          ▼
//!                 pause_until = now + pause
//!
//!   monitor tick ──> is_paused(now)?  snooze.is_active(now)?
//! ```
//!
//! # Example
//!
//! ```
//! use warden_core_resilience::{RateLimitConfig, RebootRateLimiter};
//! use std::time::{Duration, Instant};
//!
//! let config = RateLimitConfig {
//!     max_reboots: 2,
//!     window: Duration::from_secs(7200),
//!     pause: Duration::from_secs(72000),
//! };
//!
//! let mut limiter = RebootRateLimiter::new();
//! let now = Instant::now();
//! assert!(!limiter.record_and_check(now, &config).paused_now);
//! assert!(limiter.record_and_check(now, &config).paused_now);
//! assert!(limiter.is_paused(now));
//! ```

pub mod clock;
pub mod rate_limiter;
pub mod ring_buffer;
pub mod snooze;

pub use clock::{deadline_after, Clock, ManualClock, SystemClock, MAX_DEADLINE_HORIZON};
pub use rate_limiter::{RateLimitConfig, RateLimitVerdict, RebootRateLimiter};
pub use ring_buffer::{RingBuffer, RingBufferStats};
pub use snooze::SnoozeGate;

/// Prelude module for convenient imports
pub mod prelude {
    pub use super::clock::{Clock, ManualClock, SystemClock};
    pub use super::rate_limiter::{RateLimitConfig, RateLimitVerdict, RebootRateLimiter};
    pub use super::ring_buffer::RingBuffer;
    pub use super::snooze::SnoozeGate;
}
