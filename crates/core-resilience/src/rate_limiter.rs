//! Reboot rate limiting
//!
//! Keeps a sliding window of physical reboot timestamps. When the number of
//! reboots inside the trailing window reaches the configured threshold, a pause
//! deadline is established. The pause expires lazily: nothing ever clears it,
//! [`RebootRateLimiter::is_paused`] simply compares against `now`.

use crate::clock::deadline_after;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

/// Thresholds for the sliding window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Number of reboots inside `window` that triggers a pause
    pub max_reboots: u32,
    /// Length of the trailing window
    pub window: Duration,
    /// How long physical reboots stay suppressed once the threshold is hit
    pub pause: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_reboots: 5,
            window: Duration::from_secs(2 * 3600),
            pause: Duration::from_secs(20 * 3600),
        }
    }
}

/// Result of recording a reboot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitVerdict {
    /// `true` when this reboot pushed the window to the threshold
    pub paused_now: bool,
    /// The newly established pause deadline, if any
    pub pause_until: Option<Instant>,
}

/// Sliding-window counter over reboot timestamps plus the derived pause state
#[derive(Debug, Default, Clone)]
pub struct RebootRateLimiter {
    /// Reboot timestamps in insertion order; only `[now - window, now]` survives a prune
    reboots: VecDeque<Instant>,
    pause_until: Option<Instant>,
}

impl RebootRateLimiter {
    /// Empty window, no pause
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reboot at `now` and decide whether a pause starts.
    ///
    /// # Arguments
    ///
    /// * `now` - timestamp of the power cycle just issued
    /// * `config` - threshold, window and pause length from the current snapshot
    ///
    /// The append, the prune and the threshold check happen in one call so a
    /// caller holding `&mut self` can never observe a half-updated window.
    /// Pause deadlines saturate instead of overflowing.
    pub fn record_and_check(&mut self, now: Instant, config: &RateLimitConfig) -> RateLimitVerdict {
        self.reboots.push_back(now);
        self.prune(now, config.window);

        if self.reboots.len() >= config.max_reboots as usize {
            let until = deadline_after(now, config.pause);
            debug!(
                "{} reboots inside {}s window; pausing reboots for {}s",
                self.reboots.len(),
                config.window.as_secs(),
                config.pause.as_secs()
            );
            self.pause_until = Some(until);
            RateLimitVerdict {
                paused_now: true,
                pause_until: Some(until),
            }
        } else {
            RateLimitVerdict {
                paused_now: false,
                pause_until: None,
            }
        }
    }

    /// `true` while `now` is before the stored pause deadline
    pub fn is_paused(&self, now: Instant) -> bool {
        self.pause_until.is_some_and(|until| now < until)
    }

    /// Time left in the current pause, `None` once it has lapsed
    pub fn remaining_pause(&self, now: Instant) -> Option<Duration> {
        self.pause_until
            .filter(|until| now < *until)
            .map(|until| until - now)
    }

    /// The stored pause deadline, expired or not
    pub fn pause_until(&self) -> Option<Instant> {
        self.pause_until
    }

    /// Number of reboots recorded inside the trailing `window`
    pub fn reboots_in_window(&mut self, now: Instant, window: Duration) -> usize {
        self.prune(now, window);
        self.reboots.len()
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.reboots.front() {
            if now.saturating_duration_since(*oldest) > window {
                self.reboots.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RateLimitConfig {
        RateLimitConfig {
            max_reboots: 5,
            window: Duration::from_secs(7200),
            pause: Duration::from_secs(72000),
        }
    }

    #[test]
    fn test_fifth_reboot_in_window_pauses() {
        let mut limiter = RebootRateLimiter::new();
        let start = Instant::now();

        for i in 0..4 {
            let verdict = limiter.record_and_check(start + Duration::from_secs(i * 60), &config());
            assert!(!verdict.paused_now);
            assert!(verdict.pause_until.is_none());
        }

        let fifth = start + Duration::from_secs(300);
        let verdict = limiter.record_and_check(fifth, &config());
        assert!(verdict.paused_now);
        assert_eq!(verdict.pause_until, Some(fifth + Duration::from_secs(72000)));
        assert!(limiter.is_paused(fifth));
    }

    #[test]
    fn test_old_reboots_are_pruned() {
        let mut limiter = RebootRateLimiter::new();
        let start = Instant::now();

        for i in 0..4 {
            limiter.record_and_check(start + Duration::from_secs(i), &config());
        }

        // Everything above is now more than two hours old.
        let later = start + Duration::from_secs(7200 + 10);
        let verdict = limiter.record_and_check(later, &config());
        assert!(!verdict.paused_now);
        assert_eq!(limiter.reboots_in_window(later, config().window), 1);
    }

    #[test]
    fn test_window_boundary_is_inclusive() {
        let mut limiter = RebootRateLimiter::new();
        let start = Instant::now();
        limiter.record_and_check(start, &config());

        assert_eq!(
            limiter.reboots_in_window(start + Duration::from_secs(7200), config().window),
            1
        );
        assert_eq!(
            limiter.reboots_in_window(start + Duration::from_secs(7201), config().window),
            0
        );
    }

    #[test]
    fn test_pause_expires_lazily() {
        let mut limiter = RebootRateLimiter::new();
        let start = Instant::now();
        let cfg = RateLimitConfig {
            max_reboots: 1,
            ..config()
        };

        limiter.record_and_check(start, &cfg);
        assert!(limiter.is_paused(start + Duration::from_secs(71999)));
        assert_eq!(
            limiter.remaining_pause(start + Duration::from_secs(71000)),
            Some(Duration::from_secs(1000))
        );

        let expiry = start + Duration::from_secs(72000);
        assert!(!limiter.is_paused(expiry));
        assert_eq!(limiter.remaining_pause(expiry), None);
        // Deadline is retained, just no longer in the future.
        assert!(limiter.pause_until().is_some());
    }

    #[test]
    fn test_huge_pause_does_not_overflow() {
        let mut limiter = RebootRateLimiter::new();
        let now = Instant::now();
        let cfg = RateLimitConfig {
            max_reboots: 1,
            pause: Duration::from_secs(u64::MAX / 2),
            ..config()
        };

        let verdict = limiter.record_and_check(now, &cfg);

        assert!(verdict.paused_now);
        assert!(limiter.is_paused(now + Duration::from_secs(365 * 24 * 3600)));
        assert!(limiter.remaining_pause(now).is_some());
    }

    #[test]
    fn test_unpaused_limiter() {
        let limiter = RebootRateLimiter::new();
        let now = Instant::now();
        assert!(!limiter.is_paused(now));
        assert!(limiter.remaining_pause(now).is_none());
    }
}
