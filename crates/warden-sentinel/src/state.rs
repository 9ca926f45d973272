//! Shared watchdog state and the collaborator bundle
//!
//! [`WatchdogState`] owns the mutable guard state (reboot window, pause and
//! snooze deadlines) behind async mutexes so the monitor, concurrent sequences
//! and the operator surface never lose updates. [`WatchdogContext`] bundles it
//! with the policy handle, the clock and the external collaborators; it is
//! injected into every component instead of living in globals.

use crate::notify::Notifier;
use crate::policy::PolicyHandle;
use crate::probe::ConnectivityProbe;
use crate::relay::DeviceController;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use warden_core_resilience::{
    Clock, RateLimitConfig, RateLimitVerdict, RebootRateLimiter, SnoozeGate,
};

/// Mutable guard state shared by all components
#[derive(Debug, Default)]
pub struct WatchdogState {
    rate_limiter: Mutex<RebootRateLimiter>,
    snooze: Mutex<SnoozeGate>,
}

impl WatchdogState {
    /// Empty reboot window, no pause, no snooze
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a physical reboot. The window read-prune-append runs under one lock.
    pub async fn record_reboot(&self, now: Instant, config: &RateLimitConfig) -> RateLimitVerdict {
        self.rate_limiter.lock().await.record_and_check(now, config)
    }

    /// Whether a rate-limit pause is still running at `now`
    pub async fn is_paused(&self, now: Instant) -> bool {
        self.rate_limiter.lock().await.is_paused(now)
    }

    /// Time left in the rate-limit pause
    pub async fn remaining_pause(&self, now: Instant) -> Option<Duration> {
        self.rate_limiter.lock().await.remaining_pause(now)
    }

    /// Reboots inside the trailing `window`; prunes older entries
    pub async fn reboots_in_window(&self, now: Instant, window: Duration) -> usize {
        self.rate_limiter.lock().await.reboots_in_window(now, window)
    }

    /// Suppress monitoring until `now + duration`
    ///
    /// # Arguments
    ///
    /// * `now` - current time from the context clock
    /// * `duration` - snooze length; zero clears, oversized values saturate
    pub async fn snooze(&self, now: Instant, duration: Duration) -> Instant {
        self.snooze.lock().await.snooze(now, duration)
    }

    /// Whether an operator snooze is still running at `now`
    pub async fn is_snoozed(&self, now: Instant) -> bool {
        self.snooze.lock().await.is_active(now)
    }

    pub async fn remaining_snooze(&self, now: Instant) -> Option<Duration> {
        self.snooze.lock().await.remaining(now)
    }
}

/// Everything a watchdog component needs, cheap to clone
#[derive(Clone)]
pub struct WatchdogContext {
    pub policy: PolicyHandle,
    pub state: Arc<WatchdogState>,
    pub clock: Arc<dyn Clock>,
    pub probe: Arc<dyn ConnectivityProbe>,
    pub device: Arc<dyn DeviceController>,
    pub notifier: Arc<dyn Notifier>,
}

impl WatchdogContext {
    /// Bundle collaborators around a fresh [`WatchdogState`]
    pub fn new(
        policy: PolicyHandle,
        clock: Arc<dyn Clock>,
        probe: Arc<dyn ConnectivityProbe>,
        device: Arc<dyn DeviceController>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            policy,
            state: Arc::new(WatchdogState::new()),
            clock,
            probe,
            device,
            notifier,
        }
    }

    /// Replace the shared state, e.g. to pre-seed a reboot window in tests
    pub fn with_state(mut self, state: Arc<WatchdogState>) -> Self {
        self.state = state;
        self
    }
}

impl std::fmt::Debug for WatchdogContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchdogContext")
            .field("policy", &self.policy)
            .field("state", &self.state)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_reboots_are_not_lost() {
        let state = Arc::new(WatchdogState::new());
        let now = Instant::now();
        let config = RateLimitConfig {
            max_reboots: 100,
            window: Duration::from_secs(7200),
            pause: Duration::from_secs(60),
        };

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let state = state.clone();
            tasks.push(tokio::spawn(async move {
                state.record_reboot(now, &config).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(state.reboots_in_window(now, config.window).await, 20);
    }

    #[tokio::test]
    async fn test_snooze_and_pause_are_independent() {
        let state = WatchdogState::new();
        let now = Instant::now();

        state.snooze(now, Duration::from_secs(30)).await;
        assert!(state.is_snoozed(now).await);
        assert!(!state.is_paused(now).await);
        assert_eq!(
            state.remaining_snooze(now + Duration::from_secs(10)).await,
            Some(Duration::from_secs(20))
        );
        assert!(state.remaining_pause(now).await.is_none());
    }
}
