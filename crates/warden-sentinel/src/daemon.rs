//! Connectivity monitor: the top-level periodic loop
//!
//! Each tick evaluates suppression in fixed priority
//! (disabled > rate-limited > snoozed) and otherwise probes the uplink.
//! Three consecutive failures hand off to remediation and reset the counter
//! immediately, not when the remediation run later ends.

use crate::metrics::Trigger;
use crate::state::WatchdogContext;
use crate::supervisor::{Disposition, RemediationTrigger};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Consecutive probe failures that start remediation
pub const FAILURE_THRESHOLD: u32 = 3;

/// Lower bound on the loop period
pub const MIN_TICK_PERIOD: Duration = Duration::from_secs(1);

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Disabled,
    RateLimited { remaining: Duration },
    Snoozed { remaining: Duration },
    Up,
    Down { fail_count: u32 },
    Triggered(Disposition),
}

impl TickOutcome {
    /// Whether the probe ran on this tick
    pub fn probed(&self) -> bool {
        matches!(
            self,
            TickOutcome::Up | TickOutcome::Down { .. } | TickOutcome::Triggered(_)
        )
    }
}

/// The watchdog loop. Sole owner of the consecutive-failure counter.
pub struct ConnectivityMonitor {
    ctx: WatchdogContext,
    remediation: Arc<dyn RemediationTrigger>,
    fail_count: u32,
}

impl ConnectivityMonitor {
    /// Monitor that hands triggers to `remediation`
    ///
    /// # Arguments
    ///
    /// * `ctx` - shared policy, state, clock and collaborators
    /// * `remediation` - where the third consecutive failure is reported; the
    ///   call must not wait for the run it starts
    pub fn new(ctx: WatchdogContext, remediation: Arc<dyn RemediationTrigger>) -> Self {
        Self {
            ctx,
            remediation,
            fail_count: 0,
        }
    }

    /// Consecutive failed probes since the last success or trigger
    pub fn fail_count(&self) -> u32 {
        self.fail_count
    }

    /// Runs forever; spawn it as a background task
    pub async fn run(mut self) {
        let policy = self.ctx.policy.snapshot();
        info!(
            "Connectivity monitor active | check interval {}s | max attempts {} | device {}",
            policy.check_interval_s, policy.max_attempts, policy.device_ip
        );

        loop {
            self.step().await;
        }
    }

    /// One tick followed by the period sleep
    async fn step(&mut self) -> TickOutcome {
        let outcome = self.tick().await;
        self.ctx.clock.sleep(self.period()).await;
        outcome
    }

    /// Sleep between ticks, read from the snapshot current right now
    fn period(&self) -> Duration {
        self.ctx.policy.snapshot().check_interval().max(MIN_TICK_PERIOD)
    }

    /// One monitor iteration.
    ///
    /// Reads a fresh snapshot, checks suppression in priority order and
    /// otherwise probes. Never waits for a remediation run.
    pub async fn tick(&mut self) -> TickOutcome {
        let policy = self.ctx.policy.snapshot();
        let now = self.ctx.clock.now();

        if !policy.enabled {
            info!("Reboot functionality is disabled. Skipping connectivity check.");
            return TickOutcome::Disabled;
        }

        if let Some(remaining) = self.ctx.state.remaining_pause(now).await {
            info!(
                "Reboot rate limit pause active for {} more seconds. Skipping check.",
                remaining.as_secs()
            );
            return TickOutcome::RateLimited { remaining };
        }

        if let Some(remaining) = self.ctx.state.remaining_snooze(now).await {
            info!(
                "Snooze active. Skipping connectivity check for {} more seconds.",
                remaining.as_secs()
            );
            return TickOutcome::Snoozed { remaining };
        }

        if self.ctx.probe.check().await {
            if self.fail_count > 0 {
                info!(
                    "Internet connectivity recovered after {} failed check(s).",
                    self.fail_count
                );
            }
            self.fail_count = 0;
            info!("Internet connectivity OK.");
            return TickOutcome::Up;
        }

        self.fail_count += 1;
        warn!(
            "Internet connectivity lost. Fail count: {}",
            self.fail_count
        );

        if self.fail_count < FAILURE_THRESHOLD {
            return TickOutcome::Down {
                fail_count: self.fail_count,
            };
        }

        warn!(
            "{} consecutive failures. Starting reboot sequence.",
            FAILURE_THRESHOLD
        );
        self.fail_count = 0;
        let disposition = self.remediation.trigger(Trigger::Automatic).await;
        TickOutcome::Triggered(disposition)
    }
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("fail_count", &self.fail_count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;
    use crate::policy::{PolicyHandle, PolicyUpdate, WatchdogPolicy};
    use crate::probe::ConnectivityProbe;
    use crate::relay::{DeviceController, PowerCycleReport};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use warden_core_resilience::ManualClock;

    struct Switch(AtomicBool);

    #[async_trait]
    impl ConnectivityProbe for Switch {
        async fn check(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    struct NoDevice;

    #[async_trait]
    impl DeviceController for NoDevice {
        async fn cycle_power(&self) -> PowerCycleReport {
            PowerCycleReport {
                off_ok: true,
                on_ok: true,
            }
        }
    }

    #[derive(Default)]
    struct CountingTrigger(AtomicU32);

    #[async_trait]
    impl RemediationTrigger for CountingTrigger {
        async fn trigger(&self, _trigger: Trigger) -> Disposition {
            self.0.fetch_add(1, Ordering::SeqCst);
            Disposition::Started
        }
    }

    fn monitor(up: bool) -> (ConnectivityMonitor, Arc<Switch>, Arc<CountingTrigger>) {
        monitor_with(up, WatchdogPolicy::default(), Arc::new(ManualClock::new()))
    }

    fn monitor_with(
        up: bool,
        policy: WatchdogPolicy,
        clock: Arc<ManualClock>,
    ) -> (ConnectivityMonitor, Arc<Switch>, Arc<CountingTrigger>) {
        let probe = Arc::new(Switch(AtomicBool::new(up)));
        let trigger = Arc::new(CountingTrigger::default());
        let ctx = WatchdogContext::new(
            PolicyHandle::fixed(policy),
            clock,
            probe.clone(),
            Arc::new(NoDevice),
            Arc::new(LogNotifier),
        );
        (ConnectivityMonitor::new(ctx, trigger.clone()), probe, trigger)
    }

    #[tokio::test]
    async fn test_three_failures_trigger_once_and_reset() {
        let (mut monitor, _probe, trigger) = monitor(false);

        assert_eq!(monitor.tick().await, TickOutcome::Down { fail_count: 1 });
        assert_eq!(monitor.tick().await, TickOutcome::Down { fail_count: 2 });
        assert_eq!(
            monitor.tick().await,
            TickOutcome::Triggered(Disposition::Started)
        );
        assert_eq!(monitor.fail_count(), 0);
        assert_eq!(trigger.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_resets_counter() {
        let (mut monitor, probe, trigger) = monitor(false);

        monitor.tick().await;
        monitor.tick().await;
        probe.0.store(true, Ordering::SeqCst);
        assert_eq!(monitor.tick().await, TickOutcome::Up);
        assert_eq!(monitor.fail_count(), 0);

        probe.0.store(false, Ordering::SeqCst);
        monitor.tick().await;
        monitor.tick().await;
        assert_eq!(trigger.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_loop_period_is_clamped_and_follows_reloads() {
        let clock = Arc::new(ManualClock::new());
        let policy = WatchdogPolicy {
            check_interval_s: 0,
            ..Default::default()
        };
        let (mut monitor, _probe, _trigger) = monitor_with(true, policy, clock.clone());

        for _ in 0..3 {
            assert_eq!(monitor.step().await, TickOutcome::Up);
        }
        assert_eq!(clock.elapsed(), Duration::from_secs(3));

        monitor
            .ctx
            .policy
            .update(PolicyUpdate {
                check_interval_s: Some(45),
                ..Default::default()
            })
            .unwrap();
        monitor.step().await;
        monitor.step().await;
        assert_eq!(clock.elapsed(), Duration::from_secs(3 + 90));
    }

    #[tokio::test]
    async fn test_run_keeps_ticking() {
        let clock = Arc::new(ManualClock::new());
        let (monitor, _probe, trigger) = monitor_with(false, WatchdogPolicy::default(), clock.clone());

        let task = tokio::spawn(monitor.run());
        while trigger.0.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }
        task.abort();

        // Two triggers need six failed ticks, each followed by a 30s sleep.
        assert!(clock.elapsed() >= Duration::from_secs(5 * 30));
    }

    #[test]
    fn test_probed() {
        assert!(TickOutcome::Up.probed());
        assert!(!TickOutcome::Disabled.probed());
        assert!(!TickOutcome::Snoozed {
            remaining: Duration::from_secs(1)
        }
        .probed());
    }
}
