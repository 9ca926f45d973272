//! Reboot sequence: one bounded remediation run for a failure episode
//!
//! ```text
//! CheckingPause ──paused──> Paused (no side effects)
//!       │
//!       ▼
//!   Attempting ──elapsed > total──> DurationExceeded
//!       │  cycle power, record reboot
//!       │──rate limit tripped──> RateLimited
//!       ▼
//! WaitingPostAction (wait_time)
//!       │
//!       ▼
//!   Deciding ──up──> Restored
//!       │ down: sleep check_interval
//!       └──> Attempting ... until max_attempts ──> AttemptsExhausted
//! ```
//!
//! Once started, a run cannot be cancelled; it always reaches one of the
//! terminal outcomes above.

use crate::metrics::{SequenceOutcome, SequenceReport, Trigger};
use crate::notify::Delivery;
use crate::policy::WatchdogPolicy;
use crate::state::WatchdogContext;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const MSG_FIRST_ATTEMPT: &str = "Rebooting attempted: first attempt to restore connectivity.";
pub const MSG_DURATION_EXCEEDED: &str = "Maximum duration exceeded, connectivity not restored.";
pub const MSG_ATTEMPTS_EXHAUSTED: &str =
    "Maximum number of reboot attempts reached, connectivity not restored.";

/// Intermediate states of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencePhase {
    CheckingPause,
    Attempting,
    WaitingPostAction,
    Deciding,
}

/// Per-invocation state; lives only as long as the run
#[derive(Debug)]
struct RunState {
    trigger: Trigger,
    started: Instant,
    phase: SequencePhase,
    attempts: u32,
    power_cycles: u32,
    relay_failures: u32,
    notifications_sent: u32,
    first_notice_sent: bool,
}

impl RunState {
    fn new(trigger: Trigger, started: Instant) -> Self {
        Self {
            trigger,
            started,
            phase: SequencePhase::CheckingPause,
            attempts: 0,
            power_cycles: 0,
            relay_failures: 0,
            notifications_sent: 0,
            first_notice_sent: false,
        }
    }

    fn enter(&mut self, phase: SequencePhase) {
        debug!(
            "Reboot sequence attempt {}: {:?} -> {:?}",
            self.attempts, self.phase, phase
        );
        self.phase = phase;
    }

    fn finish(self, outcome: SequenceOutcome, now: Instant) -> SequenceReport {
        SequenceReport {
            trigger: self.trigger,
            outcome,
            attempts: self.attempts,
            power_cycles: self.power_cycles,
            relay_failures: self.relay_failures,
            notifications_sent: self.notifications_sent,
            elapsed: now.saturating_duration_since(self.started),
        }
    }
}

/// Bounded retry orchestrator
#[derive(Debug, Clone)]
pub struct RebootSequence {
    ctx: WatchdogContext,
}

impl RebootSequence {
    /// Sequence over the shared context; the policy snapshot is taken when `run` starts
    pub fn new(ctx: WatchdogContext) -> Self {
        Self { ctx }
    }

    /// Run to completion and report the outcome
    pub async fn run(&self, trigger: Trigger) -> SequenceReport {
        // One snapshot for the whole run.
        let policy = self.ctx.policy.snapshot();
        let clock = &self.ctx.clock;
        let mut run = RunState::new(trigger, clock.now());

        info!("Starting reboot sequence ({}).", trigger);

        if let Some(remaining) = self.ctx.state.remaining_pause(run.started).await {
            warn!(
                "Reboot rate limit pause active for {} more seconds. Skipping reboot sequence.",
                remaining.as_secs()
            );
            return run.finish(SequenceOutcome::Paused, clock.now());
        }

        while run.attempts < policy.max_attempts {
            run.attempts += 1;
            run.enter(SequencePhase::Attempting);

            let elapsed = clock.now().saturating_duration_since(run.started);
            if elapsed > policy.total_duration() {
                warn!("Total duration exceeded. Stopping attempts.");
                self.notify(&mut run, MSG_DURATION_EXCEEDED).await;
                return run.finish(SequenceOutcome::DurationExceeded, clock.now());
            }

            info!(
                "Reboot attempt {} of {} (elapsed: {}s).",
                run.attempts,
                policy.max_attempts,
                elapsed.as_secs()
            );

            if !run.first_notice_sent {
                run.first_notice_sent = true;
                self.notify(&mut run, MSG_FIRST_ATTEMPT).await;
            }

            let cycle = self.ctx.device.cycle_power().await;
            run.power_cycles += 1;
            if !cycle.is_clean() {
                run.relay_failures += 1;
                warn!(
                    "Power cycle incomplete (off_ok={}, on_ok={}); continuing.",
                    cycle.off_ok, cycle.on_ok
                );
            }

            let verdict = self
                .ctx
                .state
                .record_reboot(clock.now(), &policy.rate_limit())
                .await;
            if verdict.paused_now {
                let message = rate_limit_message(&policy);
                warn!("{} Ending reboot sequence.", message);
                self.notify(&mut run, &message).await;
                return run.finish(SequenceOutcome::RateLimited, clock.now());
            }

            run.enter(SequencePhase::WaitingPostAction);
            clock.sleep(policy.wait_time()).await;

            run.enter(SequencePhase::Deciding);
            if self.ctx.probe.check().await {
                let total = clock.now().saturating_duration_since(run.started);
                info!("Internet connectivity restored. Ending reboot sequence.");
                let message = format!(
                    "Connectivity re-established after {}s, with {} reboot attempt(s).",
                    total.as_secs(),
                    run.attempts
                );
                self.notify(&mut run, &message).await;
                return run.finish(SequenceOutcome::Restored, clock.now());
            }

            debug!(
                "Connectivity still down after attempt {}; next attempt in {}s.",
                run.attempts, policy.check_interval_s
            );
            clock.sleep(policy.check_interval()).await;
        }

        info!("Reboot sequence ended without restoring connectivity.");
        self.notify(&mut run, MSG_ATTEMPTS_EXHAUSTED).await;
        run.finish(SequenceOutcome::AttemptsExhausted, clock.now())
    }

    async fn notify(&self, run: &mut RunState, message: &str) {
        if let Delivery::Sent { .. } = self.ctx.notifier.send(message).await {
            run.notifications_sent += 1;
        }
    }
}

fn rate_limit_message(policy: &WatchdogPolicy) -> String {
    let limit = policy.rate_limit();
    format!(
        "Reboot rate limit reached ({} reboots within {}). Physical reboots paused for {}.",
        limit.max_reboots,
        human_duration(limit.window),
        human_duration(limit.pause)
    )
}

fn human_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_duration() {
        assert_eq!(human_duration(Duration::from_secs(7200)), "2h");
        assert_eq!(human_duration(Duration::from_secs(72000)), "20h");
        assert_eq!(human_duration(Duration::from_secs(90)), "90s");
        assert_eq!(human_duration(Duration::from_secs(300)), "5m");
    }

    #[test]
    fn test_rate_limit_message() {
        let message = rate_limit_message(&WatchdogPolicy::default());
        assert_eq!(
            message,
            "Reboot rate limit reached (5 reboots within 2h). Physical reboots paused for 20h."
        );
    }
}
