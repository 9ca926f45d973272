/*!
 * Operator surface
 *
 * [`Watchdog`] owns the wiring of the watchdog core and exposes the operations
 * an operator needs: recent logs, settings edits, the master switch, manual
 * reboot, snooze, reload and a status view.
 */

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::info;
use warden_core_resilience::{Clock, SystemClock};
use warden_sentinel::{
    ConnectivityMonitor, PingProbe, PolicyHandle, PolicyUpdate, RemediationSupervisor,
    RunStatus, SequenceReport, ShellyRelay, Trigger, TriggerResponse, TwilioNotifier,
    WatchdogContext, WatchdogPolicy,
};

use crate::config::SettingsFile;
use crate::error::Result;
use crate::logging::{LogRecord, LogSink};

/// Point-in-time view of the watchdog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogStatus {
    pub enabled: bool,
    pub snooze_remaining: Option<Duration>,
    pub pause_remaining: Option<Duration>,
    pub reboots_in_window: usize,
    pub run: RunStatus,
    pub last_report: Option<SequenceReport>,
}

impl WatchdogStatus {
    /// One-line summary for the console
    pub fn summary(&self) -> String {
        let mut parts = vec![format!(
            "enabled={} reboots_in_window={}",
            self.enabled, self.reboots_in_window
        )];
        if let Some(remaining) = self.snooze_remaining {
            parts.push(format!("snoozed {}s", remaining.as_secs()));
        }
        if let Some(remaining) = self.pause_remaining {
            parts.push(format!("rate-limit pause {}s", remaining.as_secs()));
        }
        match self.run {
            RunStatus::Idle => parts.push("idle".to_string()),
            RunStatus::Running { trigger, .. } => parts.push(format!("running ({})", trigger)),
        }
        parts.join(" | ")
    }
}

/// Watchdog core plus the operator-facing operations
#[derive(Debug, Clone)]
pub struct Watchdog {
    ctx: WatchdogContext,
    supervisor: RemediationSupervisor,
    logs: LogSink,
}

impl Watchdog {
    /// Wrap an already wired context; the supervisor is created here
    pub fn new(ctx: WatchdogContext, logs: LogSink) -> Self {
        let supervisor = RemediationSupervisor::new(ctx.clone());
        Self {
            ctx,
            supervisor,
            logs,
        }
    }

    /// Wire the real probe, relay and SMS notifier around `policy`
    pub fn with_policy(policy: PolicyHandle, logs: LogSink) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let ctx = WatchdogContext::new(
            policy.clone(),
            clock.clone(),
            Arc::new(PingProbe::new(policy.clone())),
            Arc::new(ShellyRelay::new(policy.clone(), clock)),
            Arc::new(TwilioNotifier::new(policy)),
        );
        Self::new(ctx, logs)
    }

    /// Load settings from `path` and wire the production collaborators
    pub fn from_settings(path: &Path, logs: LogSink) -> Result<Self> {
        let source = Arc::new(SettingsFile::new(path));
        let policy = PolicyHandle::load(source)?;
        Ok(Self::with_policy(policy, logs))
    }

    /// The snapshot current right now
    pub fn policy(&self) -> Arc<WatchdogPolicy> {
        self.ctx.policy.snapshot()
    }

    pub fn context(&self) -> &WatchdogContext {
        &self.ctx
    }

    pub fn supervisor(&self) -> &RemediationSupervisor {
        &self.supervisor
    }

    /// At most `n` most recent log records, oldest first
    pub fn get_recent_logs(&self, n: usize) -> Vec<LogRecord> {
        self.logs.recent(n)
    }

    /// Apply operator edits to the settings
    pub fn update_config(&self, update: PolicyUpdate) -> Result<Arc<WatchdogPolicy>> {
        Ok(self.ctx.policy.update(update)?)
    }

    /// Turn automatic probing and triggering on or off; persisted like any edit
    pub fn set_enabled(&self, enabled: bool) -> Arc<WatchdogPolicy> {
        self.ctx.policy.set_enabled(enabled)
    }

    /// Flip the master switch and return the new value.
    ///
    /// The read and the write happen under the policy writer lock, so two
    /// concurrent toggles always cancel out.
    pub fn toggle_enabled(&self) -> bool {
        self.ctx.policy.toggle_enabled().enabled
    }

    /// Start a reboot sequence on the operator's behalf.
    ///
    /// Runs even when automatic monitoring is disabled; an active rate-limit
    /// pause still turns the run into a no-op.
    pub fn trigger_manual_reboot(&self) -> TriggerResponse {
        info!("Manual reboot triggered.");
        self.supervisor.request(Trigger::Manual)
    }

    /// Suppress monitoring for `duration`; zero clears an active snooze
    pub async fn snooze(&self, duration: Duration) -> Instant {
        let now = self.ctx.clock.now();
        let deadline = self.ctx.state.snooze(now, duration).await;
        if duration.is_zero() {
            info!("Snooze cleared.");
        } else {
            info!("Snooze activated for {} seconds.", duration.as_secs());
        }
        deadline
    }

    /// Snooze for the configured default length
    pub async fn snooze_default(&self) -> Instant {
        let duration = self.ctx.policy.snapshot().default_snooze();
        self.snooze(duration).await
    }

    /// Re-read the settings store; the previous snapshot stays on failure
    pub fn reload(&self) -> Result<Arc<WatchdogPolicy>> {
        Ok(self.ctx.policy.reload()?)
    }

    /// Enabled flag, remaining snooze and pause, reboot count and run status
    pub async fn status(&self) -> WatchdogStatus {
        let policy = self.ctx.policy.snapshot();
        let now = self.ctx.clock.now();
        WatchdogStatus {
            enabled: policy.enabled,
            snooze_remaining: self.ctx.state.remaining_snooze(now).await,
            pause_remaining: self.ctx.state.remaining_pause(now).await,
            reboots_in_window: self
                .ctx
                .state
                .reboots_in_window(now, policy.rate_limit().window)
                .await,
            run: self.supervisor.status(),
            last_report: self.supervisor.last_report(),
        }
    }

    /// Monitor loop feeding this watchdog's supervisor
    pub fn monitor(&self) -> ConnectivityMonitor {
        ConnectivityMonitor::new(self.ctx.clone(), Arc::new(self.supervisor.clone()))
    }

    /// Run the monitor loop as a background task
    pub fn spawn_monitor(&self) -> JoinHandle<()> {
        tokio::spawn(self.monitor().run())
    }
}
