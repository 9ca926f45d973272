//! Sequence reports
//!
//! Records what a single reboot sequence did, for logs, the operator status
//! view and tests.

use std::fmt;
use std::time::Duration;

/// Who asked for remediation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Consecutive-failure threshold reached in the monitor loop
    Automatic,
    /// Operator request
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Automatic => write!(f, "automatic"),
            Trigger::Manual => write!(f, "manual"),
        }
    }
}

/// Terminal state of a sequence run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceOutcome {
    /// Connectivity came back
    Restored,
    /// A rate-limit pause was already active; nothing was done
    Paused,
    /// This run's power cycle tripped the rate limit
    RateLimited,
    /// The wall-clock budget ran out
    DurationExceeded,
    /// Every attempt was used without success
    AttemptsExhausted,
}

impl SequenceOutcome {
    /// Connectivity was restored
    pub fn is_success(&self) -> bool {
        matches!(self, SequenceOutcome::Restored)
    }
}

impl fmt::Display for SequenceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SequenceOutcome::Restored => "connectivity restored",
            SequenceOutcome::Paused => "skipped (rate-limit pause active)",
            SequenceOutcome::RateLimited => "stopped (rate limit reached)",
            SequenceOutcome::DurationExceeded => "stopped (maximum duration exceeded)",
            SequenceOutcome::AttemptsExhausted => "stopped (attempts exhausted)",
        })
    }
}

/// Summary of one sequence run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceReport {
    pub trigger: Trigger,
    pub outcome: SequenceOutcome,
    /// Attempts started, including one aborted by the duration check
    pub attempts: u32,
    /// Power cycles actually issued
    pub power_cycles: u32,
    /// Power cycles where OFF or ON failed
    pub relay_failures: u32,
    /// Notifications the provider accepted
    pub notifications_sent: u32,
    pub elapsed: Duration,
}

impl SequenceReport {
    /// One-line summary for logs and the CLI
    pub fn summary(&self) -> String {
        format!(
            "Reboot sequence ({}): {} | attempts {} | power cycles {} ({} with relay errors) | notifications {} | {}s",
            self.trigger,
            self.outcome,
            self.attempts,
            self.power_cycles,
            self.relay_failures,
            self.notifications_sent,
            self.elapsed.as_secs()
        )
    }
}
