//! Connectivity probe
//!
//! A single reachability test against a fixed external host. The check is
//! bounded in time and never fails: anything that goes wrong means "down".

use crate::error::SentinelError;
use crate::policy::PolicyHandle;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Hard ceiling on one probe, covering process start-up and both echo requests
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Number of echo requests per probe
pub const PROBE_COUNT: u32 = 2;

/// Per-reply wait handed to `ping -W`, in seconds
pub const PROBE_REPLY_WAIT_S: u32 = 2;

/// Single reachability test against the configured host
///
/// Bounded in time and infallible: any error counts as down.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// `true` iff the uplink answered
    async fn check(&self) -> bool;
}

/// ICMP probe through the system `ping` binary
#[derive(Debug, Clone)]
pub struct PingProbe {
    policy: PolicyHandle,
    timeout: Duration,
}

impl PingProbe {
    /// Probe whose target host is read from each snapshot
    pub fn new(policy: PolicyHandle) -> Self {
        Self {
            policy,
            timeout: PROBE_TIMEOUT,
        }
    }

    /// Override the overall deadline for one `ping` run
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(host: &str) -> Command {
        let mut cmd = Command::new("ping");
        cmd.arg("-c")
            .arg(PROBE_COUNT.to_string())
            .arg("-W")
            .arg(PROBE_REPLY_WAIT_S.to_string())
            .arg(host)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl ConnectivityProbe for PingProbe {
    async fn check(&self) -> bool {
        let host = self.policy.snapshot().probe_host.clone();

        match tokio::time::timeout(self.timeout, Self::command(&host).status()).await {
            Ok(Ok(status)) => {
                debug!("ping {} exited with {}", host, status);
                status.success()
            }
            Ok(Err(e)) => {
                warn!("Could not run ping against {}: {}", host, SentinelError::from(e));
                false
            }
            Err(_) => {
                warn!(
                    "ping {} did not finish within {}s",
                    host,
                    self.timeout.as_secs()
                );
                false
            }
        }
    }
}
