//! Device controller: power-cycles the modem through a network relay
//!
//! The cycle is two independent, best-effort HTTP calls separated by a settle
//! delay. A failed OFF does not stop the ON attempt, and nothing is retried
//! here; retry policy belongs to the reboot sequence.

use crate::error::{Result, SentinelError};
use crate::policy::PolicyHandle;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use warden_core_resilience::Clock;

/// Independent timeout for each relay request
pub const RELAY_TIMEOUT: Duration = Duration::from_secs(10);

/// The two relay switch requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayCommand {
    Off,
    On,
}

impl RelayCommand {
    fn as_query(self) -> &'static str {
        match self {
            RelayCommand::Off => "off",
            RelayCommand::On => "on",
        }
    }
}

impl fmt::Display for RelayCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RelayCommand::Off => "OFF",
            RelayCommand::On => "ON",
        })
    }
}

/// What happened to each half of a power cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerCycleReport {
    pub off_ok: bool,
    pub on_ok: bool,
}

impl PowerCycleReport {
    /// Both halves succeeded
    pub fn is_clean(&self) -> bool {
        self.off_ok && self.on_ok
    }
}

/// Power control for the upstream modem
///
/// Best effort and non-transactional: a failed OFF does not stop the ON
/// request. Retrying is the reboot sequence's job, not the controller's.
#[async_trait]
pub trait DeviceController: Send + Sync {
    /// Issue OFF, wait the settle delay, issue ON
    async fn cycle_power(&self) -> PowerCycleReport;
}

/// Shelly-style relay reachable at `http://<device_ip>/relay/0?turn=on|off`
pub struct ShellyRelay {
    client: reqwest::Client,
    policy: PolicyHandle,
    clock: Arc<dyn Clock>,
}

impl ShellyRelay {
    /// Relay client; the device address and settle delay come from each snapshot
    ///
    /// # Arguments
    ///
    /// * `policy` - settings handle
    /// * `clock` - time source for the settle delay between OFF and ON
    pub fn new(policy: PolicyHandle, clock: Arc<dyn Clock>) -> Self {
        Self {
            client: reqwest::Client::new(),
            policy,
            clock,
        }
    }

    /// Send a single relay command
    pub async fn switch(&self, device_ip: &str, command: RelayCommand) -> Result<()> {
        let url = format!("http://{}/relay/0", device_ip);
        let response = self
            .client
            .get(&url)
            .query(&[("turn", command.as_query())])
            .timeout(RELAY_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SentinelError::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceController for ShellyRelay {
    async fn cycle_power(&self) -> PowerCycleReport {
        let policy = self.policy.snapshot();

        info!("Turning OFF the relay to cut power to the modem.");
        let off_ok = match self.switch(&policy.device_ip, RelayCommand::Off).await {
            Ok(()) => true,
            Err(e) => {
                error!("Error turning OFF relay: {}", e);
                false
            }
        };

        self.clock.sleep(policy.settle_delay()).await;

        info!("Turning ON the relay to power up the modem.");
        let on_ok = match self.switch(&policy.device_ip, RelayCommand::On).await {
            Ok(()) => {
                info!("Relay reboot command successful.");
                true
            }
            Err(e) => {
                error!("Error turning ON relay: {}", e);
                false
            }
        };

        PowerCycleReport { off_ok, on_ok }
    }
}

impl fmt::Debug for ShellyRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellyRelay")
            .field("device_ip", &self.policy.snapshot().device_ip)
            .finish()
    }
}
