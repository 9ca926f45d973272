//! Watchdog policy: the immutable configuration snapshot
//!
//! Components never cache settings across operations. Each monitor tick, each
//! reboot sequence and each outbound request reads [`PolicyHandle::snapshot`]
//! once at its start. Reloads and operator updates build a new
//! [`WatchdogPolicy`] and swap it in atomically.

use crate::error::{Result, SentinelError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use warden_core_resilience::RateLimitConfig;

/// What happens when a reboot is requested while a sequence is already running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyPolicy {
    /// Refuse the second request
    #[default]
    Reject,
    /// Remember one pending request and start it when the current run ends
    Queue,
    /// Hand the caller the current run's result
    Join,
}

impl fmt::Display for ConcurrencyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcurrencyPolicy::Reject => write!(f, "reject"),
            ConcurrencyPolicy::Queue => write!(f, "queue"),
            ConcurrencyPolicy::Join => write!(f, "join"),
        }
    }
}

/// Watchdog operational policy
///
/// Keys mirror the flat key-value settings file, so the struct serializes
/// directly to and from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogPolicy {
    /// Upper bound on reboot attempts in one sequence
    ///
    /// **Default:** 10
    pub max_attempts: u32,

    /// Wall-clock budget for one sequence, in seconds
    ///
    /// **Default:** 7200 (2 hours)
    #[serde(rename = "total_duration")]
    pub total_duration_s: u64,

    /// Monitor period and pause between failed attempts, in seconds
    ///
    /// **Default:** 30
    #[serde(rename = "check_interval")]
    pub check_interval_s: u64,

    /// Recovery settle period after a power cycle, in seconds
    ///
    /// **Default:** 180
    #[serde(rename = "wait_time")]
    pub wait_time_s: u64,

    /// Address of the relay that powers the modem
    #[serde(rename = "shelly_ip")]
    pub device_ip: String,

    /// Recipient of operator notifications
    #[serde(rename = "twilio_to_number")]
    pub notify_to: String,

    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_from_number: Option<String>,

    /// Master switch for automatic probing and triggering
    pub enabled: bool,

    /// Reboots inside the window that start a pause
    ///
    /// **Default:** 5
    #[serde(rename = "reboot_rate_limit_count")]
    pub rate_limit_count: u32,

    /// Length of the rate-limit window, in seconds
    ///
    /// **Default:** 7200 (2 hours)
    #[serde(rename = "reboot_rate_limit_window")]
    pub rate_limit_window_s: u64,

    /// Pause length once the rate limit trips, in seconds
    ///
    /// **Default:** 72000 (20 hours)
    #[serde(rename = "rate_limit_pause_duration")]
    pub rate_limit_pause_s: u64,

    /// Snooze length used when the operator does not pick one, in seconds
    #[serde(rename = "default_snooze")]
    pub default_snooze_s: u64,

    /// Host pinged by the connectivity probe
    pub probe_host: String,

    /// Delay between relay OFF and ON, in seconds
    #[serde(rename = "settle_delay")]
    pub settle_delay_s: u64,

    /// Behaviour for overlapping reboot requests
    pub concurrency: ConcurrencyPolicy,
}

impl Default for WatchdogPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            total_duration_s: 7200,
            check_interval_s: 30,
            wait_time_s: 180,
            device_ip: "192.168.1.100".to_string(),
            notify_to: "+0987654321".to_string(),
            twilio_account_sid: None,
            twilio_auth_token: None,
            twilio_from_number: None,
            enabled: true,
            rate_limit_count: 5,
            rate_limit_window_s: 7200,
            rate_limit_pause_s: 72000,
            default_snooze_s: 3600,
            probe_host: "8.8.8.8".to_string(),
            settle_delay_s: 10,
            concurrency: ConcurrencyPolicy::Reject,
        }
    }
}

impl WatchdogPolicy {
    /// Wall-clock budget for one reboot sequence
    pub fn total_duration(&self) -> Duration {
        Duration::from_secs(self.total_duration_s)
    }

    /// Monitor period, also the pause between failed attempts
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_s)
    }

    pub fn wait_time(&self) -> Duration {
        Duration::from_secs(self.wait_time_s)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_s)
    }

    pub fn default_snooze(&self) -> Duration {
        Duration::from_secs(self.default_snooze_s)
    }

    /// Thresholds for the reboot rate limiter
    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_reboots: self.rate_limit_count,
            window: Duration::from_secs(self.rate_limit_window_s),
            pause: Duration::from_secs(self.rate_limit_pause_s),
        }
    }

    /// Messaging credentials, present only when every field is set and non-empty
    pub fn notification_credentials(&self) -> Option<NotificationCredentials<'_>> {
        Some(NotificationCredentials {
            account_sid: non_empty(self.twilio_account_sid.as_deref())?,
            auth_token: non_empty(self.twilio_auth_token.as_deref())?,
            from_number: non_empty(self.twilio_from_number.as_deref())?,
            to_number: non_empty(Some(self.notify_to.as_str()))?,
        })
    }

    /// Copy with secrets masked, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.twilio_auth_token.is_some() {
            copy.twilio_auth_token = Some("********".to_string());
        }
        copy
    }

    /// Validate the policy configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(SentinelError::InvalidPolicy(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        if self.rate_limit_count == 0 {
            return Err(SentinelError::InvalidPolicy(
                "reboot_rate_limit_count must be at least 1".to_string(),
            ));
        }

        if self.rate_limit_window_s == 0 {
            return Err(SentinelError::InvalidPolicy(
                "reboot_rate_limit_window must be greater than 0".to_string(),
            ));
        }

        if self.device_ip.trim().is_empty() {
            return Err(SentinelError::InvalidPolicy(
                "shelly_ip must not be empty".to_string(),
            ));
        }

        if self.probe_host.trim().is_empty() {
            return Err(SentinelError::InvalidPolicy(
                "probe_host must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

/// Borrowed view of a complete set of messaging credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationCredentials<'a> {
    pub account_sid: &'a str,
    pub auth_token: &'a str,
    pub from_number: &'a str,
    pub to_number: &'a str,
}

/// Operator-editable fields; `None` leaves the current value untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyUpdate {
    pub max_attempts: Option<u32>,
    /// `"hh:mm"`
    pub total_duration: Option<String>,
    pub check_interval_s: Option<u64>,
    pub wait_time_s: Option<u64>,
    pub device_ip: Option<String>,
    pub notify_to: Option<String>,
}

/// Parse an `"hh:mm"` duration into seconds
pub fn parse_hh_mm(text: &str) -> Option<u64> {
    let (hours, minutes) = text.trim().split_once(':')?;
    let hours: u64 = hours.trim().parse().ok()?;
    let minutes: u64 = minutes.trim().parse().ok()?;
    hours.checked_mul(3600)?.checked_add(minutes.checked_mul(60)?)
}

/// Render seconds as `"hh:mm"`
pub fn format_hh_mm(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 3600, (seconds % 3600) / 60)
}

/// Abstract settings store
///
/// The watchdog only needs to fetch a fresh snapshot and to write one back; the
/// storage format belongs to the implementor.
pub trait PolicySource: Send + Sync {
    fn load(&self) -> Result<WatchdogPolicy>;

    fn persist(&self, policy: &WatchdogPolicy) -> Result<()>;
}

/// Source for policies that live only in memory
#[derive(Debug, Clone, Default)]
pub struct StaticPolicySource {
    policy: WatchdogPolicy,
}

impl StaticPolicySource {
    pub fn new(policy: WatchdogPolicy) -> Self {
        Self { policy }
    }
}

impl PolicySource for StaticPolicySource {
    fn load(&self) -> Result<WatchdogPolicy> {
        Ok(self.policy.clone())
    }

    fn persist(&self, _policy: &WatchdogPolicy) -> Result<()> {
        Ok(())
    }
}

struct PolicyCell {
    current: watch::Sender<Arc<WatchdogPolicy>>,
    source: Arc<dyn PolicySource>,
    /// Held across read-modify-persist-swap so concurrent writers never drop an edit
    writer: Mutex<()>,
}

/// Shared pointer to the current snapshot
///
/// Cloning the handle is cheap; every clone observes the same swaps. Readers
/// never block. Writers ([`reload`](Self::reload), [`update`](Self::update),
/// [`set_enabled`](Self::set_enabled), [`toggle_enabled`](Self::toggle_enabled))
/// are serialized, so the persisted settings and the in-memory snapshot always
/// reflect every accepted edit.
#[derive(Clone)]
pub struct PolicyHandle {
    cell: Arc<PolicyCell>,
}

impl fmt::Debug for PolicyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyHandle")
            .field("current", &self.snapshot())
            .finish()
    }
}

impl PolicyHandle {
    /// Start from `initial`, reloading and persisting through `source`
    pub fn new(initial: WatchdogPolicy, source: Arc<dyn PolicySource>) -> Self {
        let (current, _) = watch::channel(Arc::new(initial));
        Self {
            cell: Arc::new(PolicyCell {
                current,
                source,
                writer: Mutex::new(()),
            }),
        }
    }

    /// Load the initial snapshot from `source`
    pub fn load(source: Arc<dyn PolicySource>) -> Result<Self> {
        let initial = source.load()?;
        initial.validate()?;
        Ok(Self::new(initial, source))
    }

    /// Handle over a fixed in-memory policy
    pub fn fixed(policy: WatchdogPolicy) -> Self {
        let source = Arc::new(StaticPolicySource::new(policy.clone()));
        Self::new(policy, source)
    }

    /// The snapshot current right now
    pub fn snapshot(&self) -> Arc<WatchdogPolicy> {
        self.cell.current.borrow().clone()
    }

    /// Observe future swaps
    pub fn subscribe(&self) -> watch::Receiver<Arc<WatchdogPolicy>> {
        self.cell.current.subscribe()
    }

    /// Re-read the settings store and swap in the result.
    ///
    /// On failure the previous snapshot stays in force.
    pub fn reload(&self) -> Result<Arc<WatchdogPolicy>> {
        let _writer = self.writer();
        let loaded = self.cell.source.load().and_then(|policy| {
            policy.validate()?;
            Ok(policy)
        });

        match loaded {
            Ok(policy) => {
                let policy = Arc::new(policy);
                self.cell.current.send_replace(policy.clone());
                info!("Configuration reloaded.");
                Ok(policy)
            }
            Err(e) => {
                error!("Configuration reload failed, keeping previous settings: {}", e);
                Err(e)
            }
        }
    }

    /// Apply operator edits, persist them and swap in the new snapshot
    ///
    /// # Arguments
    ///
    /// * `update` - fields to change; `None` keeps the current value
    ///
    /// A malformed `total_duration` is logged and ignored while the other
    /// fields still apply. A snapshot that fails validation is rejected and
    /// nothing is persisted. A persist failure is logged and the new snapshot
    /// still takes effect.
    pub fn update(&self, update: PolicyUpdate) -> Result<Arc<WatchdogPolicy>> {
        let _writer = self.writer();
        let current = self.snapshot();
        let mut next = (*current).clone();

        if let Some(max_attempts) = update.max_attempts {
            next.max_attempts = max_attempts;
        }
        if let Some(text) = update.total_duration.as_deref() {
            match parse_hh_mm(text) {
                Some(seconds) => next.total_duration_s = seconds,
                None => error!(
                    "Error parsing total_duration {:?}; keeping {}",
                    text,
                    format_hh_mm(current.total_duration_s)
                ),
            }
        }
        if let Some(check_interval) = update.check_interval_s {
            next.check_interval_s = check_interval;
        }
        if let Some(wait_time) = update.wait_time_s {
            next.wait_time_s = wait_time;
        }
        if let Some(device_ip) = update.device_ip {
            next.device_ip = device_ip.trim().to_string();
        }
        if let Some(notify_to) = update.notify_to {
            next.notify_to = notify_to.trim().to_string();
        }

        if let Err(e) = next.validate() {
            error!("Rejected configuration update: {}", e);
            return Err(e);
        }

        let next = self.commit(next);
        info!(
            "Configuration updated: MAX_ATTEMPTS={}, TOTAL_DURATION={}, CHECK_INTERVAL={}, WAIT_TIME={}, SHELLY_IP={}, TWILIO_TO_NUMBER={}",
            next.max_attempts,
            next.total_duration_s,
            next.check_interval_s,
            next.wait_time_s,
            next.device_ip,
            next.notify_to
        );
        Ok(next)
    }

    /// Set the master switch
    pub fn set_enabled(&self, enabled: bool) -> Arc<WatchdogPolicy> {
        let _writer = self.writer();
        let mut next = (*self.snapshot()).clone();
        next.enabled = enabled;
        let next = self.commit(next);
        info!("Enabled set to {}.", enabled);
        next
    }

    /// Flip the master switch and return the new snapshot
    pub fn toggle_enabled(&self) -> Arc<WatchdogPolicy> {
        let _writer = self.writer();
        let mut next = (*self.snapshot()).clone();
        next.enabled = !next.enabled;
        let next = self.commit(next);
        info!("Enabled toggled to {}.", next.enabled);
        next
    }

    fn writer(&self) -> MutexGuard<'_, ()> {
        self.cell
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Caller holds the writer lock
    fn commit(&self, next: WatchdogPolicy) -> Arc<WatchdogPolicy> {
        if let Err(e) = self.cell.source.persist(&next) {
            warn!("Failed to persist configuration: {}", e);
        }
        let next = Arc::new(next);
        self.cell.current.send_replace(next.clone());
        next
    }
}
