//! Warden Sentinel: connectivity watchdog core
//!
//! Periodically verifies that the uplink is reachable and, on sustained
//! failure, power-cycles the modem through a network relay, retrying within
//! bounds, rate-limiting physical reboots and notifying the operator.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │ ConnectivityMonitor │──> tick every check_interval
//! └──────────┬──────────┘    disabled > rate-limited > snoozed > probe
//!            │ 3 consecutive failures
//!            v
//! ┌───────────────────────┐
//! │ RemediationSupervisor │──> single-flight: reject / queue / join
//! └──────────┬────────────┘
//!            │ tokio::spawn
//!            v
//! ┌─────────────────────┐
//! │   RebootSequence    │──> cycle power, record reboot, wait, probe
//! └─────────────────────┘    notify on first attempt and on every exit
//! ```
//!
//! External collaborators sit behind traits ([`ConnectivityProbe`],
//! [`DeviceController`], [`Notifier`]) and time behind
//! [`warden_core_resilience::Clock`], so the whole state machine can be driven
//! by fakes and a manual clock.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use warden_core_resilience::SystemClock;
//! use warden_sentinel::{
//!     ConnectivityMonitor, PingProbe, PolicyHandle, RemediationSupervisor,
//!     ShellyRelay, TwilioNotifier, WatchdogContext, WatchdogPolicy,
//! };
//!
//! # async fn example() {
//! let policy = PolicyHandle::fixed(WatchdogPolicy::default());
//! let clock = Arc::new(SystemClock);
//! let ctx = WatchdogContext::new(
//!     policy.clone(),
//!     clock.clone(),
//!     Arc::new(PingProbe::new(policy.clone())),
//!     Arc::new(ShellyRelay::new(policy.clone(), clock)),
//!     Arc::new(TwilioNotifier::new(policy)),
//! );
//!
//! let supervisor = RemediationSupervisor::new(ctx.clone());
//! ConnectivityMonitor::new(ctx, Arc::new(supervisor)).run().await;
//! # }
//! ```

pub mod daemon;
pub mod error;
pub mod metrics;
pub mod notify;
pub mod policy;
pub mod probe;
pub mod relay;
pub mod sequence;
pub mod state;
pub mod supervisor;

pub use daemon::{ConnectivityMonitor, TickOutcome, FAILURE_THRESHOLD};
pub use error::{Result, SentinelError};
pub use metrics::{SequenceOutcome, SequenceReport, Trigger};
pub use notify::{Delivery, LogNotifier, Notifier, TwilioNotifier};
pub use policy::{
    ConcurrencyPolicy, PolicyHandle, PolicySource, PolicyUpdate, StaticPolicySource,
    WatchdogPolicy,
};
pub use probe::{ConnectivityProbe, PingProbe};
pub use relay::{DeviceController, PowerCycleReport, RelayCommand, ShellyRelay};
pub use sequence::RebootSequence;
pub use state::{WatchdogContext, WatchdogState};
pub use supervisor::{
    Disposition, RemediationSupervisor, RemediationTrigger, RunHandle, RunStatus,
    TriggerResponse,
};
