//! Remediation supervisor
//!
//! Owns the single running [`RebootSequence`]. Every trigger, automatic or
//! manual, goes through [`RemediationSupervisor::trigger`]; a second request
//! while a run is in flight is rejected, queued or joined according to the
//! snapshot's [`ConcurrencyPolicy`]. Runs are spawned onto the runtime and never
//! block the caller.

use crate::metrics::{SequenceReport, Trigger};
use crate::policy::ConcurrencyPolicy;
use crate::sequence::RebootSequence;
use crate::state::WatchdogContext;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Observable supervisor state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Idle,
    Running { trigger: Trigger, since: Instant },
}

impl RunStatus {
    /// `true` while a sequence is in flight
    pub fn is_running(&self) -> bool {
        matches!(self, RunStatus::Running { .. })
    }
}

/// Awaitable result of one run
#[derive(Debug, Clone)]
pub struct RunHandle {
    result: watch::Receiver<Option<SequenceReport>>,
}

impl RunHandle {
    /// Wait for the run to finish.
    ///
    /// Returns `None` only if the run aborted (panicked or was cancelled); the
    /// supervisor is idle again by then.
    pub async fn wait(mut self) -> Option<SequenceReport> {
        let report = self.result.wait_for(Option::is_some).await.ok()?;
        (*report).clone()
    }
}

/// What happened to a trigger request
#[derive(Debug)]
pub enum TriggerResponse {
    /// A new run was spawned
    Started(RunHandle),
    /// Parked behind the current run; starts when it ends
    Queued(RunHandle),
    /// Refused because a run is in flight
    Rejected,
    /// Attached to the run already in flight
    Joined(RunHandle),
}

impl TriggerResponse {
    /// What happened, without the handle
    pub fn disposition(&self) -> Disposition {
        match self {
            TriggerResponse::Started(_) => Disposition::Started,
            TriggerResponse::Queued(_) => Disposition::Queued,
            TriggerResponse::Rejected => Disposition::Rejected,
            TriggerResponse::Joined(_) => Disposition::Joined,
        }
    }

    /// The awaitable result, unless the request was rejected
    pub fn into_handle(self) -> Option<RunHandle> {
        match self {
            TriggerResponse::Started(h) | TriggerResponse::Queued(h) | TriggerResponse::Joined(h) => {
                Some(h)
            }
            TriggerResponse::Rejected => None,
        }
    }
}

/// Copyable summary of a [`TriggerResponse`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Started,
    Queued,
    Rejected,
    Joined,
}

/// Anything that can start remediation without blocking the caller
#[async_trait]
pub trait RemediationTrigger: Send + Sync {
    async fn trigger(&self, trigger: Trigger) -> Disposition;
}

struct ActiveRun {
    result: watch::Receiver<Option<SequenceReport>>,
}

struct PendingRun {
    trigger: Trigger,
    result: watch::Sender<Option<SequenceReport>>,
}

#[derive(Default)]
struct Slots {
    active: Option<ActiveRun>,
    pending: Option<PendingRun>,
    last_report: Option<SequenceReport>,
}

struct Inner {
    ctx: WatchdogContext,
    slots: Mutex<Slots>,
    status: watch::Sender<RunStatus>,
}

/// Single-flight owner of reboot sequences
#[derive(Clone)]
pub struct RemediationSupervisor {
    inner: Arc<Inner>,
}

impl RemediationSupervisor {
    /// Idle supervisor over `ctx`; the concurrency policy is read per request
    pub fn new(ctx: WatchdogContext) -> Self {
        let (status, _) = watch::channel(RunStatus::Idle);
        Self {
            inner: Arc::new(Inner {
                ctx,
                slots: Mutex::new(Slots::default()),
                status,
            }),
        }
    }

    /// Current run status
    pub fn status(&self) -> RunStatus {
        *self.inner.status.borrow()
    }

    /// Observe status changes
    pub fn subscribe(&self) -> watch::Receiver<RunStatus> {
        self.inner.status.subscribe()
    }

    /// Report of the most recent completed run
    pub fn last_report(&self) -> Option<SequenceReport> {
        self.slots().last_report.clone()
    }

    /// Request a run. Never waits for the run itself.
    pub fn request(&self, trigger: Trigger) -> TriggerResponse {
        let policy = self.inner.ctx.policy.snapshot().concurrency;
        let mut slots = self.slots();

        let Some(active) = slots.active.as_ref() else {
            let (tx, rx) = watch::channel(None);
            slots.active = Some(ActiveRun { result: rx.clone() });
            drop(slots);
            self.spawn(trigger, tx);
            return TriggerResponse::Started(RunHandle { result: rx });
        };

        match policy {
            ConcurrencyPolicy::Reject => {
                warn!(
                    "Reboot sequence already running; {} request rejected.",
                    trigger
                );
                TriggerResponse::Rejected
            }
            ConcurrencyPolicy::Join => {
                info!(
                    "Reboot sequence already running; {} request joined it.",
                    trigger
                );
                TriggerResponse::Joined(RunHandle {
                    result: active.result.clone(),
                })
            }
            ConcurrencyPolicy::Queue => {
                if let Some(pending) = slots.pending.as_ref() {
                    info!(
                        "Reboot sequence already queued; {} request coalesced.",
                        trigger
                    );
                    return TriggerResponse::Queued(RunHandle {
                        result: pending.result.subscribe(),
                    });
                }
                info!(
                    "Reboot sequence already running; {} request queued.",
                    trigger
                );
                let (tx, rx) = watch::channel(None);
                slots.pending = Some(PendingRun {
                    trigger,
                    result: tx,
                });
                TriggerResponse::Queued(RunHandle { result: rx })
            }
        }
    }

    fn spawn(&self, trigger: Trigger, result: watch::Sender<Option<SequenceReport>>) {
        self.inner.status.send_replace(RunStatus::Running {
            trigger,
            since: self.inner.ctx.clock.now(),
        });

        let supervisor = self.clone();
        let sequence = RebootSequence::new(self.inner.ctx.clone());
        tokio::spawn(async move {
            // The run gets its own task so a panic inside it still frees the slot.
            let report = match tokio::spawn(async move { sequence.run(trigger).await }).await {
                Ok(report) => {
                    info!("{}", report.summary());
                    Some(report)
                }
                Err(e) => {
                    error!("{} reboot sequence aborted: {}", trigger, e);
                    None
                }
            };
            // Status settles before waiters wake.
            supervisor.finish(report.clone());
            match report {
                Some(report) => {
                    result.send_replace(Some(report));
                }
                // Dropping the sender wakes waiters with `None`.
                None => drop(result),
            }
        });
    }

    fn finish(&self, report: Option<SequenceReport>) {
        let mut slots = self.slots();
        if report.is_some() {
            slots.last_report = report;
        }
        slots.active = None;

        match slots.pending.take() {
            Some(next) => {
                slots.active = Some(ActiveRun {
                    result: next.result.subscribe(),
                });
                drop(slots);
                info!("Starting queued {} reboot sequence.", next.trigger);
                self.spawn(next.trigger, next.result);
            }
            None => {
                drop(slots);
                self.inner.status.send_replace(RunStatus::Idle);
            }
        }
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.inner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RemediationTrigger for RemediationSupervisor {
    async fn trigger(&self, trigger: Trigger) -> Disposition {
        self.request(trigger).disposition()
    }
}

impl std::fmt::Debug for RemediationSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemediationSupervisor")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
