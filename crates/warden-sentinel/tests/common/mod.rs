//! Fakes shared by the watchdog integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use warden_core_resilience::ManualClock;
use warden_sentinel::{
    ConnectivityProbe, Delivery, DeviceController, Notifier, PolicyHandle, PowerCycleReport,
    WatchdogContext, WatchdogPolicy,
};

/// Answers from a script, then `fallback` once the script runs out
pub struct ScriptedProbe {
    script: Mutex<VecDeque<bool>>,
    fallback: bool,
    calls: AtomicU32,
}

impl ScriptedProbe {
    pub fn new(script: &[bool], fallback: bool) -> Self {
        Self {
            script: Mutex::new(script.iter().copied().collect()),
            fallback,
            calls: AtomicU32::new(0),
        }
    }

    pub fn always(up: bool) -> Self {
        Self::new(&[], up)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectivityProbe for ScriptedProbe {
    async fn check(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback)
    }
}

/// Counts power cycles; optionally blocks each cycle until released
pub struct FakeRelay {
    cycles: AtomicU32,
    gate: Option<Semaphore>,
}

impl FakeRelay {
    pub fn new() -> Self {
        Self {
            cycles: AtomicU32::new(0),
            gate: None,
        }
    }

    /// Every cycle waits for one permit from [`FakeRelay::release`]
    pub fn gated() -> Self {
        Self {
            cycles: AtomicU32::new(0),
            gate: Some(Semaphore::new(0)),
        }
    }

    pub fn release(&self, cycles: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(cycles);
        }
    }

    pub fn cycles(&self) -> u32 {
        self.cycles.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceController for FakeRelay {
    async fn cycle_power(&self) -> PowerCycleReport {
        self.cycles.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        PowerCycleReport {
            off_ok: true,
            on_ok: true,
        }
    }
}

/// Records every message and reports it as sent
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.messages()
            .iter()
            .filter(|m| m.contains(needle))
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &str) -> Delivery {
        let mut messages = self.messages.lock().unwrap();
        messages.push(message.to_string());
        Delivery::Sent {
            sid: format!("SM{}", messages.len()),
        }
    }
}

pub struct Harness {
    pub ctx: WatchdogContext,
    pub clock: Arc<ManualClock>,
    pub probe: Arc<ScriptedProbe>,
    pub relay: Arc<FakeRelay>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new(policy: WatchdogPolicy, probe: ScriptedProbe, relay: FakeRelay) -> Self {
        let clock = Arc::new(ManualClock::new());
        let probe = Arc::new(probe);
        let relay = Arc::new(relay);
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = WatchdogContext::new(
            PolicyHandle::fixed(policy),
            clock.clone(),
            probe.clone(),
            relay.clone(),
            notifier.clone(),
        );
        Self {
            ctx,
            clock,
            probe,
            relay,
            notifier,
        }
    }
}

/// Policy with no waiting so sequences finish in a handful of yields
pub fn fast_policy(max_attempts: u32) -> WatchdogPolicy {
    WatchdogPolicy {
        max_attempts,
        total_duration_s: 24 * 3600,
        wait_time_s: 0,
        check_interval_s: 0,
        ..Default::default()
    }
}
