//! Poll scheduler and the state it owns: the previous-snapshot counter
//! store, the per-session identity, and the shared display state consumers
//! read from.
//!
//! One fetch in flight at a time, ever. Ticks that land while a fetch is
//! outstanding are dropped, not queued, so a slow device link degrades the
//! update rate instead of stacking requests.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::derive;
use crate::history::{PerCoreHistory, Series, AGGREGATE_HISTORY, PER_CORE_HISTORY};
use crate::probe::SnapshotSource;
use crate::types::{DerivedMetrics, MetricSnapshot, DISPLAY_CORES};

pub type DeviceId = String;

/// Which history series a consumer wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesKind {
    CpuOverall,
    Memory,
    Fps,
    /// Display slot 0..7; anything past that yields an empty series.
    Core(usize),
}

/// What one cadence tick amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No device selected; polling is a no-op.
    NoSession,
    /// A fetch was already in flight; this tick was dropped.
    Busy,
    /// Snapshot fetched and folded into the display state.
    Applied,
    /// The response arrived for a session that is no longer current.
    Stale,
    /// The fetch came back with every field failed.
    NoData,
    /// Total transport failure; displayed values untouched.
    TransportDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollState {
    Idle,
    Fetching,
}

#[derive(Default)]
struct SessionState {
    device: Option<DeviceId>,
    // Bumped on every change; responses tagged with an older generation are
    // discarded at apply-time.
    generation: u64,
}

struct DisplayState {
    derived: DerivedMetrics,
    cpu: Series<u16>,
    memory: Series<u16>,
    fps: Series<u16>,
    cores: PerCoreHistory,
}

impl DisplayState {
    fn new() -> Self {
        Self {
            derived: DerivedMetrics::default(),
            cpu: Series::new(AGGREGATE_HISTORY, 0),
            memory: Series::new(AGGREGATE_HISTORY, 0),
            fps: Series::new(AGGREGATE_HISTORY, 0),
            cores: PerCoreHistory::new(PER_CORE_HISTORY, 0),
        }
    }
}

/// Cloneable read-side handle. Consumers only ever get copies of the display
/// state; the poll loop is the sole writer.
#[derive(Clone)]
pub struct MonitorHandle {
    session: Arc<RwLock<SessionState>>,
    display: Arc<RwLock<DisplayState>>,
}

impl MonitorHandle {
    /// Select the device to poll, or None to stop. Either way the previous
    /// session's counters can never be diffed against the new one.
    pub fn set_active_device(&self, device: Option<DeviceId>) {
        let mut session = write_lock(&self.session);
        session.device = device;
        session.generation += 1;
    }

    pub fn active_device(&self) -> Option<DeviceId> {
        read_lock(&self.session).device.clone()
    }

    pub fn derived(&self) -> DerivedMetrics {
        read_lock(&self.display).derived.clone()
    }

    pub fn series(&self, kind: SeriesKind) -> Vec<u16> {
        let display = read_lock(&self.display);
        match kind {
            SeriesKind::CpuOverall => display.cpu.snapshot(),
            SeriesKind::Memory => display.memory.snapshot(),
            SeriesKind::Fps => display.fps.snapshot(),
            SeriesKind::Core(slot) => display.cores.snapshot(slot),
        }
    }
}

pub struct Monitor<S> {
    source: S,
    session: Arc<RwLock<SessionState>>,
    display: Arc<RwLock<DisplayState>>,
    // Counter store: the one previous snapshot, tagged with the session
    // generation that produced it.
    prev: Option<(u64, MetricSnapshot)>,
    state: PollState,
    interval: Duration,
}

impl<S: SnapshotSource> Monitor<S> {
    pub fn new(source: S, interval: Duration) -> Self {
        Self {
            source,
            session: Arc::new(RwLock::new(SessionState::default())),
            display: Arc::new(RwLock::new(DisplayState::new())),
            prev: None,
            state: PollState::Idle,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            session: Arc::clone(&self.session),
            display: Arc::clone(&self.display),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One cadence tick: fetch, derive, publish. Skips itself when no device
    /// is selected or a fetch is already outstanding.
    pub async fn tick(&mut self) -> TickOutcome {
        let (device, generation) = {
            let session = read_lock(&self.session);
            match &session.device {
                None => return TickOutcome::NoSession,
                Some(device) => (device.clone(), session.generation),
            }
        };
        if self.state == PollState::Fetching {
            debug!("tick dropped: fetch already in flight");
            return TickOutcome::Busy;
        }

        self.state = PollState::Fetching;
        let outcome = self.fetch_and_apply(&device, generation).await;
        self.state = PollState::Idle;
        outcome
    }

    /// Poll forever on the configured cadence. Ticks missed while a fetch is
    /// outstanding are skipped, never queued.
    pub async fn run(&mut self) {
        let mut ticks = tokio::time::interval(self.interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticks.tick().await;
            self.tick().await;
        }
    }

    async fn fetch_and_apply(&mut self, device: &str, generation: u64) -> TickOutcome {
        let mut snapshot = match self.source.fetch_snapshot(device).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("snapshot fetch from {device} failed: {e}");
                return TickOutcome::TransportDown;
            }
        };
        snapshot.foreground_app = self.source.fetch_foreground_app(device).await;

        // Apply-time session check: a response that outlived its session must
        // not contaminate the new device's state.
        if read_lock(&self.session).generation != generation {
            debug!("discarding late response from {device}");
            return TickOutcome::Stale;
        }

        if !snapshot.any_ok() {
            warn!("snapshot from {device} had no usable fields");
            return TickOutcome::NoData;
        }

        let prev = match self.prev.take() {
            Some((tag, stored)) if tag == generation => Some(stored),
            _ => None,
        };

        {
            let mut display = write_lock(&self.display);
            let derived = derive::derive(prev.as_ref(), &snapshot, &display.derived);
            display.cpu.push(derived.cpu_overall_pct);
            display.memory.push(derived.memory_pct);
            display.fps.push(derived.fps);
            for slot in 0..DISPLAY_CORES {
                display.cores.push(slot, derived.per_core[slot].pct);
            }
            display.derived = derived;
        }

        self.prev = Some((generation, snapshot));
        TickOutcome::Applied
    }
}

// Poisoning only means another thread panicked mid-write; the metric state
// is plain data, so keep serving it.
fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
