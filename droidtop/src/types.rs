//! Raw device readings and the display-ready values derived from them.

use serde::Serialize;
use thiserror::Error;

/// Number of individual core slots shown by consumers (`cpu0`..`cpu7`).
pub const DISPLAY_CORES: usize = 8;

/// Why one probe's value is missing from a snapshot. Field-level only:
/// the rest of the snapshot is unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("command failed: {0}")]
    Command(String),
    #[error("parse error: {0}")]
    Parse(String),
}

/// One raw metric reading that may have failed on its own.
pub type Field<T> = Result<T, FieldError>;

/// Per-core cumulative tick counters since device boot, from /proc/stat.
/// `name` is `"cpu"` for the all-cores aggregate line, `"cpuN"` otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCoreTicks {
    pub name: String,
    pub user: u64,
    pub nice: u64,
    pub sys: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub clock_mhz: Option<u32>,
}

impl RawCoreTicks {
    pub fn is_aggregate(&self) -> bool {
        self.name == "cpu"
    }

    /// Core number parsed from `"cpuN"`; None for the aggregate line or an
    /// unrecognizable name.
    pub fn core_index(&self) -> Option<usize> {
        self.name.strip_prefix("cpu")?.parse().ok()
    }

    /// Sum of all seven tick categories.
    pub fn total_ticks(&self) -> u64 {
        [
            self.user,
            self.nice,
            self.sys,
            self.idle,
            self.iowait,
            self.irq,
            self.softirq,
        ]
        .iter()
        .fold(0u64, |acc, v| acc.saturating_add(*v))
    }

    /// Idle + iowait: time the core spent doing nothing useful.
    pub fn idle_ticks(&self) -> u64 {
        self.idle.saturating_add(self.iowait)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryReading {
    pub total_kb: u64,
    pub available_kb: u64,
}

/// Cumulative compositor frame counter plus the client-side time it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayCounters {
    pub flips: u64,
    pub timestamp_ms: u64,
}

/// One polling result. Every field is independently Ok/Err so a single
/// failed probe never blanks the rest of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSnapshot {
    /// Index 0 is the aggregate `cpu` line, the rest are individual cores.
    pub cpu: Field<Vec<RawCoreTicks>>,
    pub memory: Field<MemoryReading>,
    pub display: Field<DisplayCounters>,
    pub uptime_secs: Field<u64>,
    pub foreground_app: Field<String>,
}

impl MetricSnapshot {
    /// True when at least one probe succeeded. A snapshot with nothing in it
    /// is not worth applying.
    pub fn any_ok(&self) -> bool {
        self.cpu.is_ok()
            || self.memory.is_ok()
            || self.display.is_ok()
            || self.uptime_secs.is_ok()
            || self.foreground_app.is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CoreMetric {
    pub pct: u16,
    pub clock_mhz: Option<u32>,
}

/// Display-ready values. Fields whose raw inputs failed this poll keep their
/// previous value, so this is always safe to render as-is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedMetrics {
    pub cpu_overall_pct: u16,
    pub per_core: [CoreMetric; DISPLAY_CORES],
    pub memory_pct: u16,
    pub memory_used_label: String,
    pub fps: u16,
    pub uptime_label: String,
    pub foreground_app: String,
}

impl Default for DerivedMetrics {
    fn default() -> Self {
        Self {
            cpu_overall_pct: 0,
            per_core: [CoreMetric::default(); DISPLAY_CORES],
            memory_pct: 0,
            memory_used_label: "0 MB".to_string(),
            fps: 0,
            uptime_label: "0:00:00".to_string(),
            foreground_app: String::new(),
        }
    }
}
