//! Pure derivation of display metrics from a pair of raw snapshots.
//!
//! No I/O and no shared state: given the previous snapshot (if any), the
//! current one, and the values currently on screen, produce the next set of
//! display values. Anything that cannot be computed this poll (missing
//! probe, counter reset, zero elapsed time) keeps its previous value.

use std::collections::HashMap;

use crate::types::{
    DerivedMetrics, DisplayCounters, MetricSnapshot, RawCoreTicks, DISPLAY_CORES,
};

pub fn derive(
    prev: Option<&MetricSnapshot>,
    cur: &MetricSnapshot,
    last: &DerivedMetrics,
) -> DerivedMetrics {
    let mut out = last.clone();

    if let Ok(mem) = &cur.memory {
        if mem.total_kb > 0 {
            let used_kb = mem.total_kb.saturating_sub(mem.available_kb);
            out.memory_pct = ratio_pct(used_kb, mem.total_kb);
            out.memory_used_label = format!("{} MB", used_kb / 1024);
        }
    }

    if let Ok(secs) = &cur.uptime_secs {
        out.uptime_label = format_uptime(*secs);
    }

    if let Ok(app) = &cur.foreground_app {
        out.foreground_app = app.clone();
    }

    if let Ok(cur_cores) = &cur.cpu {
        let prev_by_name: HashMap<&str, &RawCoreTicks> = prev
            .and_then(|p| p.cpu.as_ref().ok())
            .map(|cores| cores.iter().map(|c| (c.name.as_str(), c)).collect())
            .unwrap_or_default();
        apply_cpu(&prev_by_name, cur_cores, &mut out);
    }

    let prev_display = prev.and_then(|p| p.display.as_ref().ok());
    if let (Some(pd), Ok(cd)) = (prev_display, &cur.display) {
        out.fps = fps(pd, cd, last.fps);
    }

    out
}

/// Cores are matched by name, not position: the device may reorder or omit
/// cores between polls. A core with no previous reading keeps its displayed
/// percentage but still refreshes its clock speed.
fn apply_cpu(
    prev_by_name: &HashMap<&str, &RawCoreTicks>,
    cur_cores: &[RawCoreTicks],
    out: &mut DerivedMetrics,
) {
    for core in cur_cores {
        let fresh_pct = prev_by_name
            .get(core.name.as_str())
            .copied()
            .and_then(|prev| usage_pct(prev, core));

        if core.is_aggregate() {
            if let Some(pct) = fresh_pct {
                out.cpu_overall_pct = pct;
            }
            continue;
        }

        let Some(slot) = core.core_index().filter(|ix| *ix < DISPLAY_CORES) else {
            // cpu8+ or an unparseable name: not shown, not an error
            continue;
        };
        if let Some(pct) = fresh_pct {
            out.per_core[slot].pct = pct;
        }
        if let Some(mhz) = core.clock_mhz {
            out.per_core[slot].clock_mhz = Some(mhz);
        }
    }
}

/// Busy percentage over the interval between two readings of one core.
/// None when there is no usable delta: any counter went backwards (device
/// reset) or no ticks elapsed at all.
fn usage_pct(prev: &RawCoreTicks, cur: &RawCoreTicks) -> Option<u16> {
    let total = cur.total_ticks().checked_sub(prev.total_ticks())?;
    if total == 0 {
        return None;
    }
    let idle = cur.idle_ticks().checked_sub(prev.idle_ticks())?;
    let busy = 100.0 * (1.0 - idle as f64 / total as f64);
    Some(busy.round().clamp(0.0, 100.0) as u16)
}

/// Frames per second from the compositor flip counter. An unchanged counter
/// is a genuinely static screen (0 fps); a decreased counter or non-positive
/// elapsed time yields no new reading.
fn fps(prev: &DisplayCounters, cur: &DisplayCounters, last: u16) -> u16 {
    use std::cmp::Ordering;

    match cur.flips.cmp(&prev.flips) {
        Ordering::Equal => 0,
        Ordering::Less => last,
        Ordering::Greater => {
            let elapsed_ms = cur.timestamp_ms.saturating_sub(prev.timestamp_ms);
            if elapsed_ms == 0 {
                return last;
            }
            let frames = (cur.flips - prev.flips) as f64;
            let fps = (1000.0 * frames / elapsed_ms as f64).round();
            fps.clamp(0.0, u16::MAX as f64) as u16
        }
    }
}

fn ratio_pct(part: u64, whole: u64) -> u16 {
    let pct = (100.0 * part as f64 / whole as f64).round();
    pct.clamp(0.0, 100.0) as u16
}

/// `H:MM:SS`, with a day count prefix once the device has been up that long.
pub fn format_uptime(total_secs: u64) -> String {
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3_600;
    let mins = (total_secs % 3_600) / 60;
    let secs = total_secs % 60;
    if days > 0 {
        format!("{days}d {hours}:{mins:02}:{secs:02}")
    } else {
        format!("{hours}:{mins:02}:{secs:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldError, MemoryReading};

    fn core(name: &str, user: u64, sys: u64, idle: u64) -> RawCoreTicks {
        RawCoreTicks {
            name: name.to_string(),
            user,
            nice: 0,
            sys,
            idle,
            iowait: 0,
            irq: 0,
            softirq: 0,
            clock_mhz: None,
        }
    }

    fn empty_snapshot() -> MetricSnapshot {
        let missing = FieldError::Command("not collected".to_string());
        MetricSnapshot {
            cpu: Err(missing.clone()),
            memory: Err(missing.clone()),
            display: Err(missing.clone()),
            uptime_secs: Err(missing.clone()),
            foreground_app: Err(missing),
        }
    }

    fn cpu_snapshot(cores: Vec<RawCoreTicks>) -> MetricSnapshot {
        MetricSnapshot {
            cpu: Ok(cores),
            ..empty_snapshot()
        }
    }

    #[test]
    fn test_aggregate_usage_from_deltas() {
        // 400 -> 460 total ticks, 200 -> 210 idle: 1 - 10/60 rounds to 83%
        let prev = cpu_snapshot(vec![core("cpu", 100, 100, 200)]);
        let cur = cpu_snapshot(vec![core("cpu", 150, 100, 210)]);
        let out = derive(Some(&prev), &cur, &DerivedMetrics::default());
        assert_eq!(out.cpu_overall_pct, 83);
    }

    #[test]
    fn test_usage_stays_in_bounds() {
        let mut prev = core("cpu", 0, 0, 0);
        let mut displayed = DerivedMetrics::default();
        // Arbitrary non-decreasing walk: every output must stay in 0..=100
        for step in 1..50u64 {
            let cur = core("cpu", prev.user + step * 7, prev.sys + 3, prev.idle + step);
            let out = derive(
                Some(&cpu_snapshot(vec![prev.clone()])),
                &cpu_snapshot(vec![cur.clone()]),
                &displayed,
            );
            assert!(out.cpu_overall_pct <= 100);
            displayed = out;
            prev = cur;
        }
    }

    #[test]
    fn test_no_baseline_keeps_defaults() {
        let cur = cpu_snapshot(vec![core("cpu", 500, 100, 400)]);
        let out = derive(None, &cur, &DerivedMetrics::default());
        assert_eq!(out.cpu_overall_pct, 0);
        assert_eq!(out.fps, 0);
    }

    #[test]
    fn test_counter_reset_retains_displayed_value() {
        let displayed = DerivedMetrics {
            cpu_overall_pct: 42,
            ..DerivedMetrics::default()
        };
        // Device rebooted: counters went backwards
        let prev = cpu_snapshot(vec![core("cpu", 5000, 1000, 9000)]);
        let cur = cpu_snapshot(vec![core("cpu", 10, 5, 20)]);
        let out = derive(Some(&prev), &cur, &displayed);
        assert_eq!(out.cpu_overall_pct, 42);
    }

    #[test]
    fn test_zero_elapsed_retains_displayed_value() {
        let displayed = DerivedMetrics {
            cpu_overall_pct: 55,
            ..DerivedMetrics::default()
        };
        let same = cpu_snapshot(vec![core("cpu", 100, 100, 200)]);
        let out = derive(Some(&same), &same.clone(), &displayed);
        assert_eq!(out.cpu_overall_pct, 55);
    }

    #[test]
    fn test_cores_matched_by_name_not_position() {
        let prev = cpu_snapshot(vec![
            core("cpu0", 100, 0, 100),
            core("cpu1", 200, 0, 200),
        ]);
        // Same cores, opposite order; cpu0 fully busy, cpu1 fully idle
        let cur = cpu_snapshot(vec![
            core("cpu1", 200, 0, 300),
            core("cpu0", 200, 0, 100),
        ]);
        let out = derive(Some(&prev), &cur, &DerivedMetrics::default());
        assert_eq!(out.per_core[0].pct, 100);
        assert_eq!(out.per_core[1].pct, 0);
    }

    #[test]
    fn test_new_core_records_clock_without_pct() {
        let displayed = DerivedMetrics::default();
        let prev = cpu_snapshot(vec![core("cpu0", 100, 0, 100)]);
        let mut hot = core("cpu1", 500, 0, 500);
        hot.clock_mhz = Some(2112);
        let cur = cpu_snapshot(vec![core("cpu0", 150, 0, 150), hot]);
        let out = derive(Some(&prev), &cur, &displayed);
        assert_eq!(out.per_core[1].pct, 0);
        assert_eq!(out.per_core[1].clock_mhz, Some(2112));
    }

    #[test]
    fn test_out_of_range_core_ignored() {
        let prev = cpu_snapshot(vec![core("cpu9", 0, 0, 0), core("cpuX", 0, 0, 0)]);
        let cur = cpu_snapshot(vec![
            core("cpu9", 100, 0, 0),
            core("cpuX", 100, 0, 0),
        ]);
        let out = derive(Some(&prev), &cur, &DerivedMetrics::default());
        assert_eq!(out, DerivedMetrics::default());
    }

    #[test]
    fn test_memory_percent_and_label() {
        let cur = MetricSnapshot {
            memory: Ok(MemoryReading {
                total_kb: 8_000_000,
                available_kb: 2_000_000,
            }),
            ..empty_snapshot()
        };
        let out = derive(None, &cur, &DerivedMetrics::default());
        assert_eq!(out.memory_pct, 75);
        assert_eq!(out.memory_used_label, "5859 MB");
    }

    #[test]
    fn test_fps_from_flip_delta() {
        let prev = MetricSnapshot {
            display: Ok(DisplayCounters {
                flips: 1000,
                timestamp_ms: 0,
            }),
            ..empty_snapshot()
        };
        let cur = MetricSnapshot {
            display: Ok(DisplayCounters {
                flips: 1030,
                timestamp_ms: 1000,
            }),
            ..empty_snapshot()
        };
        let out = derive(Some(&prev), &cur, &DerivedMetrics::default());
        assert_eq!(out.fps, 30);
    }

    #[test]
    fn test_static_screen_is_zero_fps() {
        let displayed = DerivedMetrics {
            fps: 60,
            ..DerivedMetrics::default()
        };
        let prev = MetricSnapshot {
            display: Ok(DisplayCounters {
                flips: 1000,
                timestamp_ms: 0,
            }),
            ..empty_snapshot()
        };
        let cur = MetricSnapshot {
            display: Ok(DisplayCounters {
                flips: 1000,
                timestamp_ms: 1000,
            }),
            ..empty_snapshot()
        };
        let out = derive(Some(&prev), &cur, &displayed);
        assert_eq!(out.fps, 0);
    }

    #[test]
    fn test_flip_reset_and_clock_skew_retain_fps() {
        let displayed = DerivedMetrics {
            fps: 60,
            ..DerivedMetrics::default()
        };
        let prev = MetricSnapshot {
            display: Ok(DisplayCounters {
                flips: 1000,
                timestamp_ms: 5000,
            }),
            ..empty_snapshot()
        };
        // Counter reset
        let reset = MetricSnapshot {
            display: Ok(DisplayCounters {
                flips: 3,
                timestamp_ms: 6000,
            }),
            ..empty_snapshot()
        };
        assert_eq!(derive(Some(&prev), &reset, &displayed).fps, 60);
        // Flips grew but no time elapsed
        let skewed = MetricSnapshot {
            display: Ok(DisplayCounters {
                flips: 1030,
                timestamp_ms: 5000,
            }),
            ..empty_snapshot()
        };
        assert_eq!(derive(Some(&prev), &skewed, &displayed).fps, 60);
    }

    #[test]
    fn test_failed_fields_keep_previous_values() {
        let displayed = DerivedMetrics {
            memory_pct: 75,
            memory_used_label: "5859 MB".to_string(),
            ..DerivedMetrics::default()
        };
        // Memory probe failed, CPU and display came through
        let prev = MetricSnapshot {
            cpu: Ok(vec![core("cpu", 100, 100, 200)]),
            display: Ok(DisplayCounters {
                flips: 1000,
                timestamp_ms: 0,
            }),
            ..empty_snapshot()
        };
        let cur = MetricSnapshot {
            cpu: Ok(vec![core("cpu", 150, 100, 210)]),
            display: Ok(DisplayCounters {
                flips: 1030,
                timestamp_ms: 1000,
            }),
            ..empty_snapshot()
        };
        let out = derive(Some(&prev), &cur, &displayed);
        assert_eq!(out.memory_pct, 75);
        assert_eq!(out.memory_used_label, "5859 MB");
        assert_eq!(out.cpu_overall_pct, 83);
        assert_eq!(out.fps, 30);
    }

    #[test]
    fn test_derivation_is_idempotent() {
        let prev = MetricSnapshot {
            cpu: Ok(vec![core("cpu", 100, 100, 200), core("cpu0", 50, 50, 100)]),
            display: Ok(DisplayCounters {
                flips: 1000,
                timestamp_ms: 0,
            }),
            ..empty_snapshot()
        };
        let cur = MetricSnapshot {
            cpu: Ok(vec![core("cpu", 150, 100, 210), core("cpu0", 80, 50, 120)]),
            memory: Ok(MemoryReading {
                total_kb: 4_000_000,
                available_kb: 1_000_000,
            }),
            display: Ok(DisplayCounters {
                flips: 1060,
                timestamp_ms: 1000,
            }),
            uptime_secs: Ok(90_061),
            foreground_app: Ok("com.example.game".to_string()),
        };
        let base = DerivedMetrics::default();
        let once = derive(Some(&prev), &cur, &base);
        let twice = derive(Some(&prev), &cur, &base);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_uptime_label() {
        assert_eq!(format_uptime(0), "0:00:00");
        assert_eq!(format_uptime(59), "0:00:59");
        assert_eq!(format_uptime(3_661), "1:01:01");
        assert_eq!(format_uptime(86_400), "1d 0:00:00");
        assert_eq!(format_uptime(90_061), "1d 1:01:01");
        assert_eq!(format_uptime(10 * 86_400 + 7_205), "10d 2:00:05");
    }

    #[test]
    fn test_uptime_and_foreground_need_no_baseline() {
        let cur = MetricSnapshot {
            uptime_secs: Ok(3_661),
            foreground_app: Ok("com.android.launcher3".to_string()),
            ..empty_snapshot()
        };
        let out = derive(None, &cur, &DerivedMetrics::default());
        assert_eq!(out.uptime_label, "1:01:01");
        assert_eq!(out.foreground_app, "com.android.launcher3");
    }
}
