//! Snapshot assembly: run the probe commands over the bridge and tag each
//! reading Ok/Err on its own, so one bad probe never blanks the rest.

use std::future::Future;

use chrono::Utc;

use crate::parse;
use crate::types::{DisplayCounters, Field, FieldError, MetricSnapshot};
use crate::ws::{self, TransportError, WsStream};

const CMD_CPU_STAT: &str = "cat /proc/stat";
const CMD_CPU_FREQ: &str = "cat /sys/devices/system/cpu/cpu*/cpufreq/scaling_cur_freq";
const CMD_MEMINFO: &str = "cat /proc/meminfo";
const CMD_UPTIME: &str = "cat /proc/uptime";
const CMD_SURFACEFLINGER: &str = "dumpsys SurfaceFlinger";
const CMD_TOP_ACTIVITY: &str = "dumpsys activity";

/// The transport seam the poll scheduler depends on. An implementation talks
/// to one device at a time, keyed by the caller-supplied device id.
pub trait SnapshotSource {
    /// Fetch one snapshot. Errs only on total loss of the device link;
    /// individual probe problems surface as field errors inside the snapshot.
    fn fetch_snapshot(
        &mut self,
        device: &str,
    ) -> impl Future<Output = Result<MetricSnapshot, TransportError>> + Send;

    /// Fetch the foreground app name. Always field-level: the scheduler
    /// merges it into the snapshot it already has.
    fn fetch_foreground_app(&mut self, device: &str) -> impl Future<Output = Field<String>> + Send;
}

/// Probe source backed by a WebSocket shell bridge. Reconnects lazily when
/// the target device changes or the previous connection died.
pub struct WsProbe {
    conn: Option<(String, WsStream)>,
}

impl WsProbe {
    pub fn new() -> Self {
        Self { conn: None }
    }

    async fn ensure(&mut self, device: &str) -> Result<&mut WsStream, TransportError> {
        let reusable = matches!(&self.conn, Some((d, _)) if d == device);
        if !reusable {
            let ws = ws::connect(device).await?;
            self.conn = Some((device.to_string(), ws));
        }
        match self.conn.as_mut() {
            Some((_, ws)) => Ok(ws),
            None => Err(TransportError::Closed),
        }
    }

    async fn snapshot_inner(&mut self, device: &str) -> Result<MetricSnapshot, TransportError> {
        let ws = self.ensure(device).await?;

        let cpu = {
            let out = ws::run_command(ws, CMD_CPU_STAT).await?;
            let mut cores = parse::parse_cpu_stat(&out);
            if cores.is_empty() {
                Err(FieldError::Parse("no cpu lines in /proc/stat".to_string()))
            } else {
                // Clock speeds are best-effort; a denied sysfs read just
                // leaves them unset.
                let freq_out = ws::run_command(ws, CMD_CPU_FREQ).await?;
                parse::apply_clock_speeds(&mut cores, &parse::parse_clock_speeds(&freq_out));
                Ok(cores)
            }
        };

        let memory = {
            let out = ws::run_command(ws, CMD_MEMINFO).await?;
            parse::parse_meminfo(&out)
                .ok_or_else(|| FieldError::Parse("unrecognized meminfo output".to_string()))
        };

        let display = {
            let out = ws::run_command(ws, CMD_SURFACEFLINGER).await?;
            let timestamp_ms = Utc::now().timestamp_millis() as u64;
            parse::parse_flips(&out)
                .map(|flips| DisplayCounters {
                    flips,
                    timestamp_ms,
                })
                .ok_or_else(|| {
                    FieldError::Parse("no flips counter in SurfaceFlinger dump".to_string())
                })
        };

        let uptime_secs = {
            let out = ws::run_command(ws, CMD_UPTIME).await?;
            parse::parse_uptime(&out)
                .ok_or_else(|| FieldError::Parse("unrecognized uptime output".to_string()))
        };

        Ok(MetricSnapshot {
            cpu,
            memory,
            display,
            uptime_secs,
            foreground_app: Err(FieldError::Command("not collected".to_string())),
        })
    }
}

impl Default for WsProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotSource for WsProbe {
    async fn fetch_snapshot(&mut self, device: &str) -> Result<MetricSnapshot, TransportError> {
        let res = self.snapshot_inner(device).await;
        if res.is_err() {
            // Dead link: force a reconnect on the next poll
            self.conn = None;
        }
        res
    }

    async fn fetch_foreground_app(&mut self, device: &str) -> Field<String> {
        let out = match self.ensure(device).await {
            Ok(ws) => ws::run_command(ws, CMD_TOP_ACTIVITY).await,
            Err(e) => Err(e),
        };
        match out {
            Ok(dump) => parse::parse_top_activity(&dump)
                .ok_or_else(|| FieldError::Parse("no top-activity entry".to_string())),
            Err(e) => {
                self.conn = None;
                Err(FieldError::Command(e.to_string()))
            }
        }
    }
}
