//! Parsers for the raw text the device bridge returns for each probe command.

use crate::types::{MemoryReading, RawCoreTicks};

/// Parse /proc/stat. Keeps the aggregate `cpu` line as element 0, then one
/// entry per `cpuN` line in file order.
pub fn parse_cpu_stat(output: &str) -> Vec<RawCoreTicks> {
    let mut cpus = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if !line.starts_with("cpu") {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() >= 8 {
            cpus.push(RawCoreTicks {
                name: parts[0].to_string(),
                user: parts[1].parse().unwrap_or(0),
                nice: parts[2].parse().unwrap_or(0),
                sys: parts[3].parse().unwrap_or(0),
                idle: parts[4].parse().unwrap_or(0),
                iowait: parts[5].parse().unwrap_or(0),
                irq: parts[6].parse().unwrap_or(0),
                softirq: parts[7].parse().unwrap_or(0),
                clock_mhz: None,
            });
        }
    }
    cpus
}

/// Parse the cpufreq scaling_cur_freq dump: one kHz value per line, in core
/// order. Non-numeric lines (permission errors etc.) are skipped.
pub fn parse_clock_speeds(output: &str) -> Vec<u32> {
    output
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .map(|khz| khz / 1000)
        .collect()
}

/// Attach clock speeds to cores by core number: `speeds_mhz[i]` belongs to
/// the core named `cpu{i}`. The aggregate line gets none.
pub fn apply_clock_speeds(cores: &mut [RawCoreTicks], speeds_mhz: &[u32]) {
    for core in cores.iter_mut() {
        if let Some(ix) = core.core_index() {
            if let Some(mhz) = speeds_mhz.get(ix) {
                core.clock_mhz = Some(*mhz);
            }
        }
    }
}

/// Parse /proc/meminfo. Requires a positive MemTotal to count as valid.
pub fn parse_meminfo(output: &str) -> Option<MemoryReading> {
    let mut total_kb = 0;
    let mut available_kb = 0;

    for line in output.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() >= 2 {
            let value = parts[1].parse::<u64>().unwrap_or(0);
            match parts[0] {
                "MemTotal:" => total_kb = value,
                "MemAvailable:" => available_kb = value,
                _ => {}
            }
        }
    }

    if total_kb > 0 {
        Some(MemoryReading {
            total_kb,
            available_kb,
        })
    } else {
        None
    }
}

/// Parse /proc/uptime: first field is seconds-since-boot as a float.
pub fn parse_uptime(output: &str) -> Option<u64> {
    let first = output.split_whitespace().next()?;
    first.parse::<f64>().ok().map(|secs| secs as u64)
}

/// Scan a SurfaceFlinger dump for the cumulative `flips=` counter.
pub fn parse_flips(output: &str) -> Option<u64> {
    for line in output.lines() {
        let line = line.trim();
        if let Some(idx) = line.find("flips=") {
            let remain = &line[idx + 6..];
            let digits: String = remain.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(flips) = digits.parse::<u64>() {
                return Some(flips);
            }
        }
    }
    None
}

/// Pull the foreground package name out of a `dumpsys activity` dump. The
/// top-activity line carries a `pid:package/activity` token second from the
/// end.
pub fn parse_top_activity(output: &str) -> Option<String> {
    let top_line = output
        .lines()
        .map(str::trim)
        .find(|line| line.contains("top-activity"))?;

    let parts: Vec<&str> = top_line.split_whitespace().collect();
    if parts.len() < 2 {
        return None;
    }
    let pkg_part = parts[parts.len() - 2];
    let (_pid, rest) = pkg_part.split_once(':')?;
    let name = match rest.find('/') {
        Some(slash) => &rest[..slash],
        None => rest,
    };
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_stat() {
        let sample_output = "cpu  416629 8243 277259 3448405 13745 66736 12224 0 0 0
        cpu0 102570 1978 72152 865261 4872 13580 3280 0 0 0
        cpu1 113337 2038 71830 855219 4697 22004 3302 0 0 0
        intr 14197288 38 693 0 0 0 0 0 0 2 0 0 0 0 0
        ctxt 23793740
        btime 1740713783
        processes 201178
        procs_running 5
        procs_blocked 0
        softirq 16010072 2 4639912 37 131849 53 0 29323 0 0 11208896
        ";

        let result = parse_cpu_stat(sample_output);
        assert_eq!(result.len(), 3);

        assert_eq!(result[0].name, "cpu");
        assert!(result[0].is_aggregate());
        assert_eq!(result[0].user, 416629);

        assert_eq!(result[1].name, "cpu0");
        assert_eq!(result[1].user, 102570);
        assert_eq!(result[1].idle, 865261);

        assert_eq!(result[2].nice, 2038);
        assert_eq!(result[2].softirq, 3302);
    }

    #[test]
    fn test_parse_clock_speeds() {
        let out = "1804800\n2112000\ncat: /sys/devices/system/cpu/cpu2/cpufreq/scaling_cur_freq: Permission denied\n940800";
        assert_eq!(parse_clock_speeds(out), vec![1804, 2112, 940]);
    }

    #[test]
    fn test_apply_clock_speeds_by_core_number() {
        let mut cores = parse_cpu_stat(
            "cpu 1 1 1 1 1 1 1 0\ncpu0 1 1 1 1 1 1 1 0\ncpu1 1 1 1 1 1 1 1 0",
        );
        apply_clock_speeds(&mut cores, &[1804, 2112]);
        assert_eq!(cores[0].clock_mhz, None);
        assert_eq!(cores[1].clock_mhz, Some(1804));
        assert_eq!(cores[2].clock_mhz, Some(2112));
    }

    #[test]
    fn test_parse_meminfo() {
        let sample_output = "
        MemTotal:       11432996 kB
        MemFree:          197724 kB
        MemAvailable:    1680480 kB
        Buffers:            2796 kB
        Cached:          1639720 kB
        ";
        let expected = MemoryReading {
            total_kb: 11432996,
            available_kb: 1680480,
        };
        assert_eq!(parse_meminfo(sample_output), Some(expected));

        assert_eq!(parse_meminfo("Buffers: 2796 kB"), None);
    }

    #[test]
    fn test_parse_uptime() {
        assert_eq!(parse_uptime("35690.45 130197.56"), Some(35690));
        assert_eq!(parse_uptime(""), None);
        assert_eq!(parse_uptime("not-a-number 12"), None);
    }

    #[test]
    fn test_parse_flips() {
        let sample_output = "Build: android
flips=123456
OtherSurface=888";
        assert_eq!(parse_flips(sample_output), Some(123456));

        let sample_output_inline = "Some state information flips=9992 ";
        assert_eq!(parse_flips(sample_output_inline), Some(9992));

        let sample_no_flips = "Build: android\nOtherSurface=888";
        assert_eq!(parse_flips(sample_no_flips), None);
    }

    #[test]
    fn test_parse_top_activity() {
        let sample_output = "ACTIVITY MANAGER RUNNING PROCESSES (dumpsys activity processes)
    PID mappings:
    Proc # 3: fg     T/A/TOP  LCM  t: 0 2748:com.android.launcher3/u0a123 (top-activity)
    Proc # 5: cch    B/CEM--- SVC  t: 12 1999:com.android.keychain/1000 (cch-empty)";
        assert_eq!(
            parse_top_activity(sample_output),
            Some("com.android.launcher3".to_string())
        );

        assert_eq!(parse_top_activity("no processes here"), None);
        assert_eq!(parse_top_activity("one-token (top-activity)"), None);
    }
}
