use std::fs;

/// Coarse process/system memory snapshot for `INFO`'s `# Memory` section
/// (spec §6). Linux-only, read straight off `/proc` the way
/// `vadv-rpglot`'s `collector::procfs` parses `/proc/meminfo` and
/// `/proc/[pid]/status` — no external memory-profiling crate, just two
/// small line-oriented parsers.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemorySnapshot {
    pub process_rss_bytes: u64,
    pub process_rss_peak_bytes: u64,
    pub total_system_bytes: u64,
    pub available_system_bytes: u64,
}

impl MemorySnapshot {
    pub fn usage_ratio(&self) -> f64 {
        if self.total_system_bytes == 0 {
            return 0.0;
        }
        let used = self.total_system_bytes.saturating_sub(self.available_system_bytes);
        used as f64 / self.total_system_bytes as f64
    }
}

/// `OK`/`WARNING`/`CRITICAL`, derived from system memory usage ratio
/// against two configurable thresholds (spec §7, "Memory pressure at
/// CRITICAL rejects new SYNCs").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryHealth {
    Ok,
    Warning,
    Critical,
}

impl MemoryHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryHealth::Ok => "OK",
            MemoryHealth::Warning => "WARNING",
            MemoryHealth::Critical => "CRITICAL",
        }
    }

    pub fn classify(ratio: f64, warning_at: f64, critical_at: f64) -> Self {
        if ratio >= critical_at {
            MemoryHealth::Critical
        } else if ratio >= warning_at {
            MemoryHealth::Warning
        } else {
            MemoryHealth::Ok
        }
    }
}

pub fn read() -> MemorySnapshot {
    let mut snap = MemorySnapshot::default();
    if let Ok(status) = fs::read_to_string("/proc/self/status") {
        for line in status.lines() {
            if let Some(kb) = line.strip_prefix("VmRSS:") {
                snap.process_rss_bytes = parse_kb_line(kb);
            } else if let Some(kb) = line.strip_prefix("VmHWM:") {
                snap.process_rss_peak_bytes = parse_kb_line(kb);
            }
        }
    }
    if let Ok(meminfo) = fs::read_to_string("/proc/meminfo") {
        for line in meminfo.lines() {
            if let Some(kb) = line.strip_prefix("MemTotal:") {
                snap.total_system_bytes = parse_kb_line(kb);
            } else if let Some(kb) = line.strip_prefix("MemAvailable:") {
                snap.available_system_bytes = parse_kb_line(kb);
            }
        }
    }
    snap
}

fn parse_kb_line(rest: &str) -> u64 {
    rest.trim().trim_end_matches(" kB").trim().parse::<u64>().unwrap_or(0) * 1024
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_kb_suffix() {
        assert_eq!(parse_kb_line(" 123456 kB"), 123456 * 1024);
    }

    #[test]
    fn classifies_thresholds() {
        assert_eq!(MemoryHealth::classify(0.5, 0.8, 0.95), MemoryHealth::Ok);
        assert_eq!(MemoryHealth::classify(0.85, 0.8, 0.95), MemoryHealth::Warning);
        assert_eq!(MemoryHealth::classify(0.97, 0.8, 0.95), MemoryHealth::Critical);
    }
}
