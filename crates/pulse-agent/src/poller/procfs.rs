//! Per-process counters read from Linux procfs.
//!
//! `sysinfo` covers memory, CPU share and disk I/O of a process; faults,
//! scheduler time, context switches and peak memory only exist in
//! `/proc/self`. Other platforms report zeros.

/// Counters from `/proc/self/stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatCounters {
    pub minor_faults: u64,
    pub major_faults: u64,
    /// Clock ticks spent in user mode.
    pub user_ticks: u64,
    /// Clock ticks spent in kernel mode.
    pub system_ticks: u64,
    pub nice: i64,
}

/// Counters from `/proc/self/status`; sizes are bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounters {
    pub voluntary_switches: u64,
    pub involuntary_switches: u64,
    pub peak_resident: u64,
    pub peak_virtual: u64,
    pub swapped: u64,
    pub data: u64,
    pub stack: u64,
    pub file_backed: u64,
}

/// Everything read from procfs in one sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcCounters {
    pub stat: StatCounters,
    pub status: StatusCounters,
    /// Time on CPU in nanoseconds, from `/proc/self/schedstat`.
    pub cpu_time_ns: u64,
    pub open_files: u64,
}

/// Parses the single line of `/proc/<pid>/stat`.
///
/// The command name is parenthesised and may contain spaces, so fields are
/// counted from the last `)`.
pub fn parse_stat(raw: &str) -> Option<StatCounters> {
    let (_, rest) = raw.rsplit_once(')')?;
    // Field 3 (state) is index 0 here.
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let field = |n: usize| fields.get(n - 3).copied();
    Some(StatCounters {
        minor_faults: field(10)?.parse().ok()?,
        major_faults: field(12)?.parse().ok()?,
        user_ticks: field(14)?.parse().ok()?,
        system_ticks: field(15)?.parse().ok()?,
        nice: field(19)?.parse().ok()?,
    })
}

/// Parses `/proc/<pid>/status`. Missing keys stay zero.
pub fn parse_status(raw: &str) -> StatusCounters {
    let mut counters = StatusCounters::default();
    for line in raw.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let mut parts = value.split_whitespace();
        let Some(Ok(number)) = parts.next().map(str::parse::<u64>) else {
            continue;
        };
        let number = match parts.next() {
            Some("kB") => number.saturating_mul(1024),
            _ => number,
        };
        let slot = match key {
            "voluntary_ctxt_switches" => &mut counters.voluntary_switches,
            "nonvoluntary_ctxt_switches" => &mut counters.involuntary_switches,
            "VmHWM" => &mut counters.peak_resident,
            "VmPeak" => &mut counters.peak_virtual,
            "VmSwap" => &mut counters.swapped,
            "VmData" => &mut counters.data,
            "VmStk" => &mut counters.stack,
            "RssFile" => &mut counters.file_backed,
            _ => continue,
        };
        *slot = number;
    }
    counters
}

/// Parses `/proc/<pid>/schedstat`: on-CPU nanoseconds come first.
pub fn parse_schedstat(raw: &str) -> Option<u64> {
    raw.split_whitespace().next()?.parse().ok()
}

/// Reads the counters of the current process.
#[cfg(target_os = "linux")]
pub fn read_self() -> ProcCounters {
    use std::fs;

    let read = |name: &str| fs::read_to_string(format!("/proc/self/{name}")).ok();
    ProcCounters {
        stat: read("stat").and_then(|raw| parse_stat(&raw)).unwrap_or_default(),
        status: read("status").map(|raw| parse_status(&raw)).unwrap_or_default(),
        cpu_time_ns: read("schedstat")
            .and_then(|raw| parse_schedstat(&raw))
            .unwrap_or_default(),
        open_files: fs::read_dir("/proc/self/fd").map_or(0, |dir| dir.count() as u64),
    }
}

/// Reads the counters of the current process.
#[cfg(not(target_os = "linux"))]
pub fn read_self() -> ProcCounters {
    ProcCounters::default()
}
