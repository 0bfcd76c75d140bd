//! Telemetry about the agent process itself.
//!
//! Every gauge describes this process; host-wide readings belong to
//! [`SystemPoller`](super::SystemPoller).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pulse_proto::Metric;
use pulse_store::SharedStore;
use sysinfo::{Pid, ProcessesToUpdate, System};

use super::{Poller, StorePoller, procfs};
use crate::error::{AgentError, Result};

/// Counter incremented once per successful collection cycle.
pub const POLL_COUNT: &str = "PollCount";

/// Gauge holding a fresh random value each cycle.
pub const RANDOM_VALUE: &str = "RandomValue";

/// Names of the sampled process gauges, in [`ProcessSample::gauges`] order.
pub const PROCESS_GAUGES: [&str; 27] = [
    "ResidentMemory",
    "VirtualMemory",
    "PeakResidentMemory",
    "PeakVirtualMemory",
    "MemoryPercent",
    "SwappedMemory",
    "DataSegment",
    "StackSize",
    "FileBackedMemory",
    "ProcessCPU",
    "ProcessCPUNormalized",
    "CPUTime",
    "UserCPUTicks",
    "SystemCPUTicks",
    "RunTime",
    "StartTime",
    "Threads",
    "Nice",
    "OpenFiles",
    "MinorPageFaults",
    "MajorPageFaults",
    "VoluntaryContextSwitches",
    "InvoluntaryContextSwitches",
    "DiskReadTotal",
    "DiskWrittenTotal",
    "DiskRead",
    "DiskWritten",
];

/// One reading of the agent process.
///
/// Memory and disk figures are bytes, times are seconds unless named ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[allow(missing_docs)]
pub struct ProcessSample {
    pub resident_memory: u64,
    pub virtual_memory: u64,
    pub peak_resident_memory: u64,
    pub peak_virtual_memory: u64,
    /// Resident memory as a percentage of host memory.
    pub memory_percent: f64,
    pub swapped_memory: u64,
    pub data_segment: u64,
    pub stack_size: u64,
    pub file_backed_memory: u64,
    /// CPU share where one fully used core is 100.
    pub cpu_usage: f32,
    /// CPU share of the whole host, 0 to 100.
    pub cpu_usage_normalized: f64,
    pub cpu_time: f64,
    pub user_ticks: u64,
    pub system_ticks: u64,
    pub run_time: u64,
    pub start_time: u64,
    pub threads: u64,
    pub nice: i64,
    pub open_files: u64,
    pub minor_faults: u64,
    pub major_faults: u64,
    pub voluntary_switches: u64,
    pub involuntary_switches: u64,
    pub disk_read_total: u64,
    pub disk_written_total: u64,
    pub disk_read: u64,
    pub disk_written: u64,
}

impl ProcessSample {
    /// Returns the sample as named gauges.
    #[must_use]
    pub fn gauges(&self) -> HashMap<String, f64> {
        let values = [
            self.resident_memory as f64,
            self.virtual_memory as f64,
            self.peak_resident_memory as f64,
            self.peak_virtual_memory as f64,
            self.memory_percent,
            self.swapped_memory as f64,
            self.data_segment as f64,
            self.stack_size as f64,
            self.file_backed_memory as f64,
            f64::from(self.cpu_usage),
            self.cpu_usage_normalized,
            self.cpu_time,
            self.user_ticks as f64,
            self.system_ticks as f64,
            self.run_time as f64,
            self.start_time as f64,
            self.threads as f64,
            self.nice as f64,
            self.open_files as f64,
            self.minor_faults as f64,
            self.major_faults as f64,
            self.voluntary_switches as f64,
            self.involuntary_switches as f64,
            self.disk_read_total as f64,
            self.disk_written_total as f64,
            self.disk_read as f64,
            self.disk_written as f64,
        ];
        PROCESS_GAUGES
            .iter()
            .zip(values)
            .map(|(name, value)| ((*name).to_string(), value))
            .collect()
    }
}

/// Source of process samples.
///
/// Implementations may block; the poller calls them on the blocking pool.
pub trait ProcessProbe: Send + Sync {
    /// Takes one sample.
    fn sample(&self) -> Result<ProcessSample>;
}

/// [`ProcessProbe`] reading the current process through `sysinfo`.
pub struct SysinfoProcessProbe {
    pid: Pid,
    system: Mutex<System>,
}

impl SysinfoProcessProbe {
    /// Creates a probe for the current process.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Collection`] if the current pid is unavailable.
    pub fn new() -> Result<Self> {
        let pid = sysinfo::get_current_pid().map_err(|e| AgentError::Collection(e.to_string()))?;
        Ok(Self {
            pid,
            system: Mutex::new(System::new()),
        })
    }
}

impl ProcessProbe for SysinfoProcessProbe {
    fn sample(&self) -> Result<ProcessSample> {
        let mut system = self.system.lock();
        system.refresh_memory();
        system.refresh_cpu_usage();
        system.refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);

        let process = system
            .process(self.pid)
            .ok_or_else(|| AgentError::Collection(format!("process {} not found", self.pid)))?;
        let disk = process.disk_usage();
        let proc = procfs::read_self();

        let host_memory = system.total_memory();
        let memory_percent = if host_memory == 0 {
            0.0
        } else {
            process.memory() as f64 / host_memory as f64 * 100.0
        };
        let cores = system.cpus().len().max(1);

        Ok(ProcessSample {
            resident_memory: process.memory(),
            virtual_memory: process.virtual_memory(),
            peak_resident_memory: proc.status.peak_resident,
            peak_virtual_memory: proc.status.peak_virtual,
            memory_percent,
            swapped_memory: proc.status.swapped,
            data_segment: proc.status.data,
            stack_size: proc.status.stack,
            file_backed_memory: proc.status.file_backed,
            cpu_usage: process.cpu_usage(),
            cpu_usage_normalized: f64::from(process.cpu_usage()) / cores as f64,
            cpu_time: proc.cpu_time_ns as f64 / 1e9,
            user_ticks: proc.stat.user_ticks,
            system_ticks: proc.stat.system_ticks,
            run_time: process.run_time(),
            start_time: process.start_time(),
            threads: process.tasks().map_or(1, |tasks| tasks.len() as u64),
            nice: proc.stat.nice,
            open_files: proc.open_files,
            minor_faults: proc.stat.minor_faults,
            major_faults: proc.stat.major_faults,
            voluntary_switches: proc.status.voluntary_switches,
            involuntary_switches: proc.status.involuntary_switches,
            disk_read_total: disk.total_read_bytes,
            disk_written_total: disk.total_written_bytes,
            disk_read: disk.read_bytes,
            disk_written: disk.written_bytes,
        })
    }
}

/// Poller recording process gauges, a random gauge and a cycle counter.
pub struct ProcessPoller {
    base: StorePoller,
    probe: Arc<dyn ProcessProbe>,
}

impl ProcessPoller {
    /// Poller name used in logs.
    pub const NAME: &'static str = "process";

    /// Creates a poller writing samples from `probe` into `store`.
    pub fn new(store: SharedStore, probe: Arc<dyn ProcessProbe>) -> Self {
        Self {
            base: StorePoller::new(Self::NAME, store),
            probe,
        }
    }

    /// Creates a poller with an in-memory store and the `sysinfo` probe.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Collection`] if the probe cannot be created.
    pub fn with_sysinfo() -> Result<Self> {
        Ok(Self {
            base: StorePoller::in_memory(Self::NAME),
            probe: Arc::new(SysinfoProcessProbe::new()?),
        })
    }
}

#[async_trait]
impl Poller for ProcessPoller {
    fn name(&self) -> &str {
        self.base.name()
    }

    async fn poll(&self) -> Result<()> {
        let probe = Arc::clone(&self.probe);
        let sample = tokio::task::spawn_blocking(move || probe.sample()).await??;

        let mut gauges = sample.gauges();
        gauges.insert(RANDOM_VALUE.to_string(), rand::random::<f64>());
        let counters = HashMap::from([(POLL_COUNT.to_string(), 1)]);

        self.base.record(&gauges, &counters).await
    }

    async fn get_metrics(&self) -> Result<Vec<Metric>> {
        self.base.metrics().await
    }

    async fn reset_metrics(&self) -> Result<()> {
        self.base.reset().await
    }
}
