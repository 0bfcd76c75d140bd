//! Host memory and CPU utilization.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pulse_proto::Metric;
use pulse_store::SharedStore;
use sysinfo::System;

use super::{Poller, StorePoller};
use crate::error::Result;

/// Names of the recorded gauges.
pub const SYSTEM_GAUGES: [&str; 3] = ["TotalMemory", "FreeMemory", "CPUutilization1"];

/// One reading of host resources.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SystemSample {
    /// Installed memory in bytes.
    pub total_memory: u64,
    /// Unused memory in bytes.
    pub free_memory: u64,
    /// Utilization across all CPUs, in percent.
    pub cpu_utilization: f32,
}

impl SystemSample {
    /// Returns the sample as named gauges.
    #[must_use]
    pub fn gauges(&self) -> HashMap<String, f64> {
        let [total, free, cpu] = SYSTEM_GAUGES;
        HashMap::from([
            (total.to_string(), self.total_memory as f64),
            (free.to_string(), self.free_memory as f64),
            (cpu.to_string(), f64::from(self.cpu_utilization)),
        ])
    }
}

/// Source of host samples.
///
/// Implementations may block; the poller calls them on the blocking pool.
pub trait SystemProbe: Send + Sync {
    /// Takes one sample.
    fn sample(&self) -> Result<SystemSample>;
}

/// [`SystemProbe`] backed by `sysinfo`.
///
/// CPU utilization is measured between consecutive samples, so the first
/// reading is zero.
pub struct SysinfoSystemProbe {
    system: Mutex<System>,
}

impl SysinfoSystemProbe {
    /// Creates a probe.
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoSystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe for SysinfoSystemProbe {
    fn sample(&self) -> Result<SystemSample> {
        let mut system = self.system.lock();
        system.refresh_memory();
        system.refresh_cpu_usage();
        Ok(SystemSample {
            total_memory: system.total_memory(),
            free_memory: system.free_memory(),
            cpu_utilization: system.global_cpu_usage(),
        })
    }
}

/// Poller recording host memory and CPU gauges.
pub struct SystemPoller {
    base: StorePoller,
    probe: Arc<dyn SystemProbe>,
}

impl SystemPoller {
    /// Poller name used in logs.
    pub const NAME: &'static str = "system";

    /// Creates a poller writing samples from `probe` into `store`.
    pub fn new(store: SharedStore, probe: Arc<dyn SystemProbe>) -> Self {
        Self {
            base: StorePoller::new(Self::NAME, store),
            probe,
        }
    }

    /// Creates a poller with an in-memory store and the `sysinfo` probe.
    #[must_use]
    pub fn with_sysinfo() -> Self {
        Self {
            base: StorePoller::in_memory(Self::NAME),
            probe: Arc::new(SysinfoSystemProbe::new()),
        }
    }
}

#[async_trait]
impl Poller for SystemPoller {
    fn name(&self) -> &str {
        self.base.name()
    }

    async fn poll(&self) -> Result<()> {
        let probe = Arc::clone(&self.probe);
        let sample = tokio::task::spawn_blocking(move || probe.sample()).await??;
        self.base.record(&sample.gauges(), &HashMap::new()).await
    }

    async fn get_metrics(&self) -> Result<Vec<Metric>> {
        self.base.metrics().await
    }

    async fn reset_metrics(&self) -> Result<()> {
        self.base.reset().await
    }
}
