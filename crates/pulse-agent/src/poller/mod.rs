//! Metric sources sampled by the agent.
//!
//! A [`Poller`] writes into its own store on every collection tick, hands out
//! the accumulated contents on delivery ticks and clears them once a delivery
//! succeeded. [`StorePoller`] carries the store handling shared by the
//! concrete pollers:
//!
//! - [`ProcessPoller`]: gauges about the agent process plus `PollCount`
//! - [`SystemPoller`]: host memory and CPU utilization

mod process;
mod procfs;
mod system;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use pulse_proto::Metric;
use pulse_store::{Counter, Gauge, MemoryStore, SharedStore};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;

pub use process::{
    POLL_COUNT, PROCESS_GAUGES, ProcessPoller, ProcessProbe, ProcessSample, RANDOM_VALUE,
    SysinfoProcessProbe,
};
pub use system::{SYSTEM_GAUGES, SysinfoSystemProbe, SystemPoller, SystemProbe, SystemSample};

/// A source of metrics owned by the agent.
#[async_trait]
pub trait Poller: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Samples the source and records the values.
    async fn poll(&self) -> Result<()>;

    /// Returns everything recorded since the last reset.
    async fn get_metrics(&self) -> Result<Vec<Metric>>;

    /// Clears everything recorded so far.
    async fn reset_metrics(&self) -> Result<()>;
}

/// A poller's store plus the lock that orders its operations.
///
/// Records and resets take the lock exclusively, reads share it, so a
/// delivery snapshot never sees half of a poll cycle.
pub struct StorePoller {
    name: String,
    store: SharedStore,
    lock: RwLock<()>,
}

impl StorePoller {
    /// Wraps `store` under `name`.
    pub fn new(name: impl Into<String>, store: SharedStore) -> Self {
        Self {
            name: name.into(),
            store,
            lock: RwLock::new(()),
        }
    }

    /// Creates a poller base backed by a fresh in-memory store.
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self::new(name, Arc::new(MemoryStore::new()))
    }

    /// Returns the poller name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the underlying store.
    #[must_use]
    pub const fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Writes one collection cycle.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Store`](crate::AgentError::Store) if a write fails.
    pub async fn record(
        &self,
        gauges: &HashMap<String, Gauge>,
        counters: &HashMap<String, Counter>,
    ) -> Result<()> {
        let _guard = self.lock.write().await;
        if !gauges.is_empty() {
            self.store.set_gauges(gauges).await?;
        }
        if !counters.is_empty() {
            self.store.set_counters(counters).await?;
        }
        debug!(
            poller = %self.name,
            gauges = gauges.len(),
            counters = counters.len(),
            "cycle recorded"
        );
        Ok(())
    }

    /// Returns the store contents as wire metrics.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Store`](crate::AgentError::Store) if a read fails.
    pub async fn metrics(&self) -> Result<Vec<Metric>> {
        let _guard = self.lock.read().await;
        Ok(self.store.snapshot().await?.to_metrics())
    }

    /// Removes all gauges and counters.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Store`](crate::AgentError::Store) if a clear fails.
    pub async fn reset(&self) -> Result<()> {
        let _guard = self.lock.write().await;
        self.store.clear_gauges().await?;
        self.store.clear_counters().await?;
        debug!(poller = %self.name, "metrics reset");
        Ok(())
    }
}
