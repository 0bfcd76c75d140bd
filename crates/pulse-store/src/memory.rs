//! In-memory metrics store.
//!
//! [`MemoryStore`] is the reference implementation of [`MetricsStore`]: both
//! mappings live behind a single `RwLock`, so bulk writes and clears are
//! observed atomically by readers.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::trace;

use crate::error::Result;
use crate::snapshot::Snapshot;
use crate::traits::{Counter, Gauge, MetricsStore, check_gauge, check_gauges};

/// Thread-safe in-memory gauge/counter store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<Snapshot>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            data: RwLock::new(snapshot),
        }
    }

    /// Returns a copy of the current contents.
    #[must_use]
    pub fn snapshot_now(&self) -> Snapshot {
        self.data.read().clone()
    }

    /// Returns the total number of gauges and counters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if the store holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

fn add(total: &mut Counter, delta: Counter) {
    *total = total.saturating_add(delta);
}

#[async_trait]
impl MetricsStore for MemoryStore {
    async fn get_gauge(&self, name: &str) -> Result<Option<Gauge>> {
        Ok(self.data.read().gauges.get(name).copied())
    }

    async fn get_gauges(&self) -> Result<HashMap<String, Gauge>> {
        Ok(self.data.read().gauges.clone())
    }

    async fn set_gauge(&self, name: &str, value: Gauge) -> Result<()> {
        check_gauge(name, value)?;
        self.data.write().gauges.insert(name.to_string(), value);
        trace!(gauge = name, value, "gauge set");
        Ok(())
    }

    #[allow(clippy::significant_drop_tightening)] // Whole batch applies under one lock
    async fn set_gauges(&self, values: &HashMap<String, Gauge>) -> Result<()> {
        check_gauges(values)?;
        let mut data = self.data.write();
        for (name, value) in values {
            data.gauges.insert(name.clone(), *value);
        }
        Ok(())
    }

    async fn clear_gauges(&self) -> Result<()> {
        self.data.write().gauges.clear();
        Ok(())
    }

    async fn get_counter(&self, name: &str) -> Result<Option<Counter>> {
        Ok(self.data.read().counters.get(name).copied())
    }

    async fn get_counters(&self) -> Result<HashMap<String, Counter>> {
        Ok(self.data.read().counters.clone())
    }

    async fn set_counter(&self, name: &str, delta: Counter) -> Result<()> {
        add(
            self.data.write().counters.entry(name.to_string()).or_insert(0),
            delta,
        );
        trace!(counter = name, delta, "counter incremented");
        Ok(())
    }

    #[allow(clippy::significant_drop_tightening)] // Whole batch applies under one lock
    async fn set_counters(&self, deltas: &HashMap<String, Counter>) -> Result<()> {
        let mut data = self.data.write();
        for (name, delta) in deltas {
            add(data.counters.entry(name.clone()).or_insert(0), *delta);
        }
        Ok(())
    }

    async fn clear_counters(&self) -> Result<()> {
        self.data.write().counters.clear();
        Ok(())
    }

    async fn snapshot(&self) -> Result<Snapshot> {
        Ok(self.snapshot_now())
    }
}
