//! The storage contract shared by every backend.
//!
//! [`MetricsStore`] holds two independent mappings: gauges (last write wins)
//! and counters (every write adds). Clearing removes entries, so a point read
//! after a clear reports `None`, never zero.
//!
//! Gauges must be finite: NaN and infinities have no JSON or snapshot form,
//! so every backend rejects them with [`StoreError::NonFiniteGauge`] before
//! writing anything.
//!
//! Backends that can report their own health also implement [`Pingable`] and
//! expose it through [`MetricsStore::as_pingable`], which lets a health check
//! ask for the capability instead of matching on concrete backend types.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Result, StoreError};
use crate::snapshot::Snapshot;

/// Gauge value.
pub type Gauge = f64;

/// Counter value.
pub type Counter = i64;

/// A concurrency-safe gauge/counter store.
///
/// Every operation is individually linearizable with respect to the other
/// operations on the same store. Dropping a returned future cancels the
/// operation.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Returns the gauge `name`, or `None` if it is absent.
    async fn get_gauge(&self, name: &str) -> Result<Option<Gauge>>;

    /// Returns all gauges.
    async fn get_gauges(&self) -> Result<HashMap<String, Gauge>>;

    /// Overwrites the gauge `name`.
    async fn set_gauge(&self, name: &str, value: Gauge) -> Result<()>;

    /// Overwrites every gauge in `values`.
    async fn set_gauges(&self, values: &HashMap<String, Gauge>) -> Result<()>;

    /// Removes all gauges.
    async fn clear_gauges(&self) -> Result<()>;

    /// Returns the counter `name`, or `None` if it is absent.
    async fn get_counter(&self, name: &str) -> Result<Option<Counter>>;

    /// Returns all counters.
    async fn get_counters(&self) -> Result<HashMap<String, Counter>>;

    /// Adds `delta` to the counter `name`, starting from zero if absent.
    async fn set_counter(&self, name: &str, delta: Counter) -> Result<()>;

    /// Adds every delta in `deltas` to its counter.
    async fn set_counters(&self, deltas: &HashMap<String, Counter>) -> Result<()>;

    /// Removes all counters.
    async fn clear_counters(&self) -> Result<()>;

    /// Returns gauges and counters together.
    async fn snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot {
            gauges: self.get_gauges().await?,
            counters: self.get_counters().await?,
        })
    }

    /// Returns the health-check capability if the backend has one.
    fn as_pingable(&self) -> Option<&dyn Pingable> {
        None
    }
}

/// Capability of backends that can check their own connectivity.
#[async_trait]
pub trait Pingable: Send + Sync {
    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<()>;
}

/// Rejects a gauge value that cannot be stored.
///
/// # Errors
///
/// Returns [`StoreError::NonFiniteGauge`] for NaN or an infinity.
pub fn check_gauge(name: &str, value: Gauge) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(StoreError::NonFiniteGauge(name.to_string()))
    }
}

/// Rejects a batch containing any non-finite gauge.
///
/// # Errors
///
/// Returns [`StoreError::NonFiniteGauge`] naming one offending gauge.
pub fn check_gauges(values: &HashMap<String, Gauge>) -> Result<()> {
    values.iter().try_for_each(|(name, value)| check_gauge(name, *value))
}

/// A store shared between tasks.
pub type SharedStore = Arc<dyn MetricsStore>;

/// Pings the store if it supports health checks.
///
/// Stores without the capability are always healthy.
pub async fn check_health(store: &dyn MetricsStore) -> Result<()> {
    match store.as_pingable() {
        Some(pingable) => pingable.ping().await,
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    struct Unreachable;

    #[async_trait]
    impl Pingable for Unreachable {
        async fn ping(&self) -> Result<()> {
            Err(StoreError::Config("unreachable".to_string()))
        }
    }

    struct PingableMemory {
        inner: MemoryStore,
        health: Unreachable,
    }

    #[async_trait]
    impl MetricsStore for PingableMemory {
        async fn get_gauge(&self, name: &str) -> Result<Option<Gauge>> {
            self.inner.get_gauge(name).await
        }
        async fn get_gauges(&self) -> Result<HashMap<String, Gauge>> {
            self.inner.get_gauges().await
        }
        async fn set_gauge(&self, name: &str, value: Gauge) -> Result<()> {
            self.inner.set_gauge(name, value).await
        }
        async fn set_gauges(&self, values: &HashMap<String, Gauge>) -> Result<()> {
            self.inner.set_gauges(values).await
        }
        async fn clear_gauges(&self) -> Result<()> {
            self.inner.clear_gauges().await
        }
        async fn get_counter(&self, name: &str) -> Result<Option<Counter>> {
            self.inner.get_counter(name).await
        }
        async fn get_counters(&self) -> Result<HashMap<String, Counter>> {
            self.inner.get_counters().await
        }
        async fn set_counter(&self, name: &str, delta: Counter) -> Result<()> {
            self.inner.set_counter(name, delta).await
        }
        async fn set_counters(&self, deltas: &HashMap<String, Counter>) -> Result<()> {
            self.inner.set_counters(deltas).await
        }
        async fn clear_counters(&self) -> Result<()> {
            self.inner.clear_counters().await
        }
        fn as_pingable(&self) -> Option<&dyn Pingable> {
            Some(&self.health)
        }
    }

    #[tokio::test]
    async fn store_without_capability_is_healthy() {
        let store = MemoryStore::new();
        assert!(store.as_pingable().is_none());
        assert!(check_health(&store).await.is_ok());
    }

    #[tokio::test]
    async fn health_check_uses_capability() {
        let store = PingableMemory {
            inner: MemoryStore::new(),
            health: Unreachable,
        };
        assert!(store.as_pingable().is_some());
        assert!(matches!(
            check_health(&store).await,
            Err(StoreError::Config(_))
        ));
    }

    #[tokio::test]
    async fn snapshot_combines_both_mappings() {
        let store = MemoryStore::new();
        store.set_gauge("g", 1.5).await.unwrap();
        store.set_counter("c", 2).await.unwrap();

        let shared: SharedStore = Arc::new(store);
        let snapshot = shared.snapshot().await.unwrap();
        assert_eq!(snapshot.gauges.get("g"), Some(&1.5));
        assert_eq!(snapshot.counters.get("c"), Some(&2));
    }
}
