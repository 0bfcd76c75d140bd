//! Point-in-time copy of a store and its conversion to wire metrics.

use std::collections::HashMap;

use pulse_proto::Metric;

use crate::traits::{Counter, Gauge};

/// Gauges and counters of a store at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Gauge values by name.
    pub gauges: HashMap<String, Gauge>,
    /// Counter values by name.
    pub counters: HashMap<String, Counter>,
}

impl Snapshot {
    /// Returns the total number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.gauges.len() + self.counters.len()
    }

    /// Returns true if there are no gauges and no counters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty() && self.counters.is_empty()
    }

    /// Converts the snapshot to wire metrics, gauges first, each group sorted by name.
    #[must_use]
    pub fn to_metrics(&self) -> Vec<Metric> {
        let mut gauges: Vec<_> = self.gauges.iter().collect();
        gauges.sort_unstable_by(|a, b| a.0.cmp(b.0));
        let mut counters: Vec<_> = self.counters.iter().collect();
        counters.sort_unstable_by(|a, b| a.0.cmp(b.0));

        gauges
            .into_iter()
            .map(|(id, value)| Metric::gauge(id.clone(), *value))
            .chain(
                counters
                    .into_iter()
                    .map(|(id, delta)| Metric::counter(id.clone(), *delta)),
            )
            .collect()
    }

    /// Folds wire metrics into a snapshot.
    ///
    /// A repeated gauge keeps its last value; repeated counter deltas are summed.
    pub fn from_metrics(metrics: impl IntoIterator<Item = Metric>) -> Self {
        let mut snapshot = Self::default();
        for metric in metrics {
            match metric {
                Metric::Gauge { id, value } => {
                    snapshot.gauges.insert(id, value);
                }
                Metric::Counter { id, delta } => {
                    let total = snapshot.counters.entry(id).or_insert(0);
                    *total = total.saturating_add(delta);
                }
            }
        }
        snapshot
    }
}
