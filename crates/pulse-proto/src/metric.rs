//! The wire form of a metric.
//!
//! On the wire a metric is a JSON object `{"id": .., "type": .., "value"|"delta": ..}`.
//! The `type` field selects which of `value` (gauge, `f64`) or `delta`
//! (counter, `i64`) is present, so [`Metric`] is modelled as an internally
//! tagged enum and a gauge can never carry a delta.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

/// A single metric as exchanged between agent, collector and file snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Metric {
    /// Last-write-wins floating point value.
    Gauge {
        /// Metric name.
        id: String,
        /// Current value.
        value: f64,
    },
    /// Accumulating integer value.
    Counter {
        /// Metric name.
        id: String,
        /// Amount to add to the running total.
        delta: i64,
    },
}

impl Metric {
    /// Creates a gauge metric.
    #[must_use]
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self::Gauge {
            id: id.into(),
            value,
        }
    }

    /// Creates a counter metric.
    #[must_use]
    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self::Counter {
            id: id.into(),
            delta,
        }
    }

    /// Returns the metric name.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Gauge { id, .. } | Self::Counter { id, .. } => id,
        }
    }

    /// Returns the metric kind.
    #[must_use]
    pub const fn kind(&self) -> MetricKind {
        match self {
            Self::Gauge { .. } => MetricKind::Gauge,
            Self::Counter { .. } => MetricKind::Counter,
        }
    }
}

/// The `type` discriminator of a [`Metric`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// A gauge.
    Gauge,
    /// A counter.
    Counter,
}

impl MetricKind {
    /// Returns the wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gauge => "gauge",
            Self::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(Self::Gauge),
            "counter" => Ok(Self::Counter),
            other => Err(ProtoError::UnknownKind(other.to_string())),
        }
    }
}
