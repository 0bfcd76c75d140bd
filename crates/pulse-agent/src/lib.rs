//! Telemetry agent for the pulse pipeline.
//!
//! The agent samples metric sources on one interval and ships what they
//! recorded to a collector on another:
//!
//! - [`Poller`]: a metric source with its own store ([`ProcessPoller`], [`SystemPoller`])
//! - [`Transport`]: where batches go ([`DeliveryClient`] over HTTP)
//! - [`Agent`]: the scheduler with a bounded delivery pool and
//!   completion-gated resets
//! - [`AgentConfig`]: flags and environment of the `pulse-agent` binary

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod agent;
pub mod config;
pub mod delivery;
pub mod error;
pub mod poller;

pub use agent::{Agent, AgentReport, AgentStats, PollerOutcome, gather_metrics, poll_all, reset_all};
pub use config::{AgentConfig, AgentSettings, MAX_RATE_LIMIT};
pub use delivery::{DeliveryClient, Transport, normalize_base_url};
pub use error::{AgentError, DeliveryError, Result};
pub use poller::{Poller, ProcessPoller, StorePoller, SystemPoller};
