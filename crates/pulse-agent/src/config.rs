//! Agent configuration.
//!
//! Every setting can come from a command-line flag or an environment
//! variable; a flag wins when both are given.

use std::time::Duration;

use clap::Parser;

use crate::error::{AgentError, Result};

/// Largest accepted rate limit; one worker task is spawned per unit.
pub const MAX_RATE_LIMIT: usize = 10_000;

fn check_rate_limit(rate_limit: usize) -> Result<()> {
    if rate_limit == 0 {
        return Err(AgentError::Config("rate limit must be positive".to_string()));
    }
    if rate_limit > MAX_RATE_LIMIT {
        return Err(AgentError::Config(format!(
            "rate limit {rate_limit} exceeds {MAX_RATE_LIMIT}"
        )));
    }
    Ok(())
}

/// Command-line and environment configuration of the agent binary.
#[derive(Debug, Clone, Parser)]
#[command(name = "pulse-agent")]
#[command(about = "Samples process and host metrics and ships them to a collector")]
#[command(version)]
pub struct AgentConfig {
    /// Collector address; `http://` is assumed when no scheme is given.
    #[arg(short = 'a', long, env = "ADDRESS", default_value = "localhost:8080")]
    pub address: String,

    /// Seconds between deliveries.
    #[arg(short = 'r', long, env = "REPORT_INTERVAL", default_value_t = 10)]
    pub report_interval: u64,

    /// Seconds between collections.
    #[arg(short = 'p', long, env = "POLL_INTERVAL", default_value_t = 2)]
    pub poll_interval: u64,

    /// Shared key for signing payloads.
    #[arg(short = 'k', long, env = "KEY")]
    pub key: Option<String>,

    /// Number of delivery workers and job queue capacity.
    #[arg(short = 'l', long, env = "RATE_LIMIT", default_value_t = 1000)]
    pub rate_limit: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8080".to_string(),
            report_interval: 10,
            poll_interval: 2,
            key: None,
            rate_limit: 1000,
        }
    }
}

impl AgentConfig {
    /// Checks that intervals are positive and the rate limit is in
    /// `1..=MAX_RATE_LIMIT`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(AgentError::Config("address must not be empty".to_string()));
        }
        if self.report_interval == 0 {
            return Err(AgentError::Config("report interval must be positive".to_string()));
        }
        if self.poll_interval == 0 {
            return Err(AgentError::Config("poll interval must be positive".to_string()));
        }
        check_rate_limit(self.rate_limit)
    }

    /// Returns the signing key, treating an empty key as none.
    #[must_use]
    pub fn signing_key(&self) -> Option<&str> {
        self.key.as_deref().filter(|k| !k.is_empty())
    }

    /// Validates the config and converts it to scheduler settings.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] if validation fails.
    pub fn settings(&self) -> Result<AgentSettings> {
        self.validate()?;
        Ok(AgentSettings {
            poll_interval: Duration::from_secs(self.poll_interval),
            report_interval: Duration::from_secs(self.report_interval),
            rate_limit: self.rate_limit,
        })
    }
}

/// Scheduling settings of a running [`Agent`](crate::Agent).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentSettings {
    /// Time between collection ticks.
    pub poll_interval: Duration,
    /// Time between delivery ticks.
    pub report_interval: Duration,
    /// Delivery workers, also the bound on queued plus in-flight batches.
    pub rate_limit: usize,
}

impl AgentSettings {
    /// Checks that both intervals are non-zero and the rate limit is in range.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(AgentError::Config("poll interval must be positive".to_string()));
        }
        if self.report_interval.is_zero() {
            return Err(AgentError::Config("report interval must be positive".to_string()));
        }
        check_rate_limit(self.rate_limit)
    }
}
