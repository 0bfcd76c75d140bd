//! Fixed-schedule retry shared by the file, database and delivery paths.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

/// Delays, in seconds, before each attempt of the default schedule.
pub const DEFAULT_SCHEDULE_SECS: [u64; 4] = [0, 1, 3, 5];

/// A bounded retry schedule.
///
/// Each entry is the pause taken before one attempt, so the number of
/// attempts equals the number of delays. A policy always makes at least one
/// attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_secs(&DEFAULT_SCHEDULE_SECS)
    }
}

impl RetryPolicy {
    /// Creates a policy from explicit delays.
    #[must_use]
    pub fn new(delays: Vec<Duration>) -> Self {
        if delays.is_empty() {
            return Self::once();
        }
        Self { delays }
    }

    /// Creates a policy from delays expressed in whole seconds.
    #[must_use]
    pub fn from_secs(secs: &[u64]) -> Self {
        Self::new(secs.iter().copied().map(Duration::from_secs).collect())
    }

    /// A policy with a single immediate attempt.
    #[must_use]
    pub fn once() -> Self {
        Self {
            delays: vec![Duration::ZERO],
        }
    }

    /// Returns the number of attempts.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.delays.len()
    }

    /// Returns the schedule.
    #[must_use]
    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    /// Runs `op` until it succeeds, fails with an error `is_retryable`
    /// rejects, or the schedule is exhausted.
    ///
    /// The error of the last attempt is returned when every attempt failed
    /// with a retryable error.
    pub async fn run<T, E, F, Fut, P>(&self, operation: &str, mut op: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let Some((last_delay, leading)) = self.delays.split_last() else {
            return op().await;
        };

        for (attempt, delay) in leading.iter().enumerate() {
            pause(*delay).await;
            match op().await {
                Err(e) if is_retryable(&e) => {
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        attempts = self.delays.len(),
                        error = %e,
                        "transient failure, retrying"
                    );
                }
                other => return other,
            }
        }

        pause(*last_delay).await;
        op().await
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        sleep(delay).await;
    }
}
