//! The collection and delivery scheduler.
//!
//! One dispatcher task drives two independent tickers:
//!
//! - **collection**: every poller's `poll` runs concurrently in a detached
//!   task group; failures are logged and counted. At most one collection
//!   is in flight; a tick that finds the previous one running is skipped.
//! - **delivery**: every poller's `get_metrics` runs concurrently, the
//!   results are merged into one batch and handed to the worker pool. The
//!   pool holds `rate_limit` permits covering queued and in-flight batches;
//!   a batch that finds no free permit is dropped.
//!
//! A worker that delivers a batch signals completion, and the dispatcher
//! then resets every poller. Nothing is reset after a failed delivery, so
//! the next batch carries the same data again.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use pulse_proto::Metric;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::AgentSettings;
use crate::delivery::Transport;
use crate::error::Result;
use crate::poller::Poller;

/// Live counters of a running agent.
#[derive(Debug, Default)]
pub struct AgentStats {
    collection_cycles: AtomicU64,
    collections_skipped: AtomicU64,
    poll_failures: AtomicU64,
    batches_enqueued: AtomicU64,
    batches_dropped: AtomicU64,
    batches_delivered: AtomicU64,
    batches_failed: AtomicU64,
    reset_cycles: AtomicU64,
}

impl AgentStats {
    /// Returns a point-in-time copy of the counters.
    #[must_use]
    pub fn report(&self) -> AgentReport {
        AgentReport {
            collection_cycles: self.collection_cycles.load(Ordering::Relaxed),
            collections_skipped: self.collections_skipped.load(Ordering::Relaxed),
            poll_failures: self.poll_failures.load(Ordering::Relaxed),
            batches_enqueued: self.batches_enqueued.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            reset_cycles: self.reset_cycles.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Counters of an agent run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentReport {
    /// Collection ticks handled.
    pub collection_cycles: u64,
    /// Collection ticks skipped because the previous collection was still running.
    pub collections_skipped: u64,
    /// Individual poller failures during collection.
    pub poll_failures: u64,
    /// Batches admitted to the worker pool.
    pub batches_enqueued: u64,
    /// Batches dropped because the pool was saturated.
    pub batches_dropped: u64,
    /// Batches the transport accepted.
    pub batches_delivered: u64,
    /// Batches that failed delivery.
    pub batches_failed: u64,
    /// Reset fan-outs triggered by deliveries.
    pub reset_cycles: u64,
}

/// Result of one poller's part in a fan-out.
#[derive(Debug)]
pub struct PollerOutcome<T> {
    /// Poller name.
    pub poller: String,
    /// What the poller returned.
    pub result: Result<T>,
}

/// Runs `op` on every poller concurrently and collects the outcomes.
///
/// Outcomes arrive in completion order.
pub async fn fan_out<T, F, Fut>(pollers: &[Arc<dyn Poller>], op: F) -> Vec<PollerOutcome<T>>
where
    T: Send + 'static,
    F: Fn(Arc<dyn Poller>) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let mut tasks = JoinSet::new();
    for poller in pollers {
        let name = poller.name().to_string();
        let work = op(Arc::clone(poller));
        tasks.spawn(async move { (name, work.await) });
    }

    let mut outcomes = Vec::with_capacity(pollers.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((poller, result)) => outcomes.push(PollerOutcome { poller, result }),
            Err(e) => error!(error = %e, "fan-out task failed"),
        }
    }
    outcomes
}

/// Polls every poller once.
pub async fn poll_all(pollers: &[Arc<dyn Poller>]) -> Vec<PollerOutcome<()>> {
    fan_out(pollers, |p| async move { p.poll().await }).await
}

/// Collects every poller's metrics.
pub async fn gather_metrics(pollers: &[Arc<dyn Poller>]) -> Vec<PollerOutcome<Vec<Metric>>> {
    fan_out(pollers, |p| async move { p.get_metrics().await }).await
}

/// Resets every poller.
pub async fn reset_all(pollers: &[Arc<dyn Poller>]) -> Vec<PollerOutcome<()>> {
    fan_out(pollers, |p| async move { p.reset_metrics().await }).await
}

/// A batch holding its pool permit until a worker is done with it.
struct Job {
    batch: Vec<Metric>,
    _permit: OwnedSemaphorePermit,
}

/// Schedules collection and delivery until cancelled.
pub struct Agent {
    pollers: Arc<[Arc<dyn Poller>]>,
    transport: Arc<dyn Transport>,
    settings: AgentSettings,
    stats: Arc<AgentStats>,
}

impl Agent {
    /// Creates an agent.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`](crate::AgentError::Config) if the
    /// settings are invalid.
    pub fn new(
        pollers: Vec<Arc<dyn Poller>>,
        transport: Arc<dyn Transport>,
        settings: AgentSettings,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            pollers: pollers.into(),
            transport,
            settings,
            stats: Arc::new(AgentStats::default()),
        })
    }

    /// Returns the live counters, usable while [`Agent::run`] is in progress.
    #[must_use]
    pub fn stats(&self) -> Arc<AgentStats> {
        Arc::clone(&self.stats)
    }

    /// Runs until `cancel` fires, then drains in-flight deliveries.
    ///
    /// Batches already admitted to the pool are still delivered, and resets
    /// for deliveries that complete while draining are applied before this
    /// returns.
    pub async fn run(self, cancel: CancellationToken) -> AgentReport {
        let Self {
            pollers,
            transport,
            settings,
            stats,
        } = self;

        if let Err(e) = transport.ping().await {
            warn!(error = %e, "collector health check failed");
        }

        let permits = Arc::new(Semaphore::new(settings.rate_limit));
        let (job_tx, job_rx) = mpsc::channel::<Job>(settings.rate_limit);
        // Bounded in practice by the permits: one signal per admitted batch.
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<()>();

        let job_rx = Arc::new(Mutex::new(job_rx));
        let mut workers = JoinSet::new();
        for id in 0..settings.rate_limit {
            workers.spawn(worker(
                id,
                Arc::clone(&job_rx),
                Arc::clone(&transport),
                done_tx.clone(),
                Arc::clone(&stats),
            ));
        }
        drop(done_tx);

        let start = Instant::now();
        let mut poll_ticker = interval_at(start + settings.poll_interval, settings.poll_interval);
        poll_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut report_ticker =
            interval_at(start + settings.report_interval, settings.report_interval);
        report_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            pollers = pollers.len(),
            poll_interval = ?settings.poll_interval,
            report_interval = ?settings.report_interval,
            rate_limit = settings.rate_limit,
            "agent started"
        );

        let mut collections = JoinSet::new();
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(()) = done_rx.recv() => reset_pollers(&pollers, &stats).await,
                _ = poll_ticker.tick() => {
                    while collections.try_join_next().is_some() {}
                    if collections.is_empty() {
                        collections.spawn(collect(Arc::clone(&pollers), Arc::clone(&stats)));
                    } else {
                        AgentStats::bump(&stats.collections_skipped);
                        debug!("previous collection still running, tick skipped");
                    }
                }
                _ = report_ticker.tick() => {
                    dispatch(&pollers, &permits, &job_tx, &stats).await;
                }
                Some(_) = collections.join_next(), if !collections.is_empty() => {}
            }
        }

        info!("agent stopping, draining deliveries");
        drop(job_tx);
        while collections.join_next().await.is_some() {}
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "delivery worker failed");
            }
        }
        while done_rx.recv().await.is_some() {
            reset_pollers(&pollers, &stats).await;
        }

        let report = stats.report();
        info!(?report, "agent stopped");
        report
    }
}

async fn collect(pollers: Arc<[Arc<dyn Poller>]>, stats: Arc<AgentStats>) {
    AgentStats::bump(&stats.collection_cycles);
    for outcome in poll_all(&pollers).await {
        if let Err(e) = outcome.result {
            AgentStats::bump(&stats.poll_failures);
            error!(poller = %outcome.poller, error = %e, "poll failed");
        }
    }
}

async fn dispatch(
    pollers: &[Arc<dyn Poller>],
    permits: &Arc<Semaphore>,
    jobs: &mpsc::Sender<Job>,
    stats: &AgentStats,
) {
    let mut batch = Vec::new();
    for outcome in gather_metrics(pollers).await {
        match outcome.result {
            Ok(metrics) => batch.extend(metrics),
            Err(e) => error!(poller = %outcome.poller, error = %e, "get metrics failed"),
        }
    }
    if batch.is_empty() {
        debug!("nothing to deliver");
        return;
    }

    let Ok(permit) = Arc::clone(permits).try_acquire_owned() else {
        AgentStats::bump(&stats.batches_dropped);
        warn!(metrics = batch.len(), "delivery pool saturated, batch dropped");
        return;
    };

    let size = batch.len();
    match jobs.try_send(Job {
        batch,
        _permit: permit,
    }) {
        Ok(()) => {
            AgentStats::bump(&stats.batches_enqueued);
            debug!(metrics = size, "batch enqueued");
        }
        Err(TrySendError::Full(_) | TrySendError::Closed(_)) => {
            AgentStats::bump(&stats.batches_dropped);
            warn!(metrics = size, "job queue unavailable, batch dropped");
        }
    }
}

async fn reset_pollers(pollers: &[Arc<dyn Poller>], stats: &AgentStats) {
    AgentStats::bump(&stats.reset_cycles);
    for outcome in reset_all(pollers).await {
        if let Err(e) = outcome.result {
            error!(poller = %outcome.poller, error = %e, "reset failed");
        }
    }
}

async fn worker(
    id: usize,
    jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
    transport: Arc<dyn Transport>,
    done: mpsc::UnboundedSender<()>,
    stats: Arc<AgentStats>,
) {
    loop {
        let next = jobs.lock().await.recv().await;
        let Some(job) = next else {
            break;
        };

        match transport.send(&job.batch).await {
            Ok(()) => {
                AgentStats::bump(&stats.batches_delivered);
                debug!(worker = id, metrics = job.batch.len(), "batch delivered");
                // The dispatcher outlives every worker.
                let _ = done.send(());
            }
            Err(e) => {
                AgentStats::bump(&stats.batches_failed);
                error!(worker = id, metrics = job.batch.len(), error = %e, "batch delivery failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AgentError, DeliveryError};
    use async_trait::async_trait;
    use std::time::Duration;

    struct StaticPoller {
        name: &'static str,
        metrics: Vec<Metric>,
        fail: bool,
    }

    #[async_trait]
    impl Poller for StaticPoller {
        fn name(&self) -> &str {
            self.name
        }
        async fn poll(&self) -> Result<()> {
            if self.fail {
                return Err(AgentError::Collection("offline".to_string()));
            }
            Ok(())
        }
        async fn get_metrics(&self) -> Result<Vec<Metric>> {
            if self.fail {
                return Err(AgentError::Collection("offline".to_string()));
            }
            Ok(self.metrics.clone())
        }
        async fn reset_metrics(&self) -> Result<()> {
            Ok(())
        }
    }

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn send(&self, _batch: &[Metric]) -> std::result::Result<(), DeliveryError> {
            Ok(())
        }
        async fn ping(&self) -> std::result::Result<(), DeliveryError> {
            Err(DeliveryError::Unavailable)
        }
    }

    fn pollers() -> Vec<Arc<dyn Poller>> {
        vec![
            Arc::new(StaticPoller {
                name: "ok",
                metrics: vec![Metric::gauge("g", 1.0)],
                fail: false,
            }),
            Arc::new(StaticPoller {
                name: "broken",
                metrics: Vec::new(),
                fail: true,
            }),
        ]
    }

    #[tokio::test]
    async fn fan_out_reports_each_poller() {
        let pollers = pollers();
        let mut outcomes = poll_all(&pollers).await;
        outcomes.sort_by(|a, b| a.poller.cmp(&b.poller));

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].poller, "broken");
        assert!(matches!(outcomes[0].result, Err(AgentError::Collection(_))));
        assert!(outcomes[1].result.is_ok());
    }

    #[tokio::test]
    async fn gather_keeps_successful_metrics() {
        let outcomes = gather_metrics(&pollers()).await;
        let metrics: Vec<Metric> = outcomes
            .into_iter()
            .filter_map(|o| o.result.ok())
            .flatten()
            .collect();
        assert_eq!(metrics, vec![Metric::gauge("g", 1.0)]);
    }

    #[tokio::test]
    async fn dispatch_drops_batch_without_permit() {
        let stats = AgentStats::default();
        let permits = Arc::new(Semaphore::new(1));
        let (tx, mut rx) = mpsc::channel(1);
        let pollers = pollers();

        dispatch(&pollers, &permits, &tx, &stats).await;
        dispatch(&pollers, &permits, &tx, &stats).await;

        let report = stats.report();
        assert_eq!(report.batches_enqueued, 1);
        assert_eq!(report.batches_dropped, 1);

        // Finishing the first job frees its permit.
        drop(rx.recv().await.unwrap());
        dispatch(&pollers, &permits, &tx, &stats).await;
        assert_eq!(stats.report().batches_enqueued, 2);
    }

    #[tokio::test]
    async fn dispatch_skips_empty_batch() {
        let stats = AgentStats::default();
        let permits = Arc::new(Semaphore::new(1));
        let (tx, _rx) = mpsc::channel(1);
        let pollers: Vec<Arc<dyn Poller>> = vec![Arc::new(StaticPoller {
            name: "empty",
            metrics: Vec::new(),
            fail: false,
        })];

        dispatch(&pollers, &permits, &tx, &stats).await;
        assert_eq!(stats.report(), AgentReport::default());
        assert_eq!(permits.available_permits(), 1);
    }

    #[test]
    fn new_rejects_invalid_settings() {
        let settings = AgentSettings {
            poll_interval: Duration::from_millis(10),
            report_interval: Duration::from_millis(20),
            rate_limit: 0,
        };
        let result = Agent::new(pollers(), Arc::new(NullTransport), settings);
        assert!(matches!(result, Err(AgentError::Config(_))));
    }

    #[test]
    fn new_rejects_oversized_rate_limit() {
        let settings = AgentSettings {
            poll_interval: Duration::from_millis(10),
            report_interval: Duration::from_millis(20),
            rate_limit: usize::MAX / 2,
        };
        let result = Agent::new(pollers(), Arc::new(NullTransport), settings);
        assert!(matches!(result, Err(AgentError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_health_check_is_not_fatal() {
        let settings = AgentSettings {
            poll_interval: Duration::from_millis(10),
            report_interval: Duration::from_millis(20),
            rate_limit: 2,
        };
        let agent = Agent::new(pollers(), Arc::new(NullTransport), settings).unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(agent.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(45)).await;
        cancel.cancel();
        let report = handle.await.unwrap();

        assert_eq!(report.collection_cycles, 4);
        assert_eq!(report.collections_skipped, 0);
        assert_eq!(report.poll_failures, 4);
        assert_eq!(report.batches_delivered, 2);
        assert_eq!(report.reset_cycles, 2);
    }
}
