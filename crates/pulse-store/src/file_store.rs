//! File-backed metrics store.
//!
//! [`FileStore`] keeps its working set in a [`MemoryStore`] and persists the
//! whole snapshot to a single JSON file, either after every mutation
//! (zero flush interval) or from a background task on a fixed interval.
//!
//! The file is a JSON array of wire metrics, gauges first, each group sorted
//! by name, and is fully rewritten on every flush.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use pulse_proto::Metric;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, error, info};

use crate::error::Result;
use crate::memory::MemoryStore;
use crate::retry::RetryPolicy;
use crate::snapshot::Snapshot;
use crate::traits::{Counter, Gauge, MetricsStore};

/// Default interval between background flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(300);

/// Configuration for a [`FileStore`].
#[derive(Debug, Clone)]
pub struct FileStoreConfig {
    /// Snapshot file location.
    pub path: PathBuf,
    /// Interval between background flushes; zero flushes after every mutation.
    pub flush_interval: Duration,
    /// Load the existing snapshot file on open.
    pub restore: bool,
    /// Retry schedule for opening the snapshot file.
    pub retry: RetryPolicy,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./store"),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            restore: true,
            retry: RetryPolicy::default(),
        }
    }
}

impl FileStoreConfig {
    /// Creates a config for the given snapshot file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Sets the flush interval.
    #[must_use]
    pub const fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Sets whether the existing file is restored on open.
    #[must_use]
    pub const fn with_restore(mut self, restore: bool) -> Self {
        self.restore = restore;
        self
    }

    /// Sets the retry schedule.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

fn is_busy(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::ResourceBusy
}

/// Serializes snapshot writes to one file.
struct SnapshotWriter {
    path: PathBuf,
    retry: RetryPolicy,
    dirty: AtomicBool,
    write_lock: Mutex<()>,
}

impl SnapshotWriter {
    fn new(path: PathBuf, retry: RetryPolicy) -> Self {
        Self {
            path,
            retry,
            dirty: AtomicBool::new(false),
            write_lock: Mutex::new(()),
        }
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    async fn write_if_dirty(&self, memory: &MemoryStore) -> Result<bool> {
        if !self.dirty.load(Ordering::Acquire) {
            return Ok(false);
        }
        self.write_latest(memory).await?;
        Ok(true)
    }

    /// Rewrites the file with the store contents as of lock acquisition.
    async fn write_latest(&self, memory: &MemoryStore) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.dirty.store(false, Ordering::Release);

        let snapshot = memory.snapshot_now();
        let body = serde_json::to_vec(&snapshot.to_metrics())?;

        let mut file = self
            .retry
            .run("create snapshot file", || File::create(&self.path), is_busy)
            .await
            .inspect_err(|_| self.mark_dirty())?;
        file.write_all(&body).await.inspect_err(|_| self.mark_dirty())?;
        file.flush().await?;

        debug!(path = %self.path.display(), entries = snapshot.len(), "snapshot written");
        Ok(())
    }

    async fn read_existing(&self) -> Result<Snapshot> {
        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true).truncate(false);
        let mut file = self
            .retry
            .run("open snapshot file", || options.open(&self.path), is_busy)
            .await?;

        let mut body = Vec::new();
        file.read_to_end(&mut body).await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Snapshot::default());
        }

        let metrics: Vec<Metric> = serde_json::from_slice(&body)?;
        Ok(Snapshot::from_metrics(metrics))
    }
}

/// Metrics store persisted to a JSON snapshot file.
pub struct FileStore {
    memory: Arc<MemoryStore>,
    writer: Arc<SnapshotWriter>,
    synchronous: bool,
    flusher: Option<JoinHandle<()>>,
}

impl FileStore {
    /// Opens the store, restoring the existing file if configured to.
    ///
    /// A missing file is created and an empty file is treated as an empty
    /// store. A non-zero flush interval starts a background flusher that
    /// runs until the store is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or holds invalid JSON.
    pub async fn open(config: FileStoreConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let writer = Arc::new(SnapshotWriter::new(config.path.clone(), config.retry));
        let snapshot = if config.restore {
            writer.read_existing().await?
        } else {
            Snapshot::default()
        };
        info!(
            path = %config.path.display(),
            restored = snapshot.len(),
            flush_interval = ?config.flush_interval,
            "file store opened"
        );

        let memory = Arc::new(MemoryStore::from_snapshot(snapshot));
        let synchronous = config.flush_interval.is_zero();
        let flusher = (!synchronous).then(|| {
            spawn_flusher(
                Arc::clone(&memory),
                Arc::clone(&writer),
                config.flush_interval,
            )
        });

        Ok(Self {
            memory,
            writer,
            synchronous,
            flusher,
        })
    }

    /// Returns the snapshot file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.writer.path
    }

    /// Writes the current contents to the file now.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn flush(&self) -> Result<()> {
        self.writer.write_latest(&self.memory).await
    }

    /// Stops the background flusher and writes a final snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the final write fails.
    pub async fn close(mut self) -> Result<()> {
        if let Some(flusher) = self.flusher.take() {
            flusher.abort();
        }
        self.flush().await
    }

    async fn persist(&self) -> Result<()> {
        if self.synchronous {
            self.writer.write_latest(&self.memory).await
        } else {
            self.writer.mark_dirty();
            Ok(())
        }
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        if let Some(flusher) = self.flusher.take() {
            flusher.abort();
        }
    }
}

fn spawn_flusher(
    memory: Arc<MemoryStore>,
    writer: Arc<SnapshotWriter>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            ticker.tick().await;
            if let Err(e) = writer.write_if_dirty(&memory).await {
                error!(path = %writer.path.display(), error = %e, "background flush failed");
            }
        }
    })
}

#[async_trait]
impl MetricsStore for FileStore {
    async fn get_gauge(&self, name: &str) -> Result<Option<Gauge>> {
        self.memory.get_gauge(name).await
    }

    async fn get_gauges(&self) -> Result<HashMap<String, Gauge>> {
        self.memory.get_gauges().await
    }

    async fn set_gauge(&self, name: &str, value: Gauge) -> Result<()> {
        self.memory.set_gauge(name, value).await?;
        self.persist().await
    }

    async fn set_gauges(&self, values: &HashMap<String, Gauge>) -> Result<()> {
        self.memory.set_gauges(values).await?;
        self.persist().await
    }

    async fn clear_gauges(&self) -> Result<()> {
        self.memory.clear_gauges().await?;
        self.persist().await
    }

    async fn get_counter(&self, name: &str) -> Result<Option<Counter>> {
        self.memory.get_counter(name).await
    }

    async fn get_counters(&self) -> Result<HashMap<String, Counter>> {
        self.memory.get_counters().await
    }

    async fn set_counter(&self, name: &str, delta: Counter) -> Result<()> {
        self.memory.set_counter(name, delta).await?;
        self.persist().await
    }

    async fn set_counters(&self, deltas: &HashMap<String, Counter>) -> Result<()> {
        self.memory.set_counters(deltas).await?;
        self.persist().await
    }

    async fn clear_counters(&self) -> Result<()> {
        self.memory.clear_counters().await?;
        self.persist().await
    }

    async fn snapshot(&self) -> Result<Snapshot> {
        Ok(self.memory.snapshot_now())
    }
}
