//! Backend selection for the collector side.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::error::{Result, StoreError};
use crate::file_store::{DEFAULT_FLUSH_INTERVAL, FileStore, FileStoreConfig};
use crate::memory::MemoryStore;
use crate::postgres::PgStore;
use crate::retry::RetryPolicy;
use crate::traits::SharedStore;

/// Which backend to open and how.
///
/// A database DSN takes precedence over a file path; with neither set the
/// store lives in memory only.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Postgres connection string.
    pub database_dsn: Option<String>,
    /// Snapshot file for the file backend.
    pub file_path: Option<PathBuf>,
    /// Flush interval for the file backend; zero writes synchronously.
    pub store_interval: Duration,
    /// Load the existing snapshot file on startup.
    pub restore: bool,
    /// Retry schedule for file and database access.
    pub retry: RetryPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_dsn: None,
            file_path: Some(PathBuf::from("./store")),
            store_interval: DEFAULT_FLUSH_INTERVAL,
            restore: true,
            retry: RetryPolicy::default(),
        }
    }
}

impl StoreConfig {
    /// A config selecting the in-memory backend.
    #[must_use]
    pub fn memory() -> Self {
        Self {
            file_path: None,
            ..Default::default()
        }
    }

    /// A config selecting the file backend.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: Some(path.into()),
            ..Default::default()
        }
    }

    /// A config selecting the Postgres backend.
    #[must_use]
    pub fn database(dsn: impl Into<String>) -> Self {
        Self {
            database_dsn: Some(dsn.into()),
            ..Self::memory()
        }
    }

    /// Sets the file flush interval.
    #[must_use]
    pub const fn with_store_interval(mut self, interval: Duration) -> Self {
        self.store_interval = interval;
        self
    }

    /// Sets whether the snapshot file is restored.
    #[must_use]
    pub const fn with_restore(mut self, restore: bool) -> Self {
        self.restore = restore;
        self
    }

    /// Returns the name of the backend this config selects.
    #[must_use]
    pub fn backend(&self) -> &'static str {
        if non_empty(self.database_dsn.as_deref()).is_some() {
            "postgres"
        } else if self.file_path.as_ref().is_some_and(|p| !p.as_os_str().is_empty()) {
            "file"
        } else {
            "memory"
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Opens the backend selected by `config`.
///
/// # Errors
///
/// Returns [`StoreError::Config`] if the database or file backend cannot be
/// set up.
pub async fn open_store(config: &StoreConfig) -> Result<SharedStore> {
    if let Some(dsn) = non_empty(config.database_dsn.as_deref()) {
        let store = PgStore::connect(dsn, config.retry.clone())
            .await
            .map_err(|e| StoreError::Config(format!("postgres backend: {e}")))?;
        info!(backend = "postgres", "metrics store opened");
        return Ok(Arc::new(store));
    }

    if let Some(path) = config.file_path.as_ref().filter(|p| !p.as_os_str().is_empty()) {
        let file_config = FileStoreConfig::new(path.clone())
            .with_flush_interval(config.store_interval)
            .with_restore(config.restore)
            .with_retry(config.retry.clone());
        let store = FileStore::open(file_config)
            .await
            .map_err(|e| StoreError::Config(format!("file backend {}: {e}", path.display())))?;
        info!(backend = "file", path = %path.display(), "metrics store opened");
        return Ok(Arc::new(store));
    }

    info!(backend = "memory", "metrics store opened");
    Ok(Arc::new(MemoryStore::new()))
}
