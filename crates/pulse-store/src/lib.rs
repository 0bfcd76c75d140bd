//! Gauge/counter metrics storage.
//!
//! This crate provides:
//!
//! - [`MetricsStore`]: the async storage contract (gauges overwrite, counters add)
//! - [`MemoryStore`]: in-memory backend
//! - [`FileStore`]: memory backend persisted to a JSON snapshot file
//! - [`PgStore`]: Postgres backend with server-side counter accumulation
//! - [`open_store`]: backend selection from a [`StoreConfig`]
//! - [`RetryPolicy`]: the fixed retry schedule shared with the delivery client
//! - [`ingest`]: helpers for applying delivered batches
//!
//! ## Example
//!
//! ```rust
//! use pulse_store::{MemoryStore, MetricsStore};
//!
//! # async fn demo() -> pulse_store::Result<()> {
//! let store = MemoryStore::new();
//! store.set_counter("PollCount", 1).await?;
//! store.set_counter("PollCount", 2).await?;
//! assert_eq!(store.get_counter("PollCount").await?, Some(3));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod file_store;
pub mod ingest;
pub mod memory;
pub mod postgres;
pub mod retry;
pub mod snapshot;
pub mod traits;

pub use config::{StoreConfig, open_store};
pub use error::{IngestError, Result, StoreError};
pub use file_store::{FileStore, FileStoreConfig};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use retry::RetryPolicy;
pub use snapshot::Snapshot;
pub use traits::{
    Counter, Gauge, MetricsStore, Pingable, SharedStore, check_gauge, check_gauges, check_health,
};
