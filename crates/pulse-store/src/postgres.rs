//! Postgres-backed metrics store.
//!
//! Gauges and counters live in two tables keyed by a unique name. Counter
//! writes add on the server side, so concurrent writers never lose
//! increments. Every call goes through the store's [`RetryPolicy`] and is
//! retried only on transient failures (see [`is_transient`]).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::retry::RetryPolicy;
use crate::traits::{Counter, Gauge, MetricsStore, Pingable, check_gauge, check_gauges};

/// Rows per multi-row insert; keeps two binds per row under the protocol limit.
const ROWS_PER_INSERT: usize = 1000;

const CREATE_GAUGES: &str = r"
CREATE TABLE IF NOT EXISTS gauges (
    name TEXT NOT NULL UNIQUE,
    value DOUBLE PRECISION NOT NULL
)";

const CREATE_COUNTERS: &str = r"
CREATE TABLE IF NOT EXISTS counters (
    name TEXT NOT NULL UNIQUE,
    value BIGINT NOT NULL
)";

const UPSERT_GAUGE: &str = " ON CONFLICT (name) DO UPDATE SET value = EXCLUDED.value";
const UPSERT_COUNTER: &str = " ON CONFLICT (name) DO UPDATE SET value = counters.value + EXCLUDED.value";

/// Returns true for failures worth retrying: broken connections, pool
/// exhaustion, deadlocks and serialization conflicts.
///
/// An I/O error can arrive after the server committed; the retried counter
/// upsert then adds the same deltas twice.
#[must_use]
pub fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => db
            .code()
            .is_some_and(|code| code.starts_with("08") || code == "40P01" || code == "40001"),
        _ => false,
    }
}

/// Metrics store backed by a Postgres database.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PgStore {
    /// Connects to `dsn` and creates the tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable or the schema cannot
    /// be created.
    pub async fn connect(dsn: &str, retry: RetryPolicy) -> Result<Self> {
        let options = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5));
        let pool = retry
            .run("connect", || options.clone().connect(dsn), is_transient)
            .await?;

        let store = Self::with_pool(pool, retry);
        store.migrate().await?;
        info!("postgres store ready");
        Ok(store)
    }

    /// Wraps an existing pool without touching the schema.
    #[must_use]
    pub const fn with_pool(pool: PgPool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    /// Returns the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the gauge and counter tables. Safe to run repeatedly.
    ///
    /// # Errors
    ///
    /// Returns an error if a statement fails.
    pub async fn migrate(&self) -> Result<()> {
        for statement in [CREATE_GAUGES, CREATE_COUNTERS] {
            self.retry
                .run(
                    "migrate",
                    || sqlx::query(statement).execute(&self.pool),
                    is_transient,
                )
                .await?;
        }
        debug!("schema up to date");
        Ok(())
    }

    async fn upsert<T>(&self, table: &str, conflict: &str, rows: &[(String, T)]) -> sqlx::Result<()>
    where
        T: for<'q> sqlx::Encode<'q, Postgres> + sqlx::Type<Postgres> + Copy + Send + Sync + 'static,
    {
        let mut tx = self.pool.begin().await?;
        for chunk in rows.chunks(ROWS_PER_INSERT) {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO {table} (name, value) "));
            builder.push_values(chunk, |mut row, (name, value)| {
                row.push_bind(name.clone()).push_bind(*value);
            });
            builder.push(conflict);
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await
    }

    async fn clear(&self, table: &'static str) -> Result<()> {
        let statement = format!("DELETE FROM {table}");
        self.retry
            .run(
                "clear",
                || sqlx::query(&statement).execute(&self.pool),
                is_transient,
            )
            .await?;
        Ok(())
    }
}

fn sorted_rows<T: Copy>(values: &HashMap<String, T>) -> Vec<(String, T)> {
    let mut rows: Vec<_> = values.iter().map(|(k, v)| (k.clone(), *v)).collect();
    rows.sort_unstable_by(|a, b| a.0.cmp(&b.0));
    rows
}

#[async_trait]
impl MetricsStore for PgStore {
    async fn get_gauge(&self, name: &str) -> Result<Option<Gauge>> {
        let value = self
            .retry
            .run(
                "get gauge",
                || {
                    sqlx::query_scalar::<_, f64>("SELECT value FROM gauges WHERE name = $1")
                        .bind(name)
                        .fetch_optional(&self.pool)
                },
                is_transient,
            )
            .await?;
        Ok(value)
    }

    async fn get_gauges(&self) -> Result<HashMap<String, Gauge>> {
        let rows = self
            .retry
            .run(
                "get gauges",
                || sqlx::query_as::<_, (String, f64)>("SELECT name, value FROM gauges").fetch_all(&self.pool),
                is_transient,
            )
            .await?;
        Ok(rows.into_iter().collect())
    }

    #[instrument(skip(self))]
    async fn set_gauge(&self, name: &str, value: Gauge) -> Result<()> {
        check_gauge(name, value)?;
        let rows = [(name.to_string(), value)];
        self.retry
            .run("set gauge", || self.upsert("gauges", UPSERT_GAUGE, &rows), is_transient)
            .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(count = values.len()))]
    async fn set_gauges(&self, values: &HashMap<String, Gauge>) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        check_gauges(values)?;
        let rows = sorted_rows(values);
        self.retry
            .run("set gauges", || self.upsert("gauges", UPSERT_GAUGE, &rows), is_transient)
            .await?;
        Ok(())
    }

    async fn clear_gauges(&self) -> Result<()> {
        self.clear("gauges").await
    }

    async fn get_counter(&self, name: &str) -> Result<Option<Counter>> {
        let value = self
            .retry
            .run(
                "get counter",
                || {
                    sqlx::query_scalar::<_, i64>("SELECT value FROM counters WHERE name = $1")
                        .bind(name)
                        .fetch_optional(&self.pool)
                },
                is_transient,
            )
            .await?;
        Ok(value)
    }

    async fn get_counters(&self) -> Result<HashMap<String, Counter>> {
        let rows = self
            .retry
            .run(
                "get counters",
                || sqlx::query_as::<_, (String, i64)>("SELECT name, value FROM counters").fetch_all(&self.pool),
                is_transient,
            )
            .await?;
        Ok(rows.into_iter().collect())
    }

    #[instrument(skip(self))]
    async fn set_counter(&self, name: &str, delta: Counter) -> Result<()> {
        let rows = [(name.to_string(), delta)];
        self.retry
            .run("set counter", || self.upsert("counters", UPSERT_COUNTER, &rows), is_transient)
            .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(count = deltas.len()))]
    async fn set_counters(&self, deltas: &HashMap<String, Counter>) -> Result<()> {
        if deltas.is_empty() {
            return Ok(());
        }
        let rows = sorted_rows(deltas);
        self.retry
            .run("set counters", || self.upsert("counters", UPSERT_COUNTER, &rows), is_transient)
            .await?;
        Ok(())
    }

    async fn clear_counters(&self) -> Result<()> {
        self.clear("counters").await
    }

    fn as_pingable(&self) -> Option<&dyn Pingable> {
        Some(self)
    }
}

#[async_trait]
impl Pingable for PgStore {
    async fn ping(&self) -> Result<()> {
        self.retry
            .run(
                "ping",
                || sqlx::query("SELECT 1").execute(&self.pool),
                is_transient,
            )
            .await?;
        Ok(())
    }
}
