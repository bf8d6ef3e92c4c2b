use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

use super::Executor;
use crate::query::QueryParams;

/// Per-minute min/max CPU usage for one host over a time range.
const CPU_USAGE_QUERY: &str = r#"
    SELECT
        time_bucket('1 minute', ts) AS minute,
        MIN(usage) AS min,
        MAX(usage) AS max,
        host
    FROM cpu_usage
    WHERE
        host = $1 AND
        ts >= $2 AND
        ts <= $3
    GROUP BY minute, host
"#;

/// The driver error is rendered inline and not exposed as a source, so an
/// `{:#}` chain prints it once.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("unable to connect to database: {0}")]
    Connect(sqlx::Error),
    #[error("connectivity check failed: {0}")]
    Ping(sqlx::Error),
    #[error("query failed: {0}")]
    Query(sqlx::Error),
    #[error("query iteration failed: {0}")]
    Decode(sqlx::Error),
}

#[derive(Debug, FromRow)]
#[allow(dead_code)]
struct CpuUsageRow {
    minute: DateTime<Utc>,
    min: f64,
    max: f64,
    host: String,
}

/// Measures queries against a TimescaleDB `cpu_usage` hypertable.
///
/// Every row of the result set is fetched and decoded before the clock stops,
/// so the measured time covers the full round trip and not just the first
/// packet.
#[derive(Clone)]
pub struct PostgresExecutor {
    pool: PgPool,
}

impl PostgresExecutor {
    /// Opens a pool of up to `max_connections` connections.
    ///
    /// Size it to the worker count: each worker holds at most one connection
    /// at a time.
    pub async fn connect(
        connection_string: &str,
        max_connections: u32,
    ) -> Result<Self, ExecutorError> {
        tracing::info!("Connecting to postgres with up to {max_connections} connections...");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(connection_string)
            .await
            .map_err(ExecutorError::Connect)?;
        tracing::info!("Connected to postgres");
        Ok(Self { pool })
    }
}

impl Executor for PostgresExecutor {
    type Error = ExecutorError;

    async fn execute(&self) -> Result<(), Self::Error> {
        let greeting: String = sqlx::query_scalar("SELECT 'Hello, world!'")
            .fetch_one(&self.pool)
            .await
            .map_err(ExecutorError::Ping)?;
        tracing::debug!("connectivity check returned {greeting:?}");
        Ok(())
    }

    async fn measure(&self, query: &QueryParams) -> Result<Duration, Self::Error> {
        let started = Instant::now();
        tracing::debug!("running a query for {}", query.hostname);

        let mut rows = sqlx::query(CPU_USAGE_QUERY)
            .bind(&query.hostname)
            .bind(query.start)
            .bind(query.end)
            .fetch(&self.pool);

        while let Some(row) = rows.try_next().await.map_err(ExecutorError::Query)? {
            let row = CpuUsageRow::from_row(&row).map_err(ExecutorError::Decode)?;
            tracing::trace!(?row, "query result");
        }

        Ok(started.elapsed())
    }

    async fn stop(&self) {
        tracing::info!("Closing postgres pool...");
        self.pool.close().await;
    }
}
