//! tsbench — replay time-range queries against TimescaleDB and measure latency.
//!
//! tsbench reads a CSV of `hostname,start,end` rows, runs one query per row
//! against the database across a fixed pool of concurrent workers, and reports
//! min/median/average/max query latency.
//!
//! # Architecture
//!
//! The pipeline is a chain of tokio tasks joined by bounded channels:
//!
//! ```text
//! QueryLoader ─► WorkerPool ─► QueryWorker × N ─► Results
//! ```
//!
//! - [`QueryLoader`]: parses the CSV input into [`QueryParams`]. Malformed rows
//!   go to a [`DiagnosticSink`] and are skipped.
//! - [`WorkerPool`]: routes each query to a worker. The first query for a host
//!   picks a random worker; every later query for that host goes to the same
//!   one.
//! - [`Executor`]: the pluggable measurement. [`PostgresExecutor`] runs the
//!   real query; tests plug in stubs.
//! - [`Results`]: collects every duration, sorts once the pool has drained, and
//!   answers statistics queries.
//! - [`Reporter`]: turns the final [`RunReport`] into text or JSON.
//!
//! Every channel is bounded, so a slow database throttles the whole pipeline
//! back to the CSV reader.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use tsbench::{Executor, PostgresExecutor, QueryLoader, Results, TracingSink, WorkerPool};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let sink = Arc::new(TracingSink);
//! let input = tokio::fs::File::open("queries.csv").await?;
//! let queries = QueryLoader::spawn(input, 4, sink.clone());
//!
//! let executor = Arc::new(PostgresExecutor::connect("postgres://localhost/tsdb", 4).await?);
//! executor.execute().await?;
//!
//! let workers = std::num::NonZeroUsize::new(4).unwrap();
//! let (pool, durations) = WorkerPool::new(workers, queries, executor.clone(), sink);
//! let results = Results::new(durations);
//!
//! println!("{}", results.summary().await?);
//! println!("{} queries routed", pool.wait().await?.routed);
//! executor.stop().await;
//! # Ok(())
//! # }
//! ```

/// Command-line configuration
pub mod config;
/// Side channel for per-query failures
pub mod diagnostics;
/// Measurement capability and the Postgres implementation
pub mod executor;
/// CSV query params source
pub mod loader;
/// Host-affinity worker pool
pub mod pool;
/// The unit of work
pub mod query;
/// Reports and Reporters
pub mod report;
/// Latency aggregation
pub mod results;
/// A single worker task
pub mod worker;

pub use config::Config;
pub use diagnostics::{DiagnosticSink, TracingSink};
pub use executor::{Executor, PostgresExecutor};
pub use loader::QueryLoader;
pub use pool::{PoolOptions, PoolStats, WorkerPool};
pub use query::QueryParams;
pub use report::{GoDuration, JsonReporter, LatencyReport, Reporter, RunReport, TextReporter};
pub use results::{Results, ResultsError};
