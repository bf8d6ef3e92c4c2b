use std::num::NonZeroUsize;
use std::time::Duration;

use clap::Parser;

use crate::pool::PoolOptions;

/// Replays time-range queries against TimescaleDB and reports latency statistics.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "tsbench", version, about)]
pub struct Config {
    /// Number of workers/threads to use
    #[arg(long, default_value = "4")]
    pub workers: NonZeroUsize,

    /// Query params CSV file path (`-` reads standard input)
    #[arg(long)]
    pub query_params_path: String,

    /// Postgres connection string
    #[arg(long, env = "TSBENCH_CONNECTION_STRING", hide_env_values = true)]
    pub connection_string: String,

    /// Maximum database connections (defaults to the worker count)
    #[arg(long)]
    pub max_connections: Option<u32>,

    /// Abandon any single query after this many milliseconds
    #[arg(long)]
    pub query_timeout_ms: Option<u64>,

    /// Seed for the host-to-worker assignment
    #[arg(long)]
    pub seed: Option<u64>,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Config {
    pub fn max_connections(&self) -> u32 {
        self.max_connections
            .unwrap_or_else(|| u32::try_from(self.workers.get()).unwrap_or(u32::MAX))
    }

    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions::builder()
            .workers(self.workers)
            .seed(self.seed)
            .measure_timeout(self.query_timeout_ms.map(Duration::from_millis))
            .build()
    }

    /// Log filter used when `RUST_LOG` is not set.
    pub fn default_log_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "warn"
        }
    }
}
