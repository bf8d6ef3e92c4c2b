//! Executor — the measurement capability plugged into the pipeline.
//!
//! An [`Executor`] knows how to run one [`QueryParams`] against the backing
//! store and how long that took. The pipeline never looks inside: it calls
//! [`Executor::execute`] once up front as a connectivity smoke test, shares the
//! executor read-only across every worker for [`Executor::measure`], and calls
//! [`Executor::stop`] once the run is over.
//!
//! Any connection pooling lives inside the executor and must be safe to use
//! from all workers at the same time.
//!
//! tsbench ships [`PostgresExecutor`] for TimescaleDB; tests plug in their own.
pub mod postgres;
pub use postgres::{ExecutorError, PostgresExecutor};

use std::future::Future;
use std::time::Duration;

use crate::query::QueryParams;

pub trait Executor
where
    Self: Send + Sync + 'static,
{
    type Error: std::error::Error + Send + Sync + 'static;

    /// Runs a trivial query to prove the backing store is reachable.
    ///
    /// A failure here is fatal to the whole run.
    fn execute(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Runs `query` to completion and returns the elapsed wall-clock time.
    ///
    /// Failures are per-query: the worker reports them and moves on.
    fn measure(
        &self,
        query: &QueryParams,
    ) -> impl Future<Output = Result<Duration, Self::Error>> + Send;

    /// Releases any resources held by the executor.
    fn stop(&self) -> impl Future<Output = ()> + Send;
}
