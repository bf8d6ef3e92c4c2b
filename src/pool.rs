//! Worker pool — host-affinity routing over a fixed set of workers.
//!
//! The pool owns `workers` [`WorkerHandle`]s and a single routing task. The
//! routing task is the only thing that ever touches the routing table, so the
//! table needs no lock: it is moved into the task at spawn time and only handed
//! back, read-only, in [`PoolStats`] once the run is over.
//!
//! # High-level flow
//! 1. All workers are spawned, each with its own single-slot inbox and a clone
//!    of the shared duration sender.
//! 2. The routing task pulls queries off the input channel one at a time. The
//!    first query for a host picks a worker uniformly at random; every later
//!    query for that host goes to the same worker.
//! 3. When the input channel closes, every worker is stopped in turn, all of
//!    them are joined, and only then is the output channel closed.
//!
//! Backpressure is end to end: a slow executor fills the worker inbox, which
//! blocks the router, which stops draining the loader's channel.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use futures::future::join_all;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use typed_builder::TypedBuilder;

use crate::diagnostics::DiagnosticSink;
use crate::executor::Executor;
use crate::query::QueryParams;
use crate::worker::WorkerHandle;

/// Knobs for [`WorkerPool::spawn`].
#[derive(Clone, Debug, TypedBuilder)]
pub struct PoolOptions {
    /// The number of worker tasks, fixed for the whole run.
    pub workers: NonZeroUsize,
    /// Seed for the routing RNG. Drawn from entropy when absent.
    #[builder(default)]
    pub seed: Option<u64>,
    /// Abandon a measurement that runs longer than this.
    #[builder(default)]
    pub measure_timeout: Option<Duration>,
}

/// What the pool did, available once it has shut down.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Queries pulled off the input channel and handed to a worker.
    pub routed: usize,
    /// Queries pulled by each worker, indexed by worker.
    pub processed: Vec<usize>,
    /// The final routing table: host to worker index.
    pub assignments: HashMap<String, usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("routing task failed: {0}")]
    Router(#[from] JoinError),
}

pub struct WorkerPool {
    workers: usize,
    routed: Arc<AtomicUsize>,
    router: JoinHandle<PoolStats>,
}

impl WorkerPool {
    /// Starts a pool of `workers` with default options.
    pub fn new<E: Executor>(
        workers: NonZeroUsize,
        input: mpsc::Receiver<QueryParams>,
        executor: Arc<E>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> (Self, mpsc::Receiver<Duration>) {
        Self::spawn(
            PoolOptions::builder().workers(workers).build(),
            input,
            executor,
            sink,
        )
    }

    /// Starts every worker and the routing task, then returns immediately.
    ///
    /// The returned receiver yields one duration per successful measurement
    /// and closes after the input has closed and every worker has drained.
    pub fn spawn<E: Executor>(
        options: PoolOptions,
        input: mpsc::Receiver<QueryParams>,
        executor: Arc<E>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> (Self, mpsc::Receiver<Duration>) {
        let workers = options.workers.get();
        let (output_tx, output_rx) = mpsc::channel(workers);

        tracing::info!("Spawning {workers} workers...");
        let handles = (0..workers)
            .map(|i| {
                WorkerHandle::spawn(
                    i,
                    output_tx.clone(),
                    executor.clone(),
                    sink.clone(),
                    options.measure_timeout,
                )
            })
            .collect();

        let seed = options.seed.unwrap_or_else(rand::random);
        tracing::info!("Routing with seed {seed}");

        let routed = Arc::new(AtomicUsize::new(0));
        let router = Router {
            workers: handles,
            assignments: HashMap::new(),
            rng: StdRng::seed_from_u64(seed),
            routed: routed.clone(),
        };
        let router = tokio::spawn(router.run(input, output_tx));

        tracing::info!("Worker pool created and ready to use");
        (
            Self {
                workers,
                routed,
                router,
            },
            output_rx,
        )
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Queries routed so far.
    ///
    /// Exact once [`WorkerPool::wait`] has resolved; a snapshot before that.
    pub fn routed_count(&self) -> usize {
        self.routed.load(Ordering::Relaxed)
    }

    /// Waits for the pool to shut down.
    pub async fn wait(self) -> Result<PoolStats, PoolError> {
        Ok(self.router.await?)
    }
}

/// State of the routing task. Never shared.
struct Router {
    workers: Vec<WorkerHandle>,
    assignments: HashMap<String, usize>,
    rng: StdRng,
    routed: Arc<AtomicUsize>,
}

impl Router {
    async fn run(
        mut self,
        mut input: mpsc::Receiver<QueryParams>,
        output: mpsc::Sender<Duration>,
    ) -> PoolStats {
        while let Some(query) = input.recv().await {
            self.route(query).await;
            self.routed.fetch_add(1, Ordering::Relaxed);
        }

        let routed = self.routed.load(Ordering::Relaxed);
        tracing::info!("Input closed after {routed} queries, stopping workers...");
        let handles: Vec<_> = self.workers.into_iter().map(WorkerHandle::stop).collect();
        let processed = join_all(handles)
            .await
            .into_iter()
            .enumerate()
            .map(|(i, res)| match res {
                Ok(n) => n,
                Err(e) => {
                    tracing::error!("worker-{i} panicked: {e}");
                    0
                }
            })
            .collect();

        tracing::info!("Closing worker pool output channel...");
        drop(output);

        PoolStats {
            routed,
            processed,
            assignments: self.assignments,
        }
    }

    async fn route(&mut self, query: QueryParams) {
        let index = self.worker_for(&query.hostname);
        let worker = &self.workers[index];
        tracing::debug!("routing query for {} to {}", query.hostname, worker.name());
        if let Err(e) = worker.send(query).await {
            tracing::error!(
                "worker-{} is gone, dropping query for {}",
                worker.index(),
                e.0.hostname
            );
        }
    }

    fn worker_for(&mut self, hostname: &str) -> usize {
        if let Some(&index) = self.assignments.get(hostname) {
            return index;
        }
        let index = self.rng.gen_range(0..self.workers.len());
        self.assignments.insert(hostname.to_owned(), index);
        tracing::debug!("picked worker-{index} for host {hostname} for the rest of the run");
        index
    }
}
