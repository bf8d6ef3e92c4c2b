use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::SendError};
use tokio::task::JoinHandle;

use crate::diagnostics::DiagnosticSink;
use crate::executor::Executor;
use crate::query::QueryParams;

/// Why a single query contributed no sample.
#[derive(Debug, thiserror::Error)]
pub enum QueryError<E>
where
    E: std::error::Error + 'static,
{
    #[error("error running query: {0}")]
    Failed(#[source] E),
    #[error("error running query for {hostname}: query timed out after {timeout:?}")]
    TimedOut { hostname: String, timeout: Duration },
}

/// The pool's end of a worker: its inbox and its task.
pub struct WorkerHandle {
    index: usize,
    inbox: mpsc::Sender<QueryParams>,
    task: JoinHandle<usize>,
}

impl WorkerHandle {
    /// Spawns a worker task that measures every query it receives and
    /// forwards successful durations to `output`.
    pub fn spawn<E: Executor>(
        index: usize,
        output: mpsc::Sender<Duration>,
        executor: Arc<E>,
        sink: Arc<dyn DiagnosticSink>,
        timeout: Option<Duration>,
    ) -> Self {
        // A single slot keeps the router at most one query ahead of each worker.
        let (tx, rx) = mpsc::channel(1);
        let worker = QueryWorker {
            index,
            processed: 0,
            inbox: rx,
            output,
            executor,
            sink,
            timeout,
        };
        tracing::debug!("starting worker-{index}");
        Self {
            index,
            inbox: tx,
            task: tokio::spawn(worker.run()),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> String {
        format!("worker-{}", self.index)
    }

    /// Queues `query` for this worker, waiting while its inbox is full.
    ///
    /// Fails only if the worker task is gone.
    pub async fn send(&self, query: QueryParams) -> Result<(), SendError<QueryParams>> {
        self.inbox.send(query).await
    }

    /// Closes the inbox. The worker finishes what is already queued and then
    /// exits; the returned handle resolves to the number of queries it pulled.
    pub fn stop(self) -> JoinHandle<usize> {
        tracing::debug!("closing input channel for {}", self.name());
        drop(self.inbox);
        self.task
    }
}

struct QueryWorker<E> {
    index: usize,
    processed: usize,
    inbox: mpsc::Receiver<QueryParams>,
    output: mpsc::Sender<Duration>,
    executor: Arc<E>,
    sink: Arc<dyn DiagnosticSink>,
    timeout: Option<Duration>,
}

impl<E: Executor> QueryWorker<E> {
    async fn run(mut self) -> usize {
        tracing::debug!("worker-{} started", self.index);

        while let Some(query) = self.inbox.recv().await {
            // Counted whether or not the measurement succeeds.
            self.processed += 1;

            match measure(self.executor.as_ref(), &query, self.timeout).await {
                Ok(elapsed) => {
                    if self.output.send(elapsed).await.is_err() {
                        tracing::warn!(
                            "worker-{} output channel closed, dropping remaining queries",
                            self.index
                        );
                        break;
                    }
                }
                Err(e) => self.sink.report(&e),
            }
        }

        tracing::debug!(
            "worker-{} is done, processed {} queries",
            self.index,
            self.processed
        );
        self.processed
    }
}

async fn measure<E: Executor>(
    executor: &E,
    query: &QueryParams,
    timeout: Option<Duration>,
) -> Result<Duration, QueryError<E::Error>> {
    let measured = executor.measure(query);
    let result = match timeout {
        Some(timeout) => tokio::time::timeout(timeout, measured)
            .await
            .map_err(|_| QueryError::TimedOut {
                hostname: query.hostname.clone(),
                timeout,
            })?,
        None => measured.await,
    };
    result.map_err(QueryError::Failed)
}
