use std::collections::HashMap;
use std::error::Error;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tsbench::{
    DiagnosticSink, Executor, PoolOptions, QueryLoader, QueryParams, Results, ResultsError,
    WorkerPool,
};

#[derive(Default)]
struct MemorySink(Mutex<Vec<String>>);

impl MemorySink {
    fn messages(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&self, error: &(dyn Error + 'static)) {
        self.0.lock().unwrap().push(error.to_string());
    }
}

#[derive(Debug, thiserror::Error)]
#[error("relation \"cpu_usage\" does not exist for {0}")]
struct MissingHost(String);

/// Counts calls per host and reports the query's range as its latency.
/// Queries whose range is inverted fail.
#[derive(Default)]
struct CountingExecutor {
    calls: Mutex<HashMap<String, usize>>,
}

impl Executor for CountingExecutor {
    type Error = MissingHost;

    async fn execute(&self) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn measure(&self, query: &QueryParams) -> Result<Duration, Self::Error> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(query.hostname.clone())
            .or_default() += 1;
        tokio::task::yield_now().await;
        (query.end - query.start)
            .to_std()
            .map_err(|_| MissingHost(query.hostname.clone()))
    }

    async fn stop(&self) {}
}

fn csv(rows: &[(&str, &str, &str)]) -> String {
    rows.iter()
        .map(|(h, s, e)| format!("{h},{s},{e}\n"))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn replays_a_csv_end_to_end() {
    let mut rows = vec![];
    for i in 0..50 {
        let host = format!("host_{:02}", i % 10);
        let end = format!("2017-01-01 08:{:02}:00", 1 + i % 5);
        rows.push((host, "2017-01-01 08:00:00".to_string(), end));
    }
    let input = rows
        .iter()
        .map(|(h, s, e)| format!("{h},{s},{e}\n"))
        .collect::<String>()
        + "broken,line\n"
        + "host_00,yesterday,2017-01-01 08:01:00\n"
        + "host_00,2017-01-01 08:00:00,tomorrow\n";

    let sink = Arc::new(MemorySink::default());
    let executor = Arc::new(CountingExecutor::default());
    let queries = QueryLoader::spawn(std::io::Cursor::new(input.into_bytes()), 4, sink.clone());
    let options = PoolOptions::builder()
        .workers(NonZeroUsize::new(4).unwrap())
        .seed(Some(1234))
        .build();
    let (pool, durations) = WorkerPool::spawn(options, queries, executor.clone(), sink.clone());
    let results = Results::new(durations);

    let report = results.report().await.unwrap();
    let stats = pool.wait().await.unwrap();

    // Conservation: every valid row is routed, measured, and sampled once.
    assert_eq!(stats.routed, 50);
    assert_eq!(report.count, 50);
    assert_eq!(stats.processed.iter().sum::<usize>(), 50);
    assert_eq!(executor.calls.lock().unwrap().values().sum::<usize>(), 50);

    // Stickiness: the per-worker totals add up host by host.
    assert_eq!(stats.assignments.len(), 10);
    for (worker, processed) in stats.processed.iter().enumerate() {
        let hosts = stats.assignments.values().filter(|w| **w == worker).count();
        let expected = hosts * 5;
        assert_eq!(*processed, expected, "worker-{worker}");
    }

    assert_eq!(report.min, Duration::from_secs(60));
    assert_eq!(report.max, Duration::from_secs(300));
    assert_eq!(report.median, Duration::from_secs(180));
    assert_eq!(report.average, Duration::from_secs(180));

    let messages = sink.messages().join("\n");
    assert!(messages.contains("doesn't have 3 fields"));
    assert!(messages.contains("failed parsing start time"));
    assert!(messages.contains("failed parsing end time"));
}

#[tokio::test]
async fn failed_measurements_reduce_the_sample_count() {
    let input = csv(&[
        ("a", "2017-01-01 08:00:00", "2017-01-01 08:02:00"),
        ("b", "2017-01-01 09:00:00", "2017-01-01 08:00:00"),
        ("a", "2017-01-01 08:00:00", "2017-01-01 08:04:00"),
    ]);

    let sink = Arc::new(MemorySink::default());
    let queries = QueryLoader::spawn(std::io::Cursor::new(input.into_bytes()), 2, sink.clone());
    let (pool, durations) = WorkerPool::new(
        NonZeroUsize::new(2).unwrap(),
        queries,
        Arc::new(CountingExecutor::default()),
        sink.clone(),
    );
    let results = Results::new(durations);

    assert_eq!(
        results.summary().await.unwrap(),
        "min: 2m0s, median: 3m0s, average: 3m0s, max: 4m0s"
    );
    assert_eq!(pool.wait().await.unwrap().routed, 3);

    let messages = sink.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("error running query:"));
    assert!(messages[0].contains("for b"));
}

#[tokio::test]
async fn all_failures_leave_no_results() {
    let input = csv(&[("b", "2017-01-01 09:00:00", "2017-01-01 08:00:00")]);

    let sink = Arc::new(MemorySink::default());
    let queries = QueryLoader::spawn(std::io::Cursor::new(input.into_bytes()), 1, sink.clone());
    let (pool, durations) = WorkerPool::new(
        NonZeroUsize::new(1).unwrap(),
        queries,
        Arc::new(CountingExecutor::default()),
        sink,
    );
    let results = Results::new(durations);

    assert_eq!(results.summary().await, Err(ResultsError::NoResults));
    let stats = pool.wait().await.unwrap();
    assert_eq!(stats.routed, 1);
    assert_eq!(stats.processed, vec![1]);
}
