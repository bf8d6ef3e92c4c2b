use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::AsyncRead;
use tracing_subscriber::EnvFilter;

use tsbench::{
    Config, DiagnosticSink, Executor, JsonReporter, PostgresExecutor, QueryLoader, Reporter,
    Results, RunReport, TextReporter, TracingSink, WorkerPool,
};

#[tokio::main]
async fn main() {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.default_log_level())),
        )
        .init();

    if let Err(e) = run(config).await {
        eprintln!("{}", render_error(&e));
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<()> {
    let started = Instant::now();
    let sink: Arc<dyn DiagnosticSink> = Arc::new(TracingSink);

    let input = open_input(&config.query_params_path).await?;
    let queries = QueryLoader::spawn(input, config.workers.get(), sink.clone());
    tracing::info!("Query loader created");

    let executor = Arc::new(
        PostgresExecutor::connect(&config.connection_string, config.max_connections()).await?,
    );
    executor.execute().await?;
    tracing::info!("Executor created");

    let (pool, durations) =
        WorkerPool::spawn(config.pool_options(), queries, executor.clone(), sink);
    let results = Results::new(durations);
    tracing::info!("Retrieving results from workers...");

    let latency = results.report().await?;
    let stats = pool.wait().await?;
    executor.stop().await;

    let report = RunReport {
        queries: stats.routed,
        workers: config.workers.get(),
        wall_clock: started.elapsed(),
        latency,
    };
    if config.json {
        JsonReporter.report(&report)?;
    } else {
        TextReporter.report(&report)?;
    }
    Ok(())
}

/// Fatal errors go to stderr as one line, causes joined with `: `.
fn render_error(error: &anyhow::Error) -> String {
    format!("{error:#}")
}

/// `-` means standard input.
async fn open_input(path: &str) -> Result<Box<dyn AsyncRead + Unpin + Send>> {
    if path == "-" {
        return Ok(Box::new(tokio::io::stdin()));
    }
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open {path}"))?;
    Ok(Box::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_input_is_a_one_line_error() {
        let Err(err) = open_input("/nonexistent/queries.csv").await else {
            panic!("opened a file that does not exist");
        };
        let rendered = render_error(&err);
        assert!(rendered.starts_with("failed to open /nonexistent/queries.csv: "));
        assert!(!rendered.contains('\n'));
    }

    #[tokio::test]
    async fn dash_reads_stdin() {
        assert!(open_input("-").await.is_ok());
    }

    #[test]
    fn nested_causes_render_on_one_line() {
        let err = anyhow::anyhow!("connection refused").context("unable to connect to database");
        assert_eq!(
            render_error(&err),
            "unable to connect to database: connection refused"
        );
    }
}
