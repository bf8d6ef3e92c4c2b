//! Query params source.
//!
//! Reads `hostname,start,end` lines from any async reader on a background task
//! and streams the parsed [`QueryParams`] through a bounded channel. Bad lines
//! never end the stream: they are handed to the [`DiagnosticSink`] and skipped.
//! The channel closes once the input is exhausted (or unreadable).

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

use crate::diagnostics::DiagnosticSink;
use crate::query::{parse_time, QueryParams};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Fields are split on every comma. Quoting is not supported, so a quoted
    /// field containing a comma lands here too.
    #[error("CSV line doesn't have 3 fields: {0:?}")]
    FieldCount(Vec<String>),
    #[error("failed parsing start time: {0}")]
    StartTime(#[source] chrono::ParseError),
    #[error("failed parsing end time: {0}")]
    EndTime(#[source] chrono::ParseError),
    #[error("failed parsing file: {0}")]
    Read(#[from] std::io::Error),
}

pub struct QueryLoader;

impl QueryLoader {
    /// Starts loading in the background and returns the receiving end.
    ///
    /// `capacity` bounds how far the loader may run ahead of the workers.
    pub fn spawn<R>(
        reader: R,
        capacity: usize,
        sink: Arc<dyn DiagnosticSink>,
    ) -> mpsc::Receiver<QueryParams>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(load(reader, tx, sink));
        rx
    }
}

async fn load<R>(reader: R, tx: mpsc::Sender<QueryParams>, sink: Arc<dyn DiagnosticSink>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut emitted = 0usize;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                sink.report(&LoadError::Read(e));
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_line(&line) {
            Ok(query) => {
                if tx.send(query).await.is_err() {
                    tracing::debug!("query receiver dropped, stop loading");
                    break;
                }
                emitted += 1;
            }
            Err(e) => sink.report(&e),
        }
    }

    tracing::info!("Finished reading {emitted} queries, closing loader output channel...");
}

/// Parses a single `hostname,start,end` record.
///
/// The hostname is the affinity key and is taken verbatim; only the
/// timestamps are trimmed.
pub fn parse_line(line: &str) -> Result<QueryParams, LoadError> {
    let fields: Vec<&str> = line.split(',').collect();
    let [hostname, start, end] = fields.as_slice() else {
        return Err(LoadError::FieldCount(
            fields.iter().map(|f| f.to_string()).collect(),
        ));
    };

    let start = parse_time(start.trim()).map_err(LoadError::StartTime)?;
    let end = parse_time(end.trim()).map_err(LoadError::EndTime)?;
    Ok(QueryParams::new(*hostname, start, end))
}
