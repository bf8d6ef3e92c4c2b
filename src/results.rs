//! Results — streaming latency aggregation.
//!
//! [`Results`] drains the pool's duration channel on a background task,
//! keeping every sample. When the channel closes the samples are sorted once
//! and published through a `watch` channel; every query waits on that signal,
//! so callers may ask for statistics at any time and simply resume once the
//! run has drained.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::report::LatencyReport;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResultsError {
    #[error("no results found to summarize")]
    NoResults,
    #[error("results collector stopped before the input was drained")]
    Collector,
}

/// Sorted samples, published exactly once.
type Drained = Option<Arc<[Duration]>>;

pub struct Results {
    drained: watch::Receiver<Drained>,
}

impl Results {
    /// Starts collecting from `input` in the background.
    pub fn new(input: mpsc::Receiver<Duration>) -> Self {
        let (tx, rx) = watch::channel(None);
        tokio::spawn(collect(input, tx));
        Self { drained: rx }
    }

    /// Number of samples collected. Waits until drained.
    pub async fn count(&self) -> Result<usize, ResultsError> {
        Ok(self.samples().await?.len())
    }

    pub async fn min(&self) -> Result<Duration, ResultsError> {
        let samples = self.samples().await?;
        samples.first().copied().ok_or(ResultsError::NoResults)
    }

    pub async fn max(&self) -> Result<Duration, ResultsError> {
        let samples = self.samples().await?;
        samples.last().copied().ok_or(ResultsError::NoResults)
    }

    pub async fn median(&self) -> Result<Duration, ResultsError> {
        median(&self.samples().await?).ok_or(ResultsError::NoResults)
    }

    pub async fn average(&self) -> Result<Duration, ResultsError> {
        average(&self.samples().await?).ok_or(ResultsError::NoResults)
    }

    /// All four statistics at once. Fails with [`ResultsError::NoResults`]
    /// when nothing was collected.
    pub async fn report(&self) -> Result<LatencyReport, ResultsError> {
        LatencyReport::from_sorted(&self.samples().await?).ok_or(ResultsError::NoResults)
    }

    /// `min: X, median: Y, average: Z, max: W`.
    pub async fn summary(&self) -> Result<String, ResultsError> {
        Ok(self.report().await?.to_string())
    }

    /// Waits for the collector to publish the sorted samples.
    async fn samples(&self) -> Result<Arc<[Duration]>, ResultsError> {
        let mut drained = self.drained.clone();
        let samples = drained
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ResultsError::Collector)?;
        (*samples).clone().ok_or(ResultsError::Collector)
    }
}

async fn collect(mut input: mpsc::Receiver<Duration>, drained: watch::Sender<Drained>) {
    let mut samples = Vec::new();

    // Block for the first sample, then take whatever else is already queued.
    while let Some(sample) = input.recv().await {
        samples.push(sample);
        while let Ok(sample) = input.try_recv() {
            samples.push(sample);
        }
    }

    samples.sort_unstable();
    tracing::info!("Collected {} durations", samples.len());
    if drained.send(Some(samples.into())).is_err() {
        tracing::debug!("results dropped before the input was drained");
    }
}

/// Middle element for an odd count, mean of the two middle elements
/// (truncated to whole nanoseconds) for an even one.
pub fn median(sorted: &[Duration]) -> Option<Duration> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    if n % 2 == 1 {
        return Some(sorted[n / 2]);
    }
    let (lo, hi) = (sorted[n / 2 - 1], sorted[n / 2]);
    Some(from_nanos((lo.as_nanos() + hi.as_nanos()) / 2))
}

/// Arithmetic mean, truncated to whole nanoseconds.
///
/// Summed in `u128` nanoseconds, which cannot overflow for any sample count
/// that fits in memory.
pub fn average(samples: &[Duration]) -> Option<Duration> {
    if samples.is_empty() {
        return None;
    }
    let total: u128 = samples.iter().map(Duration::as_nanos).sum();
    Some(from_nanos(total / samples.len() as u128))
}

fn from_nanos(nanos: u128) -> Duration {
    const NANOS_PER_SEC: u128 = 1_000_000_000;
    Duration::new(
        (nanos / NANOS_PER_SEC) as u64,
        (nanos % NANOS_PER_SEC) as u32,
    )
}
