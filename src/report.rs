use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::results::{average, median};

/// A [`LatencyReport`] is the processed form of the collected samples.
///
/// Reports are pure data: they are built once from the sorted samples and can
/// then be displayed, serialized, or handed to a [`Reporter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LatencyReport {
    pub count: usize,
    pub min: Duration,
    pub median: Duration,
    pub average: Duration,
    pub max: Duration,
}

impl LatencyReport {
    /// Builds a report from samples sorted in ascending order.
    ///
    /// Returns `None` when there are no samples.
    pub fn from_sorted(sorted: &[Duration]) -> Option<Self> {
        Some(Self {
            count: sorted.len(),
            min: *sorted.first()?,
            median: median(sorted)?,
            average: average(sorted)?,
            max: *sorted.last()?,
        })
    }
}

impl fmt::Display for LatencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "min: {}, median: {}, average: {}, max: {}",
            GoDuration(self.min),
            GoDuration(self.median),
            GoDuration(self.average),
            GoDuration(self.max)
        )
    }
}

/// Everything printed at the end of a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Queries routed to a worker, failed ones included.
    pub queries: usize,
    pub workers: usize,
    pub wall_clock: Duration,
    pub latency: LatencyReport,
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

/// A [`Reporter`] turns a [`RunReport`] into output.
///
/// `render` is pure so it can be tested; `report` writes the rendered text to
/// stdout.
pub trait Reporter {
    fn render(&self, report: &RunReport) -> Result<String, ReportError>;

    fn report(&self, report: &RunReport) -> Result<(), ReportError> {
        println!("{}", self.render(report)?);
        Ok(())
    }
}

/// Human-readable two-line summary.
pub struct TextReporter;

impl Reporter for TextReporter {
    fn render(&self, report: &RunReport) -> Result<String, ReportError> {
        Ok(format!(
            "Completed {} queries with {} workers in {}:\n  {}",
            report.queries,
            report.workers,
            GoDuration(report.wall_clock),
            report.latency
        ))
    }
}

/// One JSON object per run.
pub struct JsonReporter;

impl Reporter for JsonReporter {
    fn render(&self, report: &RunReport) -> Result<String, ReportError> {
        Ok(serde_json::to_string(report)?)
    }
}

/// Displays a [`Duration`] the compact way latencies are usually quoted:
/// `1h0m0s`, `24m48s`, `1.5s`, `250ms`, `12µs`, `7ns`.
///
/// Anything of a second or more is split into hours, minutes and seconds, with
/// leading zero units omitted and the seconds carrying any fraction. Shorter
/// values use the largest unit that keeps the integer part non-zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GoDuration(pub Duration);

impl fmt::Display for GoDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nanos = self.0.as_nanos();
        match nanos {
            0 => f.write_str("0s"),
            1..=999 => write!(f, "{nanos}ns"),
            1_000..=999_999 => {
                write_fraction(f, nanos, 1_000)?;
                f.write_str("µs")
            }
            1_000_000..=999_999_999 => {
                write_fraction(f, nanos, 1_000_000)?;
                f.write_str("ms")
            }
            _ => {
                let secs = self.0.as_secs();
                let (h, m, s) = (secs / 3600, secs / 60 % 60, secs % 60);
                if h > 0 {
                    write!(f, "{h}h")?;
                }
                if h > 0 || m > 0 {
                    write!(f, "{m}m")?;
                }
                let subsec = u128::from(self.0.subsec_nanos());
                write_fraction(f, u128::from(s) * 1_000_000_000 + subsec, 1_000_000_000)?;
                f.write_str("s")
            }
        }
    }
}

/// Writes `value / unit` with the remainder as a decimal fraction, trailing
/// zeros trimmed. `unit` must be a power of ten.
fn write_fraction(f: &mut fmt::Formatter<'_>, value: u128, unit: u128) -> fmt::Result {
    write!(f, "{}", value / unit)?;
    let frac = value % unit;
    if frac == 0 {
        return Ok(());
    }
    let width = unit.ilog10() as usize;
    let digits = format!("{frac:0width$}");
    write!(f, ".{}", digits.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn go(d: Duration) -> String {
        GoDuration(d).to_string()
    }

    #[test]
    fn formats_whole_units() {
        assert_eq!(go(Duration::ZERO), "0s");
        assert_eq!(go(Duration::from_secs(1)), "1s");
        assert_eq!(go(Duration::from_secs(60)), "1m0s");
        assert_eq!(go(Duration::from_secs(90)), "1m30s");
        assert_eq!(go(Duration::from_secs(1488)), "24m48s");
        assert_eq!(go(Duration::from_secs(3600)), "1h0m0s");
        assert_eq!(go(Duration::from_secs(100 * 3600 + 61)), "100h1m1s");
    }

    #[test]
    fn formats_fractions() {
        assert_eq!(go(Duration::from_millis(1500)), "1.5s");
        assert_eq!(go(Duration::from_millis(60_250)), "1m0.25s");
        assert_eq!(go(Duration::from_millis(250)), "250ms");
        assert_eq!(go(Duration::from_micros(1500)), "1.5ms");
        assert_eq!(go(Duration::from_micros(12)), "12µs");
        assert_eq!(go(Duration::from_nanos(12_345)), "12.345µs");
        assert_eq!(go(Duration::from_nanos(7)), "7ns");
        assert_eq!(go(Duration::new(2, 1)), "2.000000001s");
    }

    #[test]
    fn latency_report_from_sorted_samples() {
        let samples: Vec<_> = [60, 60, 120, 3600, 3600]
            .into_iter()
            .map(Duration::from_secs)
            .collect();
        let report = LatencyReport::from_sorted(&samples).unwrap();
        assert_eq!(report.count, 5);
        assert_eq!(
            report.to_string(),
            "min: 1m0s, median: 2m0s, average: 24m48s, max: 1h0m0s"
        );
        assert_eq!(LatencyReport::from_sorted(&[]), None);
    }

    fn run_report() -> RunReport {
        let samples = [Duration::from_secs(60), Duration::from_secs(120)];
        RunReport {
            queries: 3,
            workers: 4,
            wall_clock: Duration::from_millis(2500),
            latency: LatencyReport::from_sorted(&samples).unwrap(),
        }
    }

    #[test]
    fn text_reporter_renders_two_lines() {
        assert_eq!(
            TextReporter.render(&run_report()).unwrap(),
            "Completed 3 queries with 4 workers in 2.5s:\n  \
             min: 1m0s, median: 1m30s, average: 1m30s, max: 2m0s"
        );
    }

    #[test]
    fn json_reporter_renders_one_object() {
        let rendered = JsonReporter.render(&run_report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["queries"], 3);
        assert_eq!(value["workers"], 4);
        assert_eq!(value["latency"]["count"], 2);
        assert_eq!(value["latency"]["median"]["secs"], 90);
    }
}
