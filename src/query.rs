use chrono::{DateTime, NaiveDateTime, Utc};

/// Layout of the start/end columns in the query params file.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single query to replay against the datastore.
///
/// `hostname` doubles as the affinity key: every query for the same host is
/// routed to the same worker for the whole run. No relation between `start`
/// and `end` is enforced; an inverted range reaches the executor as-is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryParams {
    pub hostname: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl QueryParams {
    pub fn new(hostname: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            hostname: hostname.into(),
            start,
            end,
        }
    }
}

/// Parses a timestamp in [`TIME_FORMAT`], interpreting it as UTC.
pub fn parse_time(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, TIME_FORMAT).map(|t| t.and_utc())
}
