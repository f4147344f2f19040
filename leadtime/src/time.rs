use chrono::{DateTime, Utc};

/// Parse an ISO-8601 / RFC 3339 timestamp and normalize it to UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|parsed| parsed.with_timezone(&Utc))
}

/// Whole seconds elapsed between two instants. Negative when `to` precedes
/// `from`, which happens when upstream clocks are skewed.
pub fn elapsed_seconds(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_seconds()
}
