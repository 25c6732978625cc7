//! Timestamp parsing for checkout reports.

use chrono::{DateTime, NaiveDateTime};

/// Naive formats accepted for start and end times, tried in order.
const NAIVE_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
];

/// Parses a checkout timestamp into a `NaiveDateTime`.
///
/// All terminals are assumed to report in the same local clock, so no
/// timezone conversion happens. An RFC 3339 offset, when present, is
/// dropped and the wall-clock time is kept as written.
///
/// ## Supported Formats
///
/// - ISO 8601: `2024-05-01T10:00:30`, `2024-05-01T10:00:30.250`
/// - Space separated: `2024-05-01 10:00:30`
/// - Slash separated: `2024/05/01 10:00:30`
/// - RFC 3339: `2024-05-01T10:00:30+09:00`
///
/// ## Errors
///
/// Returns an error string if the timestamp cannot be parsed.
///
/// ## Examples
///
/// ```
/// use checkout_lib::parse_timestamp;
/// use chrono::NaiveDate;
///
/// let ts = parse_timestamp("2024-05-01 10:00:30").unwrap();
/// let expected = NaiveDate::from_ymd_opt(2024, 5, 1)
///     .unwrap()
///     .and_hms_opt(10, 0, 30)
///     .unwrap();
/// assert_eq!(ts, expected);
/// ```
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, String> {
    let trimmed = value.trim();

    if trimmed.is_empty() {
        return Err("timestamp cannot be empty".to_string());
    }

    for format in NAIVE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(ts);
        }
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.naive_local());
    }

    Err("expected timestamp like 2024-05-01T10:00:30".to_string())
}
