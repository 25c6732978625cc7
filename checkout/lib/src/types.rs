//! Core data types for checkout reporting.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

/// Display format for timestamps written to sinks.
const ROW_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// One completed service event at a checkout terminal.
///
/// Records are immutable once appended to a
/// [`TransactionLog`](crate::TransactionLog).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// The terminal that served the customer. Many records share a terminal.
    pub terminal_id: String,
    /// When the customer started being served.
    pub start_time: NaiveDateTime,
    /// When service completed.
    pub end_time: NaiveDateTime,
}

impl TransactionRecord {
    /// Creates a new record.
    ///
    /// `end_time` earlier than `start_time` is accepted as-is.
    ///
    /// ## Examples
    ///
    /// ```
    /// use checkout_lib::{parse_timestamp, TransactionRecord};
    ///
    /// let record = TransactionRecord::new(
    ///     "till-1",
    ///     parse_timestamp("2024-05-01 10:00:00").unwrap(),
    ///     parse_timestamp("2024-05-01 10:00:30").unwrap(),
    /// );
    /// assert_eq!(record.wait_duration_seconds(), 30);
    /// ```
    pub fn new(
        terminal_id: impl Into<String>,
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
    ) -> Self {
        Self {
            terminal_id: terminal_id.into(),
            start_time,
            end_time,
        }
    }

    /// Returns the service duration rounded to whole seconds.
    ///
    /// Ties round to even, so 2.5 s reports as 2 and 3.5 s as 4, matching
    /// the sheets produced before this service existed. Negative when the
    /// record ended before it started; the value is reported rather than
    /// corrected.
    pub fn wait_duration_seconds(&self) -> i64 {
        let millis = (self.end_time - self.start_time).num_milliseconds();
        (millis as f64 / 1000.0).round_ties_even() as i64
    }

    /// Returns true if the record ended strictly before `instant`.
    pub fn ended_before(&self, instant: NaiveDateTime) -> bool {
        self.end_time < instant
    }
}

/// A completed-transaction report as posted by a point-of-sale terminal.
///
/// Timestamps stay as raw strings here; they are parsed by the
/// [`CheckoutRecorder`](crate::CheckoutRecorder) so that a malformed value
/// can be rejected before anything is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReport {
    /// Terminal identifier. Accepts a JSON string or integer.
    #[serde(deserialize_with = "string_or_number")]
    pub terminal_id: String,
    /// Raw start timestamp.
    pub start_time: String,
    /// Raw end timestamp.
    pub end_time: String,
    /// How the transaction ended (e.g. `completed`, `voided`). Passed through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_status: Option<String>,
    /// Number of items scanned. Passed through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_items: Option<i64>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Signed(i64),
        Unsigned(u64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Signed(n) => n.to_string(),
        Raw::Unsigned(n) => n.to_string(),
    })
}

/// The outcome of recording one completed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    /// 1-based arrival-order position in the log (`r_i`).
    pub position: usize,
    /// Estimated number of customers waiting when service began.
    pub queue_length: u64,
    /// Service duration in whole seconds; negative for inverted timestamps.
    pub wait_duration_seconds: i64,
}

/// A single row handed to a [`RowSink`](crate::RowSink).
///
/// Field order matches the spreadsheet columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetRow {
    pub terminal_id: String,
    pub start_time: String,
    pub end_time: String,
    pub end_status: Option<String>,
    pub queue_length: u64,
    pub total_items: Option<i64>,
    pub wait_duration_seconds: i64,
}

impl SheetRow {
    /// Builds the sink row for a recorded transaction.
    pub fn new(
        record: &TransactionRecord,
        report: &CheckoutReport,
        completion: &Completion,
    ) -> Self {
        Self {
            terminal_id: record.terminal_id.clone(),
            start_time: record.start_time.format(ROW_TIME_FORMAT).to_string(),
            end_time: record.end_time.format(ROW_TIME_FORMAT).to_string(),
            end_status: report.end_status.clone(),
            queue_length: completion.queue_length,
            total_items: report.total_items,
            wait_duration_seconds: completion.wait_duration_seconds,
        }
    }
}
