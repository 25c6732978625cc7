//! Records completed checkouts and estimates the queue behind them.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::CheckoutError;
use crate::estimator::{QueueEstimator, SingleLaneEstimator};
use crate::log::TransactionLog;
use crate::parse::parse_timestamp;
use crate::types::{CheckoutReport, Completion, SheetRow, TransactionRecord};

/// Appends completed transactions to a [`TransactionLog`] and estimates the
/// queue length for each one.
///
/// The log is injected so that callers decide its lifetime and tests can
/// build independent instances. Cloning a recorder shares the same log.
///
/// ## Examples
///
/// ```
/// use std::sync::Arc;
/// use checkout_lib::{CheckoutRecorder, TransactionLog};
///
/// let recorder = CheckoutRecorder::new(Arc::new(TransactionLog::new()));
/// let completion = recorder
///     .record_completion("till-1", "2024-05-01 10:00:00", "2024-05-01 10:00:30")
///     .unwrap();
///
/// assert_eq!(completion.position, 1);
/// assert_eq!(completion.queue_length, 0);
/// assert_eq!(completion.wait_duration_seconds, 30);
/// ```
#[derive(Debug, Clone)]
pub struct CheckoutRecorder<E = SingleLaneEstimator> {
    log: Arc<TransactionLog>,
    estimator: E,
}

impl CheckoutRecorder<SingleLaneEstimator> {
    /// Creates a recorder using the single lane formula.
    #[must_use]
    pub fn new(log: Arc<TransactionLog>) -> Self {
        Self::with_estimator(log, SingleLaneEstimator)
    }
}

impl<E: QueueEstimator> CheckoutRecorder<E> {
    /// Creates a recorder with a custom estimator.
    #[must_use]
    pub fn with_estimator(log: Arc<TransactionLog>, estimator: E) -> Self {
        Self { log, estimator }
    }

    /// Returns the underlying log.
    pub fn log(&self) -> &Arc<TransactionLog> {
        &self.log
    }

    /// Parses and records one completed transaction.
    ///
    /// Both timestamps are parsed before the log is touched.
    ///
    /// ## Errors
    ///
    /// - [`CheckoutError::InvalidTimestamp`] if either timestamp is malformed;
    ///   the log is left unchanged.
    /// - [`CheckoutError::Lock`] if the log lock is poisoned.
    pub fn record_completion(
        &self,
        terminal_id: &str,
        start_time: &str,
        end_time: &str,
    ) -> Result<Completion, CheckoutError> {
        let record = build_record(terminal_id, start_time, end_time)?;
        self.record(record)
    }

    /// Records a parsed transaction.
    ///
    /// The append and the estimate run under the same lock acquisition, so
    /// the returned position and the finished-before count come from the
    /// same state of the log.
    ///
    /// ## Errors
    ///
    /// Returns [`CheckoutError::Lock`] if the log lock is poisoned.
    pub fn record(&self, record: TransactionRecord) -> Result<Completion, CheckoutError> {
        let wait_duration_seconds = record.wait_duration_seconds();
        if wait_duration_seconds < 0 {
            warn!(
                terminal = %record.terminal_id,
                start = %record.start_time,
                end = %record.end_time,
                wait_duration_seconds,
                "transaction ended before it started"
            );
        }

        let terminal_id = record.terminal_id.clone();
        let (position, queue_length) = self.log.append_with(record, |view, position| {
            let appended = &view.records()[position - 1];
            (position, self.estimator.estimate(appended, view, position))
        })?;

        debug!(
            terminal = %terminal_id,
            position,
            queue_length,
            wait_duration_seconds,
            "recorded checkout"
        );

        Ok(Completion {
            position,
            queue_length,
            wait_duration_seconds,
        })
    }

    /// Records a report and builds the row to hand to a sink.
    ///
    /// ## Errors
    ///
    /// Same as [`record_completion`](Self::record_completion).
    pub fn record_report(
        &self,
        report: &CheckoutReport,
    ) -> Result<(Completion, SheetRow), CheckoutError> {
        let record = build_record(&report.terminal_id, &report.start_time, &report.end_time)?;
        let row_record = record.clone();
        let completion = self.record(record)?;
        let row = SheetRow::new(&row_record, report, &completion);
        Ok((completion, row))
    }
}

fn build_record(
    terminal_id: &str,
    start_time: &str,
    end_time: &str,
) -> Result<TransactionRecord, CheckoutError> {
    let start = parse_timestamp(start_time).map_err(|reason| CheckoutError::InvalidTimestamp {
        field: "startTime",
        value: start_time.to_string(),
        reason,
    })?;
    let end = parse_timestamp(end_time).map_err(|reason| CheckoutError::InvalidTimestamp {
        field: "endTime",
        value: end_time.to_string(),
        reason,
    })?;
    Ok(TransactionRecord::new(terminal_id, start, end))
}
