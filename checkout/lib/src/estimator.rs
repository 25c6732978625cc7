//! Queue length estimation from completed transactions.
//!
//! There is no sensor for queue depth. The estimate is derived after the
//! fact from the arrival position of a transaction (`r_i`) and the number
//! of logged transactions that had already finished before it started
//! (`b_ai`):
//!
//! ```text
//! queue_length = max(r_i - b_ai - 1, 0)
//! ```
//!
//! Completion order stands in for queue order, so out-of-order completions
//! can skew the result in either direction. The formula is kept exactly as
//! is, including the clamp at zero, because existing spreadsheet consumers
//! read its output.

use crate::error::CheckoutError;
use crate::log::{LogView, TransactionLog};
use crate::types::TransactionRecord;

/// The single lane formula: `max(position - ended_before - 1, 0)`.
///
/// ## Examples
///
/// ```
/// use checkout_lib::single_lane;
///
/// assert_eq!(single_lane(4, 2), 1);
/// assert_eq!(single_lane(1, 0), 0);
/// assert_eq!(single_lane(2, 5), 0);
/// ```
#[must_use]
pub fn single_lane(position: usize, ended_before: usize) -> u64 {
    position
        .saturating_sub(ended_before)
        .saturating_sub(1) as u64
}

/// Estimates how many customers were waiting when a transaction started.
pub trait QueueEstimator {
    /// Estimates the queue length for `record`, which sits at the 1-based
    /// `position` of `view`.
    ///
    /// `view` must already include `record`.
    fn estimate(&self, record: &TransactionRecord, view: &LogView<'_>, position: usize) -> u64;
}

/// Estimator for a single checkout line served in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleLaneEstimator;

impl QueueEstimator for SingleLaneEstimator {
    fn estimate(&self, record: &TransactionRecord, view: &LogView<'_>, position: usize) -> u64 {
        // Strict comparison: the record itself can never count against its
        // own start time unless its end precedes its start.
        let ended_before = view.count_ended_before(record.start_time);
        let queue_length = single_lane(position, ended_before);

        tracing::trace!(
            terminal = %record.terminal_id,
            position,
            ended_before,
            queue_length,
            "estimated queue length"
        );

        queue_length
    }
}

/// Estimates against a log that is locked for the duration of the call.
///
/// Use this for replaying or inspecting a log whose contents are not
/// changing. Live recording goes through
/// [`CheckoutRecorder`](crate::CheckoutRecorder), which appends and
/// estimates under one lock.
///
/// ## Errors
///
/// Returns [`CheckoutError::Lock`] if the log lock is poisoned.
pub fn estimate(
    record: &TransactionRecord,
    log: &TransactionLog,
    position: usize,
) -> Result<u64, CheckoutError> {
    log.read(|view| SingleLaneEstimator.estimate(record, view, position))
}
