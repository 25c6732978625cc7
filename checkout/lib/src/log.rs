//! Append-only log of completed transactions.
//!
//! The log lives in process memory only and starts empty. Every mutation
//! and query goes through one mutex, so an append and the queries made on
//! its behalf can be serialized with [`TransactionLog::append_with`].

use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDateTime;

use crate::error::CheckoutError;
use crate::types::TransactionRecord;

/// An append-only, arrival-ordered record of completed transactions.
///
/// Records are never mutated or removed. Insertion order is the order in
/// which completions were reported, which need not match start or end
/// time order.
///
/// ## Examples
///
/// ```
/// use checkout_lib::{parse_timestamp, TransactionLog, TransactionRecord};
///
/// let log = TransactionLog::new();
/// let record = TransactionRecord::new(
///     "till-1",
///     parse_timestamp("2024-05-01 10:00:00").unwrap(),
///     parse_timestamp("2024-05-01 10:00:30").unwrap(),
/// );
///
/// assert_eq!(log.append(record).unwrap(), 1);
/// let later = parse_timestamp("2024-05-01 10:01:00").unwrap();
/// assert_eq!(log.count_ended_before(later).unwrap(), 1);
/// ```
#[derive(Debug, Default)]
pub struct TransactionLog {
    records: Mutex<Vec<TransactionRecord>>,
}

impl TransactionLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<TransactionRecord>>, CheckoutError> {
        self.records.lock().map_err(|_| CheckoutError::Lock)
    }

    /// Appends a record and returns its 1-based arrival position.
    ///
    /// ## Errors
    ///
    /// Returns [`CheckoutError::Lock`] if the lock is poisoned. Nothing is
    /// appended in that case.
    pub fn append(&self, record: TransactionRecord) -> Result<usize, CheckoutError> {
        self.append_with(record, |_, position| position)
    }

    /// Appends a record, then runs `f` against the log while the lock is
    /// still held.
    ///
    /// `f` receives a read view that already includes the new record and
    /// the record's 1-based position. No other append can land between the
    /// push and `f`, which keeps the position and any counts taken from the
    /// view consistent with each other.
    ///
    /// ## Errors
    ///
    /// Returns [`CheckoutError::Lock`] if the lock is poisoned.
    pub fn append_with<T, F>(&self, record: TransactionRecord, f: F) -> Result<T, CheckoutError>
    where
        F: FnOnce(&LogView<'_>, usize) -> T,
    {
        let mut records = self.lock()?;
        records.push(record);
        let position = records.len();
        Ok(f(&LogView::new(&records), position))
    }

    /// Counts records whose end time is strictly earlier than `instant`.
    ///
    /// ## Errors
    ///
    /// Returns [`CheckoutError::Lock`] if the lock is poisoned.
    pub fn count_ended_before(&self, instant: NaiveDateTime) -> Result<usize, CheckoutError> {
        self.read(|view| view.count_ended_before(instant))
    }

    /// Runs `f` against a point-in-time view of the log.
    ///
    /// ## Errors
    ///
    /// Returns [`CheckoutError::Lock`] if the lock is poisoned.
    pub fn read<T, F>(&self, f: F) -> Result<T, CheckoutError>
    where
        F: FnOnce(&LogView<'_>) -> T,
    {
        let records = self.lock()?;
        Ok(f(&LogView::new(&records)))
    }

    /// Returns the number of records appended so far.
    ///
    /// ## Errors
    ///
    /// Returns [`CheckoutError::Lock`] if the lock is poisoned.
    pub fn len(&self) -> Result<usize, CheckoutError> {
        self.read(|view| view.len())
    }

    /// Returns true if nothing has been appended yet.
    ///
    /// ## Errors
    ///
    /// Returns [`CheckoutError::Lock`] if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, CheckoutError> {
        self.read(|view| view.is_empty())
    }

    /// Returns a copy of every record in arrival order.
    ///
    /// ## Errors
    ///
    /// Returns [`CheckoutError::Lock`] if the lock is poisoned.
    pub fn snapshot(&self) -> Result<Vec<TransactionRecord>, CheckoutError> {
        self.read(|view| view.records().to_vec())
    }
}

/// A borrowed, read-only view of the log taken under its lock.
#[derive(Debug, Clone, Copy)]
pub struct LogView<'a> {
    records: &'a [TransactionRecord],
}

impl<'a> LogView<'a> {
    /// Wraps a slice of records in arrival order.
    pub fn new(records: &'a [TransactionRecord]) -> Self {
        Self { records }
    }

    /// Number of records in the view.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the view holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Counts records whose end time is strictly earlier than `instant`.
    pub fn count_ended_before(&self, instant: NaiveDateTime) -> usize {
        self.records
            .iter()
            .filter(|record| record.ended_before(instant))
            .count()
    }

    /// Records in arrival order.
    pub fn records(&self) -> &'a [TransactionRecord] {
        self.records
    }
}
