//! Checkout queue estimation library.
//!
//! Point-of-sale terminals report each completed checkout with its start
//! and end time. This library keeps those reports in an append-only log and
//! estimates, after the fact, how many customers were waiting in a single
//! checkout line when each one started being served.
//!
//! ## Core Types
//!
//! - [`TransactionRecord`] - One completed checkout at a terminal
//! - [`TransactionLog`] - Append-only, arrival-ordered record of checkouts
//! - [`CheckoutReport`] - A report as posted by a terminal
//! - [`Completion`] - Position, queue length, and wait duration of a checkout
//!
//! ## Estimation
//!
//! - [`single_lane`] - The single lane formula `max(r_i - b_ai - 1, 0)`
//! - [`QueueEstimator`] - Trait for queue length estimators
//! - [`CheckoutRecorder`] - Appends and estimates under one lock
//!
//! ## Sinks
//!
//! - [`RowSink`] - Trait for row sink backends
//! - [`JsonlSink`] - JSONL file sink with file locking
//! - [`WebhookSink`] - HTTP POST sink
//! - [`SinkWorker`] - Background writer fed through a bounded channel

mod error;
mod estimator;
mod log;
mod parse;
mod recorder;
mod sink;
mod types;

pub use error::{CheckoutError, SinkError};
pub use estimator::{estimate, single_lane, QueueEstimator, SingleLaneEstimator};
pub use log::{LogView, TransactionLog};
pub use parse::parse_timestamp;
pub use recorder::CheckoutRecorder;
pub use sink::{JsonlSink, MemorySink, RowSink, SinkHandle, SinkWorker, WebhookSink};
pub use types::{CheckoutReport, Completion, SheetRow, TransactionRecord};
