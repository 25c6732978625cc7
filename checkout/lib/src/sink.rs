//! Row sinks for recorded checkouts.
//!
//! A sink receives one [`SheetRow`] per recorded transaction. Sinks are
//! fed by a [`SinkWorker`] so that slow I/O never holds up estimation.

use std::fs::OpenOptions;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fs2::FileExt;
use reqwest::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::SinkError;
use crate::types::SheetRow;

/// Trait for row sink backends.
pub trait RowSink {
    /// Appends a single row.
    ///
    /// ## Errors
    ///
    /// Returns an error if the row could not be written.
    fn append_row(&self, row: &SheetRow) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// JSONL file sink.
///
/// Writes each row as one line of JSON. The file and its parent
/// directories are created on first write. Writes take an exclusive `fs2`
/// lock so several processes can share a file.
///
/// ## Examples
///
/// ```no_run
/// use checkout_lib::{JsonlSink, RowSink, SheetRow};
///
/// # async fn example(row: SheetRow) {
/// let sink = JsonlSink::new("/tmp/checkouts.jsonl".into());
/// sink.append_row(&row).await.unwrap();
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    /// Creates a sink writing to `path`.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Returns the path to the sink file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn write_line(path: &Path, line: &str) -> Result<(), SinkError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.lock_exclusive().map_err(|_| SinkError::FileLock)?;
        writeln!(file, "{line}")?;
        file.unlock().map_err(|_| SinkError::FileLock)?;
        Ok(())
    }
}

impl RowSink for JsonlSink {
    fn append_row(&self, row: &SheetRow) -> impl Future<Output = Result<(), SinkError>> + Send {
        let path = self.path.clone();
        let line = serde_json::to_string(row);
        async move {
            let line = line?;
            tokio::task::spawn_blocking(move || Self::write_line(&path, &line))
                .await
                .map_err(|e| SinkError::Io(std::io::Error::other(e)))?
        }
    }
}

/// HTTP webhook sink.
///
/// POSTs each row as a JSON object to a fixed URL, such as a spreadsheet
/// web-app endpoint that appends it as a new row. Any non-2xx answer is an
/// error.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    /// Creates a webhook sink with a per-request timeout.
    ///
    /// ## Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SinkError> {
        let client = Client::builder()
            .user_agent(concat!("checkout-lib/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Returns the target URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl RowSink for WebhookSink {
    fn append_row(&self, row: &SheetRow) -> impl Future<Output = Result<(), SinkError>> + Send {
        let request = self.client.post(&self.url).json(row);
        async move {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(SinkError::Rejected(status.as_u16()));
            }
            Ok(())
        }
    }
}

/// In-memory sink. Clones share the same rows.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    rows: Arc<Mutex<Vec<SheetRow>>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every row written so far.
    pub fn rows(&self) -> Vec<SheetRow> {
        self.rows
            .lock()
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }
}

impl RowSink for MemorySink {
    fn append_row(&self, row: &SheetRow) -> impl Future<Output = Result<(), SinkError>> + Send {
        let result = self
            .rows
            .lock()
            .map(|mut rows| rows.push(row.clone()))
            .map_err(|_| SinkError::Io(std::io::Error::other("memory sink poisoned")));
        async move { result }
    }
}

/// Sender half of a [`SinkWorker`].
#[derive(Debug, Clone)]
pub struct SinkHandle {
    tx: mpsc::Sender<SheetRow>,
}

impl SinkHandle {
    /// Queues a row for writing without waiting.
    ///
    /// Returns false and drops the row if the queue is full or the worker
    /// has stopped.
    pub fn submit(&self, row: SheetRow) -> bool {
        match self.tx.try_send(row) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(row)) => {
                warn!(terminal = %row.terminal_id, "sink queue full, dropping row");
                false
            }
            Err(mpsc::error::TrySendError::Closed(row)) => {
                warn!(terminal = %row.terminal_id, "sink worker stopped, dropping row");
                false
            }
        }
    }
}

/// Drains queued rows into a sink in submission order.
pub struct SinkWorker;

impl SinkWorker {
    /// Spawns the worker on the current tokio runtime.
    ///
    /// The worker runs until every [`SinkHandle`] is dropped, then resolves
    /// to the number of rows written. Rows that fail to write are logged
    /// and dropped.
    ///
    /// ## Examples
    ///
    /// ```
    /// use checkout_lib::{MemorySink, SinkWorker};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let sink = MemorySink::new();
    /// let (handle, worker) = SinkWorker::spawn(sink.clone(), 16);
    /// drop(handle);
    /// assert_eq!(worker.await.unwrap(), 0);
    /// # }
    /// ```
    pub fn spawn<S>(sink: S, capacity: usize) -> (SinkHandle, JoinHandle<usize>)
    where
        S: RowSink + Send + Sync + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<SheetRow>(capacity.max(1));

        let worker = tokio::spawn(async move {
            let mut written = 0usize;
            while let Some(row) = rx.recv().await {
                match sink.append_row(&row).await {
                    Ok(()) => {
                        written += 1;
                        debug!(terminal = %row.terminal_id, "row written");
                    }
                    Err(e) => {
                        warn!(terminal = %row.terminal_id, error = %e, "failed to write row");
                    }
                }
            }
            written
        });

        (SinkHandle { tx }, worker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(terminal_id: &str, queue_length: u64) -> SheetRow {
        SheetRow {
            terminal_id: terminal_id.to_string(),
            start_time: "2024-05-01 10:00:00".to_string(),
            end_time: "2024-05-01 10:00:30".to_string(),
            end_status: Some("completed".to_string()),
            queue_length,
            total_items: Some(2),
            wait_duration_seconds: 30,
        }
    }

    fn create_test_sink() -> (JsonlSink, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rows.jsonl");
        (JsonlSink::new(path), temp_dir)
    }

    #[tokio::test]
    async fn jsonl_sink_creates_file_lazily() {
        let (sink, _temp_dir) = create_test_sink();
        assert!(!sink.path().exists());

        sink.append_row(&row("till-1", 0)).await.unwrap();

        assert!(sink.path().exists());
    }

    #[tokio::test]
    async fn jsonl_sink_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let sink = JsonlSink::new(temp_dir.path().join("nested/dir/rows.jsonl"));

        sink.append_row(&row("till-1", 0)).await.unwrap();

        assert!(sink.path().exists());
    }

    #[tokio::test]
    async fn jsonl_sink_appends_one_line_per_row() {
        let (sink, _temp_dir) = create_test_sink();

        for i in 0..3 {
            sink.append_row(&row(&format!("till-{i}"), i)).await.unwrap();
        }

        let contents = std::fs::read_to_string(sink.path()).unwrap();
        let rows: Vec<SheetRow> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].terminal_id, "till-0");
        assert_eq!(rows[2].queue_length, 2);
    }

    #[tokio::test]
    async fn memory_sink_clones_share_rows() {
        let sink = MemorySink::new();
        let other = sink.clone();

        sink.append_row(&row("till-1", 0)).await.unwrap();

        assert_eq!(other.rows().len(), 1);
    }

    #[tokio::test]
    async fn webhook_sink_posts_row_as_json() {
        use wiremock::matchers::{body_json, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        let expected = row("till-1", 3);

        Mock::given(method("POST"))
            .and(path("/rows"))
            .and(body_json(&expected))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let sink = WebhookSink::new(
            format!("{}/rows", mock_server.uri()),
            Duration::from_secs(5),
        )
        .unwrap();

        sink.append_row(&expected).await.unwrap();
    }

    #[tokio::test]
    async fn webhook_sink_reports_rejection() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let sink = WebhookSink::new(mock_server.uri(), Duration::from_secs(5)).unwrap();
        let err = sink.append_row(&row("till-1", 0)).await.unwrap_err();

        assert!(matches!(err, SinkError::Rejected(500)));
    }

    #[tokio::test]
    async fn webhook_sink_times_out() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&mock_server)
            .await;

        let sink = WebhookSink::new(mock_server.uri(), Duration::from_millis(100)).unwrap();
        let err = sink.append_row(&row("till-1", 0)).await.unwrap_err();

        assert!(matches!(err, SinkError::Http(_)));
    }

    #[tokio::test]
    async fn worker_writes_rows_in_submission_order() {
        let sink = MemorySink::new();
        let (handle, worker) = SinkWorker::spawn(sink.clone(), 8);

        for i in 0..5 {
            assert!(handle.submit(row("till-1", i)));
        }
        drop(handle);

        assert_eq!(worker.await.unwrap(), 5);
        let lengths: Vec<u64> = sink.rows().iter().map(|r| r.queue_length).collect();
        assert_eq!(lengths, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn worker_survives_failed_writes() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let sink = WebhookSink::new(mock_server.uri(), Duration::from_secs(5)).unwrap();
        let (handle, worker) = SinkWorker::spawn(sink, 4);

        assert!(handle.submit(row("till-1", 0)));
        assert!(handle.submit(row("till-2", 0)));
        drop(handle);

        assert_eq!(worker.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn jsonl_sink_keeps_existing_rows() {
        let (sink, _temp_dir) = create_test_sink();
        let existing = serde_json::to_string(&row("till-0", 0)).unwrap();
        std::fs::write(sink.path(), format!("{existing}\n")).unwrap();

        sink.append_row(&row("till-1", 1)).await.unwrap();

        let contents = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], existing);
    }

    #[tokio::test]
    async fn submit_drops_row_when_queue_is_full() {
        let sink = MemorySink::new();
        let (handle, worker) = SinkWorker::spawn(sink.clone(), 1);

        // Current-thread runtime: the worker cannot drain until we yield.
        assert!(handle.submit(row("till-1", 0)));
        assert!(!handle.submit(row("till-2", 1)));
        drop(handle);

        assert_eq!(worker.await.unwrap(), 1);
        let rows = sink.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].terminal_id, "till-1");
    }

    #[tokio::test]
    async fn submit_fails_once_worker_is_gone() {
        let (handle, worker) = SinkWorker::spawn(MemorySink::new(), 1);
        worker.abort();
        let _ = worker.await;

        assert!(!handle.submit(row("till-1", 0)));
    }
}
