use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use vigil_core::{BackoffPolicy, ClosedRecord, ConfigError, RecordId, StoreConfigFile, StoreError};

use crate::observer::{ControllerEvent, EventBus};

/// Append-only sink for closed records. Rows are never updated in place.
pub trait RecordStore: Send + 'static {
    fn append(&mut self, record: &ClosedRecord) -> Result<(), StoreError>;
}

/// One JSON object per line.
///
/// Each append opens the file, writes the whole line with a single
/// `write_all`, flushes and syncs, then drops the handle. A crash mid-write
/// can leave at most one torn trailing line, which `read_records` skips.
#[derive(Debug, Clone)]
pub struct JsonlRecordStore {
    path: PathBuf,
}

impl JsonlRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl RecordStore for JsonlRecordStore {
    fn append(&mut self, record: &ClosedRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(record).map_err(|e| StoreError::Serialize {
            id: record.id,
            reason: e.to_string(),
        })?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| self.io_error(e))?;
        file.flush().map_err(|e| self.io_error(e))?;
        file.sync_data().map_err(|e| self.io_error(e))?;
        Ok(())
    }
}

/// Reads every row back. An unparseable final line without a trailing
/// newline is a torn write and is skipped; corruption anywhere else is an
/// error.
pub fn read_records(path: &Path) -> Result<Vec<ClosedRecord>, StoreError> {
    let content = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let complete_tail = content.ends_with('\n');
    let lines: Vec<&str> = content.lines().collect();
    let last = lines.len().saturating_sub(1);

    let mut records = Vec::with_capacity(lines.len());
    for (idx, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ClosedRecord>(line) {
            Ok(record) => records.push(record),
            Err(_) if idx == last && !complete_tail => {
                tracing::warn!(path = %path.display(), line = idx + 1, "Skipping torn trailing row");
            }
            Err(e) => {
                return Err(StoreError::CorruptRow {
                    line: idx + 1,
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(records)
}

/// In-memory store for tests and dry runs. Clones share the same rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    rows: Arc<Mutex<Vec<ClosedRecord>>>,
    failures_left: Arc<AtomicU64>,
}

impl MemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` appends fail.
    #[must_use]
    pub fn failing(n: u64) -> Self {
        let store = Self::default();
        store.failures_left.store(n, Ordering::SeqCst);
        store
    }

    #[must_use]
    pub fn rows(&self) -> Vec<ClosedRecord> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }
}

impl RecordStore for MemoryRecordStore {
    fn append(&mut self, record: &ClosedRecord) -> Result<(), StoreError> {
        let injected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Io {
                path: PathBuf::from("memory"),
                source: std::io::Error::other("injected failure"),
            });
        }
        self.rows
            .lock()
            .map_err(|_| StoreError::Closed)?
            .push(record.clone());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct StoreWriterConfig {
    pub path: PathBuf,
    pub queue_capacity: usize,
    pub retry: BackoffPolicy,
    pub degrade_after: u32,
}

impl StoreWriterConfig {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            queue_capacity: 1024,
            retry: BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(5)),
            degrade_after: 3,
        }
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: BackoffPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub const fn with_degrade_after(mut self, attempts: u32) -> Self {
        self.degrade_after = attempts;
        self
    }

    #[must_use]
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }
}

impl TryFrom<&StoreConfigFile> for StoreWriterConfig {
    type Error = ConfigError;

    fn try_from(file: &StoreConfigFile) -> Result<Self, Self::Error> {
        if file.path.trim().is_empty() {
            return Err(ConfigError::invalid("store.path", "must not be empty"));
        }
        if file.queue_capacity == 0 {
            return Err(ConfigError::invalid(
                "store.queue_capacity",
                "must be greater than zero",
            ));
        }
        if file.retry_first_ms == 0 || file.retry_max_ms < file.retry_first_ms {
            return Err(ConfigError::invalid(
                "store.retry_max_ms",
                "retry delays must satisfy 0 < retry_first_ms <= retry_max_ms",
            ));
        }
        if file.degrade_after_attempts == 0 {
            return Err(ConfigError::invalid(
                "store.degrade_after_attempts",
                "must be greater than zero",
            ));
        }
        Ok(Self::new(&file.path)
            .with_queue_capacity(file.queue_capacity)
            .with_retry(BackoffPolicy::new(
                Duration::from_millis(file.retry_first_ms),
                Duration::from_millis(file.retry_max_ms),
            ))
            .with_degrade_after(file.degrade_after_attempts))
    }
}

/// Durable-write health shared between the writer task and status reads.
#[derive(Debug, Default)]
pub struct StoreHealth {
    degraded: AtomicBool,
    failures: AtomicU64,
    dropped: AtomicU64,
}

impl StoreHealth {
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }
}

/// Queue in front of the writer task. Never blocks the caller.
#[derive(Debug, Clone)]
pub struct StoreQueue {
    tx: mpsc::Sender<ClosedRecord>,
    health: Arc<StoreHealth>,
}

impl StoreQueue {
    /// Hands a record to the writer. A full or closed queue marks the store
    /// degraded; the record is still reported to observers by the caller.
    pub fn submit(&self, record: ClosedRecord) -> bool {
        let id = record.id;
        match self.tx.try_send(record) {
            Ok(()) => true,
            Err(e) => {
                self.health.dropped.fetch_add(1, Ordering::SeqCst);
                self.health.failures.fetch_add(1, Ordering::SeqCst);
                self.health.degraded.store(true, Ordering::SeqCst);
                tracing::error!(record = %id, error = %e, "Record store queue rejected row");
                false
            }
        }
    }

    #[must_use]
    pub fn health(&self) -> &Arc<StoreHealth> {
        &self.health
    }
}

/// Serial writer: rows are appended in the order they were submitted.
/// A failing row is retried with backoff and blocks those behind it.
pub struct StoreWriter<S> {
    store: Option<S>,
    rx: mpsc::Receiver<ClosedRecord>,
    retry: BackoffPolicy,
    degrade_after: u32,
    health: Arc<StoreHealth>,
    bus: EventBus,
    shutdown_rx: broadcast::Receiver<()>,
    draining: bool,
}

impl<S: RecordStore> StoreWriter<S> {
    pub fn new(
        store: S,
        config: &StoreWriterConfig,
        bus: EventBus,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> (Self, StoreQueue) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let health = Arc::new(StoreHealth::default());
        let writer = Self {
            store: Some(store),
            rx,
            retry: config.retry,
            degrade_after: config.degrade_after.max(1),
            health: Arc::clone(&health),
            bus,
            shutdown_rx,
            draining: false,
        };
        (writer, StoreQueue { tx, health })
    }

    /// Runs until every queue handle is dropped. After shutdown is
    /// signalled each remaining row gets one final attempt.
    pub async fn run(mut self) {
        while let Some(record) = self.rx.recv().await {
            if !self.write_with_retry(record).await {
                break;
            }
        }
        tracing::debug!("Record store writer stopped");
    }

    async fn write_with_retry(&mut self, record: ClosedRecord) -> bool {
        let id = record.id;
        let mut attempt: u32 = 0;
        loop {
            let Some(store) = self.store.take() else {
                return false;
            };
            let row = record.clone();
            let joined = tokio::task::spawn_blocking(move || {
                let mut store = store;
                let result = store.append(&row);
                (store, result)
            })
            .await;

            let (store, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::error!(record = %id, error = %e, "Record store task failed");
                    self.health.degraded.store(true, Ordering::SeqCst);
                    return false;
                }
            };
            self.store = Some(store);

            match result {
                Ok(()) => {
                    if self.health.degraded.swap(false, Ordering::SeqCst) {
                        self.bus.publish(ControllerEvent::StoreRecovered);
                    }
                    return true;
                }
                Err(e) => {
                    attempt += 1;
                    self.health.failures.fetch_add(1, Ordering::SeqCst);
                    tracing::warn!(record = %id, attempt, error = %e, "Record store append failed");
                    self.note_failure(id, attempt);

                    if self.draining {
                        tracing::error!(record = %id, "Abandoning row during shutdown");
                        self.health.dropped.fetch_add(1, Ordering::SeqCst);
                        return true;
                    }
                    let delay = self.retry.next(attempt - 1);
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        _ = self.shutdown_rx.recv() => {
                            self.draining = true;
                        }
                    }
                }
            }
        }
    }

    fn note_failure(&self, id: RecordId, attempt: u32) {
        if attempt >= self.degrade_after && !self.health.degraded.swap(true, Ordering::SeqCst) {
            self.bus.publish(ControllerEvent::StoreDegraded {
                record: id,
                attempts: attempt,
            });
        }
    }
}
