//! Access log sink
//!
//! Request records are handed to a bounded queue and written by a dedicated
//! task. Producers never wait: when the queue is full (or the writer is gone)
//! the record is dropped and counted.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// One completed request
#[derive(Debug, Clone, PartialEq)]
pub struct AccessRecord {
    pub correlation_id: String,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub elapsed_ms: u64,
    pub bytes: u64,
    pub remote_addr: Option<SocketAddr>,
}

impl AccessRecord {
    /// Emit as a structured log event. Severity follows the status class.
    pub fn emit(&self) {
        let remote = self
            .remote_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "-".to_string());

        match self.status {
            500..=599 => error!(
                correlation_id = %self.correlation_id,
                method = %self.method,
                path = %self.path,
                status = self.status,
                elapsed_ms = self.elapsed_ms,
                bytes = self.bytes,
                remote_addr = %remote,
                "request failed"
            ),
            400..=499 => warn!(
                correlation_id = %self.correlation_id,
                method = %self.method,
                path = %self.path,
                status = self.status,
                elapsed_ms = self.elapsed_ms,
                bytes = self.bytes,
                remote_addr = %remote,
                "request rejected"
            ),
            _ => debug!(
                correlation_id = %self.correlation_id,
                method = %self.method,
                path = %self.path,
                status = self.status,
                elapsed_ms = self.elapsed_ms,
                bytes = self.bytes,
                remote_addr = %remote,
                "request completed"
            ),
        }
    }
}

/// Cloneable handle to the access log queue
#[derive(Clone, Debug)]
pub struct AccessLog {
    tx: mpsc::Sender<AccessRecord>,
    dropped: Arc<AtomicU64>,
}

impl AccessLog {
    /// Create a handle and the receiving end of its queue
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AccessRecord>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Create a handle whose records are written by a spawned task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(capacity: usize) -> (Self, JoinHandle<()>) {
        let (log, rx) = Self::channel(capacity);
        let writer = tokio::spawn(run_writer(rx));
        (log, writer)
    }

    /// Queue a record without waiting
    pub fn record(&self, record: AccessRecord) {
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Number of records dropped so far
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Drain the queue until every handle is gone
pub async fn run_writer(mut rx: mpsc::Receiver<AccessRecord>) {
    while let Some(record) = rx.recv().await {
        record.emit();
    }
}
