//! The periodic durable writer.
//!
//! A named thread owns the [`RecordStore`] and writes one row per interval.
//! The wait for the next row starts only after the previous write returns,
//! so a stalled write delays the schedule instead of overlapping it.
//! Shutting the writer down hands the store back to the caller.

use crate::audit::{SessionAudit, SharedSessionAudit};
use crate::core::snapshot::{SharedSnapshotStore, SnapshotStore};
use crate::storage::record::RecordStore;
use chrono::Local;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

/// Errors from the writer thread itself (row I/O errors are logged, not raised).
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("Failed to spawn writer thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("Writer thread panicked")]
    Panicked,
}

/// Copy the current snapshot and append it to the store.
///
/// Failures are logged and counted; the caller decides whether to care.
pub fn write_snapshot(
    store: &mut RecordStore,
    snapshots: &SnapshotStore,
    audit: &SessionAudit,
) -> io::Result<u64> {
    let snapshot = snapshots.read_copy();
    let now = Local::now().time();

    tracing::debug!(
        heart_rate = ?snapshot.heart_rate,
        rmssd = ?snapshot.rmssd,
        sdnn = ?snapshot.sdnn,
        stress = ?snapshot.stress,
        acceleration = ?snapshot.acceleration,
        "Writing record row"
    );

    match store.append(&snapshot, now) {
        Ok(size) => {
            audit.record_row_written();
            tracing::debug!(path = ?store.path(), "Record file size now {size} bytes");
            Ok(size)
        }
        Err(e) => {
            audit.record_write_failure();
            tracing::error!(path = ?store.path(), "Record write failed: {e}");
            Err(e)
        }
    }
}

/// Handle on the running writer thread.
pub struct DurableWriter {
    cancel: Sender<()>,
    handle: JoinHandle<RecordStore>,
}

impl DurableWriter {
    /// Start writing a row every `interval`. The first row is written one
    /// interval after start.
    pub fn spawn(
        mut store: RecordStore,
        snapshots: SharedSnapshotStore,
        audit: SharedSessionAudit,
        interval: Duration,
    ) -> Result<Self, WriterError> {
        let (cancel, cancelled) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("record-writer".to_string())
            .spawn(move || {
                loop {
                    match cancelled.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            // Already logged and counted; the next interval still runs.
                            let _ = write_snapshot(&mut store, &snapshots, &audit);
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                store
            })
            .map_err(WriterError::Spawn)?;

        tracing::info!(interval_ms = interval.as_millis() as u64, "Durable writer armed");
        Ok(Self { cancel, handle })
    }

    /// Cancel the schedule, wait for any in-flight write, and take the store back.
    pub fn shutdown(self) -> Result<RecordStore, WriterError> {
        // A full buffer means a cancel is already pending.
        let _ = self.cancel.try_send(());
        let store = self.handle.join().map_err(|_| WriterError::Panicked)?;
        tracing::info!(rows = store.rows_written(), "Durable writer stopped");
        Ok(store)
    }
}
