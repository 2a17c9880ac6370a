//! Agent lifecycle: `start` and `teardown`.
//!
//! ```text
//! start:    check sensors ─▶ startup lease ─▶ arm writer ─▶ register feed ─▶ ingest thread
//! teardown: unregister feed ─▶ join ingest ─▶ join writer ─▶ final row
//!           ─▶ transfer (under lease) ─▶ release leases ─▶ save audit
//! ```
//!
//! The record file belongs to the writer thread until teardown joins it,
//! then to the transfer engine. The two never overlap.

use crate::audit::{create_shared_audit_with_persistence, SharedSessionAudit};
use crate::config::Config;
use crate::core::ingest::SampleIngestor;
use crate::core::snapshot::{create_shared_store, SharedSnapshotStore, Snapshot};
use crate::power::{PowerLease, WakeLock};
use crate::sensor::{
    reading_channel, ReadingSink, SensorError, SensorFeed, SensorReading,
    READING_CHANNEL_CAPACITY,
};
use crate::storage::{write_snapshot, DurableWriter, RecordStore, WriterError};
use crate::transfer::{
    Radio, Sleeper, ThreadSleeper, TransferEngine, TransferError, TransferPolicy, TransferReport,
};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

/// How long the ingestion thread waits before rechecking the running flag.
const INGEST_POLL: Duration = Duration::from_millis(100);

/// Errors that prevent the agent from starting.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    #[error("Writer error: {0}")]
    Writer(#[from] WriterError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// State shared by the agent's execution contexts for one session.
#[derive(Clone)]
pub struct AgentState {
    pub snapshots: SharedSnapshotStore,
    pub audit: SharedSessionAudit,
    pub lease: Arc<PowerLease>,
}

/// Outcome of a teardown.
#[derive(Debug)]
pub struct TeardownReport {
    /// The record file handed to the transfer engine
    pub record: PathBuf,
    /// Rows written during the session, including the final one
    pub rows_written: u64,
    /// Whether the forced final write succeeded
    pub final_write_ok: bool,
    /// Transfer outcome; a failure leaves the record on local storage
    pub transfer: Result<TransferReport, TransferError>,
}

/// A running agent.
pub struct Agent {
    config: Config,
    state: AgentState,
    feed: Box<dyn SensorFeed>,
    radio: Box<dyn Radio>,
    sink: ReadingSink,
    running: Arc<AtomicBool>,
    ingest: Option<JoinHandle<()>>,
    writer: Option<DurableWriter>,
}

impl Agent {
    /// Start collecting: arm the writer, register the feed and begin ingesting.
    ///
    /// Fails without starting anything if either sensor channel is missing.
    pub fn start(
        config: Config,
        mut feed: Box<dyn SensorFeed>,
        radio: Box<dyn Radio>,
        wake_lock: Arc<dyn WakeLock>,
    ) -> Result<Self, AgentError> {
        if let Err(e) = feed.availability().require_all() {
            tracing::error!("Required sensors missing: {e}");
            return Err(e.into());
        }

        let state = AgentState {
            snapshots: create_shared_store(),
            audit: create_shared_audit_with_persistence(config.audit_path()),
            lease: Arc::new(PowerLease::new(wake_lock)),
        };
        // Left to expire once the agent is running.
        state.lease.acquire(config.startup_lease);

        let writer = match std::fs::create_dir_all(&config.data_path)
            .map_err(AgentError::from)
            .and_then(|()| {
                DurableWriter::spawn(
                    RecordStore::new(config.record_path()),
                    state.snapshots.clone(),
                    state.audit.clone(),
                    config.write_interval,
                )
                .map_err(AgentError::from)
            }) {
            Ok(writer) => writer,
            Err(e) => {
                state.lease.release();
                return Err(e);
            }
        };

        let (sink, receiver) = reading_channel(READING_CHANNEL_CAPACITY);
        if let Err(e) = feed.register(sink.clone()) {
            tracing::error!("Sensor registration failed: {e}");
            let _ = writer.shutdown();
            state.lease.release();
            return Err(e.into());
        }

        let running = Arc::new(AtomicBool::new(true));
        let ingestor = SampleIngestor::new(state.snapshots.clone(), state.audit.clone());
        let ingest = match spawn_ingest(receiver, ingestor, running.clone()) {
            Ok(handle) => handle,
            Err(e) => {
                feed.unregister();
                let _ = writer.shutdown();
                state.lease.release();
                return Err(e.into());
            }
        };

        tracing::info!(record = ?config.record_path(), "Agent started");

        Ok(Self {
            config,
            state,
            feed,
            radio,
            sink,
            running,
            ingest: Some(ingest),
            writer: Some(writer),
        })
    }

    /// Copy of the most recently known state.
    pub fn snapshot(&self) -> Snapshot {
        self.state.snapshots.read_copy()
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn record_path(&self) -> PathBuf {
        self.config.record_path()
    }

    /// Stop, write the final row and hand the record off.
    pub fn teardown(self) -> TeardownReport {
        self.teardown_with(&ThreadSleeper)
    }

    /// [`teardown`](Self::teardown) with a custom sleeper for the transfer backoff.
    pub fn teardown_with(mut self, sleeper: &dyn Sleeper) -> TeardownReport {
        tracing::info!("Teardown: writing and sending record");

        self.stop_ingestion();
        self.state.audit.record_dropped_readings(self.sink.dropped());

        let mut store = match self.writer.take().map(DurableWriter::shutdown) {
            Some(Ok(store)) => store,
            Some(Err(e)) => {
                tracing::error!("Writer did not shut down cleanly: {e}");
                RecordStore::resume(self.config.record_path())
            }
            None => RecordStore::resume(self.config.record_path()),
        };

        let final_write_ok =
            write_snapshot(&mut store, &self.state.snapshots, &self.state.audit).is_ok();
        let rows_written = store.rows_written();
        let record = store.into_path();

        let transfer = transfer_record(
            &record,
            self.radio.as_ref(),
            self.config.transfer.clone(),
            &self.state.lease,
            self.config.transfer_lease,
            sleeper,
        );
        match &transfer {
            Ok(report) => self.state.audit.record_transfer_completed(report.bytes_sent),
            Err(e) => {
                self.state.audit.record_transfer_failed();
                tracing::warn!("Record left on local storage: {e}");
            }
        }

        self.state.lease.release();
        if let Err(e) = self.state.audit.save() {
            tracing::warn!("Could not save audit stats: {e}");
        }

        tracing::info!(rows = rows_written, "Teardown complete");
        TeardownReport {
            record,
            rows_written,
            final_write_ok,
            transfer,
        }
    }

    fn stop_ingestion(&mut self) {
        self.feed.unregister();
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.ingest.take() {
            if handle.join().is_err() {
                tracing::error!("Ingestion thread panicked");
            }
        }
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        // Dropped without teardown: stop the threads, skip the hand-off.
        if self.ingest.is_some() {
            self.stop_ingestion();
        }
        if let Some(writer) = self.writer.take() {
            let _ = writer.shutdown();
        }
    }
}

/// Run the transfer engine over `record` while holding the wake lease.
///
/// The lease is released on every return path.
pub fn transfer_record(
    record: &Path,
    radio: &dyn Radio,
    policy: TransferPolicy,
    lease: &PowerLease,
    lease_window: Duration,
    sleeper: &dyn Sleeper,
) -> Result<TransferReport, TransferError> {
    let _guard = lease.hold(lease_window);
    TransferEngine::new(radio, policy)
        .with_sleeper(sleeper)
        .run(record)
}

fn spawn_ingest(
    receiver: Receiver<SensorReading>,
    mut ingestor: SampleIngestor,
    running: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("sensor-ingest".to_string())
        .spawn(move || {
            while running.load(Ordering::SeqCst) {
                match receiver.recv_timeout(INGEST_POLL) {
                    Ok(reading) => ingestor.on_reading(reading),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            // Readings delivered before unregistration still count.
            for reading in receiver.try_iter() {
                ingestor.on_reading(reading);
            }
        })
}
