//! Core signal processing for the HRV sensor agent.
//!
//! This module contains:
//! - The streaming HRV engine (RR window, RMSSD, SDNN, stress label)
//! - The snapshot store shared by ingestion and writing
//! - The sample ingestor connecting the two

pub mod hrv;
pub mod ingest;
pub mod snapshot;

pub use hrv::{HrvEngine, HrvMetrics, RrSeries, StressLevel, RR_CAPACITY};
pub use ingest::SampleIngestor;
pub use snapshot::{
    create_shared_store, SharedSnapshotStore, Snapshot, SnapshotStore, SnapshotUpdate,
};
