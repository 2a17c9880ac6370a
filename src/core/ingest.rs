//! Sample ingestion: sensor readings into the snapshot store.

use crate::audit::SharedSessionAudit;
use crate::core::hrv::{HrvEngine, HrvMetrics};
use crate::core::snapshot::{SharedSnapshotStore, SnapshotUpdate};
use crate::sensor::types::{AccelerationSample, HeartRateTick, SensorReading};

/// Turns readings into snapshot updates.
///
/// Owned by the ingestion context; the HRV engine is never shared.
pub struct SampleIngestor {
    hrv: HrvEngine,
    snapshots: SharedSnapshotStore,
    audit: SharedSessionAudit,
}

impl SampleIngestor {
    pub fn new(snapshots: SharedSnapshotStore, audit: SharedSessionAudit) -> Self {
        Self {
            hrv: HrvEngine::new(),
            snapshots,
            audit,
        }
    }

    pub fn on_reading(&mut self, reading: SensorReading) {
        match reading {
            SensorReading::HeartRate(tick) => {
                self.on_heart_rate(tick);
            }
            SensorReading::Acceleration(sample) => self.on_acceleration(sample),
        }
    }

    /// Record a heart-rate tick and publish the updated metrics.
    pub fn on_heart_rate(&mut self, tick: HeartRateTick) -> Option<HrvMetrics> {
        self.audit.record_heart_rate_tick();

        // HRV math runs outside the snapshot lock.
        let metrics = self.hrv.on_tick(tick.timestamp_ms);
        self.snapshots
            .update(SnapshotUpdate::heart_rate(tick.bpm, metrics.as_ref()));

        if let Some(ref m) = metrics {
            tracing::trace!(
                interval_ms = m.interval_ms,
                rmssd = ?m.rmssd,
                sdnn = ?m.sdnn,
                stress = %m.stress,
                "HRV updated"
            );
        }
        metrics
    }

    pub fn on_acceleration(&mut self, sample: AccelerationSample) {
        self.audit.record_acceleration_sample();
        self.snapshots
            .update(SnapshotUpdate::acceleration(sample.vector()));
    }

    pub fn hrv(&self) -> &HrvEngine {
        &self.hrv
    }
}
