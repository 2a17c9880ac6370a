//! The most recently known sensor and HRV state.
//!
//! The ingestion context replaces fields and the writer context copies the
//! whole record out. Both go through one mutex held only for the
//! field replace or the copy; no I/O happens under it.

use crate::core::hrv::{HrvMetrics, StressLevel};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

/// Most recently known state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub heart_rate: Option<f32>,
    pub rmssd: Option<f64>,
    pub sdnn: Option<f64>,
    /// `None` until the first interval is seen; rendered as `null`
    pub stress: Option<StressLevel>,
    pub acceleration: [f32; 3],
}

/// A partial update: only the `Some` fields replace stored values.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SnapshotUpdate {
    pub heart_rate: Option<f32>,
    pub rmssd: Option<f64>,
    pub sdnn: Option<f64>,
    pub stress: Option<StressLevel>,
    pub acceleration: Option<[f32; 3]>,
}

impl SnapshotUpdate {
    /// Update for a heart-rate tick, with HRV fields when an interval was produced.
    pub fn heart_rate(bpm: f32, metrics: Option<&HrvMetrics>) -> Self {
        Self {
            heart_rate: Some(bpm),
            rmssd: metrics.and_then(|m| m.rmssd),
            sdnn: metrics.and_then(|m| m.sdnn),
            stress: metrics.map(|m| m.stress),
            acceleration: None,
        }
    }

    pub fn acceleration(vector: [f32; 3]) -> Self {
        Self {
            acceleration: Some(vector),
            ..Self::default()
        }
    }
}

impl Snapshot {
    fn apply(&mut self, update: SnapshotUpdate) {
        if let Some(hr) = update.heart_rate {
            self.heart_rate = Some(hr);
        }
        if let Some(rmssd) = update.rmssd {
            self.rmssd = Some(rmssd);
        }
        if let Some(sdnn) = update.sdnn {
            self.sdnn = Some(sdnn);
        }
        if let Some(stress) = update.stress {
            self.stress = Some(stress);
        }
        if let Some(accel) = update.acceleration {
            self.acceleration = accel;
        }
    }
}

/// Lock-protected holder of the current [`Snapshot`].
#[derive(Debug, Default)]
pub struct SnapshotStore {
    inner: Mutex<Snapshot>,
}

/// Snapshot store shared between ingestion and writing.
pub type SharedSnapshotStore = Arc<SnapshotStore>;

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whichever fields the update carries.
    pub fn update(&self, update: SnapshotUpdate) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(update);
    }

    /// Copy out the current state.
    pub fn read_copy(&self) -> Snapshot {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create a new shared snapshot store.
pub fn create_shared_store() -> SharedSnapshotStore {
    Arc::new(SnapshotStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_defaults() {
        let snapshot = SnapshotStore::new().read_copy();
        assert_eq!(snapshot.heart_rate, None);
        assert_eq!(snapshot.stress, None);
        assert_eq!(snapshot.acceleration, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let store = SnapshotStore::new();
        store.update(SnapshotUpdate::acceleration([1.0, 2.0, 3.0]));
        store.update(SnapshotUpdate::heart_rate(64.0, None));

        let snapshot = store.read_copy();
        assert_eq!(snapshot.heart_rate, Some(64.0));
        assert_eq!(snapshot.acceleration, [1.0, 2.0, 3.0]);
        assert_eq!(snapshot.rmssd, None);
    }

    #[test]
    fn test_heart_rate_update_with_metrics() {
        let store = SnapshotStore::new();
        let metrics = HrvMetrics {
            interval_ms: 800,
            rmssd: Some(42.0),
            sdnn: Some(12.5),
            stress: StressLevel::Moderate,
        };
        store.update(SnapshotUpdate::heart_rate(75.0, Some(&metrics)));

        let snapshot = store.read_copy();
        assert_eq!(snapshot.rmssd, Some(42.0));
        assert_eq!(snapshot.sdnn, Some(12.5));
        assert_eq!(snapshot.stress, Some(StressLevel::Moderate));
    }

    #[test]
    fn test_reads_never_see_torn_vectors() {
        let store = create_shared_store();
        let writer = {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..2_000 {
                    let v = i as f32;
                    store.update(SnapshotUpdate::acceleration([v, v, v]));
                }
            })
        };
        for _ in 0..2_000 {
            let [x, y, z] = store.read_copy().acceleration;
            assert!(x == y && y == z);
        }
        writer.join().unwrap();
    }
}
