//! A feed driven by the embedding process.
//!
//! Useful when the host already receives sensor callbacks from its own
//! platform layer, and in tests.

use crate::sensor::types::{AccelerationSample, HeartRateTick, SensorReading};
use crate::sensor::{ReadingSink, SensorAvailability, SensorError, SensorFeed};
use std::sync::{Arc, Mutex, PoisonError};

/// A feed whose readings are pushed through a [`ManualFeedHandle`].
pub struct ManualFeed {
    availability: SensorAvailability,
    sink: Arc<Mutex<Option<ReadingSink>>>,
}

/// Cloneable handle used to push readings into a registered [`ManualFeed`].
#[derive(Clone)]
pub struct ManualFeedHandle {
    sink: Arc<Mutex<Option<ReadingSink>>>,
}

impl ManualFeed {
    /// Create a feed exposing both sensor channels.
    pub fn new() -> (Self, ManualFeedHandle) {
        Self::with_availability(SensorAvailability::all())
    }

    /// Create a feed reporting the given availability.
    pub fn with_availability(availability: SensorAvailability) -> (Self, ManualFeedHandle) {
        let sink = Arc::new(Mutex::new(None));
        let handle = ManualFeedHandle { sink: sink.clone() };
        (Self { availability, sink }, handle)
    }
}

impl SensorFeed for ManualFeed {
    fn availability(&self) -> SensorAvailability {
        self.availability
    }

    fn register(&mut self, sink: ReadingSink) -> Result<(), SensorError> {
        let mut slot = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(SensorError::AlreadyRegistered);
        }
        *slot = Some(sink);
        Ok(())
    }

    fn unregister(&mut self) {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl ManualFeedHandle {
    /// Push a reading. Returns `false` when the feed is not registered or the
    /// reading was dropped.
    pub fn push(&self, reading: impl Into<SensorReading>) -> bool {
        let slot = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(sink) => sink.deliver(reading.into()),
            None => false,
        }
    }

    pub fn heart_rate(&self, bpm: f32, timestamp_ms: i64) -> bool {
        self.push(HeartRateTick::at(bpm, timestamp_ms))
    }

    pub fn acceleration(&self, x: f32, y: f32, z: f32, timestamp_ms: i64) -> bool {
        self.push(AccelerationSample::at(x, y, z, timestamp_ms))
    }

    /// Whether the feed is currently registered with an agent.
    pub fn is_registered(&self) -> bool {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
