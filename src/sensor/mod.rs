//! Sensor feeds for the HRV sensor agent.
//!
//! A feed is a push-style source of heart-rate ticks and acceleration
//! samples. The agent hands it the sending half of a bounded channel on
//! registration; the feed delivers fire-and-forget and never waits on the
//! agent.

pub mod manual;
pub mod replay;
pub mod types;

pub use manual::{ManualFeed, ManualFeedHandle};
pub use replay::ReplayFeed;
pub use types::{AccelerationSample, HeartRateTick, SensorReading};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Capacity of the ingestion channel between a feed and the agent.
pub const READING_CHANNEL_CAPACITY: usize = 10_000;

/// Which sensor channels the device exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorAvailability {
    pub heart_rate: bool,
    pub accelerometer: bool,
}

impl SensorAvailability {
    pub fn all() -> Self {
        Self {
            heart_rate: true,
            accelerometer: true,
        }
    }

    /// Check the availability against what the agent requires.
    pub fn require_all(&self) -> Result<(), SensorError> {
        match (self.heart_rate, self.accelerometer) {
            (true, true) => Ok(()),
            (false, _) => Err(SensorError::Unavailable("heart rate")),
            (_, false) => Err(SensorError::Unavailable("accelerometer")),
        }
    }
}

/// Errors raised by sensor feeds.
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("Required sensor missing: {0}")]
    Unavailable(&'static str),

    #[error("Sensor feed is already registered")]
    AlreadyRegistered,

    #[error("Sensor feed failed: {0}")]
    Feed(String),
}

/// A push-style source of sensor readings.
pub trait SensorFeed: Send {
    /// Report which channels exist on this device.
    fn availability(&self) -> SensorAvailability;

    /// Begin delivering readings into `sink`.
    fn register(&mut self, sink: ReadingSink) -> Result<(), SensorError>;

    /// Stop delivering readings. Calling this on an unregistered feed is a no-op.
    fn unregister(&mut self);
}

/// Sending half of the ingestion channel, as handed to a feed.
///
/// Delivery never blocks: when the channel is full the reading is dropped
/// and counted.
#[derive(Debug, Clone)]
pub struct ReadingSink {
    sender: Sender<SensorReading>,
    dropped: Arc<AtomicU64>,
}

impl ReadingSink {
    /// Deliver a reading. Returns `false` if it was dropped.
    pub fn deliver(&self, reading: SensorReading) -> bool {
        match self.sender.try_send(reading) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Number of readings dropped because the channel was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Create the bounded ingestion channel.
pub fn reading_channel(capacity: usize) -> (ReadingSink, Receiver<SensorReading>) {
    let (sender, receiver) = bounded(capacity);
    (
        ReadingSink {
            sender,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        receiver,
    )
}
