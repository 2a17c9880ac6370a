//! Sensor reading types delivered by a [`SensorFeed`](super::SensorFeed).
//!
//! Readings carry the provider's timestamp in epoch milliseconds. Values are
//! passed through untouched: NaN, zero or negative readings are not filtered.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A single heart-rate tick from the optical sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeartRateTick {
    /// Beats per minute as reported by the provider
    pub bpm: f32,
    /// Epoch milliseconds when the tick was observed
    pub timestamp_ms: i64,
}

impl HeartRateTick {
    pub fn new(bpm: f32) -> Self {
        Self {
            bpm,
            timestamp_ms: Utc::now().timestamp_millis(),
        }
    }

    pub fn at(bpm: f32, timestamp_ms: i64) -> Self {
        Self { bpm, timestamp_ms }
    }
}

/// A triaxial accelerometer sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelerationSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Epoch milliseconds when the sample was observed
    pub timestamp_ms: i64,
}

impl AccelerationSample {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self::at(x, y, z, Utc::now().timestamp_millis())
    }

    pub fn at(x: f32, y: f32, z: f32, timestamp_ms: i64) -> Self {
        Self {
            x,
            y,
            z,
            timestamp_ms,
        }
    }

    /// The sample as an `[x, y, z]` vector.
    pub fn vector(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

/// Unified reading type carried on the ingestion channel.
///
/// Tagged so a recorded trace can hold one reading per JSON line:
/// `{"kind":"heart_rate","bpm":72.0,"timestamp_ms":1700000000000}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorReading {
    HeartRate(HeartRateTick),
    Acceleration(AccelerationSample),
}

impl SensorReading {
    pub fn timestamp_ms(&self) -> i64 {
        match self {
            SensorReading::HeartRate(t) => t.timestamp_ms,
            SensorReading::Acceleration(s) => s.timestamp_ms,
        }
    }
}

impl From<HeartRateTick> for SensorReading {
    fn from(tick: HeartRateTick) -> Self {
        SensorReading::HeartRate(tick)
    }
}

impl From<AccelerationSample> for SensorReading {
    fn from(sample: AccelerationSample) -> Self {
        SensorReading::Acceleration(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_json_shape() {
        let reading = SensorReading::HeartRate(HeartRateTick::at(72.0, 1_000));
        let json = serde_json::to_string(&reading).unwrap();
        assert!(json.contains("\"kind\":\"heart_rate\""));
        assert!(json.contains("\"timestamp_ms\":1000"));

        let parsed: SensorReading =
            serde_json::from_str(r#"{"kind":"acceleration","x":0.1,"y":-9.8,"z":0.0,"timestamp_ms":5}"#)
                .unwrap();
        assert_eq!(parsed.timestamp_ms(), 5);
        match parsed {
            SensorReading::Acceleration(s) => assert_eq!(s.vector(), [0.1, -9.8, 0.0]),
            other => panic!("unexpected reading {other:?}"),
        }
    }

    #[test]
    fn test_new_tick_is_timestamped_now() {
        let before = Utc::now().timestamp_millis();
        let tick = HeartRateTick::new(60.0);
        assert!(tick.timestamp_ms >= before);
    }
}
