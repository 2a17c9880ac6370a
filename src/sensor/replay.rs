//! Replay of a recorded sensor trace.
//!
//! A trace is a JSON Lines file with one [`SensorReading`] per line. The
//! feed replays it on a background thread, sleeping between readings for
//! the gap between their timestamps divided by the speed factor.

use crate::sensor::types::SensorReading;
use crate::sensor::{ReadingSink, SensorAvailability, SensorError, SensorFeed};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Longest single pause between two replayed readings.
const MAX_REPLAY_GAP: Duration = Duration::from_secs(5);

/// Granularity at which a sleeping replay checks for unregistration.
const STOP_POLL: Duration = Duration::from_millis(50);

/// A feed that replays a recorded trace.
pub struct ReplayFeed {
    readings: Arc<Vec<SensorReading>>,
    speed: f64,
    running: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl ReplayFeed {
    /// Build a feed from already parsed readings.
    pub fn new(readings: Vec<SensorReading>, speed: f64) -> Self {
        Self {
            readings: Arc::new(readings),
            speed: if speed > 0.0 { speed } else { 1.0 },
            running: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    /// Load a JSON Lines trace. Blank lines are skipped.
    pub fn from_file(path: &Path, speed: f64) -> Result<Self, SensorError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SensorError::Feed(format!("reading trace {path:?}: {e}")))?;
        Ok(Self::new(parse_trace(&content)?, speed))
    }

    /// Number of readings in the trace.
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Whether every reading has been delivered.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Flag that flips once the trace is exhausted; stays usable after the
    /// feed has been handed to an agent.
    pub fn finished_flag(&self) -> Arc<AtomicBool> {
        self.finished.clone()
    }
}

/// Parse a JSON Lines trace into readings.
pub fn parse_trace(content: &str) -> Result<Vec<SensorReading>, SensorError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .map_err(|e| SensorError::Feed(format!("trace line {}: {e}", i + 1)))
        })
        .collect()
}

impl SensorFeed for ReplayFeed {
    fn availability(&self) -> SensorAvailability {
        SensorAvailability::all()
    }

    fn register(&mut self, sink: ReadingSink) -> Result<(), SensorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(SensorError::AlreadyRegistered);
        }
        self.running.store(true, Ordering::SeqCst);
        self.finished.store(false, Ordering::SeqCst);

        let readings = self.readings.clone();
        let running = self.running.clone();
        let finished = self.finished.clone();
        let speed = self.speed;

        let handle = thread::Builder::new()
            .name("sensor-replay".to_string())
            .spawn(move || {
                replay(&readings, speed, &sink, &running);
                finished.store(true, Ordering::SeqCst);
            })
            .map_err(|e| SensorError::Feed(format!("spawning replay thread: {e}")))?;

        self.thread_handle = Some(handle);
        tracing::info!(readings = self.readings.len(), speed, "Replay feed registered");
        Ok(())
    }

    fn unregister(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                tracing::error!("Replay thread panicked");
            }
        }
    }
}

impl Drop for ReplayFeed {
    fn drop(&mut self) {
        self.unregister();
    }
}

fn replay(readings: &[SensorReading], speed: f64, sink: &ReadingSink, running: &AtomicBool) {
    let mut previous: Option<i64> = None;

    for reading in readings {
        if let Some(prev) = previous {
            let gap_ms = (reading.timestamp_ms() - prev).max(0) as f64 / speed;
            let gap = Duration::from_secs_f64(gap_ms / 1000.0).min(MAX_REPLAY_GAP);
            if !sleep_while_running(gap, running) {
                return;
            }
        }
        if !running.load(Ordering::SeqCst) {
            return;
        }
        sink.deliver(*reading);
        previous = Some(reading.timestamp_ms());
    }
}

/// Sleep for `total`, waking early if `running` drops. Returns whether the
/// replay should continue.
fn sleep_while_running(total: Duration, running: &AtomicBool) -> bool {
    let mut remaining = total;
    while !remaining.is_zero() {
        if !running.load(Ordering::SeqCst) {
            return false;
        }
        let step = remaining.min(STOP_POLL);
        thread::sleep(step);
        remaining -= step;
    }
    running.load(Ordering::SeqCst)
}
