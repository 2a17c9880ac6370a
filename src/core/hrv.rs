//! Heart-rate variability from heart-rate tick timing.
//!
//! Every heart-rate tick after the first yields one inter-beat (RR)
//! interval: the gap since the previous tick. Intervals are kept in a
//! bounded FIFO window; RMSSD, SDNN and the stress label are recomputed
//! over the whole window after each append.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::VecDeque;
use std::fmt;

/// Maximum number of RR intervals kept in the window.
pub const RR_CAPACITY: usize = 300;

/// RMSSD strictly above this is low stress (ms).
const LOW_STRESS_RMSSD: f64 = 50.0;

/// RMSSD at or above this (and at or below [`LOW_STRESS_RMSSD`]) is moderate stress (ms).
const MODERATE_STRESS_RMSSD: f64 = 30.0;

/// Bounded, insertion-ordered window of RR intervals in milliseconds.
#[derive(Debug, Clone)]
pub struct RrSeries {
    intervals: VecDeque<i64>,
    capacity: usize,
}

impl RrSeries {
    pub fn new() -> Self {
        Self::with_capacity(RR_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            intervals: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an interval, evicting the oldest once over capacity.
    pub fn push(&mut self, interval_ms: i64) {
        self.intervals.push_back(interval_ms);
        if self.intervals.len() > self.capacity {
            self.intervals.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        self.intervals.iter().copied()
    }

    /// Root mean square of successive differences.
    ///
    /// `None` until the window holds at least two intervals.
    pub fn rmssd(&self) -> Option<f64> {
        if self.intervals.len() < 2 {
            return None;
        }
        let diffs: Vec<f64> = self
            .intervals
            .iter()
            .zip(self.intervals.iter().skip(1))
            .map(|(a, b)| (b - a) as f64)
            .collect();
        Some(diffs.quadratic_mean())
    }

    /// Population standard deviation of the intervals.
    ///
    /// `None` for an empty window, `0.0` for a single interval.
    pub fn sdnn(&self) -> Option<f64> {
        if self.intervals.is_empty() {
            return None;
        }
        Some(self.intervals.iter().map(|&v| v as f64).population_std_dev())
    }
}

impl Default for RrSeries {
    fn default() -> Self {
        Self::new()
    }
}

/// Stress classification derived from RMSSD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StressLevel {
    #[serde(rename = "Low Stress")]
    Low,
    #[serde(rename = "Moderate Stress")]
    Moderate,
    #[serde(rename = "High Stress")]
    High,
}

impl StressLevel {
    /// Classify an RMSSD value. An undefined RMSSD counts as high stress.
    pub fn from_rmssd(rmssd: Option<f64>) -> Self {
        match rmssd {
            Some(v) if v > LOW_STRESS_RMSSD => StressLevel::Low,
            Some(v) if (MODERATE_STRESS_RMSSD..=LOW_STRESS_RMSSD).contains(&v) => {
                StressLevel::Moderate
            }
            _ => StressLevel::High,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StressLevel::Low => "Low Stress",
            StressLevel::Moderate => "Moderate Stress",
            StressLevel::High => "High Stress",
        }
    }
}

impl fmt::Display for StressLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Metrics recomputed after an interval was appended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HrvMetrics {
    /// The interval that was just appended (ms)
    pub interval_ms: i64,
    pub rmssd: Option<f64>,
    pub sdnn: Option<f64>,
    pub stress: StressLevel,
}

/// Streaming HRV computation over heart-rate tick timestamps.
#[derive(Debug, Default)]
pub struct HrvEngine {
    series: RrSeries,
    previous_tick_ms: Option<i64>,
}

impl HrvEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a heart-rate tick.
    ///
    /// The first tick only primes the engine and returns `None`. Every later
    /// tick appends the gap since the previous one and returns the updated
    /// metrics.
    pub fn on_tick(&mut self, timestamp_ms: i64) -> Option<HrvMetrics> {
        let previous = self.previous_tick_ms.replace(timestamp_ms)?;
        let interval_ms = timestamp_ms - previous;
        self.series.push(interval_ms);

        let rmssd = self.series.rmssd();
        Some(HrvMetrics {
            interval_ms,
            rmssd,
            sdnn: self.series.sdnn(),
            stress: StressLevel::from_rmssd(rmssd),
        })
    }

    pub fn series(&self) -> &RrSeries {
        &self.series
    }
}
