//! Session audit counters.
//!
//! Tracks what the agent did during a session (readings ingested, rows
//! written, transfers attempted) and persists cumulative totals as JSON so
//! `hrv-agent status` can report them after the session ends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for the current session.
#[derive(Debug)]
pub struct SessionAudit {
    heart_rate_ticks: AtomicU64,
    acceleration_samples: AtomicU64,
    dropped_readings: AtomicU64,
    rows_written: AtomicU64,
    write_failures: AtomicU64,
    transfers_completed: AtomicU64,
    transfers_failed: AtomicU64,
    bytes_transferred: AtomicU64,
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl SessionAudit {
    pub fn new() -> Self {
        Self {
            heart_rate_ticks: AtomicU64::new(0),
            acceleration_samples: AtomicU64::new(0),
            dropped_readings: AtomicU64::new(0),
            rows_written: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            transfers_completed: AtomicU64::new(0),
            transfers_failed: AtomicU64::new(0),
            bytes_transferred: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create an audit log that loads and saves cumulative totals at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut audit = Self::new();
        audit.persist_path = Some(path);

        if let Err(e) = audit.load() {
            tracing::warn!("Could not load previous audit stats: {e}");
        }

        audit
    }

    pub fn record_heart_rate_tick(&self) {
        self.heart_rate_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_acceleration_sample(&self) {
        self.acceleration_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_readings(&self, count: u64) {
        self.dropped_readings.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_row_written(&self) {
        self.rows_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transfer_completed(&self, bytes: u64) {
        self.transfers_completed.fetch_add(1, Ordering::Relaxed);
        self.bytes_transferred.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_transfer_failed(&self) {
        self.transfers_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> AuditStats {
        AuditStats {
            heart_rate_ticks: self.heart_rate_ticks.load(Ordering::Relaxed),
            acceleration_samples: self.acceleration_samples.load(Ordering::Relaxed),
            dropped_readings: self.dropped_readings.load(Ordering::Relaxed),
            rows_written: self.rows_written.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            transfers_completed: self.transfers_completed.load(Ordering::Relaxed),
            transfers_failed: self.transfers_failed.load(Ordering::Relaxed),
            bytes_transferred: self.bytes_transferred.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    ///
    /// Counters include totals loaded from disk; only the duration is
    /// limited to the current session.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Cumulative Statistics:\n\
             - Heart-rate ticks: {}\n\
             - Acceleration samples: {}\n\
             - Readings dropped: {}\n\
             - Rows written: {}\n\
             - Write failures: {}\n\
             - Transfers completed: {}\n\
             - Transfers failed: {}\n\
             - Bytes transferred: {}\n\
             - Current session duration: {} seconds",
            stats.heart_rate_ticks,
            stats.acceleration_samples,
            stats.dropped_readings,
            stats.rows_written,
            stats.write_failures,
            stats.transfers_completed,
            stats.transfers_failed,
            stats.bytes_transferred,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                heart_rate_ticks: stats.heart_rate_ticks,
                acceleration_samples: stats.acceleration_samples,
                dropped_readings: stats.dropped_readings,
                rows_written: stats.rows_written,
                write_failures: stats.write_failures,
                transfers_completed: stats.transfers_completed,
                transfers_failed: stats.transfers_failed,
                bytes_transferred: stats.bytes_transferred,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.heart_rate_ticks
                    .store(persisted.heart_rate_ticks, Ordering::Relaxed);
                self.acceleration_samples
                    .store(persisted.acceleration_samples, Ordering::Relaxed);
                self.dropped_readings
                    .store(persisted.dropped_readings, Ordering::Relaxed);
                self.rows_written
                    .store(persisted.rows_written, Ordering::Relaxed);
                self.write_failures
                    .store(persisted.write_failures, Ordering::Relaxed);
                self.transfers_completed
                    .store(persisted.transfers_completed, Ordering::Relaxed);
                self.transfers_failed
                    .store(persisted.transfers_failed, Ordering::Relaxed);
                self.bytes_transferred
                    .store(persisted.bytes_transferred, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for SessionAudit {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the audit counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditStats {
    pub heart_rate_ticks: u64,
    pub acceleration_samples: u64,
    pub dropped_readings: u64,
    pub rows_written: u64,
    pub write_failures: u64,
    pub transfers_completed: u64,
    pub transfers_failed: u64,
    pub bytes_transferred: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// On-disk format.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedStats {
    pub heart_rate_ticks: u64,
    pub acceleration_samples: u64,
    #[serde(default)]
    pub dropped_readings: u64,
    pub rows_written: u64,
    pub write_failures: u64,
    pub transfers_completed: u64,
    pub transfers_failed: u64,
    pub bytes_transferred: u64,
    pub last_updated: DateTime<Utc>,
}

/// Thread-safe shared audit log.
pub type SharedSessionAudit = Arc<SessionAudit>;

pub fn create_shared_audit() -> SharedSessionAudit {
    Arc::new(SessionAudit::new())
}

pub fn create_shared_audit_with_persistence(path: PathBuf) -> SharedSessionAudit {
    Arc::new(SessionAudit::with_persistence(path))
}
