//! HRV Sensor Agent - wearable heart-rate variability recorder.
//!
//! This library collects heart-rate and accelerometer readings, derives
//! short-term HRV metrics and a stress label, writes a timestamped record
//! at a fixed cadence and, when the session ends, hands the record to a
//! bonded companion device.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      HRV Sensor Agent                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐         │
//! │  │   Sensor    │──▶│   Ingest    │──▶│  Snapshot   │         │
//! │  │    Feed     │   │ (HRV engine)│   │    Store    │         │
//! │  └─────────────┘   └─────────────┘   └─────────────┘         │
//! │                           │                 │                │
//! │                           ▼                 ▼                │
//! │                    ┌─────────────┐   ┌─────────────┐         │
//! │                    │   Session   │   │   Durable   │         │
//! │                    │    Audit    │   │   Writer    │         │
//! │                    └─────────────┘   └─────────────┘         │
//! │                                             │ teardown       │
//! │                                             ▼                │
//! │                  ┌─────────────┐     ┌─────────────┐         │
//! │                  │ Power Lease │◀───▶│  Transfer   │──▶ peer │
//! │                  └─────────────┘     │   Engine    │         │
//! │                                      └─────────────┘         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use hrv_sensor_agent::{power::LogWakeLock, sensor::ManualFeed, transfer::TcpRadio};
//! use hrv_sensor_agent::{Agent, Config};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let config = Config::default();
//! let (feed, handle) = ManualFeed::new();
//! let radio = TcpRadio::new(config.bonded_peers.clone(), config.connect_timeout);
//!
//! let agent = Agent::start(config, Box::new(feed), Box::new(radio), Arc::new(LogWakeLock))
//!     .expect("sensors available");
//! handle.heart_rate(72.0, 1_000);
//! handle.heart_rate(71.0, 1_830);
//! handle.acceleration(0.0, 0.0, 9.8, 1_900);
//!
//! let report = agent.teardown();
//! println!("{} rows in {:?}", report.rows_written, report.record);
//! ```

pub mod agent;
pub mod audit;
pub mod config;
pub mod core;
pub mod power;
pub mod sensor;
pub mod storage;
pub mod transfer;

// Re-export key types at crate root for convenience
pub use agent::{transfer_record, Agent, AgentError, AgentState, TeardownReport};
pub use audit::{AuditStats, SessionAudit, SharedSessionAudit};
pub use config::{Config, ConfigError};
pub use core::{HrvEngine, HrvMetrics, Snapshot, SnapshotStore, StressLevel};
pub use power::{LeaseGuard, PowerLease, WakeLock};
pub use sensor::{SensorAvailability, SensorError, SensorFeed, SensorReading};
pub use storage::{DurableWriter, RecordStore, RECORD_HEADER};
pub use transfer::{
    Radio, TransferCandidate, TransferEngine, TransferError, TransferPolicy, TransferReport,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
