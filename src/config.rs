//! Configuration for the HRV sensor agent.

use crate::transfer::{TransferCandidate, TransferPolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Interval between record rows
    #[serde(with = "duration_secs")]
    pub write_interval: Duration,

    /// Directory holding the record file and audit stats
    pub data_path: PathBuf,

    /// File name of the session record inside `data_path`
    pub record_file_name: String,

    /// Wake lease taken while the agent starts up
    #[serde(with = "duration_secs")]
    pub startup_lease: Duration,

    /// Wake lease taken around the final transfer
    #[serde(with = "duration_secs")]
    pub transfer_lease: Duration,

    /// Retry and streaming policy for the hand-off
    #[serde(default)]
    pub transfer: TransferPolicy,

    /// Connect timeout for host (TCP) channels
    #[serde(with = "duration_millis", default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// Peers used by the host transport, in the order they are tried
    #[serde(default)]
    pub bonded_peers: Vec<TransferCandidate>,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hrv-sensor-agent");

        Self {
            write_interval: Duration::from_secs(10),
            data_path: data_dir,
            record_file_name: "sensor_data.csv".to_string(),
            startup_lease: Duration::from_secs(5 * 60),
            transfer_lease: Duration::from_secs(10 * 60),
            transfer: TransferPolicy::default(),
            connect_timeout: default_connect_timeout(),
            bonded_peers: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content).map_err(ConfigError::Parse)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hrv-sensor-agent")
            .join("config.json")
    }

    /// Path of the session record file.
    pub fn record_path(&self) -> PathBuf {
        self.data_path.join(&self.record_file_name)
    }

    /// Path of the persisted audit stats.
    pub fn audit_path(&self) -> PathBuf {
        self.data_path.join("audit.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)?;
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Serde support for Duration as whole seconds.
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serde support for Duration as whole milliseconds.
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.write_interval, Duration::from_secs(10));
        assert_eq!(config.startup_lease, Duration::from_secs(300));
        assert_eq!(config.transfer_lease, Duration::from_secs(600));
        assert_eq!(config.transfer.connect_attempts, 5);
        assert!(config.bonded_peers.is_empty());
        assert!(config.record_path().ends_with("sensor_data.csv"));
    }

    #[test]
    fn test_config_json_shape() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert_eq!(json["write_interval"], 10);
        assert_eq!(json["connect_timeout"], 5000);
        assert_eq!(json["transfer"]["initial_backoff"], 500);
    }

    #[test]
    fn test_optional_sections_default() {
        let json = r#"{
            "write_interval": 2,
            "data_path": "/tmp/hrv",
            "record_file_name": "session.csv",
            "startup_lease": 60,
            "transfer_lease": 120
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.write_interval, Duration::from_secs(2));
        assert_eq!(config.transfer, TransferPolicy::default());
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.record_path(), PathBuf::from("/tmp/hrv/session.csv"));
    }
}
