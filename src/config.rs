//! Configuration for the irrigation monitor.

use crate::core::series::SeriesMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Interval between feed ticks
    #[serde(with = "duration_serde")]
    pub tick_interval: Duration,

    /// Labeled reference dataset used to train the classifier
    pub reference_data_path: PathBuf,

    /// Persisted classifier
    pub model_path: PathBuf,

    /// Path for storing state and activity logs
    pub data_path: PathBuf,

    /// HTTP port for `serve`
    pub port: u16,

    /// Largest CSV body `serve` accepts on upload
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Rows plotted by the metric charts
    #[serde(default)]
    pub series_mode: SeriesMode,

    /// Parcel layout, one entry per window slot
    #[serde(default = "ParcelConfig::defaults")]
    pub parcels: Vec<ParcelConfig>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("irrigation-monitor");

        Self {
            tick_interval: Duration::from_secs(6),
            reference_data_path: data_dir.join("ModelDevDataset.csv"),
            model_path: data_dir.join("rf_model.json"),
            data_path: data_dir,
            port: 8501,
            max_upload_bytes: default_max_upload_bytes(),
            series_mode: SeriesMode::default(),
            parcels: ParcelConfig::defaults(),
        }
    }
}

/// 64 MiB, several million readings.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

fn default_max_upload_bytes() -> usize {
    DEFAULT_MAX_UPLOAD_BYTES
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("irrigation-monitor")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        if let Some(parent) = self.model_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }
        Ok(())
    }

    /// Path of the persisted activity counters.
    pub fn activity_path(&self) -> PathBuf {
        self.data_path.join("activity.json")
    }

    /// Reject settings the feed cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "tick_interval must be at least 1 second".to_string(),
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_upload_bytes must be greater than zero".to_string(),
            ));
        }
        if let SeriesMode::Trailing { rows } = self.series_mode {
            if rows == 0 {
                return Err(ConfigError::Invalid(
                    "trailing series needs at least one row".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Display name and map position of a parcel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelConfig {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl ParcelConfig {
    pub fn new(name: &str, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.to_string(),
            latitude,
            longitude,
        }
    }

    /// The two monitored parcels.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("Parcel 1", 54.887360, -2.065662),
            Self::new("Parcel 2", 54.889350, -2.067652),
        ]
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration.
mod duration_serde {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tick_interval, Duration::from_secs(6));
        assert_eq!(config.series_mode, SeriesMode::Cumulative);
        assert_eq!(config.parcels.len(), 2);
        assert!(config.model_path.ends_with("rf_model.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_json_round_trip() {
        let mut config = Config::default();
        config.series_mode = SeriesMode::Trailing { rows: 10 };
        config.tick_interval = Duration::from_secs(3);

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"tick_interval\":3"));

        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.tick_interval, Duration::from_secs(3));
        assert_eq!(parsed.series_mode, SeriesMode::Trailing { rows: 10 });
        assert_eq!(parsed.parcels, ParcelConfig::defaults());
    }

    #[test]
    fn test_missing_optional_fields_use_defaults() {
        let json = r#"{
            "tick_interval": 6,
            "reference_data_path": "ref.csv",
            "model_path": "model.json",
            "data_path": ".",
            "port": 9000
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.series_mode, SeriesMode::Cumulative);
        assert_eq!(config.parcels[1].name, "Parcel 2");
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        config.tick_interval = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.series_mode = SeriesMode::Trailing { rows: 0 };
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.max_upload_bytes = 0;
        assert!(config.validate().is_err());
    }
}
