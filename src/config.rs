//! Configuration management for burst clustering
//!
//! TOML file configuration with environment variable overrides and
//! defaults for every field:
//!
//! ```toml
//! [extraction]
//! duration_filter = 1000
//!
//! [clustering]
//! algorithm = "DBSCAN"
//! parameters = { epsilon = 0.03, min_points = 10 }
//!
//! [[parameters]]
//! kind = "single_event"
//! name = "Instructions"
//! event_type = 42000050
//! apply_log = true
//!
//! [distributed]
//! ranks = 4
//! collector_address = "node01:7411"
//! ```

use crate::bursts::{ClusteringParameter, MixOperation, MixedEventsParameter, ParameterSet, TraceDataConfig};
use crate::clustering::Dbscan;
use crate::distributed::{validate_rank, ConnectPolicy};
use crate::engine::TraceClusteringBuilder;
use crate::error::{Error, Result, ValidationError};
use crate::extraction::{AssemblerConfig, CounterFixup};
use crate::types::{EventType, HWC_GROUP_CHANGE_TYPE, RUNNING_STATE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AnalysisConfig {
    /// Burst extraction settings
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Clustering backend
    #[serde(default)]
    pub clustering: ClusteringConfig,

    /// Clustering dimensions
    #[serde(default = "default_parameters")]
    pub parameters: Vec<ClusteringParameter>,

    /// Multi-rank execution
    #[serde(default)]
    pub distributed: DistributedConfig,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Burst extraction configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExtractionConfig {
    /// State value marking running computation
    #[serde(default = "default_running_state")]
    pub running_state: u32,

    /// Event type of a hardware counter group change
    #[serde(default = "default_hwc_group_change_type")]
    pub hwc_group_change_type: EventType,

    /// Counters whose values get the 32-bit overflow correction
    #[serde(default = "default_overflow_fixup_types")]
    pub overflow_fixup_types: CounterFixup,

    /// Multiplier from trace time units to durations
    #[serde(default = "default_time_factor")]
    pub time_factor: u64,

    /// Bursts shorter than this are not clustered
    #[serde(default)]
    pub duration_filter: u64,

    /// Range-normalize coordinates before clustering
    #[serde(default = "default_true")]
    pub normalize: bool,
}

/// Clustering backend configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ClusteringConfig {
    /// Registered algorithm name
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Parameters forwarded to the algorithm constructor
    #[serde(default = "default_algorithm_parameters")]
    pub parameters: BTreeMap<String, toml::Value>,
}

/// Multi-rank configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DistributedConfig {
    /// This process's rank
    #[serde(default)]
    pub rank: usize,

    /// Number of ranks
    #[serde(default = "default_ranks")]
    pub ranks: usize,

    /// Address the collector listens on
    #[serde(default = "default_collector_address")]
    pub collector_address: String,

    /// Worker connection attempts
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,

    /// Pause between connection attempts in milliseconds
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace) or an `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_running_state() -> u32 { RUNNING_STATE }
fn default_hwc_group_change_type() -> EventType { HWC_GROUP_CHANGE_TYPE }
fn default_overflow_fixup_types() -> CounterFixup { CounterFixup::legacy() }
fn default_time_factor() -> u64 { 1 }
fn default_algorithm() -> String { Dbscan::NAME.to_string() }
fn default_ranks() -> usize { 1 }
fn default_collector_address() -> String { "127.0.0.1:7411".to_string() }
fn default_connect_retries() -> u32 { 50 }
fn default_retry_interval_ms() -> u64 { 100 }
fn default_log_level() -> String { "info".to_string() }
fn default_true() -> bool { true }

fn default_algorithm_parameters() -> BTreeMap<String, toml::Value> {
    let mut parameters = BTreeMap::new();
    parameters.insert(Dbscan::EPSILON_KEY.to_string(), toml::Value::Float(0.03));
    parameters.insert(Dbscan::MIN_POINTS_KEY.to_string(), toml::Value::Integer(10));
    parameters
}

fn default_parameters() -> Vec<ClusteringParameter> {
    let mut instructions = ClusteringParameter::single("Instructions", 42_000_050);
    if let ClusteringParameter::SingleEvent(p) = &mut instructions {
        p.apply_log = true;
    }
    vec![
        instructions,
        ClusteringParameter::MixedEvents(MixedEventsParameter {
            name: "IPC".to_string(),
            event_type_a: 42_000_050,
            event_type_b: 42_000_059,
            operation: MixOperation::Divide,
            factor: 1.0,
            apply_log: false,
            range_min: None,
            range_max: None,
        }),
    ]
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            extraction: ExtractionConfig::default(),
            clustering: ClusteringConfig::default(),
            parameters: default_parameters(),
            distributed: DistributedConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            running_state: default_running_state(),
            hwc_group_change_type: default_hwc_group_change_type(),
            overflow_fixup_types: default_overflow_fixup_types(),
            time_factor: default_time_factor(),
            duration_filter: 0,
            normalize: true,
        }
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            parameters: default_algorithm_parameters(),
        }
    }
}

impl Default for DistributedConfig {
    fn default() -> Self {
        Self {
            rank: 0,
            ranks: default_ranks(),
            collector_address: default_collector_address(),
            connect_retries: default_connect_retries(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ClusteringConfig {
    /// Parameters as the string map taken by algorithm constructors
    ///
    /// Strings are passed through unquoted, other values in TOML notation.
    pub fn parameter_map(&self) -> BTreeMap<String, String> {
        self.parameters
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect()
    }
}

impl DistributedConfig {
    /// Worker connection policy
    pub fn connect_policy(&self) -> ConnectPolicy {
        ConnectPolicy {
            attempts: self.connect_retries,
            interval: Duration::from_millis(self.retry_interval_ms),
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!("Failed to parse config file {}: {}", path.display(), e))
        })
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        // Clustering
        if let Ok(epsilon) = std::env::var("BURSTS_EPSILON") {
            if let Ok(e) = epsilon.parse::<f64>() {
                self.clustering
                    .parameters
                    .insert(Dbscan::EPSILON_KEY.to_string(), toml::Value::Float(e));
            }
        }
        if let Ok(min_points) = std::env::var("BURSTS_MIN_POINTS") {
            if let Ok(m) = min_points.parse::<i64>() {
                self.clustering
                    .parameters
                    .insert(Dbscan::MIN_POINTS_KEY.to_string(), toml::Value::Integer(m));
            }
        }

        // Extraction
        if let Ok(filter) = std::env::var("BURSTS_DURATION_FILTER") {
            if let Ok(f) = filter.parse() {
                self.extraction.duration_filter = f;
            }
        }

        // Distributed
        if let Ok(rank) = std::env::var("BURSTS_RANK") {
            if let Ok(r) = rank.parse() {
                self.distributed.rank = r;
            }
        }
        if let Ok(ranks) = std::env::var("BURSTS_RANKS") {
            if let Ok(r) = ranks.parse() {
                self.distributed.ranks = r;
            }
        }
        if let Ok(address) = std::env::var("BURSTS_COLLECTOR") {
            self.distributed.collector_address = address;
        }

        // Logging
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.logging.level = log_level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.extraction.time_factor == 0 {
            return Err(ValidationError::OutOfRange {
                field: "extraction.time_factor".to_string(),
                value: "0".to_string(),
                min: "1".to_string(),
                max: u64::MAX.to_string(),
            });
        }

        if self.clustering.algorithm.trim().is_empty() {
            return Err(ValidationError::MissingField("clustering.algorithm".to_string()));
        }

        if self.parameters.is_empty() {
            return Err(ValidationError::MissingField("parameters".to_string()));
        }
        ParameterSet::new(self.parameters.clone())?;

        validate_rank(self.distributed.rank, self.distributed.ranks)?;
        if self.distributed.ranks > 1 && self.distributed.collector_address.trim().is_empty() {
            return Err(ValidationError::MissingField(
                "distributed.collector_address".to_string(),
            ));
        }

        Ok(())
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents).map_err(|e| {
            Error::Configuration(format!("Failed to write config file {}: {}", path.display(), e))
        })
    }

    /// Extraction settings for the assembler
    pub fn assembler_config(&self) -> AssemblerConfig {
        AssemblerConfig {
            running_state: self.extraction.running_state,
            hwc_group_change_type: self.extraction.hwc_group_change_type,
            time_factor: self.extraction.time_factor,
            fixup: self.extraction.overflow_fixup_types.clone(),
        }
    }

    /// Burst store settings
    pub fn trace_data_config(&self) -> TraceDataConfig {
        TraceDataConfig {
            duration_filter: self.extraction.duration_filter,
            normalize: self.extraction.normalize,
            rank: self.distributed.rank,
            ranks: self.distributed.ranks,
        }
    }

    /// Pipeline builder carrying every setting of this configuration
    pub fn builder(&self) -> TraceClusteringBuilder {
        TraceClusteringBuilder::new()
            .with_parameters(self.parameters.clone())
            .with_assembler_config(self.assembler_config())
            .with_trace_data_config(self.trace_data_config())
            .with_algorithm(self.clustering.algorithm.clone(), self.clustering.parameter_map())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AnalysisConfig::default();
        assert_eq!(config.clustering.algorithm, "DBSCAN");
        assert_eq!(config.parameters.len(), 2);
        assert_eq!(config.distributed.ranks, 1);
        assert!(config.extraction.normalize);
    }

    #[test]
    fn test_config_validation() {
        assert!(AnalysisConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_rank() {
        let mut config = AnalysisConfig::default();
        config.distributed.rank = 3;
        config.distributed.ranks = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_parameter_names() {
        let mut config = AnalysisConfig::default();
        config.parameters.push(ClusteringParameter::single("IPC", 1));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parameter_map_stringifies_values() {
        let config = AnalysisConfig::default();
        let map = config.clustering.parameter_map();
        assert_eq!(map.get("epsilon").map(String::as_str), Some("0.03"));
        assert_eq!(map.get("min_points").map(String::as_str), Some("10"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AnalysisConfig = toml::from_str(
            r#"
            [extraction]
            duration_filter = 500

            [clustering]
            parameters = { epsilon = 0.5, min_points = 4 }

            [[parameters]]
            kind = "single_event"
            name = "Cycles"
            event_type = 42000059
            "#,
        )
        .unwrap();

        assert_eq!(config.extraction.duration_filter, 500);
        assert_eq!(config.extraction.time_factor, 1);
        assert_eq!(config.parameters.len(), 1);
        assert_eq!(config.clustering.algorithm, "DBSCAN");
        assert_eq!(config.logging.level, "info");
        assert!(config.builder().build().is_ok());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("analysis.toml");

        let mut config = AnalysisConfig::default();
        config.distributed.ranks = 4;
        config.extraction.overflow_fixup_types = CounterFixup::new([7, 9]);
        config.save_to_file(&path).unwrap();

        let loaded = AnalysisConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            AnalysisConfig::from_file("/nonexistent/analysis.toml"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("BURSTS_RANKS", "8");
        std::env::set_var("BURSTS_EPSILON", "0.25");
        let config = AnalysisConfig::from_env();
        assert_eq!(config.distributed.ranks, 8);
        assert_eq!(
            config.clustering.parameter_map().get("epsilon").map(String::as_str),
            Some("0.25")
        );
        std::env::remove_var("BURSTS_RANKS");
        std::env::remove_var("BURSTS_EPSILON");
    }
}
