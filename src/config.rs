//! Configuration system for simulations.
//!
//! This module provides YAML/JSON configuration file support for describing
//! a simulation declaratively: logging and seeding, the connection clock
//! and buffering, cache geometry and the traffic scenario.
//!
//! # Configuration File Structure
//!
//! ```yaml
//! simulation:
//!   log_level: info
//!   seed: 42
//!
//! connection:
//!   freq_period: 1
//!   end_capacity: 1
//!
//! cache:
//!   num_req_per_cycle: 4
//!   log2_block_size: 6
//!   num_sets: 16
//!   way_associativity: 4
//!   num_banks: 2
//!   bank_latency: 10
//!
//! traffic:
//!   num_agents: 10
//!   msgs_per_agent: 1000
//!   port_capacity: 4
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::freq::Freq;
use crate::types::SimTime;

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

/// Global simulation parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seed for every random choice made while building traffic
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Stop processing events after this time (None = run until idle)
    #[serde(default)]
    pub max_time: Option<SimTime>,

    /// Whether to collect detailed statistics
    #[serde(default)]
    pub collect_stats: bool,

    /// Output directory for results
    #[serde(default)]
    pub output_dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_seed() -> u64 {
    42
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            seed: default_seed(),
            max_time: None,
            collect_stats: false,
            output_dir: None,
        }
    }
}

/// Parameters of direct connections.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Clock period of the connection
    #[serde(default = "default_period")]
    pub freq_period: SimTime,

    /// Pending sends each plugged-in port may have on the connection
    #[serde(default = "default_end_capacity")]
    pub end_capacity: usize,
}

fn default_period() -> SimTime {
    1
}

fn default_end_capacity() -> usize {
    1
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            freq_period: default_period(),
            end_capacity: default_end_capacity(),
        }
    }
}

impl ConnectionConfig {
    pub fn freq(&self) -> Freq {
        Freq::new(self.freq_period)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.freq_period == 0 {
            return Err(invalid("connection freq_period must be positive"));
        }
        if self.end_capacity == 0 {
            return Err(invalid("connection end_capacity must be positive"));
        }
        Ok(())
    }
}

/// Geometry and timing of a write-around cache.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Clock period of the cache
    #[serde(default = "default_period")]
    pub freq_period: SimTime,

    /// Issue width of the coalesce, bottom-parse and respond stages
    #[serde(default = "default_num_req_per_cycle")]
    pub num_req_per_cycle: usize,

    /// log2 of the cache line size in bytes
    #[serde(default = "default_log2_block_size")]
    pub log2_block_size: u32,

    #[serde(default = "default_num_sets")]
    pub num_sets: usize,

    #[serde(default = "default_way_associativity")]
    pub way_associativity: usize,

    #[serde(default = "default_num_banks")]
    pub num_banks: usize,

    /// Cycles a bank needs for one access
    #[serde(default = "default_bank_latency")]
    pub bank_latency: u64,

    /// Outstanding misses tracked at once
    #[serde(default = "default_num_mshr_entry")]
    pub num_mshr_entry: usize,

    /// Transactions in flight before the coalescer stalls
    #[serde(default = "default_max_num_concurrent_trans")]
    pub max_num_concurrent_trans: usize,

    #[serde(default = "default_buffer_size")]
    pub dir_buffer_size: usize,

    #[serde(default = "default_buffer_size")]
    pub bank_buffer_size: usize,

    /// Incoming buffer of the top, bottom and control ports
    #[serde(default = "default_buffer_size")]
    pub port_capacity: usize,
}

fn default_num_req_per_cycle() -> usize {
    4
}

fn default_log2_block_size() -> u32 {
    6
}

fn default_num_sets() -> usize {
    16
}

fn default_way_associativity() -> usize {
    4
}

fn default_num_banks() -> usize {
    1
}

fn default_bank_latency() -> u64 {
    10
}

fn default_num_mshr_entry() -> usize {
    16
}

fn default_max_num_concurrent_trans() -> usize {
    16
}

fn default_buffer_size() -> usize {
    4
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freq_period: default_period(),
            num_req_per_cycle: default_num_req_per_cycle(),
            log2_block_size: default_log2_block_size(),
            num_sets: default_num_sets(),
            way_associativity: default_way_associativity(),
            num_banks: default_num_banks(),
            bank_latency: default_bank_latency(),
            num_mshr_entry: default_num_mshr_entry(),
            max_num_concurrent_trans: default_max_num_concurrent_trans(),
            dir_buffer_size: default_buffer_size(),
            bank_buffer_size: default_buffer_size(),
            port_capacity: default_buffer_size(),
        }
    }
}

impl CacheConfig {
    pub fn freq(&self) -> Freq {
        Freq::new(self.freq_period)
    }

    /// Cache line size in bytes.
    pub fn block_size(&self) -> u64 {
        1 << self.log2_block_size
    }

    /// Total data capacity in bytes.
    pub fn total_byte_size(&self) -> u64 {
        self.block_size() * (self.num_sets * self.way_associativity) as u64
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let positive = [
            ("freq_period", self.freq_period as usize),
            ("num_req_per_cycle", self.num_req_per_cycle),
            ("num_sets", self.num_sets),
            ("way_associativity", self.way_associativity),
            ("num_banks", self.num_banks),
            ("num_mshr_entry", self.num_mshr_entry),
            ("max_num_concurrent_trans", self.max_num_concurrent_trans),
            ("dir_buffer_size", self.dir_buffer_size),
            ("bank_buffer_size", self.bank_buffer_size),
            ("port_capacity", self.port_capacity),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(invalid(format!("cache {name} must be positive")));
            }
        }

        if self.log2_block_size > 16 {
            return Err(invalid(format!(
                "cache log2_block_size {} is larger than 16",
                self.log2_block_size
            )));
        }

        if self.max_num_concurrent_trans < self.num_mshr_entry {
            tracing::warn!(
                "cache max_num_concurrent_trans ({}) is below num_mshr_entry ({}); some MSHR entries can never be used",
                self.max_num_concurrent_trans,
                self.num_mshr_entry
            );
        }
        Ok(())
    }
}

/// Parameters of the all-to-all traffic scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrafficConfig {
    #[serde(default = "default_num_agents")]
    pub num_agents: usize,

    #[serde(default = "default_msgs_per_agent")]
    pub msgs_per_agent: usize,

    /// Incoming buffer of each agent port
    #[serde(default = "default_buffer_size")]
    pub port_capacity: usize,

    /// Clock period of the agents
    #[serde(default = "default_period")]
    pub freq_period: SimTime,
}

fn default_num_agents() -> usize {
    10
}

fn default_msgs_per_agent() -> usize {
    1000
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            num_agents: default_num_agents(),
            msgs_per_agent: default_msgs_per_agent(),
            port_capacity: default_buffer_size(),
            freq_period: default_period(),
        }
    }
}

impl TrafficConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.num_agents < 2 {
            return Err(invalid(format!(
                "traffic needs at least 2 agents, got {}",
                self.num_agents
            )));
        }
        if self.port_capacity == 0 {
            return Err(invalid("traffic port_capacity must be positive"));
        }
        if self.freq_period == 0 {
            return Err(invalid("traffic freq_period must be positive"));
        }
        Ok(())
    }
}

/// Complete simulation configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimConfig {
    /// Global simulation parameters
    #[serde(default)]
    pub simulation: SimulationParams,

    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub traffic: TrafficConfig,
}

impl SimConfig {
    /// Creates a configuration with every default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: SimConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Loads configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, auto-detecting format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.simulation.log_level.to_lowercase().as_str()) {
            return Err(invalid(format!(
                "unknown log level: {}",
                self.simulation.log_level
            )));
        }

        self.connection.validate()?;
        self.cache.validate()?;
        self.traffic.validate()?;
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Saves configuration to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Converts to YAML string.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Converts to JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builder for creating SimConfig programmatically.
#[derive(Default)]
pub struct SimConfigBuilder {
    config: SimConfig,
}

impl SimConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.simulation.log_level = level.into();
        self
    }

    /// Sets the random seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.simulation.seed = seed;
        self
    }

    /// Caps the simulated time.
    pub fn max_time(mut self, time: SimTime) -> Self {
        self.config.simulation.max_time = Some(time);
        self
    }

    /// Enables statistics collection.
    pub fn collect_stats(mut self, enable: bool) -> Self {
        self.config.simulation.collect_stats = enable;
        self
    }

    /// Sets the per-port End capacity of connections.
    pub fn end_capacity(mut self, capacity: usize) -> Self {
        self.config.connection.end_capacity = capacity;
        self
    }

    /// Sets the connection clock period.
    pub fn connection_period(mut self, period: SimTime) -> Self {
        self.config.connection.freq_period = period;
        self
    }

    /// Replaces the cache configuration.
    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.config.cache = cache;
        self
    }

    /// Sets the number of traffic agents.
    pub fn num_agents(mut self, n: usize) -> Self {
        self.config.traffic.num_agents = n;
        self
    }

    /// Sets the messages each agent sends.
    pub fn msgs_per_agent(mut self, n: usize) -> Self {
        self.config.traffic.msgs_per_agent = n;
        self
    }

    /// Sets the incoming buffer of each agent port.
    pub fn port_capacity(mut self, capacity: usize) -> Self {
        self.config.traffic.port_capacity = capacity;
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> ConfigResult<SimConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimConfig::new();
        assert_eq!(config.simulation.seed, 42);
        assert_eq!(config.connection.end_capacity, 1);
        assert_eq!(config.traffic.num_agents, 10);
        assert_eq!(config.traffic.port_capacity, 4);
        assert_eq!(config.cache.block_size(), 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
simulation:
  log_level: debug
  seed: 7

connection:
  end_capacity: 2

cache:
  num_sets: 8
  way_associativity: 2
  num_banks: 2

traffic:
  num_agents: 4
  msgs_per_agent: 10
"#;

        let config = SimConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.simulation.log_level, "debug");
        assert_eq!(config.simulation.seed, 7);
        assert_eq!(config.connection.end_capacity, 2);
        assert_eq!(config.cache.num_banks, 2);
        assert_eq!(config.cache.total_byte_size(), 8 * 2 * 64);
        // Untouched fields keep their defaults.
        assert_eq!(config.cache.bank_latency, 10);
        assert_eq!(config.traffic.msgs_per_agent, 10);
    }

    #[test]
    fn test_json_parsing() {
        let json = r#"{
            "simulation": {"seed": 3},
            "traffic": {"num_agents": 2, "msgs_per_agent": 5}
        }"#;

        let config = SimConfig::from_json(json).unwrap();
        assert_eq!(config.simulation.seed, 3);
        assert_eq!(config.traffic.num_agents, 2);
    }

    #[test]
    fn test_builder() {
        let config = SimConfigBuilder::new()
            .seed(11)
            .max_time(5000)
            .end_capacity(1)
            .num_agents(10)
            .msgs_per_agent(1000)
            .port_capacity(4)
            .build()
            .unwrap();

        assert_eq!(config.simulation.max_time, Some(5000));
        assert_eq!(config.connection.freq().period(), 1);
        assert_eq!(config.traffic.num_agents, 10);
    }

    #[test]
    fn test_validation_rejects_single_agent() {
        let result = SimConfigBuilder::new().num_agents(1).build();
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validation_rejects_zero_capacity() {
        let yaml = r#"
connection:
  end_capacity: 0
"#;
        assert!(SimConfig::from_yaml(yaml).is_err());

        let cache = CacheConfig {
            num_mshr_entry: 0,
            ..CacheConfig::default()
        };
        let err = cache.validate().unwrap_err();
        assert!(err.to_string().contains("num_mshr_entry"));
    }

    #[test]
    fn test_validation_rejects_unknown_log_level() {
        let result = SimConfigBuilder::new().log_level("loud").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_extension() {
        let result = SimConfig::from_file("sim.toml");
        assert!(matches!(result, Err(ConfigError::UnknownFormat(ext)) if ext == "toml"));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = SimConfigBuilder::new().seed(99).num_agents(3).build().unwrap();

        let yaml = config.to_yaml().unwrap();
        let restored = SimConfig::from_yaml(&yaml).unwrap();

        assert_eq!(restored.simulation.seed, 99);
        assert_eq!(restored.traffic.num_agents, 3);
    }
}
