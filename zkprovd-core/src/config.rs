//! Configuration for the zkprovd proving daemon.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::{Error, Result};

/// Top-level daemon configuration, loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub circuits: CircuitsConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub witness: WitnessConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for the RPC listener.
    #[serde(default = "DaemonConfig::default_rpc_listen")]
    pub rpc_listen: String,
    /// Bind address for the witness TCP listener.
    #[serde(default = "DaemonConfig::default_witness_listen")]
    pub witness_listen: String,
}

impl DaemonConfig {
    fn default_rpc_listen() -> String {
        "127.0.0.1:9002".to_string()
    }
    fn default_witness_listen() -> String {
        "127.0.0.1:9001".to_string()
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            rpc_listen: Self::default_rpc_listen(),
            witness_listen: Self::default_witness_listen(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CircuitsConfig {
    /// Root of the on-disk circuit catalog
    /// (`<dir>/<curve>/<name>/{*.pk,*.vk,*.r1cs}`).
    #[serde(default = "CircuitsConfig::default_dir")]
    pub dir: PathBuf,
}

impl CircuitsConfig {
    fn default_dir() -> PathBuf {
        PathBuf::from("/var/lib/zkprovd/circuits")
    }
}

impl Default for CircuitsConfig {
    fn default() -> Self {
        Self { dir: Self::default_dir() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Capacity of the ready-queue. Witness ingestion blocks once this many
    /// jobs are queued ahead of the worker — the admission-control knob.
    #[serde(default = "WorkerConfig::default_queue_capacity")]
    pub queue_capacity: usize,
}

impl WorkerConfig {
    fn default_queue_capacity() -> usize {
        10
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { queue_capacity: Self::default_queue_capacity() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// Default TTL for jobs created without an explicit one.
    #[serde(default = "JobsConfig::default_ttl_secs")]
    pub default_ttl_secs: u64,
    /// Period of the expired-job garbage collector.
    #[serde(default = "JobsConfig::default_gc_interval_secs")]
    pub gc_interval_secs: u64,
}

impl JobsConfig {
    fn default_ttl_secs() -> u64 {
        3 * 60 * 60
    }
    fn default_gc_interval_secs() -> u64 {
        2 * 60
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: Self::default_ttl_secs(),
            gc_interval_secs: Self::default_gc_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WitnessConfig {
    /// Deadline for each read on the witness socket. Bounds how long a
    /// connection may keep a job's lock held.
    #[serde(default = "WitnessConfig::default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

impl WitnessConfig {
    fn default_read_timeout_secs() -> u64 {
        30
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

impl Default for WitnessConfig {
    fn default() -> Self {
        Self { read_timeout_secs: Self::default_read_timeout_secs() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    #[serde(default)]
    pub format: Option<String>,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: Self::default_level(), format: None }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon: DaemonConfig::default(),
            circuits: CircuitsConfig::default(),
            worker: WorkerConfig::default(),
            jobs: JobsConfig::default(),
            witness: WitnessConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker.queue_capacity == 0 {
            return Err(Error::Config(
                "worker.queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
