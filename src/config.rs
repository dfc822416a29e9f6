use crate::types::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Totally-ordered log level: `CRITICAL = FATAL > ERROR > WARN = WARNING
/// > INFO > DEBUG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    #[serde(alias = "WARNING")]
    Warn,
    Error,
    #[serde(alias = "FATAL")]
    Critical,
}

impl LogLevel {
    /// Maps to the `tracing` filter directive used by the driver binary.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Critical => "error",
        }
    }
}

/// Coarse quantizer configuration, as consumed from a driver config file.
#[derive(Debug, Clone, Deserialize)]
pub struct CoarseConfig {
    pub number_centroids: usize,
    pub max_iterations: usize,
    pub seed: u64,
}

/// Product quantizer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PqConfig {
    pub number_subquantizers: usize,
    pub number_centroids: usize,
    pub max_iterations: usize,
    pub seed: u64,
}

/// IVFADC engine operational configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IvfadcConfig {
    /// Number of coarse cells probed per query (`w`).
    pub coarse_neighbors_lookup: usize,
    /// Number of neighbors returned per query (`k`).
    pub nearest_neighbors: usize,
}

/// Dataset file paths consumed by the driver.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetsConfig {
    pub train_set: String,
    pub base_set: String,
    pub query_set: String,
    pub ground_truth: String,
}

/// Top-level driver configuration, loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub coarse: CoarseConfig,
    pub pq: PqConfig,
    pub ivfadc: IvfadcConfig,
    pub datasets: DatasetsConfig,
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
    pub recall_rs: Vec<usize>,
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

impl Config {
    /// Loads and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&text)
            .map_err(|e| Error::invalid_argument(format!("Invalid configuration: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.ivfadc.nearest_neighbors < 1 {
            return Err(Error::invalid_argument("ivfadc.nearest_neighbors must be at least 1."));
        }

        if self.ivfadc.coarse_neighbors_lookup < 1 {
            return Err(Error::invalid_argument(
                "ivfadc.coarse_neighbors_lookup must be at least 1.",
            ));
        }

        for &r in &self.recall_rs {
            if r > self.ivfadc.nearest_neighbors {
                return Err(Error::invalid_argument(format!(
                    "recall_rs entry {r} exceeds nearest_neighbors ({}).",
                    self.ivfadc.nearest_neighbors
                )));
            }
        }

        Ok(())
    }
}
