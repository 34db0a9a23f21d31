//! blockpool.toml configuration parser.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default worker ceiling (Y).
pub const DEFAULT_MAX_WORKERS: u32 = 5;
/// Default scale-up block size (Z).
pub const DEFAULT_BLOCK_SIZE: u32 = 2;
/// Default lower bound of the simulated job body.
pub const DEFAULT_MIN_JOB_MS: u64 = 2_000;
/// Default upper bound of the simulated job body.
pub const DEFAULT_MAX_JOB_MS: u64 = 10_000;

/// A configuration that can never make forward progress.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid configuration: max_workers must be positive")]
    ZeroCeiling,

    #[error("invalid configuration: block_size must be positive")]
    ZeroBlockSize,

    #[error("invalid configuration: min_job_ms ({min}) exceeds max_job_ms ({max})")]
    InvertedJobDuration { min: u64, max: u64 },
}

/// On-disk layout of `blockpool.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationFile {
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Parameters of one simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of jobs seeded as pending.
    pub total_jobs: u64,
    /// Maximum number of workers the pool may ever hold.
    pub max_workers: u32,
    /// Number of workers added per scale-up event.
    pub block_size: u32,
    /// Shortest simulated job body, in milliseconds.
    pub min_job_ms: u64,
    /// Longest simulated job body, in milliseconds.
    pub max_job_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            total_jobs: 0,
            max_workers: DEFAULT_MAX_WORKERS,
            block_size: DEFAULT_BLOCK_SIZE,
            min_job_ms: DEFAULT_MIN_JOB_MS,
            max_job_ms: DEFAULT_MAX_JOB_MS,
        }
    }
}

impl SimulationConfig {
    /// Read the `[simulation]` table from a TOML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: SimulationFile = toml::from_str(&content)?;
        Ok(file.simulation)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        let file = SimulationFile {
            simulation: self.clone(),
        };
        Ok(toml::to_string_pretty(&file)?)
    }

    /// Reject configurations under which the dispatch loop would stall.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::ZeroCeiling);
        }
        if self.block_size == 0 {
            return Err(ConfigError::ZeroBlockSize);
        }
        if self.min_job_ms > self.max_job_ms {
            return Err(ConfigError::InvertedJobDuration {
                min: self.min_job_ms,
                max: self.max_job_ms,
            });
        }
        Ok(())
    }

    /// Inclusive bounds of the simulated job body.
    pub fn job_duration(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.min_job_ms),
            Duration::from_millis(self.max_job_ms),
        )
    }
}
