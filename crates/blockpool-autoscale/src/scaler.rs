//! Block scaler — decides how many workers to add when none is idle.
//!
//! The scheduler owns the worker pool and performs the actual creation;
//! this module only answers "how many, if any".

use tracing::debug;

use blockpool_core::{ConfigError, SimulationConfig};

/// A scaling decision for the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDecision {
    /// Create this many workers as a single scale-up event.
    Grow(u32),
    /// The pool is full; wait for a busy worker to go idle.
    AtCeiling,
}

/// Block-sized, ceiling-bounded scaling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockScaler {
    ceiling: u32,
    block_size: u32,
}

impl BlockScaler {
    /// Create a scaler. Both parameters must be positive, otherwise an
    /// empty pool could never grow.
    pub fn new(ceiling: u32, block_size: u32) -> Result<Self, ConfigError> {
        if ceiling == 0 {
            return Err(ConfigError::ZeroCeiling);
        }
        if block_size == 0 {
            return Err(ConfigError::ZeroBlockSize);
        }
        Ok(Self {
            ceiling,
            block_size,
        })
    }

    pub fn from_config(config: &SimulationConfig) -> Result<Self, ConfigError> {
        Self::new(config.max_workers, config.block_size)
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Evaluate the pool at `current` workers.
    pub fn evaluate(&self, current: u32) -> ScaleDecision {
        if current >= self.ceiling {
            debug!(current, ceiling = self.ceiling, "pool at ceiling");
            return ScaleDecision::AtCeiling;
        }

        let grow = self.block_size.min(self.ceiling - current);
        debug!(
            current,
            grow,
            ceiling = self.ceiling,
            block_size = self.block_size,
            "scale-up decided"
        );
        ScaleDecision::Grow(grow)
    }
}
