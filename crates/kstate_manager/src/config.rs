//! Checkpoint configuration.

use serde::{Deserialize, Serialize};

/// Default events between checkpoint saves
pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 15_000;

/// Checkpointing configuration for one trace manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Events between checkpoint saves; 0 disables periodic checkpoints
    pub interval: u64,
}

impl CheckpointConfig {
    /// Create a config with the default interval
    #[must_use]
    pub fn new() -> Self {
        Self {
            interval: DEFAULT_CHECKPOINT_INTERVAL,
        }
    }

    /// Set the checkpoint interval (tests use much smaller values)
    #[must_use]
    pub fn with_interval(mut self, interval: u64) -> Self {
        self.interval = interval;
        self
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_interval() {
        let config = CheckpointConfig::default();
        assert_eq!(config.interval, 15_000);
    }

    #[test]
    fn test_with_interval() {
        let config = CheckpointConfig::new().with_interval(1_000);
        assert_eq!(config.interval, 1_000);
    }
}
