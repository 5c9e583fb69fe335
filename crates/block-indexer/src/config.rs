//! Indexer scheduling and failure-handling settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,

    /// Attempts per node call before the cycle is abandoned.
    #[serde(default = "default_max_fetch_attempts")]
    pub max_fetch_attempts: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_detect_reorgs")]
    pub detect_reorgs: bool,

    #[serde(default = "default_max_reorg_depth")]
    pub max_reorg_depth: u64,

    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_poll_interval() -> u64 {
    10
}

fn default_max_fetch_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    5000
}

fn default_detect_reorgs() -> bool {
    true
}

fn default_max_reorg_depth() -> u64 {
    100
}

fn default_event_capacity() -> usize {
    1000
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval(),
            max_fetch_attempts: default_max_fetch_attempts(),
            retry_delay_ms: default_retry_delay(),
            detect_reorgs: default_detect_reorgs(),
            max_reorg_depth: default_max_reorg_depth(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl IndexerConfig {
    /// Never shorter than one second; a zero setting polls every second.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds.max(1))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_intervals() {
        let config = IndexerConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.retry_delay(), Duration::from_millis(5000));
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let config = IndexerConfig {
            poll_interval_seconds: 0,
            ..IndexerConfig::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
    }
}
