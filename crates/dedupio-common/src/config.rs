//! Configuration types for the dedup engine
//!
//! A [`DeviceConfig`] is constructed once at startup by whatever launches the
//! engine and passed into `Device::open`; there is no implicit global state.

use crate::BLOCK_SIZE;
use crate::types::ResolvePolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while validating engine configuration. All of these are
/// fatal at startup; no operation begins on an invalid configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("device size is required")]
    MissingSize,

    #[error("store path is required")]
    MissingStorePath,

    #[error("block size must be a nonzero power of two, got {0}")]
    InvalidBlockSize(usize),

    #[error("device size {size} is not a multiple of block size {block_size}")]
    UnalignedSize { size: u64, block_size: usize },
}

/// Configuration for one virtual device
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device size in bytes; must be a multiple of `block_size`
    pub size_bytes: u64,
    /// Deduplication granularity in bytes
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// Location of the backing store file
    pub store_path: PathBuf,
    /// Block resolution policy
    #[serde(default)]
    pub resolve: ResolvePolicy,
    /// Retry behaviour on transient store contention
    #[serde(default)]
    pub retry: RetryConfig,
}

impl DeviceConfig {
    /// Create a configuration with default block size, policy and retry
    pub fn new(size_bytes: u64, store_path: impl Into<PathBuf>) -> Self {
        Self {
            size_bytes,
            block_size: BLOCK_SIZE,
            store_path: store_path.into(),
            resolve: ResolvePolicy::default(),
            retry: RetryConfig::default(),
        }
    }

    /// Validate the configuration, failing on missing or misaligned values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.size_bytes == 0 {
            return Err(ConfigError::MissingSize);
        }
        if self.store_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingStorePath);
        }
        if self.block_size == 0 || !self.block_size.is_power_of_two() {
            return Err(ConfigError::InvalidBlockSize(self.block_size));
        }
        if self.size_bytes % self.block_size as u64 != 0 {
            return Err(ConfigError::UnalignedSize {
                size: self.size_bytes,
                block_size: self.block_size,
            });
        }
        Ok(())
    }

    /// Number of addressable blocks on the device
    #[must_use]
    pub fn block_count(&self) -> u64 {
        self.size_bytes / self.block_size as u64
    }
}

fn default_block_size() -> usize {
    BLOCK_SIZE
}

/// Retry behaviour for transient store contention: a fixed delay between
/// attempts and an optional attempt cap. The default is uncapped, favouring
/// availability over bounded latency for a long-running server.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay between attempts in milliseconds
    pub delay_ms: u64,
    /// Maximum number of attempts before surfacing the contention error
    pub max_attempts: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            delay_ms: 100,
            max_attempts: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = DeviceConfig::new(64 * 4096, "/tmp/dedupio.redb");
        assert!(config.validate().is_ok());
        assert_eq!(config.block_count(), 64);
    }

    #[test]
    fn test_missing_size() {
        let config = DeviceConfig::new(0, "/tmp/dedupio.redb");
        assert_eq!(config.validate(), Err(ConfigError::MissingSize));
    }

    #[test]
    fn test_missing_store_path() {
        let config = DeviceConfig::new(4096, "");
        assert_eq!(config.validate(), Err(ConfigError::MissingStorePath));
    }

    #[test]
    fn test_unaligned_size() {
        let config = DeviceConfig::new(4096 + 1, "/tmp/dedupio.redb");
        assert_eq!(
            config.validate(),
            Err(ConfigError::UnalignedSize {
                size: 4097,
                block_size: 4096
            })
        );
    }

    #[test]
    fn test_invalid_block_size() {
        let mut config = DeviceConfig::new(4096, "/tmp/dedupio.redb");
        config.block_size = 3000;
        assert_eq!(config.validate(), Err(ConfigError::InvalidBlockSize(3000)));
    }

    #[test]
    fn test_block_size_serde_default() {
        let config: DeviceConfig =
            serde_json::from_str(r#"{"size_bytes": 8192, "store_path": "/tmp/d.redb"}"#).unwrap();
        assert_eq!(config.block_size, BLOCK_SIZE);
        assert_eq!(config.resolve, ResolvePolicy::Verified);
        assert!(config.retry.max_attempts.is_none());
    }
}
