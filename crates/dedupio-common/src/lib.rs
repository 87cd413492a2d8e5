//! Dedupio Common - Shared types and utilities
//!
//! This crate provides the types shared by the store and engine crates:
//! content fingerprints, device configuration, and identifier aliases.

pub mod config;
pub mod fingerprint;
pub mod types;

pub use config::{ConfigError, DeviceConfig, RetryConfig};
pub use fingerprint::Fingerprint;
pub use types::*;

/// Device block size in bytes (cannot change without recreating the store)
pub const BLOCK_SIZE: usize = 4096;
