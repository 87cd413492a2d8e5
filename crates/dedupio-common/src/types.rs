//! Core type definitions for Dedupio
//!
//! This module defines the fundamental identifier types and the block
//! resolution policy shared between the store and engine crates.

use serde::{Deserialize, Serialize};

/// Logical block address: index of one fixed-size region of the device
pub type Lba = u64;

/// Identifier of one stored content block
pub type BlockId = u64;

/// How an incoming chunk is matched against stored blocks that share its
/// fingerprint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvePolicy {
    /// Fingerprint match plus byte-for-byte payload comparison
    #[default]
    Verified,
    /// Fingerprint match alone. Faster, but a hash collision silently
    /// corrupts one of the colliding blocks.
    Trusted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_policy_default() {
        assert_eq!(ResolvePolicy::default(), ResolvePolicy::Verified);
    }

    #[test]
    fn test_resolve_policy_serde() {
        let json = serde_json::to_string(&ResolvePolicy::Trusted).unwrap();
        assert_eq!(json, "\"trusted\"");
        let policy: ResolvePolicy = serde_json::from_str("\"verified\"").unwrap();
        assert_eq!(policy, ResolvePolicy::Verified);
    }
}
