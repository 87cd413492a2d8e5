//! Redb table definitions for the block store.

use redb::{MultimapTableDefinition, TableDefinition};

/// Content blocks: block id → bincode(BlockRecord)
pub const BLOCKS: TableDefinition<u64, &[u8]> = TableDefinition::new("blocks");

/// Reference counts: block id → number of live mappings pointing at it.
/// Kept beside the block relation so refcount adjustments don't rewrite the
/// payload; created and deleted in the same transaction as the block.
pub const REFCOUNTS: TableDefinition<u64, u64> = TableDefinition::new("refcounts");

/// Fingerprint index: digest bytes → candidate block ids. A multimap because
/// under the verified policy two distinct blocks may share a fingerprint.
pub const BLOCKS_BY_FINGERPRINT: MultimapTableDefinition<&[u8], u64> =
    MultimapTableDefinition::new("blocks_by_fingerprint");

/// Block index: lba → block id
pub const MAPPINGS: TableDefinition<u64, u64> = TableDefinition::new("mappings");

/// Engine metadata (single-key counters)
pub const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Meta key for the block id allocator
pub(crate) const NEXT_BLOCK_ID: &str = "next_block_id";
