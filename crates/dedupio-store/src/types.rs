//! Serialisable records for the block relation.

use dedupio_common::Fingerprint;
use serde::{Deserialize, Serialize};

/// One stored content block. The payload length always equals the device
/// block size; the refcount lives in its own table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRecord {
    /// SHA-256 digest of `data`
    pub fingerprint: Fingerprint,
    /// Exactly one block of payload
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_record_round_trips_bincode() {
        let data = vec![0xAAu8; 4096];
        let record = BlockRecord {
            fingerprint: Fingerprint::compute(&data),
            data,
        };
        let raw = bincode::serialize(&record).unwrap();
        let decoded: BlockRecord = bincode::deserialize(&raw).unwrap();
        assert_eq!(decoded.fingerprint, record.fingerprint);
        assert_eq!(decoded.data, record.data);
    }
}
