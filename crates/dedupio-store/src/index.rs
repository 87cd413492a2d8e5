//! Block Index operations: the LBA → block id mapping relation.
//!
//! At most one mapping exists per LBA; an LBA with no mapping reads as
//! all-zero at the device layer.

use std::collections::BTreeMap;
use std::ops::Range;

use dedupio_common::{BlockId, Lba};
use redb::ReadableTable;

use crate::store::{ReadTables, StoreResult, TxnTables};

fn scan_mappings(
    table: &impl ReadableTable<u64, u64>,
    lbas: Range<Lba>,
) -> StoreResult<Vec<(Lba, BlockId)>> {
    let mut found = Vec::new();
    for entry in table.range(lbas)? {
        let (lba, block) = entry?;
        found.push((lba.value(), block.value()));
    }
    Ok(found)
}

impl TxnTables<'_> {
    /// Block currently mapped at `lba`, if any.
    pub fn mapping(&self, lba: Lba) -> StoreResult<Option<BlockId>> {
        Ok(self.mappings.get(lba)?.map(|g| g.value()))
    }

    /// Point the mapping for `lba` at `block`, replacing any previous target.
    /// Refcount adjustments are the caller's job.
    pub fn set_mapping(&mut self, lba: Lba, block: BlockId) -> StoreResult<()> {
        self.mappings.insert(lba, block)?;
        Ok(())
    }

    /// Remove every mapping in `lbas`. Returns how many of the removed
    /// mappings pointed at each block, for batched refcount release.
    pub fn take_mappings(&mut self, lbas: Range<Lba>) -> StoreResult<BTreeMap<BlockId, u64>> {
        let drained = scan_mappings(&self.mappings, lbas)?;
        let mut released: BTreeMap<BlockId, u64> = BTreeMap::new();
        for (lba, block) in drained {
            self.mappings.remove(lba)?;
            *released.entry(block).or_insert(0) += 1;
        }
        Ok(released)
    }
}

impl ReadTables {
    /// Mappings present in `lbas`, ascending by LBA.
    pub fn mappings_in(&self, lbas: Range<Lba>) -> StoreResult<Vec<(Lba, BlockId)>> {
        scan_mappings(&self.mappings, lbas)
    }
}
