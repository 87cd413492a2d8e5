//! Garbage collection
//!
//! Blocks are reaped inside the same transaction that dropped their refcount
//! to zero, so a concurrent writer can never re-target a mapping onto a
//! block that has already been deleted underneath it.

use std::collections::BTreeSet;

use dedupio_common::BlockId;
use dedupio_store::{StoreResult, TxnTables};

/// Reap every candidate whose refcount is still zero. A candidate may have
/// been re-referenced later in the same call, so the count is re-checked
/// before deletion. Returns the number of blocks deleted.
pub fn reap(t: &mut TxnTables<'_>, candidates: &BTreeSet<BlockId>) -> StoreResult<usize> {
    let mut reaped = 0;
    for &id in candidates {
        if t.reap_block(id)? {
            reaped += 1;
        }
    }
    Ok(reaped)
}

/// Delete every persisted zero-refcount block. Clean operation leaves none;
/// this runs at open as a recovery measure. Returns the number deleted.
pub fn sweep(t: &mut TxnTables<'_>) -> StoreResult<usize> {
    let mut reaped = 0;
    for id in t.unreferenced_blocks()? {
        if t.reap_block(id)? {
            reaped += 1;
        }
    }
    Ok(reaped)
}
