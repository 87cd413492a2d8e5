//! Device façade
//!
//! The engine's public surface. Every operation validates alignment and
//! bounds first, then runs as a single transaction against the store, so a
//! call either commits all of its mapping and refcount effects or none.
//! Concurrent callers from other threads or processes are serialized by the
//! store's transaction isolation, not by in-process locks.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use dedupio_common::{BlockId, DeviceConfig, Fingerprint, Lba};
use dedupio_store::{RetryPolicy, Store, StoreError, TxnTables};

use crate::error::EngineResult;
use crate::gc;
use crate::geometry::Geometry;
use crate::resolve::{ContentMatch, matcher_for};

/// Size hints advertised to the block transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSizeHints {
    pub minimum: usize,
    pub preferred: usize,
    pub maximum: usize,
}

/// Storage accounting for one device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Fixed device size in bytes
    pub device_bytes: u64,
    /// Bytes addressable through live mappings
    pub logical_bytes: u64,
    /// Bytes held in unique stored blocks
    pub physical_bytes: u64,
    /// Number of unique stored blocks
    pub unique_blocks: u64,
    /// Number of live LBA mappings
    pub mapped_blocks: u64,
}

/// A fixed-size deduplicating virtual block device
pub struct Device {
    store: Arc<Store>,
    geometry: Geometry,
    matcher: Box<dyn ContentMatch>,
}

impl Device {
    /// Open a device per `config`, creating the backing store if absent.
    pub fn open(config: &DeviceConfig) -> EngineResult<Self> {
        config.validate()?;
        let retry = RetryPolicy::from(config.retry);
        let store = Store::open(&config.store_path, retry)?;
        Self::with_store(config, Arc::new(store))
    }

    /// Open a device over an already-opened store (in-memory stores, tests).
    /// Runs a recovery sweep for unreferenced blocks before returning.
    pub fn with_store(config: &DeviceConfig, store: Arc<Store>) -> EngineResult<Self> {
        config.validate()?;
        let device = Self {
            store,
            geometry: Geometry::new(config.block_size, config.block_count()),
            matcher: matcher_for(config.resolve),
        };
        let swept = device.sweep_unreferenced()?;
        if swept > 0 {
            info!(swept, "removed unreferenced blocks left by an earlier crash");
        }
        Ok(device)
    }

    /// Fixed device size in bytes
    #[must_use]
    pub fn size(&self) -> u64 {
        self.geometry.size_bytes()
    }

    /// Alignment hints for the transport. The engine operates at exactly one
    /// granularity, so all three hints are the configured block size.
    #[must_use]
    pub fn block_size_hints(&self) -> BlockSizeHints {
        let block_size = self.geometry.block_size();
        BlockSizeHints {
            minimum: block_size,
            preferred: block_size,
            maximum: block_size,
        }
    }

    /// Read `length` bytes at `offset`. Unmapped extents read as zeros, the
    /// same as a sparse device whose unwritten ranges were never allocated.
    pub fn read(&self, offset: u64, length: usize) -> EngineResult<Vec<u8>> {
        let span = self.geometry.lba_span(offset, length)?;
        let block_size = self.geometry.block_size();
        let buf = self.store.with_read(|t| {
            let mut buf = vec![0u8; length];
            for (lba, block_id) in t.mappings_in(span.clone())? {
                let record = t.block(block_id)?.ok_or_else(|| {
                    StoreError::CorruptRecord(block_id, "mapping target missing".into())
                })?;
                let at = (lba - span.start) as usize * block_size;
                buf[at..at + block_size].copy_from_slice(&record.data);
            }
            Ok(buf)
        })?;
        Ok(buf)
    }

    /// Write `buf` at `offset`, deduplicating each block-sized chunk against
    /// stored content. The whole call commits as one transaction.
    pub fn write(&self, offset: u64, buf: &[u8]) -> EngineResult<()> {
        let span = self.geometry.lba_span(offset, buf.len())?;
        let block_size = self.geometry.block_size();
        self.store.with_write(|t| {
            let mut zeroed = BTreeSet::new();
            for (i, lba) in span.clone().enumerate() {
                let chunk = &buf[i * block_size..(i + 1) * block_size];
                self.write_chunk(t, lba, chunk, &mut zeroed)?;
            }
            let reaped = gc::reap(t, &zeroed)?;
            if reaped > 0 {
                debug!(reaped, "reaped blocks displaced by write");
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Place one chunk at `lba`. Blocks whose refcount drops to zero are
    /// collected into `zeroed` for the end-of-call reap; a later chunk may
    /// still re-reference them.
    fn write_chunk(
        &self,
        t: &mut TxnTables<'_>,
        lba: Lba,
        chunk: &[u8],
        zeroed: &mut BTreeSet<BlockId>,
    ) -> Result<(), StoreError> {
        let fingerprint = Fingerprint::compute(chunk);

        let mut target = None;
        for id in t.candidate_blocks(&fingerprint)? {
            let record = t.block(id)?.ok_or_else(|| {
                StoreError::CorruptRecord(id, "fingerprint index target missing".into())
            })?;
            if self.matcher.confirm(&record.data, chunk) {
                target = Some(id);
                break;
            }
        }

        let previous = t.mapping(lba)?;
        match target {
            // Identical content already mapped here: nothing to do
            Some(block) if previous == Some(block) => {}
            Some(block) => {
                if let Some(displaced) = previous
                    && t.release_block(displaced, 1)? == 0
                {
                    zeroed.insert(displaced);
                }
                t.set_mapping(lba, block)?;
                t.retain_block(block)?;
            }
            None => {
                if let Some(displaced) = previous
                    && t.release_block(displaced, 1)? == 0
                {
                    zeroed.insert(displaced);
                }
                let block = t.insert_block(&fingerprint, chunk)?;
                t.set_mapping(lba, block)?;
            }
        }
        Ok(())
    }

    /// Discard every mapping in the range. Released blocks that no mapping
    /// points at anymore are deleted in the same transaction; subsequent
    /// reads of the range return zeros. Trimming an unmapped range is a
    /// no-op.
    pub fn trim(&self, offset: u64, length: usize) -> EngineResult<()> {
        let span = self.geometry.lba_span(offset, length)?;
        self.store.with_write(|t| {
            let released = t.take_mappings(span.clone())?;
            let mut zeroed = BTreeSet::new();
            for (&block, &uses) in &released {
                if t.release_block(block, uses)? == 0 {
                    zeroed.insert(block);
                }
            }
            let reaped = gc::reap(t, &zeroed)?;
            if reaped > 0 {
                debug!(reaped, "reaped blocks released by trim");
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Zeroing a range has the same effect as trimming it: reads of the
    /// range return zeros either way, and no zero-filled block is stored.
    pub fn zero(&self, offset: u64, length: usize) -> EngineResult<()> {
        self.trim(offset, length)
    }

    /// Delete any persisted zero-refcount block. Returns the number deleted.
    pub fn sweep_unreferenced(&self) -> EngineResult<usize> {
        Ok(self.store.with_write(gc::sweep)?)
    }

    /// Storage accounting from a consistent snapshot
    pub fn stats(&self) -> EngineResult<DeviceStats> {
        let block_size = self.geometry.block_size() as u64;
        let stats = self.store.with_read(|t| {
            let unique_blocks = t.block_count()?;
            let mapped_blocks = t.mapping_count()?;
            Ok(DeviceStats {
                device_bytes: self.geometry.size_bytes(),
                logical_bytes: mapped_blocks * block_size,
                physical_bytes: unique_blocks * block_size,
                unique_blocks,
                mapped_blocks,
            })
        })?;
        Ok(stats)
    }
}
