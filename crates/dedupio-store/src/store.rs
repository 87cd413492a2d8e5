//! Persistent deduplicated block storage backed by redb.
//!
//! [`Store`] owns the database handle and the retry policy. Callers run
//! whole operations through [`Store::with_write`] / [`Store::with_read`];
//! the closure receives a view over every table so multi-table updates
//! commit atomically. Transient contention re-runs the closure, so closures
//! must not carry state across attempts.

use std::path::Path;

use redb::{
    Database, MultimapTable, ReadOnlyTable, ReadTransaction, Table, WriteTransaction,
};

use crate::retry::RetryPolicy;
use crate::tables;

/// Error type for block store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store contended: {0}")]
    Contended(String),
    #[error("refcount underflow on block {0}")]
    RefcountUnderflow(u64),
    #[error("corrupt record for block {0}: {1}")]
    CorruptRecord(u64, String),
}

impl From<redb::TransactionError> for StoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

impl StoreError {
    /// Whether the retry layer should re-run the transaction. Covers the
    /// explicit contention marker and the backing file being held by another
    /// process, the conditions expected to clear after a short wait.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Contended(_) | Self::Redb(redb::DatabaseError::DatabaseAlreadyOpen)
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Shared handle over the backing database plus the retry policy.
pub struct Store {
    db: Database,
    retry: RetryPolicy,
}

impl Store {
    /// Open (or create) the store at `path`. Waits out another process
    /// holding the database file under the retry policy.
    pub fn open(path: impl AsRef<Path>, retry: RetryPolicy) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = retry.run(|| Database::create(path).map_err(StoreError::from))?;
        Self::init(db, retry)
    }

    /// Open a store on an in-memory backend (tests, ephemeral devices).
    pub fn open_in_memory(retry: RetryPolicy) -> StoreResult<Self> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db, retry)
    }

    fn init(db: Database, retry: RetryPolicy) -> StoreResult<Self> {
        // Create all tables eagerly so later read txns don't fail
        let txn = db.begin_write()?;
        {
            let _t = txn.open_table(tables::BLOCKS)?;
            let _t = txn.open_table(tables::REFCOUNTS)?;
            let _t = txn.open_multimap_table(tables::BLOCKS_BY_FINGERPRINT)?;
            let _t = txn.open_table(tables::MAPPINGS)?;
            let _t = txn.open_table(tables::META)?;
        }
        txn.commit()?;
        Ok(Self { db, retry })
    }

    /// Run `f` inside one write transaction, committing on success and
    /// rolling back on error. Transient failures re-run the whole closure.
    pub fn with_write<T>(
        &self,
        mut f: impl FnMut(&mut TxnTables<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        self.retry.run(|| {
            let txn = self.db.begin_write()?;
            let result = {
                let mut t = TxnTables::open(&txn)?;
                f(&mut t)
            };
            match result {
                Ok(value) => {
                    txn.commit()?;
                    Ok(value)
                }
                Err(e) => {
                    txn.abort()?;
                    Err(e)
                }
            }
        })
    }

    /// Run `f` against a consistent read snapshot.
    pub fn with_read<T>(
        &self,
        mut f: impl FnMut(&ReadTables) -> StoreResult<T>,
    ) -> StoreResult<T> {
        self.retry.run(|| {
            let txn = self.db.begin_read()?;
            let t = ReadTables::open(&txn)?;
            f(&t)
        })
    }
}

/// Write-transaction view over every store table. Operations on the block
/// relation live in `blocks.rs`, operations on the mapping relation in
/// `index.rs`.
pub struct TxnTables<'txn> {
    pub(crate) blocks: Table<'txn, u64, &'static [u8]>,
    pub(crate) refcounts: Table<'txn, u64, u64>,
    pub(crate) by_fingerprint: MultimapTable<'txn, &'static [u8], u64>,
    pub(crate) mappings: Table<'txn, u64, u64>,
    pub(crate) meta: Table<'txn, &'static str, u64>,
}

impl<'txn> TxnTables<'txn> {
    fn open(txn: &'txn WriteTransaction) -> StoreResult<Self> {
        Ok(Self {
            blocks: txn.open_table(tables::BLOCKS)?,
            refcounts: txn.open_table(tables::REFCOUNTS)?,
            by_fingerprint: txn.open_multimap_table(tables::BLOCKS_BY_FINGERPRINT)?,
            mappings: txn.open_table(tables::MAPPINGS)?,
            meta: txn.open_table(tables::META)?,
        })
    }
}

/// Read-snapshot view over the tables read paths need.
pub struct ReadTables {
    pub(crate) blocks: ReadOnlyTable<u64, &'static [u8]>,
    pub(crate) refcounts: ReadOnlyTable<u64, u64>,
    pub(crate) mappings: ReadOnlyTable<u64, u64>,
}

impl ReadTables {
    fn open(txn: &ReadTransaction) -> StoreResult<Self> {
        Ok(Self {
            blocks: txn.open_table(tables::BLOCKS)?,
            refcounts: txn.open_table(tables::REFCOUNTS)?,
            mappings: txn.open_table(tables::MAPPINGS)?,
        })
    }
}
