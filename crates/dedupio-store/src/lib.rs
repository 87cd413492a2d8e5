//! Dedupio Store - persistent block and mapping relations
//!
//! This crate owns everything that touches the backing redb database: the
//! content-addressed block relation with its refcounts and fingerprint index,
//! the LBA mapping relation, and the transaction/retry discipline the engine
//! runs every operation under.
//!
//! The engine never opens its own transactions. It calls
//! [`Store::with_write`] or [`Store::with_read`] with a closure over a table
//! view, so a mapping upsert, its refcount adjustments and any block reaping
//! commit or roll back as one unit.

pub mod blocks;
pub mod index;
pub mod retry;
pub mod store;
pub mod tables;
pub mod types;

pub use retry::RetryPolicy;
pub use store::{ReadTables, Store, StoreError, StoreResult, TxnTables};
pub use types::BlockRecord;
