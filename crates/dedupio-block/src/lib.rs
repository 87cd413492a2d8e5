//! Dedupio Block Engine
//!
//! A deduplicating block storage engine exposed as a fixed-size virtual
//! block device. Logical block addresses map to content-addressed blocks so
//! identical content written at different LBAs is stored once; per-block
//! reference counts drive reclamation of blocks nothing maps to anymore.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ Block transport  │  (NBD, iSCSI, ... out of tree)
//! └────────┬─────────┘
//!          │ read / write / trim
//! ┌────────▼─────────┐
//! │  Device façade   │  alignment + bounds checks, LBA ranges
//! │  - resolve       │  fingerprint match (verified / trusted)
//! │  - gc            │  reap unreferenced blocks
//! └────────┬─────────┘
//!          │ one transaction per call
//! ┌────────▼─────────┐
//! │  dedupio-store   │  blocks / refcounts / mappings (redb)
//! └──────────────────┘
//! ```

pub mod device;
pub mod error;
pub mod gc;
pub mod geometry;
pub mod resolve;

pub use device::{BlockSizeHints, Device, DeviceStats};
pub use error::{EngineError, EngineResult};
pub use geometry::Geometry;
pub use resolve::{ContentMatch, Trusted, Verified};

pub use dedupio_common::BLOCK_SIZE;
