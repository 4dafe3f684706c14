//! # Trove Index
//!
//! On-disk word indices for the trove desktop indexer and the rules that
//! govern their files.
//!
//! - [`IndexStore`] is the write contract the indexing engine relies on:
//!   buffer postings, flush them, report how many were flushed.
//! - [`BucketIndex`] is the bucket-hash implementation of that contract.
//! - [`IndexLifecycleManager`] names the index files of a data directory,
//!   promotes rebuilt indices once their merge is complete, and enforces
//!   the size ceiling.
//!
//! ## Example
//!
//! ```no_run
//! use trove_index::{IndexKind, IndexLifecycleManager, IndexStore};
//! use std::path::Path;
//!
//! fn main() -> trove_index::Result<()> {
//!     let mut manager = IndexLifecycleManager::new();
//!     manager.init(Path::new("/var/cache/trove"), 10, 20)?;
//!
//!     let mut index = manager.open_index(IndexKind::Files)?;
//!     index.add("kernel", 1, 1, 5);
//!     let flushed = index.flush()?;
//!
//!     println!("Flushed {flushed} postings");
//!     Ok(())
//! }
//! ```

mod bucket;
mod error;
mod lifecycle;
mod store;

pub use bucket::{BucketIndex, BucketRange};
pub use error::{IndexError, Result};
pub use lifecycle::{
    IndexKind, IndexLifecycleManager, InitReport, MAX_BUCKET_DEFAULT, MAX_INDEX_FILE_SIZE,
    MIN_BUCKET_DEFAULT, ScanErrorPolicy, filename_for, has_pending_merge_files,
    scan_pending_merge_files,
};
pub use store::{IndexStore, Posting};
