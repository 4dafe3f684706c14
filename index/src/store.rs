use crate::error::Result;
use serde::{Deserialize, Serialize};

/// One occurrence of a term: the document, the service it belongs to and
/// the weight of the field the term came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub document_id: u64,
    pub service_id: u32,
    pub weight: u32,
}

/// Write side of an inverted word index.
///
/// Postings handed to [`IndexStore::add`] are buffered; they only become
/// durable when [`IndexStore::flush`] returns successfully.
pub trait IndexStore {
    /// Buffer a posting for `term`.
    fn add(&mut self, term: &str, document_id: u64, service_id: u32, weight: u32);

    /// Persist every buffered posting, returning how many were written.
    fn flush(&mut self) -> Result<u64>;

    /// Number of postings waiting for the next flush.
    fn pending(&self) -> usize;
}
