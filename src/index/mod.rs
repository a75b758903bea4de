//! Read-only index access consumed by the checker.
//!
//! Value indexes are reached through an [`IndexProvider`] snapshot; the label index and
//! the relationship type index are both [`TokenScanStore`]s.

#![forbid(unsafe_code)]

mod memory;

use std::sync::Arc;

use crate::checker::IdRange;
use crate::error::StoreError;
use crate::schema::IndexDescriptor;
use crate::store::Value;

/// In-memory index fakes.
pub use memory::{MemoryIndex, MemoryIndexProvider, MemoryTokenScanStore};

/// One value index entry.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexEntry {
    /// Indexed entity id.
    pub entity: u64,
    /// Indexed values, in the descriptor's key order.
    pub values: Vec<Value>,
}

/// Reader for one online value index.
pub trait IndexAccessor: Send + Sync {
    /// Rule this index implements.
    fn descriptor(&self) -> &IndexDescriptor;

    /// Approximate number of entries.
    fn estimated_entry_count(&self) -> u64;

    /// Entity ids indexed under exactly `values`.
    fn lookup(&self, values: &[Value]) -> Result<Vec<u64>, StoreError>;

    /// Entries whose entity id falls in `range`, ordered by entity id.
    fn entries(&self, range: IdRange) -> Result<Vec<IndexEntry>, StoreError>;
}

/// Point-in-time view over every index.
pub trait IndexAccessors: Send + Sync {
    /// Rules of indexes that are online and readable.
    fn online_rules(&self) -> Vec<IndexDescriptor>;

    /// Rules of indexes that are populating or failed.
    fn not_online_rules(&self) -> Vec<IndexDescriptor>;

    /// Reader for an online index.
    fn accessor(&self, id: u64) -> Option<Arc<dyn IndexAccessor>>;
}

/// Source of index snapshots; the checker takes one snapshot per run, on first use.
pub trait IndexProvider: Send + Sync {
    /// Captures the current index set.
    fn snapshot(&self) -> Arc<dyn IndexAccessors>;
}

/// One entity's tokens in a token index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenScanEntry {
    /// Entity id.
    pub entity: u64,
    /// Sorted token ids.
    pub tokens: Vec<i64>,
}

/// Label index or relationship type index.
pub trait TokenScanStore: Send + Sync {
    /// Entries whose entity id falls in `range`, ordered by entity id.
    fn entries(&self, range: IdRange) -> Result<Vec<TokenScanEntry>, StoreError>;
}
