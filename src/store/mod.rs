//! Record store abstraction consumed by the checker.
//!
//! The checker never sees bytes or pages: it asks a [`RecordStore`] for typed records
//! and learns about unreadable data through [`DecodeOutcome`].

#![forbid(unsafe_code)]

mod memory;
mod record;
mod trace;
mod value;

use std::sync::Arc;

use crate::error::StoreError;

/// In-memory stores for tests and embedders.
pub use memory::{MemoryStore, MemoryStores, MemoryTokenStores, DEFAULT_DYNAMIC_BLOCK_SIZE};
/// Record views.
pub use record::{
    reference, DynamicRecord, GroupDirection, LabelField, NodeEnd, NodeRecord, PropertyBlock,
    PropertyRecord, Record, RelationshipGroupRecord, RelationshipRecord, SchemaRecord,
    TokenRecord, NULL_REFERENCE,
};
/// Page cache counters.
pub use trace::{PageCacheStats, PageCacheTracer};
/// Property values and payload codecs.
pub use value::{
    decode_array, decode_labels, decode_string, encode_array, encode_labels, hash_values,
    split_blocks, PropertyBlockValue, Value, ValueDecodeError, SHORT_STRING_MAX,
};

/// How strictly a record is decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordLoad {
    /// Strict decoding for normal reads.
    Normal,
    /// Lenient decoding: return whatever can be salvaged and flag the rest.
    Check,
}

/// Why a record read did not produce a record.
#[derive(Debug)]
pub enum DecodeOutcome {
    /// The record is corrupt but the store is readable; reported as a finding.
    ReportableCorruption(String),
    /// The store cannot be read any further; the check aborts.
    Fatal(StoreError),
}

impl From<StoreError> for DecodeOutcome {
    fn from(err: StoreError) -> Self {
        DecodeOutcome::Fatal(err)
    }
}

/// Read access to one record store.
pub trait RecordStore<R: Record>: Send + Sync {
    /// Reads the record with the given id. Ids at or past [`high_id`](Self::high_id)
    /// return an unused record.
    fn get_record(&self, id: u64, mode: RecordLoad) -> Result<R, DecodeOutcome>;

    /// One past the highest id ever allocated.
    fn high_id(&self) -> u64;

    /// Payload capacity of one record; meaningful for dynamic stores.
    fn record_data_size(&self) -> usize {
        0
    }

    /// Blank record with the given id.
    fn new_record(&self, id: u64) -> R {
        R::unused(id)
    }
}

/// Token name stores, one per token kind.
#[derive(Clone)]
pub struct TokenStores {
    /// Token records.
    pub tokens: Arc<dyn RecordStore<TokenRecord>>,
    /// Name chains.
    pub names: Arc<dyn RecordStore<DynamicRecord>>,
}

/// Every store the checker reads.
#[derive(Clone)]
pub struct Stores {
    /// Node records.
    pub nodes: Arc<dyn RecordStore<NodeRecord>>,
    /// Node label overflow chains.
    pub node_labels: Arc<dyn RecordStore<DynamicRecord>>,
    /// Relationship records.
    pub relationships: Arc<dyn RecordStore<RelationshipRecord>>,
    /// Relationship group records.
    pub relationship_groups: Arc<dyn RecordStore<RelationshipGroupRecord>>,
    /// Property records.
    pub properties: Arc<dyn RecordStore<PropertyRecord>>,
    /// String value chains.
    pub strings: Arc<dyn RecordStore<DynamicRecord>>,
    /// Array value chains.
    pub arrays: Arc<dyn RecordStore<DynamicRecord>>,
    /// Schema rules.
    pub schema: Arc<dyn RecordStore<SchemaRecord>>,
    /// Label tokens.
    pub labels: TokenStores,
    /// Relationship type tokens.
    pub relationship_types: TokenStores,
    /// Property key tokens.
    pub property_keys: TokenStores,
}
