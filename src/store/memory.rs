use std::sync::Arc;

use parking_lot::RwLock;

use super::record::{
    DynamicRecord, NodeRecord, PropertyRecord, Record, RelationshipGroupRecord,
    RelationshipRecord, SchemaRecord, TokenRecord,
};
use super::{DecodeOutcome, RecordLoad, RecordStore, Stores, TokenStores};
use crate::error::StoreError;

/// Default payload size of in-memory dynamic stores.
pub const DEFAULT_DYNAMIC_BLOCK_SIZE: usize = 16;

#[derive(Clone, Debug)]
enum Slot<R> {
    Record(R),
    /// Decodes only in lenient mode; carries the salvaged record.
    Corrupt(R, String),
    /// Cannot be read at all.
    Unreadable(String),
}

/// Record store backed by a vector, for tests and tools.
#[derive(Debug)]
pub struct MemoryStore<R> {
    name: &'static str,
    record_data_size: usize,
    slots: RwLock<Vec<Option<Slot<R>>>>,
}

impl<R: Record> MemoryStore<R> {
    /// Empty store; `name` appears in read errors.
    pub fn new(name: &'static str) -> Self {
        Self::with_record_data_size(name, 0)
    }

    /// Empty store with a fixed payload capacity per record.
    pub fn with_record_data_size(name: &'static str, record_data_size: usize) -> Self {
        Self {
            name,
            record_data_size,
            slots: RwLock::new(Vec::new()),
        }
    }

    /// Allocates the next id without writing a record.
    pub fn next_id(&self) -> u64 {
        let mut slots = self.slots.write();
        slots.push(None);
        (slots.len() - 1) as u64
    }

    /// Writes a record at its id, growing the store as needed.
    pub fn insert(&self, record: R) {
        self.put(record.id(), Slot::Record(record));
    }

    /// Applies `f` to the stored record (or a blank one) and writes it back.
    pub fn update(&self, id: u64, f: impl FnOnce(&mut R)) {
        let mut record = self.read(id).unwrap_or_else(|| R::unused(id));
        f(&mut record);
        self.insert(record);
    }

    /// Current record, ignoring corruption markers.
    pub fn read(&self, id: u64) -> Option<R> {
        let slots = self.slots.read();
        match slots.get(id as usize)? {
            Some(Slot::Record(record)) | Some(Slot::Corrupt(record, _)) => Some(record.clone()),
            Some(Slot::Unreadable(_)) | None => None,
        }
    }

    /// Marks a record as decodable only in lenient mode.
    pub fn corrupt(&self, id: u64, detail: impl Into<String>) {
        let record = self.read(id).unwrap_or_else(|| R::unused(id));
        self.put(id, Slot::Corrupt(record, detail.into()));
    }

    /// Marks a record as unreadable in every mode.
    pub fn make_unreadable(&self, id: u64, detail: impl Into<String>) {
        self.put(id, Slot::Unreadable(detail.into()));
    }

    fn put(&self, id: u64, slot: Slot<R>) {
        let mut slots = self.slots.write();
        let index = id as usize;
        if slots.len() <= index {
            slots.resize(index + 1, None);
        }
        slots[index] = Some(slot);
    }
}

impl<R: Record> RecordStore<R> for MemoryStore<R> {
    fn get_record(&self, id: u64, mode: RecordLoad) -> Result<R, DecodeOutcome> {
        let slots = self.slots.read();
        match slots.get(id as usize) {
            None | Some(None) => Ok(R::unused(id)),
            Some(Some(Slot::Record(record))) => Ok(record.clone()),
            Some(Some(Slot::Corrupt(record, detail))) => match mode {
                RecordLoad::Check => Err(DecodeOutcome::ReportableCorruption(detail.clone())),
                RecordLoad::Normal => Err(DecodeOutcome::Fatal(StoreError::unreadable(
                    self.name,
                    record.id(),
                    detail.clone(),
                ))),
            },
            Some(Some(Slot::Unreadable(detail))) => Err(DecodeOutcome::Fatal(
                StoreError::unreadable(self.name, id, detail.clone()),
            )),
        }
    }

    fn high_id(&self) -> u64 {
        self.slots.read().len() as u64
    }

    fn record_data_size(&self) -> usize {
        self.record_data_size
    }
}

/// Token record store with its name chain store.
#[derive(Debug)]
pub struct MemoryTokenStores {
    /// Token records.
    pub tokens: Arc<MemoryStore<TokenRecord>>,
    /// Name chains.
    pub names: Arc<MemoryStore<DynamicRecord>>,
}

impl MemoryTokenStores {
    fn new(kind: &'static str, names: &'static str, block_size: usize) -> Self {
        Self {
            tokens: Arc::new(MemoryStore::new(kind)),
            names: Arc::new(MemoryStore::with_record_data_size(names, block_size)),
        }
    }

    fn view(&self) -> TokenStores {
        TokenStores {
            tokens: self.tokens.clone(),
            names: self.names.clone(),
        }
    }
}

/// A full set of in-memory stores.
#[derive(Debug)]
pub struct MemoryStores {
    /// Node records.
    pub nodes: Arc<MemoryStore<NodeRecord>>,
    /// Node label overflow chains.
    pub node_labels: Arc<MemoryStore<DynamicRecord>>,
    /// Relationship records.
    pub relationships: Arc<MemoryStore<RelationshipRecord>>,
    /// Relationship group records.
    pub relationship_groups: Arc<MemoryStore<RelationshipGroupRecord>>,
    /// Property records.
    pub properties: Arc<MemoryStore<PropertyRecord>>,
    /// String chains.
    pub strings: Arc<MemoryStore<DynamicRecord>>,
    /// Array chains.
    pub arrays: Arc<MemoryStore<DynamicRecord>>,
    /// Schema rules.
    pub schema: Arc<MemoryStore<SchemaRecord>>,
    /// Label tokens.
    pub labels: MemoryTokenStores,
    /// Relationship type tokens.
    pub relationship_types: MemoryTokenStores,
    /// Property key tokens.
    pub property_keys: MemoryTokenStores,
}

impl Default for MemoryStores {
    fn default() -> Self {
        Self::new(DEFAULT_DYNAMIC_BLOCK_SIZE)
    }
}

impl MemoryStores {
    /// Empty stores whose dynamic chains use `block_size` payload bytes per record.
    pub fn new(block_size: usize) -> Self {
        Self {
            nodes: Arc::new(MemoryStore::new("node")),
            node_labels: Arc::new(MemoryStore::with_record_data_size(
                "node_labels",
                block_size,
            )),
            relationships: Arc::new(MemoryStore::new("relationship")),
            relationship_groups: Arc::new(MemoryStore::new("relationship_group")),
            properties: Arc::new(MemoryStore::new("property")),
            strings: Arc::new(MemoryStore::with_record_data_size("string", block_size)),
            arrays: Arc::new(MemoryStore::with_record_data_size("array", block_size)),
            schema: Arc::new(MemoryStore::new("schema")),
            labels: MemoryTokenStores::new("label_token", "label_token_name", block_size),
            relationship_types: MemoryTokenStores::new(
                "relationship_type_token",
                "relationship_type_token_name",
                block_size,
            ),
            property_keys: MemoryTokenStores::new(
                "property_key_token",
                "property_key_token_name",
                block_size,
            ),
        }
    }

    /// Type-erased view handed to the checker.
    pub fn stores(&self) -> Stores {
        Stores {
            nodes: self.nodes.clone(),
            node_labels: self.node_labels.clone(),
            relationships: self.relationships.clone(),
            relationship_groups: self.relationship_groups.clone(),
            properties: self.properties.clone(),
            strings: self.strings.clone(),
            arrays: self.arrays.clone(),
            schema: self.schema.clone(),
            labels: self.labels.view(),
            relationship_types: self.relationship_types.view(),
            property_keys: self.property_keys.view(),
        }
    }
}
