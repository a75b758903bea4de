use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{
    IndexAccessor, IndexAccessors, IndexEntry, IndexProvider, TokenScanEntry, TokenScanStore,
};
use crate::checker::IdRange;
use crate::error::StoreError;
use crate::schema::IndexDescriptor;
use crate::store::Value;

/// Value index held in a map from entity id to indexed value tuples.
#[derive(Debug)]
pub struct MemoryIndex {
    descriptor: IndexDescriptor,
    entries: RwLock<BTreeMap<u64, Vec<Vec<Value>>>>,
}

impl MemoryIndex {
    /// Empty index for `descriptor`.
    pub fn new(descriptor: IndexDescriptor) -> Self {
        Self {
            descriptor,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Adds an entry; an entity may be indexed more than once.
    pub fn add(&self, entity: u64, values: Vec<Value>) {
        self.entries.write().entry(entity).or_default().push(values);
    }

    /// Drops every entry of `entity`.
    pub fn remove(&self, entity: u64) {
        self.entries.write().remove(&entity);
    }

    /// Replaces every entry of `entity` with a single one.
    pub fn replace(&self, entity: u64, values: Vec<Value>) {
        self.entries.write().insert(entity, vec![values]);
    }

    /// Value tuples stored for `entity`.
    pub fn values_of(&self, entity: u64) -> Vec<Vec<Value>> {
        self.entries.read().get(&entity).cloned().unwrap_or_default()
    }
}

impl IndexAccessor for MemoryIndex {
    fn descriptor(&self) -> &IndexDescriptor {
        &self.descriptor
    }

    fn estimated_entry_count(&self) -> u64 {
        self.entries.read().values().map(|v| v.len() as u64).sum()
    }

    fn lookup(&self, values: &[Value]) -> Result<Vec<u64>, StoreError> {
        let entries = self.entries.read();
        let mut hits = Vec::new();
        for (entity, tuples) in entries.iter() {
            for tuple in tuples {
                if tuple.as_slice() == values {
                    hits.push(*entity);
                }
            }
        }
        Ok(hits)
    }

    fn entries(&self, range: IdRange) -> Result<Vec<IndexEntry>, StoreError> {
        let entries = self.entries.read();
        Ok(entries
            .range(range.start..range.end)
            .flat_map(|(entity, tuples)| {
                tuples.iter().map(|values| IndexEntry {
                    entity: *entity,
                    values: values.clone(),
                })
            })
            .collect())
    }
}

#[derive(Default)]
struct ProviderState {
    online: Vec<Arc<MemoryIndex>>,
    not_online: Vec<IndexDescriptor>,
}

/// Mutable set of in-memory indexes that hands out frozen snapshots.
#[derive(Default)]
pub struct MemoryIndexProvider {
    state: RwLock<ProviderState>,
}

impl MemoryIndexProvider {
    /// Empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an online index and returns a handle for populating it.
    pub fn add_online(&self, descriptor: IndexDescriptor) -> Arc<MemoryIndex> {
        let index = Arc::new(MemoryIndex::new(descriptor));
        self.state.write().online.push(index.clone());
        index
    }

    /// Registers an index that is still populating or has failed.
    pub fn add_not_online(&self, descriptor: IndexDescriptor) {
        self.state.write().not_online.push(descriptor);
    }

    /// Online index by rule id.
    pub fn index(&self, id: u64) -> Option<Arc<MemoryIndex>> {
        self.state
            .read()
            .online
            .iter()
            .find(|index| index.descriptor.id == id)
            .cloned()
    }

    /// Every online index.
    pub fn online(&self) -> Vec<Arc<MemoryIndex>> {
        self.state.read().online.clone()
    }
}

struct MemorySnapshot {
    online: Vec<Arc<MemoryIndex>>,
    not_online: Vec<IndexDescriptor>,
}

impl IndexAccessors for MemorySnapshot {
    fn online_rules(&self) -> Vec<IndexDescriptor> {
        self.online.iter().map(|i| i.descriptor.clone()).collect()
    }

    fn not_online_rules(&self) -> Vec<IndexDescriptor> {
        self.not_online.clone()
    }

    fn accessor(&self, id: u64) -> Option<Arc<dyn IndexAccessor>> {
        self.online
            .iter()
            .find(|index| index.descriptor.id == id)
            .map(|index| index.clone() as Arc<dyn IndexAccessor>)
    }
}

impl IndexProvider for MemoryIndexProvider {
    fn snapshot(&self) -> Arc<dyn IndexAccessors> {
        let state = self.state.read();
        Arc::new(MemorySnapshot {
            online: state.online.clone(),
            not_online: state.not_online.clone(),
        })
    }
}

/// Token index held in an ordered map.
#[derive(Debug, Default)]
pub struct MemoryTokenScanStore {
    entries: RwLock<BTreeMap<u64, Vec<i64>>>,
}

impl MemoryTokenScanStore {
    /// Empty token index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tokens of `entity`; an empty set removes the entry.
    pub fn set(&self, entity: u64, tokens: &[i64]) {
        let mut tokens = tokens.to_vec();
        tokens.sort_unstable();
        tokens.dedup();
        let mut entries = self.entries.write();
        if tokens.is_empty() {
            entries.remove(&entity);
        } else {
            entries.insert(entity, tokens);
        }
    }

    /// Tokens recorded for `entity`.
    pub fn get(&self, entity: u64) -> Vec<i64> {
        self.entries.read().get(&entity).cloned().unwrap_or_default()
    }
}

impl TokenScanStore for MemoryTokenScanStore {
    fn entries(&self, range: IdRange) -> Result<Vec<TokenScanEntry>, StoreError> {
        Ok(self
            .entries
            .read()
            .range(range.start..range.end)
            .map(|(entity, tokens)| TokenScanEntry {
                entity: *entity,
                tokens: tokens.clone(),
            })
            .collect())
    }
}
