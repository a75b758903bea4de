//! Builder for consistent in-memory graphs.
//!
//! [`GraphFixture`] writes records the way a database would: relationship chains with
//! head insertion and degree counts, sorted relationship groups for dense nodes, property
//! chains with overflow into the string and array stores, label overflow chains, and
//! value and token indexes kept in step with the records. A fresh fixture always checks
//! clean; tests then damage individual records through [`GraphFixture::stores`].

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::checker::StoreAccess;
use crate::index::{IndexAccessor, MemoryIndexProvider, MemoryTokenScanStore};
use crate::schema::{
    ConstraintDescriptor, ConstraintKind, EntityType, IndexDescriptor, IndexType,
    SchemaDescriptor, SchemaRule,
};
use crate::store::{
    encode_array, encode_labels, split_blocks, DynamicRecord, GroupDirection, LabelField,
    MemoryStore, MemoryStores, MemoryTokenStores, NodeEnd, NodeRecord, PropertyBlock,
    PropertyBlockValue, PropertyRecord, RecordStore, RelationshipGroupRecord,
    RelationshipRecord, SchemaRecord, TokenRecord, Value, DEFAULT_DYNAMIC_BLOCK_SIZE,
    NULL_REFERENCE, SHORT_STRING_MAX,
};

/// Property blocks per property record.
pub const BLOCKS_PER_PROPERTY_RECORD: usize = 4;

/// Labels stored inline in a node record before spilling into a label chain.
pub const INLINE_LABELS_MAX: usize = 4;

#[derive(Clone, Debug)]
struct Entity {
    tokens: Vec<i64>,
    properties: Vec<(i32, Value)>,
}

impl Entity {
    fn values_for(&self, schema: &SchemaDescriptor) -> Option<Vec<Value>> {
        if !self.tokens.contains(&i64::from(schema.token_id)) {
            return None;
        }
        schema
            .property_keys
            .iter()
            .map(|key| {
                self.properties
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, value)| value.clone())
            })
            .collect()
    }
}

/// A consistent graph under construction.
pub struct GraphFixture {
    stores: MemoryStores,
    indexes: Arc<MemoryIndexProvider>,
    label_index: Arc<MemoryTokenScanStore>,
    relationship_type_index: Arc<MemoryTokenScanStore>,
    nodes: BTreeMap<u64, Entity>,
    relationships: BTreeMap<u64, Entity>,
}

impl Default for GraphFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphFixture {
    /// Empty graph with the default dynamic block size.
    pub fn new() -> Self {
        Self::with_block_size(DEFAULT_DYNAMIC_BLOCK_SIZE)
    }

    /// Empty graph whose dynamic chains use `block_size` payload bytes per record.
    pub fn with_block_size(block_size: usize) -> Self {
        Self {
            stores: MemoryStores::new(block_size),
            indexes: Arc::new(MemoryIndexProvider::new()),
            label_index: Arc::new(MemoryTokenScanStore::new()),
            relationship_type_index: Arc::new(MemoryTokenScanStore::new()),
            nodes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    /// Underlying stores, for direct damage.
    pub fn stores(&self) -> &MemoryStores {
        &self.stores
    }

    /// Value indexes.
    pub fn indexes(&self) -> &MemoryIndexProvider {
        &self.indexes
    }

    /// Label index.
    pub fn label_index(&self) -> &MemoryTokenScanStore {
        &self.label_index
    }

    /// Relationship type index.
    pub fn relationship_type_index(&self) -> &MemoryTokenScanStore {
        &self.relationship_type_index
    }

    /// Everything a check needs to read this graph.
    pub fn access(&self) -> StoreAccess {
        StoreAccess {
            stores: self.stores.stores(),
            indexes: self.indexes.clone(),
            label_index: self.label_index.clone(),
            relationship_type_index: self.relationship_type_index.clone(),
            tokens: None,
            page_cache_tracer: None,
        }
    }

    /// Creates a label token.
    pub fn label(&mut self, name: &str) -> i64 {
        create_token(&self.stores.labels, name)
    }

    /// Creates a relationship type token.
    pub fn relationship_type(&mut self, name: &str) -> i64 {
        create_token(&self.stores.relationship_types, name)
    }

    /// Creates a property key token.
    pub fn property_key(&mut self, name: &str) -> i32 {
        create_token(&self.stores.property_keys, name) as i32
    }

    /// Creates a sparse node.
    pub fn create_node(&mut self, labels: &[i64], properties: &[(i32, Value)]) -> u64 {
        self.insert_node(labels, properties, false)
    }

    /// Creates a dense node; its relationships are reached through relationship groups.
    pub fn create_dense_node(&mut self, labels: &[i64], properties: &[(i32, Value)]) -> u64 {
        self.insert_node(labels, properties, true)
    }

    fn insert_node(&mut self, labels: &[i64], properties: &[(i32, Value)], dense: bool) -> u64 {
        let id = self.stores.nodes.next_id();
        let mut labels = labels.to_vec();
        labels.sort_unstable();
        labels.dedup();
        let field = if labels.len() <= INLINE_LABELS_MAX {
            LabelField::Inline(labels.iter().copied().collect::<SmallVec<_>>())
        } else {
            let ids: Vec<u32> = labels.iter().map(|&label| label as u32).collect();
            LabelField::Dynamic(write_chain(
                &self.stores.node_labels,
                &encode_labels(id, &ids),
            ))
        };
        let next_prop = self.write_properties(properties);
        self.stores.nodes.insert(NodeRecord {
            dense,
            next_prop,
            labels: field,
            ..NodeRecord::new(id)
        });
        self.label_index.set(id, &labels);
        let entity = Entity {
            tokens: labels,
            properties: properties.to_vec(),
        };
        index_entity(&self.indexes, EntityType::Node, id, &entity);
        self.nodes.insert(id, entity);
        id
    }

    /// Creates a relationship and links it into both endpoints' chains. A loop is linked
    /// once, with both of its sides in the same chain.
    pub fn create_relationship(
        &mut self,
        source: u64,
        target: u64,
        type_id: i64,
        properties: &[(i32, Value)],
    ) -> u64 {
        let id = self.stores.relationships.next_id();
        let mut record = RelationshipRecord::new(id, source as i64, target as i64, type_id);
        record.next_prop = self.write_properties(properties);
        self.stores.relationships.insert(record);
        self.link(id, source);
        if target != source {
            self.link(id, target);
        }
        self.relationship_type_index.set(id, &[type_id]);
        let entity = Entity {
            tokens: vec![type_id],
            properties: properties.to_vec(),
        };
        index_entity(&self.indexes, EntityType::Relationship, id, &entity);
        self.relationships.insert(id, entity);
        id
    }

    fn link(&self, relationship: u64, node: u64) {
        let Some(owner) = self.stores.nodes.read(node) else {
            return;
        };
        if !owner.dense {
            let head = owner.next_rel;
            self.push_front(relationship, node, head);
            self.stores
                .nodes
                .update(node, |n| n.next_rel = relationship as i64);
            return;
        }
        let Some(record) = self.stores.relationships.read(relationship) else {
            return;
        };
        let Some(direction) = GroupDirection::of(&record, node as i64) else {
            return;
        };
        let group = self.group_for(&owner, record.type_id);
        let head = self
            .stores
            .relationship_groups
            .read(group)
            .map_or(NULL_REFERENCE, |g| g.first(direction));
        self.push_front(relationship, node, head);
        self.stores
            .relationship_groups
            .update(group, |g| *g.first_mut(direction) = relationship as i64);
    }

    /// Makes `relationship` the head of `node`'s chain that currently starts at `head`.
    fn push_front(&self, relationship: u64, node: u64, head: i64) {
        let node_ref = node as i64;
        let mut degree = 1;
        if head != NULL_REFERENCE {
            if let Some(old) = self.stores.relationships.read(head as u64) {
                let ends = ends_of(&old, node_ref);
                if let Some(&end) = ends.first() {
                    degree = old.prev(end) + 1;
                }
                self.stores.relationships.update(head as u64, |old| {
                    for end in ends {
                        *old.first_in_chain_mut(end) = false;
                        *old.prev_mut(end) = relationship as i64;
                    }
                });
            }
        }
        self.stores.relationships.update(relationship, |record| {
            for end in ends_of(record, node_ref) {
                *record.first_in_chain_mut(end) = true;
                *record.prev_mut(end) = degree;
                *record.next_mut(end) = head;
            }
        });
    }

    /// Group of `owner` for `type_id`, created in type order when missing.
    fn group_for(&self, owner: &NodeRecord, type_id: i64) -> u64 {
        let groups = &self.stores.relationship_groups;
        let mut previous: Option<u64> = None;
        let mut current = owner.next_rel;
        while current != NULL_REFERENCE {
            let Some(group) = groups.read(current as u64) else {
                break;
            };
            if group.type_id == type_id {
                return group.id;
            }
            if group.type_id > type_id {
                break;
            }
            previous = Some(group.id);
            current = group.next;
        }
        let id = groups.next_id();
        let mut group = RelationshipGroupRecord::new(id, type_id, owner.id as i64);
        group.next = current;
        groups.insert(group);
        match previous {
            Some(previous) => groups.update(previous, |g| g.next = id as i64),
            None => self.stores.nodes.update(owner.id, |n| n.next_rel = id as i64),
        }
        id
    }

    fn write_properties(&self, properties: &[(i32, Value)]) -> i64 {
        if properties.is_empty() {
            return NULL_REFERENCE;
        }
        let store = &self.stores.properties;
        let chunks: Vec<_> = properties.chunks(BLOCKS_PER_PROPERTY_RECORD).collect();
        let ids: Vec<u64> = chunks.iter().map(|_| store.next_id()).collect();
        for (position, chunk) in chunks.iter().enumerate() {
            let mut record = PropertyRecord::new(ids[position]);
            if position > 0 {
                record.prev_prop = ids[position - 1] as i64;
            }
            if let Some(&next) = ids.get(position + 1) {
                record.next_prop = next as i64;
            }
            record.blocks = chunk
                .iter()
                .map(|(key, value)| PropertyBlock {
                    key: *key,
                    value: self.block_value(value),
                })
                .collect();
            store.insert(record);
        }
        ids[0] as i64
    }

    fn block_value(&self, value: &Value) -> PropertyBlockValue {
        match value {
            Value::Bool(v) => PropertyBlockValue::Bool(*v),
            Value::Int(v) => PropertyBlockValue::Int(*v),
            Value::Float(v) => PropertyBlockValue::Float(*v),
            Value::String(s) if s.len() <= SHORT_STRING_MAX => {
                PropertyBlockValue::ShortString(s.clone())
            }
            Value::String(s) => {
                PropertyBlockValue::String(write_chain(&self.stores.strings, s.as_bytes()))
            }
            array => PropertyBlockValue::Array(write_chain(
                &self.stores.arrays,
                &encode_array(array).unwrap_or_default(),
            )),
        }
    }

    /// Creates an online node index over `label` and fills it from existing nodes.
    pub fn create_index(&mut self, name: &str, label: i64, keys: &[i32]) -> u64 {
        let schema = SchemaDescriptor::for_label(label as i32, keys);
        self.add_index(name, schema, false, None)
    }

    /// Creates an online relationship index over `type_id`.
    pub fn create_relationship_index(&mut self, name: &str, type_id: i64, keys: &[i32]) -> u64 {
        let schema = SchemaDescriptor::for_relationship_type(type_id as i32, keys);
        self.add_index(name, schema, false, None)
    }

    /// Writes an index rule that is not online; nothing populates it.
    pub fn create_populating_index(&mut self, name: &str, label: i64, keys: &[i32]) -> u64 {
        let id = self.stores.schema.next_id();
        let descriptor = IndexDescriptor {
            id,
            name: name.to_owned(),
            schema: SchemaDescriptor::for_label(label as i32, keys),
            index_type: IndexType::Range,
            unique: false,
            owning_constraint: None,
        };
        self.write_rule(&SchemaRule::Index(descriptor.clone()));
        self.indexes.add_not_online(descriptor);
        id
    }

    /// Creates a uniqueness constraint with its backing index. Returns
    /// `(constraint, index)`.
    pub fn create_unique_constraint(&mut self, name: &str, label: i64, keys: &[i32]) -> (u64, u64) {
        self.add_backed_constraint(name, label, keys, ConstraintKind::Uniqueness)
    }

    /// Creates a node key constraint with its backing index. Returns `(constraint, index)`.
    pub fn create_node_key_constraint(&mut self, name: &str, label: i64, keys: &[i32]) -> (u64, u64) {
        self.add_backed_constraint(name, label, keys, ConstraintKind::NodeKey)
    }

    /// Creates a property existence constraint over `label`.
    pub fn create_existence_constraint(&mut self, name: &str, label: i64, keys: &[i32]) -> u64 {
        let id = self.stores.schema.next_id();
        self.write_rule(&SchemaRule::Constraint(ConstraintDescriptor {
            id,
            name: name.to_owned(),
            schema: SchemaDescriptor::for_label(label as i32, keys),
            kind: ConstraintKind::Existence,
            index_type: IndexType::Range,
            owned_index: None,
        }));
        id
    }

    fn add_backed_constraint(
        &mut self,
        name: &str,
        label: i64,
        keys: &[i32],
        kind: ConstraintKind,
    ) -> (u64, u64) {
        let schema = SchemaDescriptor::for_label(label as i32, keys);
        let constraint = self.stores.schema.next_id();
        let index = self.add_index(&format!("{name}_index"), schema.clone(), true, Some(constraint));
        self.write_rule(&SchemaRule::Constraint(ConstraintDescriptor {
            id: constraint,
            name: name.to_owned(),
            schema,
            kind,
            index_type: IndexType::Range,
            owned_index: Some(index),
        }));
        (constraint, index)
    }

    fn add_index(
        &mut self,
        name: &str,
        schema: SchemaDescriptor,
        unique: bool,
        owning_constraint: Option<u64>,
    ) -> u64 {
        let id = self.stores.schema.next_id();
        let descriptor = IndexDescriptor {
            id,
            name: name.to_owned(),
            schema,
            index_type: IndexType::Range,
            unique,
            owning_constraint,
        };
        self.write_rule(&SchemaRule::Index(descriptor.clone()));
        let index = self.indexes.add_online(descriptor);
        let schema = &index.descriptor().schema;
        let entities = match schema.entity {
            EntityType::Node => &self.nodes,
            EntityType::Relationship => &self.relationships,
        };
        for (&entity, shadow) in entities {
            if let Some(values) = shadow.values_for(schema) {
                index.add(entity, values);
            }
        }
        id
    }

    fn write_rule(&self, rule: &SchemaRule) {
        self.stores.schema.insert(SchemaRecord {
            id: rule.id(),
            in_use: true,
            data: rule.encode(),
        });
    }
}

/// Adds `entity` to every online index whose schema it satisfies.
fn index_entity(provider: &MemoryIndexProvider, kind: EntityType, id: u64, entity: &Entity) {
    for index in provider.online() {
        let schema = &index.descriptor().schema;
        if schema.entity != kind {
            continue;
        }
        if let Some(values) = entity.values_for(schema) {
            index.add(id, values);
        }
    }
}

/// Sides of `record` attached to `node`; both for a loop.
fn ends_of(record: &RelationshipRecord, node: i64) -> Vec<NodeEnd> {
    NodeEnd::BOTH
        .into_iter()
        .filter(|&end| record.node(end) == node)
        .collect()
}

/// Writes `payload` as a dynamic chain and returns its first record id.
fn write_chain(store: &MemoryStore<DynamicRecord>, payload: &[u8]) -> i64 {
    let blocks = split_blocks(payload, store.record_data_size());
    let ids: Vec<u64> = blocks.iter().map(|_| store.next_id()).collect();
    for (position, block) in blocks.into_iter().enumerate() {
        let mut record = DynamicRecord::new(ids[position], position == 0, block);
        if let Some(&next) = ids.get(position + 1) {
            record.next = next as i64;
        }
        store.insert(record);
    }
    ids[0] as i64
}

fn create_token(stores: &MemoryTokenStores, name: &str) -> i64 {
    let name_id = write_chain(&stores.names, name.as_bytes());
    let id = stores.tokens.next_id();
    stores.tokens.insert(TokenRecord::new(id, name_id));
    id as i64
}
