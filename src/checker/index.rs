//! Value index checking: which indexes are probed per entity, which are checked from the
//! index side through the cache, and the validation of every index entry.

use std::sync::Arc;

use tracing::debug;

use super::cache::{index_slot, INDEX_ENTRY};
use super::compliance::{entity_view, index_values, record_type_of};
use super::{CheckerContext, IdRange, MemoryLimiter};
use crate::error::Result;
use crate::index::IndexAccessor;
use crate::report::{Inconsistency, RecordType};
use crate::schema::{EntityType, IndexDescriptor};
use crate::store::hash_values;

#[derive(Debug, Default)]
struct Partition {
    small: Vec<IndexDescriptor>,
    large: Vec<IndexDescriptor>,
}

/// Online value indexes split by size.
///
/// An index is large when its estimated entry count divided by the entity high id
/// exceeds the configured threshold. Small indexes are probed once per entity; large ones
/// are read range by range into the cache and compared against a scan of the entities.
#[derive(Debug, Default)]
pub struct IndexSizes {
    nodes: Partition,
    relationships: Partition,
}

impl IndexSizes {
    /// Classifies the online indexes of the context's snapshot. Empty when index checks
    /// are disabled.
    pub fn select(ctx: &CheckerContext) -> Self {
        let mut sizes = Self::default();
        if !ctx.flags().check_indexes {
            return sizes;
        }
        let snapshot = ctx.indexes();
        for descriptor in snapshot.online_rules() {
            let Some(accessor) = snapshot.accessor(descriptor.id) else {
                continue;
            };
            let high_id = match descriptor.schema.entity {
                EntityType::Node => ctx.high_node_id(),
                EntityType::Relationship => ctx.high_relationship_id(),
            };
            let ratio = accessor.estimated_entry_count() as f64 / high_id.max(1) as f64;
            let large = ratio > ctx.large_index_threshold();
            debug!(
                target: "sombra_check::index",
                index = descriptor.id,
                name = %descriptor.name,
                ratio,
                large,
                "index size classified"
            );
            let partition = match descriptor.schema.entity {
                EntityType::Node => &mut sizes.nodes,
                EntityType::Relationship => &mut sizes.relationships,
            };
            if large {
                partition.large.push(descriptor);
            } else {
                partition.small.push(descriptor);
            }
        }
        sizes
    }

    fn partition(&self, entity: EntityType) -> &Partition {
        match entity {
            EntityType::Node => &self.nodes,
            EntityType::Relationship => &self.relationships,
        }
    }

    /// Indexes probed per entity.
    pub fn small(&self, entity: EntityType) -> &[IndexDescriptor] {
        &self.partition(entity).small
    }

    /// Indexes checked from the index side.
    pub fn large(&self, entity: EntityType) -> &[IndexDescriptor] {
        &self.partition(entity).large
    }
}

/// Checks entity presence in large indexes through the `INDEX_ENTRY` cache.
pub(crate) struct LargeIndexChecker<'a> {
    ctx: &'a CheckerContext,
    sizes: &'a IndexSizes,
}

impl<'a> LargeIndexChecker<'a> {
    pub(crate) fn new(ctx: &'a CheckerContext, sizes: &'a IndexSizes) -> Self {
        Self { ctx, sizes }
    }

    pub(crate) fn check(&self, entity: EntityType) -> Result<()> {
        let large = self.sizes.large(entity);
        if large.is_empty() {
            return Ok(());
        }
        let high_id = match entity {
            EntityType::Node => self.ctx.high_node_id(),
            EntityType::Relationship => self.ctx.high_relationship_id(),
        };
        let limiter = MemoryLimiter::new(
            self.ctx.memory_limit_bytes(),
            INDEX_ENTRY.bytes_per_slot(),
        );
        let snapshot = self.ctx.indexes();
        for range in limiter.ranges(high_id) {
            for descriptor in large {
                let Some(accessor) = snapshot.accessor(descriptor.id) else {
                    continue;
                };
                self.check_range(entity, descriptor, accessor, range)?;
            }
        }
        self.ctx.cache().clear();
        Ok(())
    }

    fn check_range(
        &self,
        entity: EntityType,
        descriptor: &IndexDescriptor,
        accessor: Arc<dyn IndexAccessor>,
        range: IdRange,
    ) -> Result<()> {
        let cache = self.ctx.cache().prepare(INDEX_ENTRY, range);
        let execution = self.ctx.execution();
        execution.run("large index entries", range, |chunk| {
            for entry in accessor.entries(chunk.range)? {
                if !cache.covers(entry.entity) {
                    continue;
                }
                cache.add(entry.entity, index_slot::COUNT, 1);
                cache.put(entry.entity, index_slot::HASH, hash_values(&entry.values));
            }
            Ok(())
        })?;

        let silent = self.ctx.without_reporting();
        let token = i64::from(descriptor.schema.token_id);
        let record_type = record_type_of(entity);
        execution.run("large index compliance", range, |chunk| {
            for id in chunk.range.start..chunk.range.end {
                let view = entity_view(&silent, entity, id)?;
                if !view.in_use || !view.tokens.contains(&token) {
                    continue;
                }
                let Some(values) = view.values.as_ref() else {
                    continue;
                };
                let Some(indexed) = index_values(descriptor, values) else {
                    continue;
                };
                let count = cache.get(id, index_slot::COUNT);
                if count == 0 || (count == 1 && cache.get(id, index_slot::HASH) != hash_values(&indexed)) {
                    self.ctx.reporter().report(
                        record_type,
                        id,
                        Inconsistency::NotIndexed {
                            index: descriptor.id,
                            values: indexed,
                        },
                    );
                } else if count > 1 {
                    self.ctx.reporter().report(
                        record_type,
                        id,
                        Inconsistency::IndexedMultipleTimes {
                            index: descriptor.id,
                            count,
                        },
                    );
                }
            }
            Ok(())
        })
    }
}

/// Validates every entry of every online index against the entity it names.
pub(crate) struct IndexEntryChecker<'a> {
    ctx: &'a CheckerContext,
}

impl<'a> IndexEntryChecker<'a> {
    pub(crate) fn new(ctx: &'a CheckerContext) -> Self {
        Self { ctx }
    }

    pub(crate) fn check(&self) -> Result<()> {
        let snapshot = self.ctx.indexes();
        let silent = self.ctx.without_reporting();
        for descriptor in snapshot.online_rules() {
            let Some(accessor) = snapshot.accessor(descriptor.id) else {
                continue;
            };
            let entity = descriptor.schema.entity;
            let high_id = match entity {
                EntityType::Node => self.ctx.high_node_id(),
                EntityType::Relationship => self.ctx.high_relationship_id(),
            };
            let token = descriptor.schema.token_id;
            self.ctx
                .execution()
                .run("index entries", IdRange::new(0, high_id), |chunk| {
                    let range = if chunk.last {
                        chunk.range.to_end_of_space()
                    } else {
                        chunk.range
                    };
                    for entry in accessor.entries(range)? {
                        let view = entity_view(&silent, entity, entry.entity)?;
                        let finding = if !view.in_use {
                            Inconsistency::IndexedEntityNotInUse {
                                entity: entry.entity,
                            }
                        } else if !view.tokens.contains(&i64::from(token)) {
                            Inconsistency::IndexedEntityDoesNotHaveExpectedToken {
                                entity: entry.entity,
                                token,
                            }
                        } else {
                            match view.values.as_ref() {
                                Some(values)
                                    if index_values(&descriptor, values).as_deref()
                                        != Some(entry.values.as_slice()) =>
                                {
                                    Inconsistency::IndexEntryValueMismatch {
                                        entity: entry.entity,
                                    }
                                }
                                _ => continue,
                            }
                        };
                        self.ctx
                            .reporter()
                            .report(RecordType::Index, descriptor.id, finding);
                    }
                    Ok(())
                })?;
        }
        Ok(())
    }
}
