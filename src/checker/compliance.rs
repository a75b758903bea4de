//! Per-entity schema compliance: mandatory properties and value-index probes.

use super::index::IndexSizes;
use super::node::read_labels;
use super::property::{PropertyValues, SafePropertyChainReader};
use super::schema::MandatoryProperties;
use super::CheckerContext;
use crate::error::Result;
use crate::report::{Inconsistency, RecordType};
use crate::schema::{EntityType, IndexDescriptor};
use crate::store::Value;

/// Values of `values` in the key order of `index`, or `None` when a key is missing.
pub(crate) fn index_values(index: &IndexDescriptor, values: &PropertyValues) -> Option<Vec<Value>> {
    index
        .schema
        .property_keys
        .iter()
        .map(|key| values.get(key).cloned())
        .collect()
}

pub(crate) fn record_type_of(entity: EntityType) -> RecordType {
    match entity {
        EntityType::Node => RecordType::Node,
        EntityType::Relationship => RecordType::Relationship,
    }
}

/// What index checks need to know about one entity.
#[derive(Debug, Default)]
pub(crate) struct EntityView {
    pub(crate) in_use: bool,
    pub(crate) tokens: Vec<i64>,
    /// `None` when the property chain could not be read cleanly.
    pub(crate) values: Option<PropertyValues>,
}

/// Reads an entity through `ctx` for index checks; callers pass a silent context, since
/// the entity's own scan already reports what is wrong with it.
pub(crate) fn entity_view(ctx: &CheckerContext, entity: EntityType, id: u64) -> Result<EntityView> {
    let stores = ctx.stores();
    let (tokens, first_property) = match entity {
        EntityType::Node => {
            let node = ctx.lookup(stores.nodes.as_ref(), id)?;
            if !node.in_use {
                return Ok(EntityView::default());
            }
            let labels = read_labels(ctx, &node)?.unwrap_or_default();
            (labels, node.next_prop)
        }
        EntityType::Relationship => {
            let relationship = ctx.lookup(stores.relationships.as_ref(), id)?;
            if !relationship.in_use {
                return Ok(EntityView::default());
            }
            (vec![relationship.type_id], relationship.next_prop)
        }
    };
    let (values, ok) =
        SafePropertyChainReader::new(ctx).read(record_type_of(entity), id, first_property)?;
    Ok(EntityView {
        in_use: true,
        tokens,
        values: ok.then_some(values),
    })
}

/// Checks one entity against the mandatory-property map and the per-entity index probes.
pub(crate) struct SchemaComplianceChecker<'a> {
    ctx: &'a CheckerContext,
    mandatory: &'a MandatoryProperties,
    sizes: &'a IndexSizes,
}

impl<'a> SchemaComplianceChecker<'a> {
    pub(crate) fn new(
        ctx: &'a CheckerContext,
        mandatory: &'a MandatoryProperties,
        sizes: &'a IndexSizes,
    ) -> Self {
        Self {
            ctx,
            mandatory,
            sizes,
        }
    }

    pub(crate) fn check(
        &self,
        entity: EntityType,
        id: u64,
        tokens: &[i64],
        values: &PropertyValues,
    ) -> Result<()> {
        let record_type = record_type_of(entity);
        for key in self.mandatory.keys_for(entity, tokens) {
            if !values.contains_key(&key) {
                self.ctx.reporter().report(
                    record_type,
                    id,
                    Inconsistency::MissingMandatoryProperty { key },
                );
            }
        }
        if !self.ctx.flags().check_indexes {
            return Ok(());
        }
        for index in self.sizes.small(entity) {
            self.probe(index, record_type, id, tokens, values, true)?;
        }
        for index in self.sizes.large(entity).iter().filter(|index| index.unique) {
            self.probe(index, record_type, id, tokens, values, false)?;
        }
        Ok(())
    }

    fn probe(
        &self,
        index: &IndexDescriptor,
        record_type: RecordType,
        id: u64,
        tokens: &[i64],
        values: &PropertyValues,
        presence: bool,
    ) -> Result<()> {
        if !tokens.contains(&i64::from(index.schema.token_id)) {
            return Ok(());
        }
        let Some(indexed) = index_values(index, values) else {
            return Ok(());
        };
        let Some(accessor) = self.ctx.indexes().accessor(index.id) else {
            return Ok(());
        };
        let hits = accessor.lookup(&indexed)?;
        let reporter = self.ctx.reporter();
        if presence {
            let own = hits.iter().filter(|&&hit| hit == id).count() as u64;
            if own == 0 {
                reporter.report(
                    record_type,
                    id,
                    Inconsistency::NotIndexed {
                        index: index.id,
                        values: indexed,
                    },
                );
            } else if own > 1 {
                reporter.report(
                    record_type,
                    id,
                    Inconsistency::IndexedMultipleTimes {
                        index: index.id,
                        count: own,
                    },
                );
            }
        }
        if index.unique {
            if let Some(&duplicate) = hits.iter().find(|&&hit| hit != id) {
                reporter.report(
                    record_type,
                    id,
                    Inconsistency::UniqueIndexNotUnique {
                        index: index.id,
                        duplicate,
                    },
                );
            }
        }
        Ok(())
    }
}
