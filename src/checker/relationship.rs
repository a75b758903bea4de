//! Relationship records against the nodes of the current range, their first-round checks,
//! the relationship type index, and the node references left unconfirmed afterwards.

use super::cache::{node_slot, Cache};
use super::compliance::SchemaComplianceChecker;
use super::property::SafePropertyChainReader;
use super::scan::TokenScanCursor;
use super::token::{TokenKind, TokenUse};
use super::{CheckerContext, IdRange};
use crate::error::Result;
use crate::report::{Inconsistency, RecordType};
use crate::schema::EntityType;
use crate::store::{reference, NodeEnd, RelationshipRecord, NULL_REFERENCE};

pub(crate) struct RelationshipChecker<'a> {
    ctx: &'a CheckerContext,
    compliance: &'a SchemaComplianceChecker<'a>,
}

impl<'a> RelationshipChecker<'a> {
    pub(crate) fn new(ctx: &'a CheckerContext, compliance: &'a SchemaComplianceChecker<'a>) -> Self {
        Self { ctx, compliance }
    }

    /// Scans every relationship against the nodes cached in `cache`. Checks that do not
    /// depend on the node range run only when `first_range` is set.
    pub(crate) fn check(&self, cache: &Cache, first_range: bool) -> Result<()> {
        let structure = self.ctx.flags().check_structure;
        if !first_range && !structure {
            return Ok(());
        }
        let high_id = self.ctx.high_relationship_id();
        let type_index = first_range && self.ctx.flags().check_relationship_type_index;
        self.ctx
            .execution()
            .run("relationships", IdRange::new(0, high_id), |chunk| {
                let mut entries = TokenScanCursor::new(if type_index {
                    let scan = if chunk.last {
                        chunk.range.to_end_of_space()
                    } else {
                        chunk.range
                    };
                    self.ctx.relationship_type_index().entries(scan)?
                } else {
                    Vec::new()
                });
                let store = self.ctx.stores().relationships.as_ref();
                for id in chunk.range.start..chunk.range.end {
                    let relationship = if first_range {
                        self.ctx.read(store, RecordType::Relationship, id)?
                    } else {
                        self.ctx.lookup(store, id)?
                    };
                    if type_index {
                        let indexed = entries.take(id, |stray| self.report_stray(stray));
                        self.compare_with_index(&relationship, indexed);
                    }
                    if !relationship.in_use {
                        continue;
                    }
                    let is_loop = relationship.first_node == relationship.second_node;
                    for end in NodeEnd::BOTH.into_iter().filter(|_| structure) {
                        let Some(node) = reference(relationship.node(end)) else {
                            continue;
                        };
                        if !cache.covers(node) {
                            continue;
                        }
                        if is_loop && end == NodeEnd::Target {
                            self.check_loop_target(cache, &relationship, node);
                        } else {
                            self.check_endpoint(cache, &relationship, end, node);
                        }
                    }
                    if first_range {
                        self.check_first_round(&relationship)?;
                    }
                }
                entries.finish(|stray| self.report_stray(stray));
                Ok(())
            })
    }

    fn check_endpoint(&self, cache: &Cache, relationship: &RelationshipRecord, end: NodeEnd, node: u64) {
        let reporter = self.ctx.reporter();
        let node_ref = node as i64;
        let flags = cache.get(node, node_slot::FLAGS);
        if flags & node_slot::IN_USE == 0 {
            reporter.report(
                RecordType::Relationship,
                relationship.id,
                Inconsistency::NodeNotInUse {
                    end,
                    node: node_ref,
                },
            );
            return;
        }
        let next_rel = cache.get_reference(node, node_slot::NEXT_REL);
        if next_rel == NULL_REFERENCE {
            reporter.report(
                RecordType::Relationship,
                relationship.id,
                Inconsistency::NodeHasNoRelationships {
                    end,
                    node: node_ref,
                },
            );
            return;
        }
        if flags & node_slot::DENSE != 0 {
            return;
        }
        self.check_chain_head(cache, relationship, end, node, next_rel);
    }

    /// The second side of a loop shares its node with the first, so only its chain head
    /// flag is checked against the node.
    fn check_loop_target(&self, cache: &Cache, relationship: &RelationshipRecord, node: u64) {
        let flags = cache.get(node, node_slot::FLAGS);
        let next_rel = cache.get_reference(node, node_slot::NEXT_REL);
        let sparse = flags & node_slot::IN_USE != 0 && flags & node_slot::DENSE == 0;
        if sparse && next_rel != NULL_REFERENCE {
            self.check_chain_head(cache, relationship, NodeEnd::Target, node, next_rel);
        }
    }

    fn check_chain_head(
        &self,
        cache: &Cache,
        relationship: &RelationshipRecord,
        end: NodeEnd,
        node: u64,
        next_rel: i64,
    ) {
        let reporter = self.ctx.reporter();
        let node_ref = node as i64;
        let referenced = next_rel == relationship.id as i64;
        if relationship.first_in_chain(end) {
            if referenced {
                cache.clear_flag(node, node_slot::FLAGS, node_slot::CHECK_MARK);
            } else {
                // the node's own reference stays marked and is resolved afterwards
                reporter.report(
                    RecordType::Relationship,
                    relationship.id,
                    Inconsistency::NodeDoesNotReferenceBack {
                        end,
                        node: node_ref,
                    },
                );
            }
        } else if referenced {
            reporter.report(
                RecordType::Node,
                node,
                Inconsistency::RelationshipNotFirstInChain {
                    end,
                    relationship: relationship.id as i64,
                },
            );
        }
    }

    fn check_first_round(&self, relationship: &RelationshipRecord) -> Result<()> {
        let reporter = self.ctx.reporter();
        let id = relationship.id;
        for end in NodeEnd::BOTH {
            let node = relationship.node(end);
            if node < 0 {
                reporter.report(
                    RecordType::Relationship,
                    id,
                    Inconsistency::IllegalNode { end, node },
                );
            } else if node as u64 >= self.ctx.high_node_id() {
                reporter.report(
                    RecordType::Relationship,
                    id,
                    Inconsistency::NodeNotInUse { end, node },
                );
            }
        }
        let type_id = relationship.type_id;
        let type_use = self.ctx.token_use(TokenKind::RelationshipType, type_id)?;
        match type_use {
            TokenUse::Valid => {}
            TokenUse::Illegal => reporter.report(
                RecordType::Relationship,
                id,
                Inconsistency::IllegalRelationshipType { type_id },
            ),
            TokenUse::NotInUse => reporter.report(
                RecordType::Relationship,
                id,
                Inconsistency::RelationshipTypeNotInUse { type_id },
            ),
        }
        let (values, ok) = SafePropertyChainReader::new(self.ctx).read(
            RecordType::Relationship,
            id,
            relationship.next_prop,
        )?;
        if ok && type_use == TokenUse::Valid {
            self.compliance
                .check(EntityType::Relationship, id, &[type_id], &values)?;
        }
        Ok(())
    }

    fn report_stray(&self, relationship: u64) {
        self.ctx.reporter().report(
            RecordType::RelationshipTypeScanDocument,
            relationship,
            Inconsistency::IndexedRelationshipNotInUse { relationship },
        );
    }

    fn compare_with_index(&self, relationship: &RelationshipRecord, indexed: Option<Vec<i64>>) {
        let reporter = self.ctx.reporter();
        let id = relationship.id;
        if !relationship.in_use {
            if indexed.is_some() {
                reporter.report(
                    RecordType::RelationshipTypeScanDocument,
                    id,
                    Inconsistency::IndexedRelationshipNotInUse { relationship: id },
                );
            }
            return;
        }
        let type_id = relationship.type_id;
        let indexed = indexed.unwrap_or_default();
        if type_id >= 0 && !indexed.contains(&type_id) {
            reporter.report(
                RecordType::Relationship,
                id,
                Inconsistency::RelationshipTypeNotInIndex { type_id },
            );
        }
        for &other in indexed.iter().filter(|&&t| t != type_id) {
            reporter.report(
                RecordType::RelationshipTypeScanDocument,
                id,
                Inconsistency::RelationshipDoesNotHaveExpectedRelationshipType { type_id: other },
            );
        }
    }
}

/// Resolves node references no relationship or group confirmed during the range.
pub(crate) struct UnusedReferencesChecker<'a> {
    ctx: &'a CheckerContext,
}

impl<'a> UnusedReferencesChecker<'a> {
    pub(crate) fn new(ctx: &'a CheckerContext) -> Self {
        Self { ctx }
    }

    pub(crate) fn check(&self, cache: &Cache) -> Result<()> {
        let marked = node_slot::IN_USE | node_slot::CHECK_MARK;
        self.ctx
            .execution()
            .run("unused node references", cache.range(), |chunk| {
                for id in chunk.range.start..chunk.range.end {
                    if !cache.has_flag(id, node_slot::FLAGS, marked) {
                        continue;
                    }
                    let next = cache.get_reference(id, node_slot::NEXT_REL);
                    if cache.has_flag(id, node_slot::FLAGS, node_slot::DENSE) {
                        self.check_group_reference(id, next)?;
                    } else {
                        self.check_relationship_reference(id, next)?;
                    }
                }
                Ok(())
            })
    }

    fn check_relationship_reference(&self, node: u64, relationship: i64) -> Result<()> {
        let store = self.ctx.stores().relationships.as_ref();
        let finding = match self.ctx.follow(store, relationship)? {
            Some(record) if record.in_use => {
                if record.side_of(node as i64).is_some() {
                    return Ok(());
                }
                Inconsistency::RelationshipForOtherNode { relationship }
            }
            _ => Inconsistency::RelationshipNotInUse { relationship },
        };
        self.ctx.reporter().report(RecordType::Node, node, finding);
        Ok(())
    }

    fn check_group_reference(&self, node: u64, group: i64) -> Result<()> {
        let store = self.ctx.stores().relationship_groups.as_ref();
        let finding = match self.ctx.follow(store, group)? {
            Some(record) if record.in_use => {
                if record.owning_node == node as i64 {
                    return Ok(());
                }
                Inconsistency::RelationshipGroupHasOtherOwner {
                    group,
                    owner: record.owning_node,
                }
            }
            _ => Inconsistency::RelationshipGroupNotInUse { group },
        };
        self.ctx.reporter().report(RecordType::Node, node, finding);
        Ok(())
    }
}
