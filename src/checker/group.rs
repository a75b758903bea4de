//! Relationship group records of dense nodes.

use super::cache::{node_slot, Cache};
use super::token::{TokenKind, TokenUse};
use super::{CheckerContext, IdRange};
use crate::error::Result;
use crate::report::{Inconsistency, RecordType};
use crate::store::{
    reference, GroupDirection, RecordStore, RelationshipGroupRecord, RelationshipRecord,
    NULL_REFERENCE,
};

pub(crate) struct RelationshipGroupChecker<'a> {
    ctx: &'a CheckerContext,
}

impl<'a> RelationshipGroupChecker<'a> {
    pub(crate) fn new(ctx: &'a CheckerContext) -> Self {
        Self { ctx }
    }

    /// Scans every group against the owners cached in `cache`, confirming the dense
    /// nodes whose first group it is.
    pub(crate) fn check(&self, cache: &Cache, first_range: bool) -> Result<()> {
        let store = self.ctx.stores().relationship_groups.clone();
        self.ctx.execution().run(
            "relationship groups",
            IdRange::new(0, store.high_id()),
            |chunk| {
                for id in chunk.range.start..chunk.range.end {
                    let group = if first_range {
                        self.ctx.read(store.as_ref(), RecordType::RelationshipGroup, id)?
                    } else {
                        self.ctx.lookup(store.as_ref(), id)?
                    };
                    if !group.in_use {
                        continue;
                    }
                    self.check_owner_in_range(cache, &group);
                    if first_range {
                        self.check_group(&group)?;
                    }
                }
                Ok(())
            },
        )
    }

    fn check_owner_in_range(&self, cache: &Cache, group: &RelationshipGroupRecord) {
        let Some(owner) = reference(group.owning_node) else {
            return;
        };
        if !cache.covers(owner) {
            return;
        }
        let flags = cache.get(owner, node_slot::FLAGS);
        if flags & node_slot::IN_USE == 0 {
            self.ctx.reporter().report(
                RecordType::RelationshipGroup,
                group.id,
                Inconsistency::OwnerNotInUse {
                    owner: group.owning_node,
                },
            );
        } else if flags & node_slot::DENSE != 0
            && cache.get_reference(owner, node_slot::NEXT_REL) == group.id as i64
        {
            cache.clear_flag(owner, node_slot::FLAGS, node_slot::CHECK_MARK);
        }
    }

    fn check_group(&self, group: &RelationshipGroupRecord) -> Result<()> {
        let reporter = self.ctx.reporter();
        let id = group.id;
        let owner = group.owning_node;
        if owner < 0 {
            reporter.report(
                RecordType::RelationshipGroup,
                id,
                Inconsistency::IllegalOwner { owner },
            );
        } else if owner as u64 >= self.ctx.high_node_id() {
            reporter.report(
                RecordType::RelationshipGroup,
                id,
                Inconsistency::OwnerNotInUse { owner },
            );
        }
        let type_id = group.type_id;
        match self.ctx.token_use(TokenKind::RelationshipType, type_id)? {
            TokenUse::Valid => {}
            TokenUse::Illegal => reporter.report(
                RecordType::RelationshipGroup,
                id,
                Inconsistency::IllegalRelationshipType { type_id },
            ),
            TokenUse::NotInUse => reporter.report(
                RecordType::RelationshipGroup,
                id,
                Inconsistency::RelationshipTypeNotInUse { type_id },
            ),
        }
        if group.next != NULL_REFERENCE {
            let groups = self.ctx.stores().relationship_groups.as_ref();
            match self.ctx.follow(groups, group.next)? {
                Some(next) if next.in_use => {
                    if next.owning_node != owner {
                        reporter.report(
                            RecordType::RelationshipGroup,
                            id,
                            Inconsistency::NextGroupHasOtherOwner {
                                group: group.next,
                                owner: next.owning_node,
                            },
                        );
                    }
                    if next.type_id <= type_id {
                        reporter.report(
                            RecordType::RelationshipGroup,
                            id,
                            Inconsistency::InvalidTypeSortOrder { group: group.next },
                        );
                    }
                }
                _ => reporter.report(
                    RecordType::RelationshipGroup,
                    id,
                    Inconsistency::NextGroupNotInUse { group: group.next },
                ),
            }
        }
        for direction in GroupDirection::ALL {
            self.check_first_relationship(group, direction)?;
        }
        Ok(())
    }

    fn check_first_relationship(
        &self,
        group: &RelationshipGroupRecord,
        direction: GroupDirection,
    ) -> Result<()> {
        let first = group.first(direction);
        if first == NULL_REFERENCE {
            return Ok(());
        }
        let reporter = self.ctx.reporter();
        let relationships = self.ctx.stores().relationships.as_ref();
        let relationship = match self.ctx.follow(relationships, first)? {
            Some(relationship) if relationship.in_use => relationship,
            _ => {
                reporter.report(
                    RecordType::RelationshipGroup,
                    group.id,
                    Inconsistency::FirstRelationshipNotInUse {
                        direction,
                        relationship: first,
                    },
                );
                return Ok(());
            }
        };
        if relationship.type_id != group.type_id {
            reporter.report(
                RecordType::RelationshipGroup,
                group.id,
                Inconsistency::FirstRelationshipOfOtherType {
                    direction,
                    relationship: first,
                },
            );
        }
        if !heads_chain(&relationship, group.owning_node, direction) {
            reporter.report(
                RecordType::RelationshipGroup,
                group.id,
                Inconsistency::FirstRelationshipNotFirstInChain {
                    direction,
                    relationship: first,
                },
            );
        }
        Ok(())
    }
}

/// Whether `relationship` starts `owner`'s chain in `direction`.
fn heads_chain(relationship: &RelationshipRecord, owner: i64, direction: GroupDirection) -> bool {
    GroupDirection::of(relationship, owner) == Some(direction)
        && match direction {
            GroupDirection::Outgoing | GroupDirection::Loop => relationship.first_in_first_chain,
            GroupDirection::Incoming => relationship.first_in_second_chain,
        }
}
