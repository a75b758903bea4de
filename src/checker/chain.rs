//! Relationship chain links, checked over relationship-id ranges in two directions.
//!
//! The forward pass caches each relationship's `prev` pointers and checks every `next`
//! link that lands in the range. The backward pass caches `next` pointers and checks the
//! `prev` links of relationships that are not first in that chain.

use super::cache::{relationship_slot as slot, Cache, Direction, RELATIONSHIP_LINK};
use super::{CheckerContext, IdRange, MemoryLimiter};
use crate::error::Result;
use crate::report::{ChainLink, Inconsistency, RecordType};
use crate::store::{NodeEnd, RelationshipRecord, NULL_REFERENCE};

fn node_column(end: NodeEnd) -> usize {
    match end {
        NodeEnd::Source => slot::SOURCE_NODE,
        NodeEnd::Target => slot::TARGET_NODE,
    }
}

fn pointer_column(end: NodeEnd) -> usize {
    match end {
        NodeEnd::Source => slot::SOURCE_POINTER,
        NodeEnd::Target => slot::TARGET_POINTER,
    }
}

fn first_flag(end: NodeEnd) -> u64 {
    match end {
        NodeEnd::Source => slot::FIRST_IN_SOURCE,
        NodeEnd::Target => slot::FIRST_IN_TARGET,
    }
}

pub(crate) struct RelationshipChainChecker<'a> {
    ctx: &'a CheckerContext,
}

impl<'a> RelationshipChainChecker<'a> {
    pub(crate) fn new(ctx: &'a CheckerContext) -> Self {
        Self { ctx }
    }

    pub(crate) fn check(&self) -> Result<()> {
        let high_id = self.ctx.high_relationship_id();
        let limiter = MemoryLimiter::new(
            self.ctx.memory_limit_bytes(),
            RELATIONSHIP_LINK.bytes_per_slot(),
        );
        let ranges = limiter.ranges(high_id);
        for direction in [Direction::Forward, Direction::Backward] {
            self.ctx.cache().set_direction(direction);
            for (index, range) in ranges.iter().enumerate() {
                let cache = self.ctx.cache().prepare(RELATIONSHIP_LINK, *range);
                self.ctx
                    .execution()
                    .run("relationship chain cache", *range, |chunk| {
                        self.populate(&cache, chunk.range, direction)
                    })?;
                self.ctx.execution().run(
                    "relationship chain links",
                    IdRange::new(0, high_id),
                    |chunk| self.check_links(&cache, chunk.range, direction, index == 0),
                )?;
            }
        }
        self.ctx.cache().clear();
        self.ctx.cache().set_direction(Direction::Forward);
        Ok(())
    }

    fn populate(&self, cache: &Cache, range: IdRange, direction: Direction) -> Result<()> {
        let store = self.ctx.stores().relationships.as_ref();
        for id in range.start..range.end {
            let relationship = self.ctx.lookup(store, id)?;
            if !relationship.in_use {
                continue;
            }
            let mut flags = slot::IN_USE;
            for end in NodeEnd::BOTH {
                if relationship.first_in_chain(end) {
                    flags |= first_flag(end);
                }
                cache.put_reference(id, node_column(end), relationship.node(end));
                let pointer = match direction {
                    Direction::Forward => relationship.prev(end),
                    Direction::Backward => relationship.next(end),
                };
                cache.put_reference(id, pointer_column(end), pointer);
            }
            cache.put(id, slot::FLAGS, flags);
        }
        Ok(())
    }

    fn check_links(
        &self,
        cache: &Cache,
        range: IdRange,
        direction: Direction,
        first_range: bool,
    ) -> Result<()> {
        let store = self.ctx.stores().relationships.as_ref();
        for id in range.start..range.end {
            let relationship = self.ctx.lookup(store, id)?;
            if !relationship.in_use {
                continue;
            }
            for end in NodeEnd::BOTH {
                self.check_link(cache, &relationship, end, direction, first_range);
            }
        }
        Ok(())
    }

    fn check_link(
        &self,
        cache: &Cache,
        relationship: &RelationshipRecord,
        end: NodeEnd,
        direction: Direction,
        first_range: bool,
    ) {
        let (link, target) = match direction {
            Direction::Forward => (ChainLink::Next, relationship.next(end)),
            Direction::Backward => {
                if relationship.first_in_chain(end) {
                    return;
                }
                (ChainLink::Prev, relationship.prev(end))
            }
        };
        if target == NULL_REFERENCE {
            return;
        }
        let reporter = self.ctx.reporter();
        let report = |kind| reporter.report(RecordType::Relationship, relationship.id, kind);
        if target < 0 || target as u64 >= self.ctx.high_relationship_id() {
            if first_range {
                report(Inconsistency::RelationshipChainNotInUse {
                    end,
                    link,
                    relationship: target,
                });
            }
            return;
        }
        let target_id = target as u64;
        if !cache.covers(target_id) {
            return;
        }
        let flags = cache.get(target_id, slot::FLAGS);
        if flags & slot::IN_USE == 0 {
            report(Inconsistency::RelationshipChainNotInUse {
                end,
                link,
                relationship: target,
            });
            return;
        }
        let node = relationship.node(end);
        let side = if cache.get_reference(target_id, slot::SOURCE_NODE) == node {
            NodeEnd::Source
        } else if cache.get_reference(target_id, slot::TARGET_NODE) == node {
            NodeEnd::Target
        } else {
            report(Inconsistency::RelationshipChainReferencesOtherNodes {
                end,
                link,
                relationship: target,
            });
            return;
        };
        // the prev field of a chain head holds the chain degree
        let head = direction == Direction::Forward && flags & first_flag(side) != 0;
        if head || cache.get_reference(target_id, pointer_column(side)) != relationship.id as i64 {
            report(Inconsistency::RelationshipChainDoesNotReferenceBack {
                end,
                link,
                relationship: target,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::testing::{context_with, Collected};
    use crate::config::CheckConfig;
    use crate::store::MemoryStores;

    /// Two relationships between nodes 0 and 1: 1 is the head of both chains, then 0.
    fn pair(stores: &MemoryStores) {
        let mut head = RelationshipRecord::new(1, 0, 1, 0);
        head.first_prev_rel = 2;
        head.second_prev_rel = 2;
        head.first_next_rel = 0;
        head.second_next_rel = 0;
        let mut tail = RelationshipRecord::new(0, 0, 1, 0);
        tail.first_in_first_chain = false;
        tail.first_in_second_chain = false;
        tail.first_prev_rel = 1;
        tail.second_prev_rel = 1;
        stores.relationships.insert(head);
        stores.relationships.insert(tail);
    }

    fn run(stores: &MemoryStores, memory: u64) -> Collected {
        let config = CheckConfig::default().with_memory_limit(memory);
        let (ctx, collected) = context_with(stores, &config);
        RelationshipChainChecker::new(&ctx).check().expect("check");
        collected
    }

    #[test]
    fn consistent_chain_in_one_and_many_ranges() {
        let stores = MemoryStores::default();
        pair(&stores);
        assert!(run(&stores, 1 << 20).findings().is_empty());
        assert!(run(&stores, 1).findings().is_empty());
    }

    #[test]
    fn broken_links_in_both_directions() {
        let stores = MemoryStores::default();
        pair(&stores);
        stores.relationships.update(0, |r| r.second_prev_rel = 5);
        stores.relationships.update(1, |r| r.first_next_rel = 1);
        let expected: Vec<_> = [
            (0, Inconsistency::RelationshipChainDoesNotReferenceBack {
                end: NodeEnd::Source,
                link: ChainLink::Prev,
                relationship: 1,
            }),
            (0, Inconsistency::RelationshipChainNotInUse {
                end: NodeEnd::Target,
                link: ChainLink::Prev,
                relationship: 5,
            }),
            (1, Inconsistency::RelationshipChainDoesNotReferenceBack {
                end: NodeEnd::Source,
                link: ChainLink::Next,
                relationship: 1,
            }),
            (1, Inconsistency::RelationshipChainDoesNotReferenceBack {
                end: NodeEnd::Target,
                link: ChainLink::Next,
                relationship: 0,
            }),
        ]
        .into_iter()
        .map(|(id, kind)| (RecordType::Relationship, id, kind))
        .collect();
        assert_eq!(run(&stores, 1 << 20).kinds(), expected);
        assert_eq!(run(&stores, 1).kinds(), expected);
    }

    #[test]
    fn link_into_a_chain_of_other_nodes() {
        let stores = MemoryStores::default();
        pair(&stores);
        stores.relationships.insert(RelationshipRecord::new(2, 5, 6, 0));
        stores.relationships.update(1, |r| r.first_next_rel = 2);
        let expected: Vec<_> = [
            (0, Inconsistency::RelationshipChainDoesNotReferenceBack {
                end: NodeEnd::Source,
                link: ChainLink::Prev,
                relationship: 1,
            }),
            (1, Inconsistency::RelationshipChainReferencesOtherNodes {
                end: NodeEnd::Source,
                link: ChainLink::Next,
                relationship: 2,
            }),
        ]
        .into_iter()
        .map(|(id, kind)| (RecordType::Relationship, id, kind))
        .collect();
        assert_eq!(run(&stores, 1 << 20).kinds(), expected);
        assert_eq!(run(&stores, 1).kinds(), expected);
    }

    #[test]
    fn second_side_of_a_loop_is_followed() {
        let stores = MemoryStores::default();
        stores.relationships.insert(RelationshipRecord::new(0, 3, 3, 0));
        assert!(run(&stores, 1 << 20).findings().is_empty());
        stores.relationships.update(0, |r| r.second_next_rel = 5);
        assert_eq!(
            run(&stores, 1 << 20).kinds(),
            vec![(
                RecordType::Relationship,
                0,
                Inconsistency::RelationshipChainNotInUse {
                    end: NodeEnd::Target,
                    link: ChainLink::Next,
                    relationship: 5,
                }
            )]
        );
    }
}
