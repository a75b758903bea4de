//! Schema rule validation and the mandatory-property map it produces.

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use super::token::{TokenKind, TokenUse};
use super::CheckerContext;
use crate::error::Result;
use crate::report::{Inconsistency, RecordType};
use crate::schema::{EntityType, RuleContent, SchemaRule};
use crate::store::RecordStore;

/// Property keys every entity with a given token must carry.
#[derive(Debug, Default)]
pub(crate) struct MandatoryProperties {
    nodes: FxHashMap<i64, BTreeSet<i32>>,
    relationships: FxHashMap<i64, BTreeSet<i32>>,
}

impl MandatoryProperties {
    fn add(&mut self, entity: EntityType, token: i32, keys: &[i32]) {
        let map = match entity {
            EntityType::Node => &mut self.nodes,
            EntityType::Relationship => &mut self.relationships,
        };
        map.entry(i64::from(token))
            .or_default()
            .extend(keys.iter().copied());
    }

    /// Union of the mandatory keys of `tokens`.
    pub(crate) fn keys_for(&self, entity: EntityType, tokens: &[i64]) -> BTreeSet<i32> {
        let map = match entity {
            EntityType::Node => &self.nodes,
            EntityType::Relationship => &self.relationships,
        };
        tokens
            .iter()
            .filter_map(|token| map.get(token))
            .flatten()
            .copied()
            .collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.relationships.is_empty()
    }
}

/// Validates every schema rule against the token stores and against each other.
pub(crate) struct SchemaChecker<'a> {
    ctx: &'a CheckerContext,
}

impl<'a> SchemaChecker<'a> {
    pub(crate) fn new(ctx: &'a CheckerContext) -> Self {
        Self { ctx }
    }

    /// Runs the pass and returns the mandatory-property map of the valid rules.
    pub(crate) fn check(&self) -> Result<MandatoryProperties> {
        let rules = self.load_rules()?;
        for rule in rules.values() {
            self.check_tokens(rule)?;
        }
        self.check_duplicates(&rules);
        self.check_obligations(&rules);
        self.check_online(&rules);

        let mut mandatory = MandatoryProperties::default();
        for rule in rules.values() {
            if let SchemaRule::Constraint(constraint) = rule {
                if constraint.kind.requires_existence() {
                    mandatory.add(
                        constraint.schema.entity,
                        constraint.schema.token_id,
                        &constraint.schema.property_keys,
                    );
                }
            }
        }
        debug!(
            target: "sombra_check::schema",
            rules = rules.len(),
            mandatory = !mandatory.is_empty(),
            "schema rules checked"
        );
        Ok(mandatory)
    }

    fn load_rules(&self) -> Result<BTreeMap<u64, SchemaRule>> {
        let store = self.ctx.stores().schema.as_ref();
        let mut rules = BTreeMap::new();
        for id in 0..store.high_id() {
            let record = self.ctx.read(store, RecordType::Schema, id)?;
            if !record.in_use {
                continue;
            }
            match SchemaRule::decode(id, &record.data) {
                Ok(rule) => {
                    rules.insert(id, rule);
                }
                Err(err) => self.ctx.reporter().report(
                    RecordType::Schema,
                    id,
                    Inconsistency::MalformedSchemaRule {
                        detail: err.to_string(),
                    },
                ),
            }
        }
        Ok(rules)
    }

    fn check_tokens(&self, rule: &SchemaRule) -> Result<()> {
        let reporter = self.ctx.reporter();
        let schema = rule.schema();
        let token = i64::from(schema.token_id);
        let (kind, finding) = match schema.entity {
            EntityType::Node => (
                TokenKind::Label,
                Inconsistency::LabelNotInUse { label: token },
            ),
            EntityType::Relationship => (
                TokenKind::RelationshipType,
                Inconsistency::RelationshipTypeNotInUse { type_id: token },
            ),
        };
        if self.ctx.token_use(kind, token)? != TokenUse::Valid {
            reporter.report(RecordType::Schema, rule.id(), finding);
        }
        for &key in &schema.property_keys {
            if self.ctx.token_use(TokenKind::PropertyKey, i64::from(key))? != TokenUse::Valid {
                reporter.report(
                    RecordType::Schema,
                    rule.id(),
                    Inconsistency::PropertyKeyNotInUse { key },
                );
            }
        }
        Ok(())
    }

    fn check_duplicates(&self, rules: &BTreeMap<u64, SchemaRule>) {
        let mut seen: FxHashMap<RuleContent, u64> = FxHashMap::default();
        for (&id, rule) in rules {
            match seen.get(&rule.content()) {
                Some(&canonical) => self.ctx.reporter().report(
                    RecordType::Schema,
                    id,
                    Inconsistency::DuplicateRuleContent { canonical },
                ),
                None => {
                    seen.insert(rule.content(), id);
                }
            }
        }
    }

    fn check_obligations(&self, rules: &BTreeMap<u64, SchemaRule>) {
        let reporter = self.ctx.reporter();
        let mut claimed_constraints: FxHashMap<u64, u64> = FxHashMap::default();
        let mut claimed_indexes: FxHashMap<u64, u64> = FxHashMap::default();
        let mut owned_indexes: FxHashSet<u64> = FxHashSet::default();

        for (&id, rule) in rules {
            let SchemaRule::Constraint(constraint) = rule else {
                continue;
            };
            if !constraint.kind.is_index_backed() {
                continue;
            }
            let Some(index_id) = constraint.owned_index else {
                reporter.report(
                    RecordType::Schema,
                    id,
                    Inconsistency::MissingObligation { obligation: None },
                );
                continue;
            };
            owned_indexes.insert(index_id);
            if let Some(&other) = claimed_indexes.get(&index_id) {
                reporter.report(
                    RecordType::Schema,
                    id,
                    Inconsistency::DuplicateObligation {
                        obligation: index_id,
                        other,
                    },
                );
            } else {
                claimed_indexes.insert(index_id, id);
            }
            match rules.get(&index_id) {
                Some(SchemaRule::Index(index)) => {
                    if index.owning_constraint != Some(id) {
                        reporter.report(
                            RecordType::Schema,
                            index_id,
                            Inconsistency::UniquenessConstraintNotReferencingBack {
                                constraint: id,
                            },
                        );
                    }
                    if !index.unique || index.index_type != constraint.index_type {
                        reporter.report(
                            RecordType::Schema,
                            id,
                            Inconsistency::UniquenessConstraintReferencingIndexOfWrongType {
                                index: index_id,
                            },
                        );
                    }
                }
                _ => reporter.report(
                    RecordType::Schema,
                    id,
                    Inconsistency::MissingObligation {
                        obligation: Some(index_id),
                    },
                ),
            }
        }

        for (&id, rule) in rules {
            let SchemaRule::Index(index) = rule else {
                continue;
            };
            let Some(constraint_id) = index.owning_constraint else {
                if index.unique && !owned_indexes.contains(&id) {
                    reporter.report(
                        RecordType::Schema,
                        id,
                        Inconsistency::MissingObligation { obligation: None },
                    );
                }
                continue;
            };
            if let Some(&other) = claimed_constraints.get(&constraint_id) {
                reporter.report(
                    RecordType::Schema,
                    id,
                    Inconsistency::DuplicateObligation {
                        obligation: constraint_id,
                        other,
                    },
                );
            } else {
                claimed_constraints.insert(constraint_id, id);
            }
            match rules.get(&constraint_id) {
                Some(SchemaRule::Constraint(constraint)) => {
                    if constraint.owned_index != Some(id) {
                        reporter.report(
                            RecordType::Schema,
                            constraint_id,
                            Inconsistency::ConstraintIndexRuleNotReferencingBack { index: id },
                        );
                    }
                }
                _ => reporter.report(
                    RecordType::Schema,
                    id,
                    Inconsistency::MissingObligation {
                        obligation: Some(constraint_id),
                    },
                ),
            }
        }
    }

    fn check_online(&self, rules: &BTreeMap<u64, SchemaRule>) {
        if !self.ctx.flags().check_indexes {
            return;
        }
        for descriptor in self.ctx.indexes().not_online_rules() {
            let Some(SchemaRule::Index(index)) = rules.get(&descriptor.id) else {
                continue;
            };
            let backs_constraint = index.owning_constraint.is_some()
                || rules.values().any(|rule| {
                    matches!(rule, SchemaRule::Constraint(c) if c.owned_index == Some(index.id))
                });
            self.ctx.reporter().report(
                RecordType::Schema,
                index.id,
                Inconsistency::SchemaRuleNotOnline {
                    constraint_index: backs_constraint,
                },
            );
        }
    }
}
