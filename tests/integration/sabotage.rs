#![allow(missing_docs)]

//! Damages one record of a consistent graph and checks the damage is reported.

use proptest::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use sombra_check::index::IndexAccessor;
use sombra_check::report::ChainLink;
use sombra_check::store::{
    LabelField, MemoryStore, NodeEnd, NodeRecord, PropertyBlockValue, PropertyRecord, Record,
    RecordStore, RelationshipRecord, Value, NULL_REFERENCE,
};
use sombra_check::{CheckConfig, Finding, FullCheck, GraphFixture, Inconsistency, RecordType};

struct World {
    graph: GraphFixture,
    hub: u64,
    people: Vec<u64>,
}

fn world() -> World {
    let mut graph = GraphFixture::new();
    let person = graph.label("Person");
    let city = graph.label("City");
    let tags: Vec<i64> = (0..5).map(|i| graph.label(&format!("Tag{i}"))).collect();
    let knows = graph.relationship_type("KNOWS");
    let lives_in = graph.relationship_type("LIVES_IN");
    let name = graph.property_key("name");
    let scores = graph.property_key("scores");
    let nick = graph.property_key("nick");
    graph.create_unique_constraint("person_name", person, &[name]);

    let hub = graph.create_dense_node(&[city], &[(name, Value::String("Gotham".into()))]);
    let people: Vec<u64> = (0..12)
        .map(|i| {
            let labels = match i % 4 {
                0 => [vec![person], tags.clone()].concat(),
                1 => vec![person, tags[0]],
                _ => vec![person],
            };
            graph.create_node(
                &labels,
                &[
                    (name, Value::String(format!("citizen of gotham {i}"))),
                    (nick, Value::String(format!("n{i}"))),
                    (scores, Value::FloatArray(vec![0.5; i + 1])),
                ],
            )
        })
        .collect();
    for (i, &p) in people.iter().enumerate() {
        graph.create_relationship(p, people[(i + 1) % people.len()], knows, &[]);
        graph.create_relationship(p, people[(i + 5) % people.len()], knows, &[]);
        graph.create_relationship(p, hub, lives_in, &[]);
    }
    World { graph, hub, people }
}

fn records<R: Record>(store: &MemoryStore<R>) -> Vec<R> {
    (0..store.high_id())
        .filter_map(|id| store.read(id))
        .filter(Record::in_use)
        .collect()
}

#[derive(Clone, Copy, Debug)]
enum Sabotage {
    NodeReferencesForeignRelationship,
    NodeReferencesUnusedRelationship,
    RelationshipEndpointPastHighId,
    RelationshipTypeUnknown,
    ChainTargetDeleted,
    PropertyKeyUnknown,
    StringRecordDeleted,
    LabelsReversed,
    FirstGroupStolen,
    LabelChainDeleted,
    PropertyChainLoops,
    LabelNameDeleted,
    DeletedNodeStillIndexed,
    TypeIndexDisagrees,
    DroppedFromUniqueIndex,
}

const ALL: [Sabotage; 15] = [
    Sabotage::NodeReferencesForeignRelationship,
    Sabotage::NodeReferencesUnusedRelationship,
    Sabotage::RelationshipEndpointPastHighId,
    Sabotage::RelationshipTypeUnknown,
    Sabotage::ChainTargetDeleted,
    Sabotage::PropertyKeyUnknown,
    Sabotage::StringRecordDeleted,
    Sabotage::LabelsReversed,
    Sabotage::FirstGroupStolen,
    Sabotage::LabelChainDeleted,
    Sabotage::PropertyChainLoops,
    Sabotage::LabelNameDeleted,
    Sabotage::DeletedNodeStillIndexed,
    Sabotage::TypeIndexDisagrees,
    Sabotage::DroppedFromUniqueIndex,
];

fn finding(record_type: RecordType, id: u64, kind: Inconsistency) -> Finding {
    Finding {
        record_type,
        id,
        kind,
    }
}

impl Sabotage {
    /// Damages `world` and returns one finding the damage must produce.
    fn apply(self, world: &World, rng: &mut ChaCha8Rng) -> Finding {
        let stores = world.graph.stores();
        let sparse: Vec<NodeRecord> = records(&stores.nodes)
            .into_iter()
            .filter(|n| !n.dense)
            .collect();
        let relationships: Vec<RelationshipRecord> = records(&stores.relationships);
        let node = sparse.choose(rng).expect("node").clone();
        let relationship = relationships.choose(rng).expect("relationship").clone();
        match self {
            Sabotage::NodeReferencesForeignRelationship => {
                let foreign = relationships
                    .iter()
                    .filter(|r| r.side_of(node.id as i64).is_none())
                    .collect::<Vec<_>>()
                    .choose(rng)
                    .map(|r| r.id as i64)
                    .expect("foreign relationship");
                stores.nodes.update(node.id, |n| n.next_rel = foreign);
                finding(
                    RecordType::Node,
                    node.id,
                    Inconsistency::RelationshipForOtherNode {
                        relationship: foreign,
                    },
                )
            }
            Sabotage::NodeReferencesUnusedRelationship => {
                let unused = stores.relationships.high_id() as i64 + 5;
                stores.nodes.update(node.id, |n| n.next_rel = unused);
                finding(
                    RecordType::Node,
                    node.id,
                    Inconsistency::RelationshipNotInUse {
                        relationship: unused,
                    },
                )
            }
            Sabotage::RelationshipEndpointPastHighId => {
                let missing = stores.nodes.high_id() as i64 + 3;
                stores
                    .relationships
                    .update(relationship.id, |r| r.second_node = missing);
                finding(
                    RecordType::Relationship,
                    relationship.id,
                    Inconsistency::NodeNotInUse {
                        end: NodeEnd::Target,
                        node: missing,
                    },
                )
            }
            Sabotage::RelationshipTypeUnknown => {
                stores
                    .relationships
                    .update(relationship.id, |r| r.type_id = 999);
                finding(
                    RecordType::Relationship,
                    relationship.id,
                    Inconsistency::RelationshipTypeNotInUse { type_id: 999 },
                )
            }
            Sabotage::ChainTargetDeleted => {
                let linked: Vec<&RelationshipRecord> = relationships
                    .iter()
                    .filter(|r| r.first_next_rel != NULL_REFERENCE)
                    .collect();
                let source = *linked.choose(rng).expect("linked relationship");
                let target = source.first_next_rel;
                stores
                    .relationships
                    .update(target as u64, |r| r.in_use = false);
                finding(
                    RecordType::Relationship,
                    source.id,
                    Inconsistency::RelationshipChainNotInUse {
                        end: NodeEnd::Source,
                        link: ChainLink::Next,
                        relationship: target,
                    },
                )
            }
            Sabotage::PropertyKeyUnknown => {
                let property = records(&stores.properties)
                    .choose(rng)
                    .map(|p| p.id)
                    .expect("property");
                stores.properties.update(property, |p| p.blocks[0].key = 500);
                finding(
                    RecordType::Property,
                    property,
                    Inconsistency::KeyNotInUse { key: 500 },
                )
            }
            Sabotage::StringRecordDeleted => {
                let with_strings: Vec<(u64, i64)> = records(&stores.properties)
                    .iter()
                    .flat_map(|p: &PropertyRecord| {
                        p.blocks.iter().filter_map(move |b| match b.value {
                            PropertyBlockValue::String(first) => Some((p.id, first)),
                            _ => None,
                        })
                    })
                    .collect();
                let (property, first) = *with_strings.choose(rng).expect("string value");
                stores.strings.update(first as u64, |s| s.in_use = false);
                finding(
                    RecordType::Property,
                    property,
                    Inconsistency::StringNotInUse { record: first },
                )
            }
            Sabotage::LabelsReversed => {
                let candidates: Vec<&NodeRecord> = sparse
                    .iter()
                    .filter(|n| matches!(&n.labels, LabelField::Inline(l) if l.len() == 2))
                    .collect();
                let target = *candidates.choose(rng).expect("two-label node");
                let LabelField::Inline(labels) = &target.labels else {
                    unreachable!()
                };
                let (smallest, largest) = (labels[0], labels[1]);
                stores.nodes.update(target.id, |n| {
                    n.labels = LabelField::Inline([largest, smallest].into_iter().collect())
                });
                finding(
                    RecordType::Node,
                    target.id,
                    Inconsistency::LabelsOutOfOrder { largest, smallest },
                )
            }
            Sabotage::FirstGroupStolen => {
                let group = stores.nodes.read(world.hub).expect("hub").next_rel;
                let thief = node.id as i64;
                stores
                    .relationship_groups
                    .update(group as u64, |g| g.owning_node = thief);
                finding(
                    RecordType::Node,
                    world.hub,
                    Inconsistency::RelationshipGroupHasOtherOwner {
                        group,
                        owner: thief,
                    },
                )
            }
            Sabotage::LabelChainDeleted => {
                let chains: Vec<(u64, i64)> = sparse
                    .iter()
                    .filter_map(|n| match n.labels {
                        LabelField::Dynamic(first) => Some((n.id, first)),
                        LabelField::Inline(_) => None,
                    })
                    .collect();
                let (owner, first) = *chains.choose(rng).expect("label chain");
                stores.node_labels.update(first as u64, |r| r.in_use = false);
                finding(
                    RecordType::Node,
                    owner,
                    Inconsistency::DynamicLabelRecordNotInUse { record: first },
                )
            }
            Sabotage::PropertyChainLoops => {
                let first = node.next_prop;
                stores
                    .properties
                    .update(first as u64, |p| p.next_prop = first);
                finding(
                    RecordType::Node,
                    node.id,
                    Inconsistency::PropertyChainContainsCircularReference { property: first },
                )
            }
            Sabotage::LabelNameDeleted => {
                let tokens = records(&stores.labels.tokens);
                let token = tokens.choose(rng).expect("label token");
                stores
                    .labels
                    .names
                    .update(token.name_id as u64, |r| r.in_use = false);
                finding(
                    RecordType::LabelToken,
                    token.id,
                    Inconsistency::NameBlockNotInUse {
                        record: token.name_id,
                    },
                )
            }
            Sabotage::DeletedNodeStillIndexed => {
                stores.nodes.update(node.id, |n| n.in_use = false);
                finding(
                    RecordType::LabelScanDocument,
                    node.id,
                    Inconsistency::IndexedNodeNotInUse { node: node.id },
                )
            }
            Sabotage::TypeIndexDisagrees => {
                let other = 1 - relationship.type_id;
                world
                    .graph
                    .relationship_type_index()
                    .set(relationship.id, &[other]);
                finding(
                    RecordType::Relationship,
                    relationship.id,
                    Inconsistency::RelationshipTypeNotInIndex {
                        type_id: relationship.type_id,
                    },
                )
            }
            Sabotage::DroppedFromUniqueIndex => {
                let person = *world.people.choose(rng).expect("person");
                let index = world
                    .graph
                    .indexes()
                    .online()
                    .into_iter()
                    .find(|i| i.descriptor().unique)
                    .expect("unique index");
                let values = index.values_of(person).remove(0);
                index.remove(person);
                finding(
                    RecordType::Node,
                    person,
                    Inconsistency::NotIndexed {
                        index: index.descriptor().id,
                        values,
                    },
                )
            }
        }
    }
}

fn detect(sabotage: Sabotage, seed: u64, config: CheckConfig) {
    let world = world();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let expected = sabotage.apply(&world, &mut rng);
    let result = FullCheck::new(config)
        .execute(world.graph.access())
        .expect("check");
    assert!(!result.is_consistent(), "{sabotage:?} went unnoticed");
    assert!(
        result.findings.contains(&expected),
        "{sabotage:?} (seed {seed}): expected {expected}, got {:#?}",
        result.findings
    );
}

#[test]
fn untouched_world_is_consistent() {
    let world = world();
    let result = FullCheck::default()
        .execute(world.graph.access())
        .expect("check");
    assert!(result.findings.is_empty(), "{:#?}", result.findings);
}

#[test]
fn every_sabotage_is_detected() {
    for sabotage in ALL {
        for seed in 0..3 {
            detect(sabotage, seed, CheckConfig::default());
        }
    }
}

#[test]
fn every_sabotage_is_detected_with_a_tight_memory_budget() {
    for sabotage in ALL {
        detect(sabotage, 7, CheckConfig::default().with_memory_limit(48));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn sabotage_is_found_for_any_seed_and_thread_count(
        pick in 0..ALL.len(),
        seed in any::<u64>(),
        threads in 1usize..5,
    ) {
        detect(ALL[pick], seed, CheckConfig::default().with_threads(threads));
    }
}
