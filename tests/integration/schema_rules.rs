#![allow(missing_docs)]

use sombra_check::schema::{
    ConstraintDescriptor, ConstraintKind, IndexDescriptor, IndexType, SchemaDescriptor, SchemaRule,
};
use sombra_check::store::{SchemaRecord, Value};
use sombra_check::{
    CheckConfig, ConsistencyCheckResult, Finding, FullCheck, GraphFixture, Inconsistency,
    RecordType,
};

fn check(graph: &GraphFixture) -> ConsistencyCheckResult {
    FullCheck::new(CheckConfig::default())
        .execute(graph.access())
        .expect("check")
}

fn schema_finding(id: u64, kind: Inconsistency) -> Finding {
    Finding {
        record_type: RecordType::Schema,
        id,
        kind,
    }
}

fn write_rule(graph: &GraphFixture, rule: SchemaRule) {
    graph.stores().schema.insert(SchemaRecord {
        id: rule.id(),
        in_use: true,
        data: rule.encode(),
    });
}

struct People {
    graph: GraphFixture,
    person: i64,
    name: i32,
    age: i32,
}

fn people() -> People {
    let mut graph = GraphFixture::new();
    let person = graph.label("Person");
    let name = graph.property_key("name");
    let age = graph.property_key("age");
    People {
        graph,
        person,
        name,
        age,
    }
}

#[test]
fn constraints_with_their_indexes_are_consistent() {
    let mut p = people();
    p.graph.create_node_key_constraint("person_key", p.person, &[p.name]);
    p.graph.create_existence_constraint("person_age", p.person, &[p.age]);
    p.graph.create_index("person_age_index", p.person, &[p.age]);
    for i in 0..5 {
        p.graph.create_node(
            &[p.person],
            &[
                (p.name, Value::String(format!("member {i}"))),
                (p.age, Value::Int(30 + i)),
            ],
        );
    }
    let result = check(&p.graph);
    assert!(result.findings.is_empty(), "{:#?}", result.findings);
}

#[test]
fn deleted_backing_index_leaves_the_obligation_missing() {
    let mut p = people();
    let (constraint, index) = p.graph.create_unique_constraint("unique_name", p.person, &[p.name]);
    p.graph.stores().schema.update(index, |r| r.in_use = false);
    let result = check(&p.graph);
    assert_eq!(
        result.findings,
        vec![schema_finding(
            constraint,
            Inconsistency::MissingObligation {
                obligation: Some(index)
            }
        )]
    );
}

#[test]
fn second_index_claiming_a_constraint_is_reported_on_both_sides() {
    let mut p = people();
    let (constraint, index) = p.graph.create_unique_constraint("unique_name", p.person, &[p.name]);
    let rogue = p.graph.stores().schema.next_id();
    write_rule(
        &p.graph,
        SchemaRule::Index(IndexDescriptor {
            id: rogue,
            name: "rogue".into(),
            schema: SchemaDescriptor::for_label(p.person as i32, &[p.age]),
            index_type: IndexType::Range,
            unique: true,
            owning_constraint: Some(constraint),
        }),
    );
    let result = check(&p.graph);
    assert!(result.findings.contains(&schema_finding(
        constraint,
        Inconsistency::ConstraintIndexRuleNotReferencingBack { index: rogue }
    )));
    assert!(result.findings.contains(&schema_finding(
        rogue,
        Inconsistency::DuplicateObligation {
            obligation: constraint,
            other: index
        }
    )));
}

#[test]
fn unreadable_rule_bytes_are_malformed() {
    let p = people();
    let id = p.graph.stores().schema.next_id();
    p.graph.stores().schema.insert(SchemaRecord {
        id,
        in_use: true,
        data: vec![9, 9, 9],
    });
    let result = check(&p.graph);
    assert_eq!(result.findings.len(), 1);
    assert_eq!(result.findings[0].id, id);
    assert!(matches!(
        result.findings[0].kind,
        Inconsistency::MalformedSchemaRule { .. }
    ));
}

#[test]
fn duplicate_index_points_at_the_first() {
    let mut p = people();
    let first = p.graph.create_index("by_name", p.person, &[p.name]);
    let second = p.graph.create_index("by_name_again", p.person, &[p.name]);
    let result = check(&p.graph);
    assert_eq!(
        result.findings,
        vec![schema_finding(
            second,
            Inconsistency::DuplicateRuleContent { canonical: first }
        )]
    );
}

#[test]
fn rules_over_unknown_tokens() {
    let mut p = people();
    let unknown_label = p.graph.create_index("ghost_label", 50, &[p.name]);
    let unknown_key = p.graph.create_index("ghost_key", p.person, &[99]);
    let result = check(&p.graph);
    assert_eq!(
        result.findings,
        vec![
            schema_finding(unknown_label, Inconsistency::LabelNotInUse { label: 50 }),
            schema_finding(unknown_key, Inconsistency::PropertyKeyNotInUse { key: 99 }),
        ]
    );
}

#[test]
fn populating_plain_index_is_only_a_warning() {
    let mut p = people();
    let index = p.graph.create_populating_index("later", p.person, &[p.age]);
    let result = check(&p.graph);
    assert!(result.is_consistent());
    assert_eq!(result.summary.total_warnings, 1);
    assert_eq!(
        result.findings,
        vec![schema_finding(
            index,
            Inconsistency::SchemaRuleNotOnline {
                constraint_index: false
            }
        )]
    );
}

#[test]
fn populating_constraint_index_is_an_error() {
    let p = people();
    let schema = SchemaDescriptor::for_label(p.person as i32, &[p.name]);
    let constraint = p.graph.stores().schema.next_id();
    let index = p.graph.stores().schema.next_id();
    write_rule(
        &p.graph,
        SchemaRule::Constraint(ConstraintDescriptor {
            id: constraint,
            name: "unique_name".into(),
            schema: schema.clone(),
            kind: ConstraintKind::Uniqueness,
            index_type: IndexType::Range,
            owned_index: Some(index),
        }),
    );
    let descriptor = IndexDescriptor {
        id: index,
        name: "unique_name_index".into(),
        schema,
        index_type: IndexType::Range,
        unique: true,
        owning_constraint: Some(constraint),
    };
    write_rule(&p.graph, SchemaRule::Index(descriptor.clone()));
    p.graph.indexes().add_not_online(descriptor);
    let result = check(&p.graph);
    assert!(!result.is_consistent());
    assert_eq!(
        result.findings,
        vec![schema_finding(
            index,
            Inconsistency::SchemaRuleNotOnline {
                constraint_index: true
            }
        )]
    );
}

#[test]
fn existence_constraint_flags_nodes_without_the_key() {
    let mut p = people();
    p.graph.create_existence_constraint("person_age", p.person, &[p.age]);
    p.graph
        .create_node(&[p.person], &[(p.age, Value::Int(40))]);
    let missing = p
        .graph
        .create_node(&[p.person], &[(p.name, Value::String("nobody".into()))]);
    p.graph.create_node(&[], &[]);
    let result = check(&p.graph);
    assert_eq!(
        result.findings,
        vec![Finding {
            record_type: RecordType::Node,
            id: missing,
            kind: Inconsistency::MissingMandatoryProperty { key: p.age },
        }]
    );
}

#[test]
fn uniqueness_is_checked_for_small_and_large_indexes() {
    for threshold in [0.05, 1.0] {
        let mut p = people();
        let (_, index) = p.graph.create_unique_constraint("unique_name", p.person, &[p.name]);
        let twin = || vec![(p.name, Value::String("same name twice".into()))];
        let a = p.graph.create_node(&[p.person], &twin());
        let b = p.graph.create_node(&[p.person], &twin());
        let mut config = CheckConfig::default();
        config.large_index_threshold = threshold;
        let result = FullCheck::new(config)
            .execute(p.graph.access())
            .expect("check");
        let node = |id, duplicate| Finding {
            record_type: RecordType::Node,
            id,
            kind: Inconsistency::UniqueIndexNotUnique { index, duplicate },
        };
        assert_eq!(
            result.findings,
            vec![node(a, b), node(b, a)],
            "threshold {threshold}"
        );
    }
}

#[test]
fn relationship_existence_rules_use_relationship_types() {
    let mut graph = GraphFixture::new();
    let knows = graph.relationship_type("KNOWS");
    let since = graph.property_key("since");
    let id = graph.stores().schema.next_id();
    write_rule(
        &graph,
        SchemaRule::Constraint(ConstraintDescriptor {
            id,
            name: "knows_since".into(),
            schema: SchemaDescriptor::for_relationship_type(knows as i32, &[since]),
            kind: ConstraintKind::Existence,
            index_type: IndexType::Range,
            owned_index: None,
        }),
    );
    let a = graph.create_node(&[], &[]);
    let b = graph.create_node(&[], &[]);
    graph.create_relationship(a, b, knows, &[(since, Value::Int(2020))]);
    let bare = graph.create_relationship(b, a, knows, &[]);
    let result = check(&graph);
    assert_eq!(
        result.findings,
        vec![Finding {
            record_type: RecordType::Relationship,
            id: bare,
            kind: Inconsistency::MissingMandatoryProperty { key: since },
        }]
    );
}
