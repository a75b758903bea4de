#![allow(missing_docs)]

use std::sync::Arc;

use sombra_check::index::{IndexAccessor, MemoryIndex};
use sombra_check::store::{LabelField, PropertyBlockValue, Value};
use sombra_check::{
    CheckConfig, ConsistencyCheckResult, Finding, FullCheck, GraphFixture, Inconsistency,
    RecordType,
};

/// Large-index threshold that sends every index down the per-entity probe path.
const PROBE_ALL: f64 = 1.0;
/// Threshold that checks every index from the index side.
const SCAN_ALL: f64 = 0.05;

fn check_with(graph: &GraphFixture, threshold: f64) -> ConsistencyCheckResult {
    let mut config = CheckConfig::default().with_memory_limit(32);
    config.large_index_threshold = threshold;
    FullCheck::new(config)
        .execute(graph.access())
        .expect("check")
}

fn index(graph: &GraphFixture, id: u64) -> Arc<MemoryIndex> {
    graph.indexes().index(id).expect("online index")
}

struct Catalog {
    graph: GraphFixture,
    books: Vec<u64>,
    plain: u64,
    by_title: u64,
}

/// Ten books indexed by title and one unlabelled node.
fn catalog() -> Catalog {
    let mut graph = GraphFixture::new();
    let book = graph.label("Book");
    let title = graph.property_key("title");
    let by_title = graph.create_index("by_title", book, &[title]);
    let books = (0..10)
        .map(|i| graph.create_node(&[book], &[(title, Value::String(format!("volume {i}")))]))
        .collect();
    let plain = graph.create_node(&[], &[(title, Value::String("loose page".into()))]);
    Catalog {
        graph,
        books,
        plain,
        by_title,
    }
}

fn node(id: u64, kind: Inconsistency) -> Finding {
    Finding {
        record_type: RecordType::Node,
        id,
        kind,
    }
}

fn index_finding(id: u64, kind: Inconsistency) -> Finding {
    Finding {
        record_type: RecordType::Index,
        id,
        kind,
    }
}

#[test]
fn both_strategies_accept_a_complete_index() {
    let c = catalog();
    for threshold in [PROBE_ALL, SCAN_ALL] {
        let result = check_with(&c.graph, threshold);
        assert!(result.findings.is_empty(), "{:#?}", result.findings);
    }
}

#[test]
fn missing_entry_is_found_by_both_strategies() {
    let c = catalog();
    index(&c.graph, c.by_title).remove(c.books[3]);
    let expected = vec![node(
        c.books[3],
        Inconsistency::NotIndexed {
            index: c.by_title,
            values: vec![Value::String("volume 3".into())],
        },
    )];
    for threshold in [PROBE_ALL, SCAN_ALL] {
        assert_eq!(check_with(&c.graph, threshold).findings, expected);
    }
}

#[test]
fn repeated_entry_is_found_by_both_strategies() {
    let c = catalog();
    index(&c.graph, c.by_title).add(c.books[7], vec![Value::String("volume 7".into())]);
    let expected = vec![node(
        c.books[7],
        Inconsistency::IndexedMultipleTimes {
            index: c.by_title,
            count: 2,
        },
    )];
    for threshold in [PROBE_ALL, SCAN_ALL] {
        assert_eq!(check_with(&c.graph, threshold).findings, expected);
    }
}

#[test]
fn stale_entry_is_reported_from_both_sides() {
    let c = catalog();
    index(&c.graph, c.by_title).replace(c.books[0], vec![Value::String("old title".into())]);
    let expected = vec![
        node(
            c.books[0],
            Inconsistency::NotIndexed {
                index: c.by_title,
                values: vec![Value::String("volume 0".into())],
            },
        ),
        index_finding(
            c.by_title,
            Inconsistency::IndexEntryValueMismatch {
                entity: c.books[0],
            },
        ),
    ];
    for threshold in [PROBE_ALL, SCAN_ALL] {
        assert_eq!(check_with(&c.graph, threshold).findings, expected);
    }
}

#[test]
fn entries_for_wrong_or_missing_entities() {
    let c = catalog();
    let by_title = index(&c.graph, c.by_title);
    by_title.add(c.plain, vec![Value::String("loose page".into())]);
    by_title.add(500, vec![Value::String("ghost".into())]);
    let token = by_title.descriptor().schema.token_id;
    let result = check_with(&c.graph, SCAN_ALL);
    assert_eq!(
        result.findings,
        vec![
            index_finding(
                c.by_title,
                Inconsistency::IndexedEntityDoesNotHaveExpectedToken {
                    entity: c.plain,
                    token,
                },
            ),
            index_finding(c.by_title, Inconsistency::IndexedEntityNotInUse { entity: 500 }),
        ]
    );
}

#[test]
fn changed_property_value_disagrees_with_its_entry() {
    let c = catalog();
    let stores = c.graph.stores();
    let property = stores.nodes.read(c.books[5]).expect("book").next_prop as u64;
    stores.properties.update(property, |p| {
        p.blocks[0].value = PropertyBlockValue::Int(5)
    });
    let result = check_with(&c.graph, PROBE_ALL);
    assert_eq!(
        result.findings,
        vec![
            node(
                c.books[5],
                Inconsistency::NotIndexed {
                    index: c.by_title,
                    values: vec![Value::Int(5)],
                },
            ),
            index_finding(
                c.by_title,
                Inconsistency::IndexEntryValueMismatch {
                    entity: c.books[5],
                },
            ),
        ]
    );
}

#[test]
fn relationship_indexes_are_checked_like_node_indexes() {
    let mut graph = GraphFixture::new();
    let rated = graph.relationship_type("RATED");
    let stars = graph.property_key("stars");
    let by_stars = graph.create_relationship_index("by_stars", rated, &[stars]);
    let reader = graph.create_node(&[], &[]);
    let book = graph.create_node(&[], &[]);
    let ratings: Vec<u64> = (0..4)
        .map(|i| graph.create_relationship(reader, book, rated, &[(stars, Value::Int(i))]))
        .collect();
    graph.indexes().index(by_stars).expect("index").remove(ratings[2]);
    for threshold in [PROBE_ALL, SCAN_ALL] {
        assert_eq!(
            check_with(&graph, threshold).findings,
            vec![Finding {
                record_type: RecordType::Relationship,
                id: ratings[2],
                kind: Inconsistency::NotIndexed {
                    index: by_stars,
                    values: vec![Value::Int(2)],
                },
            }]
        );
    }
}

#[test]
fn unordered_labels_report_the_descending_pair_once() {
    let mut graph = GraphFixture::new();
    let labels: Vec<i64> = (0..4).map(|i| graph.label(&format!("L{i}"))).collect();
    let node_id = graph.create_node(&labels[1..], &[]);
    graph.stores().nodes.update(node_id, |n| {
        n.labels = LabelField::Inline([3, 1, 2].into_iter().collect())
    });
    let result = check_with(&graph, PROBE_ALL);
    assert_eq!(
        result.findings,
        vec![node(
            node_id,
            Inconsistency::LabelsOutOfOrder {
                largest: 3,
                smallest: 1
            }
        )]
    );
}

#[test]
fn label_index_disagreements_are_reported_per_side() {
    let mut graph = GraphFixture::new();
    let a = graph.label("A");
    let b = graph.label("B");
    let c = graph.label("C");
    let first = graph.create_node(&[a], &[]);
    let second = graph.create_node(&[a, b], &[]);
    graph.label_index().set(first, &[a, c]);
    graph.label_index().set(second, &[b]);
    let result = check_with(&graph, PROBE_ALL);
    assert_eq!(
        result.findings,
        vec![
            node(second, Inconsistency::NodeLabelNotInIndex { label: a }),
            Finding {
                record_type: RecordType::LabelScanDocument,
                id: first,
                kind: Inconsistency::NodeDoesNotHaveExpectedLabel { label: c },
            },
        ]
    );
}

#[test]
fn property_cycle_across_records() {
    let mut graph = GraphFixture::new();
    let keys: Vec<i32> = (0..6).map(|i| graph.property_key(&format!("k{i}"))).collect();
    let properties: Vec<(i32, Value)> = keys.iter().map(|&k| (k, Value::Int(k as i64))).collect();
    let owner = graph.create_node(&[], &properties);
    let stores = graph.stores();
    let head = stores.nodes.read(owner).expect("owner").next_prop;
    let tail = stores.properties.read(head as u64).expect("head").next_prop;
    stores.properties.update(tail as u64, |p| p.next_prop = head);
    let result = check_with(&graph, PROBE_ALL);
    assert_eq!(
        result.findings,
        vec![
            node(
                owner,
                Inconsistency::PropertyChainContainsCircularReference { property: head }
            ),
            Finding {
                record_type: RecordType::Property,
                id: tail as u64,
                kind: Inconsistency::NextDoesNotReferenceBack { property: head },
            },
        ]
    );
}
