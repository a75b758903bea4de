#![allow(missing_docs)]

use std::sync::{Arc, Once};

use sombra_check::store::{PageCacheTracer, PropertyBlockValue, Value};
use sombra_check::{
    CheckConfig, CheckError, ConsistencyFlags, FullCheck, GraphFixture, Inconsistency,
    RecordType,
};
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("sombra_check=warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

struct Social {
    graph: GraphFixture,
    people: Vec<u64>,
    hub: u64,
}

/// People in a ring with chords and a few self loops, all living in one dense city,
/// under a uniqueness constraint, an existence constraint and two plain indexes.
fn social(people: usize) -> Social {
    let mut graph = GraphFixture::new();
    let person = graph.label("Person");
    let city = graph.label("City");
    let extra: Vec<i64> = (0..5).map(|i| graph.label(&format!("Tag{i}"))).collect();
    let knows = graph.relationship_type("KNOWS");
    let lives_in = graph.relationship_type("LIVES_IN");
    let name = graph.property_key("name");
    let age = graph.property_key("age");
    let scores = graph.property_key("scores");
    let since = graph.property_key("since");

    graph.create_unique_constraint("person_name", person, &[name]);
    graph.create_existence_constraint("person_age", person, &[age]);
    graph.create_index("city_name", city, &[name]);
    graph.create_relationship_index("knows_since", knows, &[since]);

    let hub = graph.create_dense_node(
        &[city],
        &[(name, Value::String("Metropolis on the river".into()))],
    );
    let people: Vec<u64> = (0..people)
        .map(|i| {
            let mut labels = vec![person];
            if i % 4 == 0 {
                labels.extend(&extra);
            }
            let mut properties = vec![
                (name, Value::String(format!("person number {i}"))),
                (age, Value::Int(20 + i as i64)),
            ];
            if i % 3 == 0 {
                properties.push((scores, Value::IntArray(vec![i as i64; 6])));
            }
            graph.create_node(&labels, &properties)
        })
        .collect();
    for (i, &p) in people.iter().enumerate() {
        let next = people[(i + 1) % people.len()];
        let chord = people[(i + 3) % people.len()];
        graph.create_relationship(p, next, knows, &[(since, Value::Int(2000 + i as i64))]);
        graph.create_relationship(chord, p, knows, &[]);
        graph.create_relationship(p, hub, lives_in, &[]);
        if i % 7 == 0 {
            graph.create_relationship(p, p, knows, &[(since, Value::Int(1999))]);
        }
    }
    graph.create_relationship(hub, hub, lives_in, &[]);
    Social {
        graph,
        people,
        hub,
    }
}

fn run(graph: &GraphFixture, config: CheckConfig) -> sombra_check::ConsistencyCheckResult {
    init_tracing();
    FullCheck::new(config).execute(graph.access()).expect("check")
}

#[test]
fn empty_stores_are_consistent() {
    let result = run(&GraphFixture::new(), CheckConfig::default());
    assert!(result.is_consistent());
    assert_eq!(result.summary.total_warnings, 0);
    assert!(result.findings.is_empty());
}

#[test]
fn built_graph_is_consistent_under_every_partitioning() {
    let social = social(24);
    for memory in [CheckConfig::default().memory_limit_bytes, 64, 1] {
        for threads in [1, 4] {
            for threshold in [0.05, 1.0] {
                let mut config = CheckConfig::default()
                    .with_threads(threads)
                    .with_memory_limit(memory);
                config.large_index_threshold = threshold;
                let result = run(&social.graph, config);
                assert!(
                    result.findings.is_empty(),
                    "memory {memory} threads {threads} threshold {threshold}: {:?}",
                    result.findings
                );
                assert_eq!(result.summary.total_warnings, 0);
            }
        }
    }
}

#[test]
fn findings_do_not_depend_on_partitioning() {
    let social = social(16);
    let stores = social.graph.stores();
    stores
        .relationships
        .update(5, |r| r.first_next_rel = 1_000_000);
    stores.nodes.update(social.people[3], |n| n.next_rel = 2);
    stores.properties.update(0, |p| p.blocks[0].key = 77);

    let baseline = run(&social.graph, CheckConfig::default().with_threads(1));
    assert!(!baseline.is_consistent());
    for memory in [64, 16, 1] {
        let result = run(
            &social.graph,
            CheckConfig::default().with_threads(3).with_memory_limit(memory),
        );
        assert_eq!(result.findings, baseline.findings, "memory {memory}");
        assert_eq!(result.summary, baseline.summary, "memory {memory}");
    }
}

#[test]
fn disabled_phases_skip_their_findings() {
    let social = social(8);
    let stores = social.graph.stores();
    let property = stores.nodes.read(social.people[1]).expect("node").next_prop as u64;
    stores
        .properties
        .update(property, |p| p.blocks[0].value = PropertyBlockValue::Invalid(42));
    social.graph.label_index().set(social.people[2], &[]);

    let structure = run(&social.graph, CheckConfig::structure_only());
    assert!(structure.is_consistent(), "{:?}", structure.findings);

    let full = run(&social.graph, CheckConfig::default());
    assert!(full.findings.iter().any(|f| f.record_type == RecordType::Property
        && f.id == property
        && f.kind == Inconsistency::InvalidPropertyType { tag: 42 }));
    assert!(full.findings.iter().any(|f| f.record_type == RecordType::Node
        && f.id == social.people[2]
        && matches!(f.kind, Inconsistency::NodeLabelNotInIndex { .. })));
}

#[test]
fn label_index_check_can_be_switched_off_alone() {
    let social = social(8);
    social.graph.label_index().set(social.hub, &[]);
    let mut config = CheckConfig::default();
    config.flags = ConsistencyFlags {
        check_label_index: false,
        ..ConsistencyFlags::all()
    };
    assert!(run(&social.graph, config).is_consistent());
}

#[test]
fn retention_limit_keeps_counting() {
    let social = social(8);
    // every fourth person carries extra labels; leave those alone
    for (_, &person) in social.people.iter().enumerate().filter(|(i, _)| i % 4 != 0) {
        social.graph.label_index().set(person, &[]);
    }
    let mut config = CheckConfig::default();
    config.max_retained_findings = 3;
    let result = run(&social.graph, config);
    assert_eq!(result.findings.len(), 3);
    assert_eq!(result.summary.total_errors, 6);
    assert_eq!(result.summary.dropped_findings, 3);
    assert_eq!(result.summary.inconsistency_count_for(RecordType::Node), 6);
}

#[test]
fn corrupt_record_becomes_a_finding() {
    let social = social(8);
    social.graph.stores().nodes.corrupt(social.people[4], "bad checksum");
    let result = run(&social.graph, CheckConfig::default());
    assert!(result.findings.iter().any(|f| f.record_type == RecordType::Node
        && f.id == social.people[4]
        && f.kind
            == Inconsistency::RecordNotDecodable {
                detail: "bad checksum".into()
            }));
}

#[test]
fn unreadable_record_aborts_the_run() {
    init_tracing();
    let social = social(8);
    social
        .graph
        .stores()
        .nodes
        .make_unreadable(social.people[0], "device gone");
    let err = FullCheck::default()
        .execute(social.graph.access())
        .expect_err("unreadable store");
    assert!(err.to_string().contains("device gone"), "{err}");
}

#[test]
fn invalid_configuration_is_rejected() {
    let mut config = CheckConfig::default();
    config.large_index_threshold = 0.0;
    let err = FullCheck::new(config)
        .execute(GraphFixture::new().access())
        .expect_err("invalid config");
    assert!(matches!(err, CheckError::Config(_)));
}

#[test]
fn tracer_counts_reads() {
    init_tracing();
    let social = social(4);
    let mut access = social.graph.access();
    access.page_cache_tracer = Some(Arc::new(PageCacheTracer::new()));
    let result = FullCheck::default().execute(access).expect("check");
    let stats = result.page_cache.expect("stats");
    assert!(stats.pins > 0);
    assert_eq!(stats.pins, stats.unpins);
}

#[test]
fn result_renders_as_json() {
    let social = social(4);
    social.graph.label_index().set(social.people[1], &[]);
    let json = run(&social.graph, CheckConfig::default())
        .to_json()
        .expect("json");
    assert!(json.contains("\"total_errors\": 1"), "{json}");
    assert!(json.contains("node_label_not_in_index"), "{json}");
}

#[test]
fn repeated_runs_agree_and_leave_stores_untouched() {
    let social = social(8);
    let stores = social.graph.stores();
    stores.nodes.update(social.people[2], |n| n.next_rel = 3);
    let before = stores.nodes.read(social.people[2]).expect("node");
    let first = run(&social.graph, CheckConfig::default());
    let second = run(&social.graph, CheckConfig::default());
    assert!(!first.is_consistent());
    assert_eq!(first.findings, second.findings);
    assert_eq!(first.summary, second.summary);
    assert_eq!(stores.nodes.read(social.people[2]).expect("node"), before);
}
