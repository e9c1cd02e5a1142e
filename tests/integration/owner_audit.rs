use std::sync::Arc;

use smallvec::smallvec;
use sombra_consistency::report::CollectingLogger;
use sombra_consistency::store::builder::{StoreBuilder, Value};
use sombra_consistency::store::{PropertyBlock, PropertyRecord, PropertyValue};
use sombra_consistency::{
    CheckConfig, CheckSummary, ExecutionOrder, FullCheck, InconsistencyKind, RecordType,
};

fn check(builder: &StoreBuilder, owners: bool, order: ExecutionOrder) -> CheckSummary {
    let stores = builder.build_in_memory().expect("build stores");
    let config = CheckConfig {
        check_property_owners: owners,
        execution_order: order,
        ..CheckConfig::default()
    };
    FullCheck::new(config)
        .execute(&stores, Arc::new(CollectingLogger::new()))
        .expect("check completes")
}

fn with_stray_property() -> (StoreBuilder, u64) {
    let mut b = StoreBuilder::demo();
    let mut stray = PropertyRecord::new(0);
    stray.blocks = smallvec![PropertyBlock {
        key: 1,
        value: PropertyValue::Int(7),
    }];
    let id = b.push_property(stray);
    (b, id)
}

#[test]
fn demo_has_no_owner_problems() {
    for order in [ExecutionOrder::Sequential, ExecutionOrder::MultiThreaded] {
        let summary = check(&StoreBuilder::demo(), true, order);
        assert!(summary.is_consistent(), "{order:?}: {summary}");
        assert_eq!(summary.total(), 0);
    }
}

#[test]
fn unreachable_property_is_one_orphan() {
    let (b, stray) = with_stray_property();
    for order in [ExecutionOrder::Sequential, ExecutionOrder::MultiThreaded] {
        let summary = check(&b, true, order);
        assert_eq!(summary.kind_count(InconsistencyKind::OrphanPropertyChain), 1);
        assert_eq!(summary.total(), 1);
        let finding = &summary.findings[0];
        assert_eq!(finding.record_type, RecordType::Property);
        assert_eq!(finding.id, stray);
    }
}

#[test]
fn orphans_go_unnoticed_without_auditing() {
    let (b, _) = with_stray_property();
    let summary = check(&b, false, ExecutionOrder::MultiThreaded);
    assert!(summary.is_consistent());
    assert_eq!(summary.total(), 0);
}

#[test]
fn shared_chain_has_two_owners_and_leaves_an_orphan() {
    let mut b = StoreBuilder::new();
    let key = b.add_property_key("k");
    let first = b.add_node(&[], &[(key, Value::Int(1))]);
    let second = b.add_node(&[], &[(key, Value::Int(2))]);
    let shared = b.node(first).map(|n| n.next_prop).expect("first node");
    let abandoned = b.node(second).map(|n| n.next_prop).expect("second node");
    if let Some(node) = b.node_mut(second) {
        node.next_prop = shared;
    }
    let summary = check(&b, true, ExecutionOrder::MultiThreaded);
    assert_eq!(summary.total(), 2);
    let owners: Vec<_> = summary
        .findings_of(InconsistencyKind::MultipleOwners)
        .collect();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].id, shared);
    assert_eq!(owners[0].actual, "claimed more than once");
    let orphans: Vec<_> = summary
        .findings_of(InconsistencyKind::OrphanPropertyChain)
        .map(|f| f.id)
        .collect();
    assert_eq!(orphans, vec![abandoned]);
}

#[test]
fn relationship_and_node_sharing_a_chain() {
    let mut b = StoreBuilder::new();
    let key = b.add_property_key("since");
    let knows = b.add_relationship_type("KNOWS");
    let a = b.add_node(&[], &[(key, Value::Int(1999))]);
    let c = b.add_node(&[], &[]);
    let rel = b.add_relationship(a, c, knows, &[]);
    let head = b.node(a).map(|n| n.next_prop).expect("node a");
    if let Some(record) = b.relationship_mut(rel) {
        record.next_prop = head;
    }
    let summary = check(&b, true, ExecutionOrder::Sequential);
    assert_eq!(summary.kind_count(InconsistencyKind::MultipleOwners), 1);
    assert_eq!(summary.count(RecordType::Property), 1);
    assert_eq!(summary.total(), 1);
}
