use std::sync::Arc;

use sombra_consistency::report::CollectingLogger;
use sombra_consistency::store::builder::{StoreBuilder, Value};
use sombra_consistency::store::{DynamicRecord, PropertyValue, SchemaRule};
use sombra_consistency::types::{DynamicStore, NO_ID};
use sombra_consistency::{
    CheckConfig, CheckSummary, ExecutionOrder, FullCheck, InconsistencyKind, RecordType,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn config(order: ExecutionOrder) -> CheckConfig {
    CheckConfig {
        execution_order: order,
        worker_threads: Some(4),
        max_retained_findings: 64,
        ..CheckConfig::default()
    }
}

fn check(builder: &StoreBuilder, config: CheckConfig) -> Result<CheckSummary, Box<dyn std::error::Error>> {
    let stores = builder.build_in_memory()?;
    let logger = Arc::new(CollectingLogger::new());
    let summary = FullCheck::new(config).execute(&stores, logger.clone())?;
    assert_eq!(logger.findings().len() as u64, summary.total());
    Ok(summary)
}

#[test]
fn demo_store_is_consistent_in_both_orders() -> TestResult {
    for order in [ExecutionOrder::Sequential, ExecutionOrder::MultiThreaded] {
        let summary = check(&StoreBuilder::demo(), config(order))?;
        assert!(summary.is_consistent(), "{order:?}: {summary}");
        assert_eq!(summary.total(), 0);
    }
    Ok(())
}

#[test]
fn dangling_node_property_pointer_counts_once_under_node() -> TestResult {
    let mut b = StoreBuilder::new();
    let key = b.add_property_key("k");
    for value in 0..3 {
        b.add_node(&[], &[(key, Value::Int(value))]);
    }
    if let Some(node) = b.node_mut(2) {
        node.next_prop = 4_096;
    }
    let summary = check(&b, config(ExecutionOrder::MultiThreaded))?;
    assert!(!summary.is_consistent());
    assert_eq!(summary.count(RecordType::Node), 1);
    assert_eq!(summary.total(), 1);
    let finding = &summary.findings[0];
    assert_eq!(finding.id, 2);
    assert_eq!(finding.kind, InconsistencyKind::ReferenceNotInUse);
    assert_eq!(finding.field, "next_prop");
    Ok(())
}

#[test]
fn two_constraint_indexes_without_constraint_report_one_missing_obligation() -> TestResult {
    let mut b = StoreBuilder::new();
    let label = b.add_label("Account");
    let key = b.add_property_key("iban");
    let first = b.add_schema_rule(SchemaRule::constraint_index(0, label, key, NO_ID));
    let second = b.add_schema_rule(SchemaRule::constraint_index(0, label, key, NO_ID));
    let summary = check(&b, config(ExecutionOrder::MultiThreaded))?;
    assert_eq!(summary.kind_count(InconsistencyKind::MissingObligation), 1);
    let missing: Vec<_> = summary
        .findings_of(InconsistencyKind::MissingObligation)
        .collect();
    assert_eq!(missing[0].id, first);
    assert_eq!(summary.kind_count(InconsistencyKind::DuplicateRuleContent), 1);
    assert_eq!(
        summary
            .findings_of(InconsistencyKind::DuplicateRuleContent)
            .map(|f| f.id)
            .collect::<Vec<_>>(),
        vec![second]
    );
    Ok(())
}

#[test]
fn changed_value_behind_an_index_is_one_mismatch_on_the_rule() -> TestResult {
    let b = {
        let mut b = StoreBuilder::demo();
        if let Some(value) = b.property_value_mut(0, 0) {
            *value = PropertyValue::ShortString("Augusta".into());
        }
        b
    };
    let summary = check(&b, config(ExecutionOrder::MultiThreaded))?;
    assert_eq!(summary.kind_count(InconsistencyKind::IndexValueMismatch), 1);
    assert_eq!(summary.total(), 1);
    let finding = &summary.findings[0];
    assert_eq!(finding.record_type, RecordType::Index);
    assert_eq!(finding.id, 0);
    assert_eq!(finding.field, "node 0");
    Ok(())
}

#[test]
fn orders_agree_on_a_damaged_store() -> TestResult {
    let mut b = StoreBuilder::demo();
    if let Some(node) = b.node_mut(1) {
        node.next_prop = NO_ID;
    }
    if let Some(rel) = b.relationship_mut(2) {
        rel.first_next = 40;
    }
    if let Some(value) = b.property_value_mut(3, 0) {
        *value = PropertyValue::ShortString("Paris".into());
    }
    b.push_free_node();
    let sequential = check(&b, config(ExecutionOrder::Sequential))?;
    let parallel = check(&b, config(ExecutionOrder::MultiThreaded))?;
    assert!(!sequential.is_consistent());
    assert_eq!(sequential, parallel);
    for _ in 0..3 {
        assert_eq!(check(&b, config(ExecutionOrder::MultiThreaded))?, parallel);
    }
    Ok(())
}

#[test]
fn detached_array_block_loop_is_found_in_both_orders() -> TestResult {
    let mut b = StoreBuilder::demo();
    let block = |b: &mut StoreBuilder| {
        b.push_dynamic(DynamicStore::Array, DynamicRecord::new(0, false, vec![7; 120]))
    };
    let first = block(&mut b);
    let second = block(&mut b);
    if let Some(record) = b.dynamic_mut(DynamicStore::Array, first) {
        record.next = second;
    }
    if let Some(record) = b.dynamic_mut(DynamicStore::Array, second) {
        record.next = first;
    }
    for order in [ExecutionOrder::Sequential, ExecutionOrder::MultiThreaded] {
        let summary = check(&b, config(order))?;
        assert_eq!(summary.total(), 1, "{order:?}: {summary}");
        let finding = &summary.findings[0];
        assert_eq!(finding.kind, InconsistencyKind::ContinuationCycle);
        assert_eq!(finding.record_type, RecordType::Array);
        assert_eq!(finding.id, first);
    }
    Ok(())
}

#[test]
fn retained_findings_are_capped_but_counts_are_not() -> TestResult {
    let mut b = StoreBuilder::new();
    let key = b.add_property_key("k");
    for value in 0..10 {
        let node = b.add_node(&[], &[(key, Value::Int(value))]);
        if let Some(node) = b.node_mut(node) {
            node.next_prop = 10_000 + value as u64;
        }
    }
    let summary = check(
        &b,
        CheckConfig {
            max_retained_findings: 3,
            ..config(ExecutionOrder::MultiThreaded)
        },
    )?;
    assert_eq!(summary.count(RecordType::Node), 10);
    assert_eq!(summary.findings.len(), 3);
    assert_eq!(
        summary.findings.iter().map(|f| f.id).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    Ok(())
}

#[test]
fn invalid_worker_count_is_rejected_before_any_work() -> TestResult {
    let stores = StoreBuilder::demo().build_in_memory()?;
    let err = FullCheck::new(CheckConfig {
        worker_threads: Some(0),
        ..CheckConfig::default()
    })
    .execute(&stores, Arc::new(CollectingLogger::new()))
    .unwrap_err();
    assert!(err.failed_task().is_none());
    Ok(())
}
