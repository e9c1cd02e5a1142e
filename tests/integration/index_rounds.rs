use std::sync::Arc;

use sombra_consistency::full::multi_pass::MultiPassCaches;
use sombra_consistency::report::CollectingLogger;
use sombra_consistency::store::builder::{StoreBuilder, Value};
use sombra_consistency::store::{IndexEntry, IndexValue, NodeLabelEntry, PropertyValue};
use sombra_consistency::{
    CheckConfig, CheckError, CheckSummary, ExecutionOrder, FullCheck, InconsistencyKind,
    RecordType,
};

// Room for two node slice entries per round, nothing else.
const TINY_BUDGET: u64 = 4 * MultiPassCaches::SLICE_ENTRY_BYTES;

fn run(builder: &StoreBuilder, budget: u64, order: ExecutionOrder) -> Result<CheckSummary, CheckError> {
    let stores = builder.build_in_memory()?;
    let config = CheckConfig {
        total_mapped_memory_budget: budget,
        execution_order: order,
        max_retained_findings: 100,
        ..CheckConfig::default()
    };
    FullCheck::new(config).execute(&stores, Arc::new(CollectingLogger::new()))
}

fn damaged_graph() -> StoreBuilder {
    let mut b = StoreBuilder::new();
    let person = b.add_label("Person");
    let name = b.add_property_key("name");
    let rule = b.add_index(person, name);
    for pos in 0..9i64 {
        b.add_node(&[person], &[(name, Value::Int(pos))]);
    }
    for node in [1u64, 4, 7] {
        if let Some(value) = b.property_value_mut(node, name) {
            *value = PropertyValue::Int(100 + node as i64);
        }
    }
    let mut scan = b.label_scan_entries();
    scan.retain(|entry| entry.node != 5);
    scan.push(NodeLabelEntry {
        node: 30,
        labels: vec![person],
    });
    b.set_label_scan_entries(scan);
    let mut entries: Vec<IndexEntry> = b
        .index_entries()
        .into_iter()
        .find(|(id, _)| *id == rule)
        .map(|(_, entries)| entries)
        .unwrap_or_default();
    entries.push(IndexEntry {
        node: 8,
        value: IndexValue::Int(8),
    });
    b.set_index_entries(rule, entries);
    b
}

#[test]
fn rounds_find_exactly_what_a_single_pass_finds() -> Result<(), CheckError> {
    let b = damaged_graph();
    let single = run(&b, 64 << 20, ExecutionOrder::Sequential)?;
    assert_eq!(single.kind_count(InconsistencyKind::IndexValueMismatch), 3);
    assert_eq!(single.kind_count(InconsistencyKind::LabelScanMissingEntry), 1);
    assert_eq!(single.kind_count(InconsistencyKind::NodeNotInUse), 1);
    assert_eq!(single.count(RecordType::Index), 3);
    for order in [ExecutionOrder::Sequential, ExecutionOrder::MultiThreaded] {
        let rounds = run(&b, TINY_BUDGET, order)?;
        assert_eq!(rounds, single, "{order:?}");
    }
    Ok(())
}

#[test]
fn duplicate_index_entry_still_checks_the_value() -> Result<(), CheckError> {
    let b = damaged_graph();
    let summary = run(&b, TINY_BUDGET, ExecutionOrder::MultiThreaded)?;
    let on_node_eight: Vec<_> = summary
        .findings_of(InconsistencyKind::IndexValueMismatch)
        .filter(|f| f.field == "node 8")
        .collect();
    assert!(on_node_eight.is_empty());
    Ok(())
}

#[test]
fn unreadable_index_aborts_without_a_summary() {
    let mut b = StoreBuilder::demo();
    b.fail_index_reads(0);
    for budget in [64 << 20, TINY_BUDGET] {
        let err = run(&b, budget, ExecutionOrder::MultiThreaded).unwrap_err();
        let task = err.failed_task().expect("failing task is named");
        assert!(task.starts_with("Index_0_"), "{task}");
        assert!(matches!(err, CheckError::Incomplete { .. }));
    }
    let err = run(&b, 64 << 20, ExecutionOrder::Sequential).unwrap_err();
    assert_eq!(err.failed_task(), Some("Index_0_0"));
}
