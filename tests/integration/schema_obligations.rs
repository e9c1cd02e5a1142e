use std::sync::Arc;

use sombra_consistency::report::CollectingLogger;
use sombra_consistency::store::builder::StoreBuilder;
use sombra_consistency::store::{DynamicRecord, SchemaRule};
use sombra_consistency::types::{DynamicStore, NO_ID};
use sombra_consistency::{CheckConfig, CheckSummary, FullCheck, InconsistencyKind, RecordType};

fn check(builder: &StoreBuilder) -> CheckSummary {
    let stores = builder.build_in_memory().expect("build stores");
    FullCheck::new(CheckConfig::default())
        .execute(&stores, Arc::new(CollectingLogger::new()))
        .expect("check completes")
}

fn schema_fixture() -> (StoreBuilder, u32, u32) {
    let mut b = StoreBuilder::new();
    let label = b.add_label("Order");
    let key = b.add_property_key("number");
    (b, label, key)
}

#[test]
fn paired_constraint_and_index_are_clean() {
    let (mut b, label, key) = schema_fixture();
    let placed = b.add_property_key("placed_at");
    b.add_unique_constraint(label, key);
    b.add_index(label, placed);
    let summary = check(&b);
    assert!(summary.is_consistent(), "{summary}");
}

#[test]
fn constraint_without_its_index() {
    let (mut b, label, key) = schema_fixture();
    let constraint = b.add_schema_rule(SchemaRule::uniqueness_constraint(0, label, key, NO_ID));
    let summary = check(&b);
    assert_eq!(summary.total(), 1);
    assert_eq!(summary.count(RecordType::Schema), 1);
    let finding = &summary.findings[0];
    assert_eq!(finding.kind, InconsistencyKind::MissingObligation);
    assert_eq!(finding.id, constraint);
    assert_eq!(finding.field, "obligation");
}

#[test]
fn index_and_constraint_naming_the_wrong_partner() {
    let (mut b, label, key) = schema_fixture();
    let other = b.add_label("Invoice");
    let first = b.next_schema_id();
    b.add_schema_rule(SchemaRule::constraint_index(first, label, key, first + 2));
    b.add_schema_rule(SchemaRule::uniqueness_constraint(first + 1, label, key, first));
    b.add_schema_rule(SchemaRule::uniqueness_constraint(first + 2, other, key, first));
    let summary = check(&b);
    assert_eq!(
        summary.kind_count(InconsistencyKind::ConstraintIndexNotReferencingBack),
        0
    );
    let not_back: Vec<_> = summary
        .findings_of(InconsistencyKind::UniquenessConstraintNotReferencingBack)
        .map(|f| f.id)
        .collect();
    assert_eq!(not_back, vec![first + 1]);
    assert_eq!(summary.kind_count(InconsistencyKind::MissingObligation), 1);
    let missing: Vec<_> = summary
        .findings_of(InconsistencyKind::MissingObligation)
        .map(|f| f.id)
        .collect();
    assert_eq!(missing, vec![first + 2]);
}

#[test]
fn malformed_payload_and_unknown_tokens() {
    let (mut b, label, _) = schema_fixture();
    let garbage = b.push_dynamic(
        DynamicStore::Schema,
        DynamicRecord::new(0, true, vec![0xEE, 1, 2]),
    );
    let dangling = b.add_schema_rule(SchemaRule::index(0, label, 42));
    let summary = check(&b);
    let malformed: Vec<_> = summary
        .findings_of(InconsistencyKind::MalformedSchemaRule)
        .collect();
    assert_eq!(malformed.len(), 1);
    assert_eq!(malformed[0].id, garbage);
    let tokens: Vec<_> = summary
        .findings_of(InconsistencyKind::ReferenceNotInUse)
        .collect();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].id, dangling);
    assert_eq!(tokens[0].field, "property_key");
    assert_eq!(summary.count(RecordType::Schema), 2);
}

#[test]
fn freed_rule_records_are_ignored() {
    let (mut b, label, key) = schema_fixture();
    let constraint = b.add_schema_rule(SchemaRule::uniqueness_constraint(0, label, key, NO_ID));
    if let Some(record) = b.dynamic_mut(DynamicStore::Schema, constraint) {
        record.in_use = false;
    }
    let summary = check(&b);
    assert!(summary.is_consistent(), "{summary}");
    assert_eq!(summary.total(), 0);
}
