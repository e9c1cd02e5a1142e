use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;
use sombra_consistency::full::multi_pass::MultiPassCaches;
use sombra_consistency::report::CollectingLogger;
use sombra_consistency::store::builder::{StoreBuilder, Value};
use sombra_consistency::{
    CheckConfig, CheckSummary, ExecutionOrder, FullCheck, InconsistencyKind, RecordType,
};

#[derive(Debug, Clone)]
struct GraphPlan {
    nodes: Vec<(BTreeSet<u32>, Vec<Value>)>,
    edges: Vec<(usize, usize)>,
}

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::Int),
        any::<bool>().prop_map(Value::Bool),
        "[a-z]{0,7}".prop_map(Value::String),
        "[a-z ]{8,300}".prop_map(Value::String),
        prop::collection::vec(any::<i64>(), 0..40).prop_map(Value::Array),
    ]
}

fn arb_plan() -> impl Strategy<Value = GraphPlan> {
    prop::collection::vec(
        (
            prop::collection::btree_set(0u32..5, 0..=5),
            prop::collection::vec(arb_value(), 0..=6),
        ),
        1..24,
    )
    .prop_flat_map(|nodes| {
        let count = nodes.len();
        let edges = prop::collection::vec((0..count, 0..count), 0..32);
        (Just(nodes), edges)
    })
    .prop_map(|(nodes, edges)| GraphPlan { nodes, edges })
}

fn build(plan: &GraphPlan) -> StoreBuilder {
    let mut b = StoreBuilder::new();
    let labels: Vec<u32> = (0..5).map(|i| b.add_label(&format!("L{i}"))).collect();
    let keys: Vec<u32> = (0..6).map(|i| b.add_property_key(&format!("p{i}"))).collect();
    let rel_type = b.add_relationship_type("LINKS");
    b.add_index(labels[0], keys[0]);
    b.add_unique_constraint(labels[1], keys[1]);
    let mut ids = Vec::with_capacity(plan.nodes.len());
    for (node_labels, values) in &plan.nodes {
        let node_labels: Vec<u32> = node_labels.iter().map(|l| labels[*l as usize]).collect();
        let props: Vec<(u32, Value)> = keys.iter().copied().zip(values.iter().cloned()).collect();
        ids.push(b.add_node(&node_labels, &props));
    }
    for (from, to) in &plan.edges {
        if from != to {
            b.add_relationship(ids[*from], ids[*to], rel_type, &[]);
        }
    }
    b
}

fn check(builder: &StoreBuilder, budget: u64, order: ExecutionOrder) -> CheckSummary {
    let stores = builder.build_in_memory().expect("build stores");
    let config = CheckConfig {
        total_mapped_memory_budget: budget,
        execution_order: order,
        check_property_owners: true,
        max_retained_findings: 256,
        ..CheckConfig::default()
    };
    FullCheck::new(config)
        .execute(&stores, Arc::new(CollectingLogger::new()))
        .expect("check completes")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn built_graphs_are_consistent(plan in arb_plan()) {
        let b = build(&plan);
        let summary = check(&b, 64 << 20, ExecutionOrder::MultiThreaded);
        prop_assert!(summary.is_consistent(), "{}", summary);
        prop_assert_eq!(summary.total(), 0);
    }

    #[test]
    fn one_dangling_pointer_is_one_node_finding(plan in arb_plan(), pick in any::<prop::sample::Index>()) {
        let mut b = build(&plan);
        let victim = pick.index(plan.nodes.len()) as u64;
        if let Some(node) = b.node_mut(victim) {
            node.next_prop = 1 << 40;
        }
        let summary = check(&b, 64 << 20, ExecutionOrder::Sequential);
        prop_assert_eq!(summary.count(RecordType::Node), 1);
        let own: Vec<_> = summary
            .findings
            .iter()
            .filter(|f| f.record_type == RecordType::Node)
            .collect();
        prop_assert_eq!(own[0].id, victim);
        prop_assert_eq!(own[0].kind, InconsistencyKind::ReferenceNotInUse);
    }

    #[test]
    fn budget_and_order_do_not_change_the_outcome(
        plan in arb_plan(),
        entries in 1u64..12,
        pick in any::<prop::sample::Index>(),
    ) {
        let mut b = build(&plan);
        let victim = pick.index(plan.nodes.len()) as u64;
        if let Some(node) = b.node_mut(victim) {
            node.next_prop = 1 << 40;
        }
        let reference = check(&b, 64 << 20, ExecutionOrder::Sequential);
        let budget = 2 * entries * MultiPassCaches::SLICE_ENTRY_BYTES;
        prop_assert_eq!(&check(&b, budget, ExecutionOrder::MultiThreaded), &reference);
        prop_assert_eq!(&check(&b, budget, ExecutionOrder::Sequential), &reference);
    }
}
