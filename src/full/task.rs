//! The unit of scheduling: one store sweep, schema pass, or index round.

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use super::multi_pass::{CacheCategory, MultiPassCaches, NodeLabelSlice};
use super::processor::StoreProcessor;
use super::progress::ProgressAggregator;
use crate::access::DiffRecordAccess;
use crate::check::{index, label_scan, ChainOwnership, CheckMode, ObligationRegistry, RecordCheck};
use crate::report::{ConsistencyReporter, InconsistencyReport};
use crate::store::{DirectStoreAccess, Result, SchemaRule};
use crate::types::{DynamicStore, TokenKind};

/// What a task does.
#[derive(Clone, Debug)]
pub enum TaskKind {
    /// Sweep of one store.
    Store(StoreProcessor),
    /// Schema obligation pass.
    Obligations(Arc<ObligationRegistry>),
    /// Label-scan entries of one node round.
    LabelScan {
        /// Round index.
        round: usize,
    },
    /// Entries of one index rule for one node round.
    Index {
        /// The index rule.
        rule: SchemaRule,
        /// Round index.
        round: usize,
    },
}

/// A named task and the tasks it must wait for.
#[derive(Clone, Debug)]
pub struct CheckTask {
    /// Task name, used in logs and failures.
    pub name: String,
    /// The work.
    pub kind: TaskKind,
    /// Positions in the task list that must finish first; always earlier ones.
    pub depends_on: Vec<usize>,
}

/// Shared state every task of a run reads from.
pub struct RunContext<'a> {
    /// Record lookups.
    pub access: &'a dyn DiffRecordAccess,
    /// Index readers.
    pub stores: &'a DirectStoreAccess,
    /// Projections and round slices.
    pub caches: &'a MultiPassCaches,
    /// Ownership mode.
    pub mode: &'a CheckMode,
    /// Dynamic continuation claims.
    pub chains: &'a ChainOwnership,
    /// Report sink.
    pub report: &'a InconsistencyReport,
    /// Progress counters.
    pub progress: &'a ProgressAggregator,
}

impl CheckTask {
    /// Runs the task to completion.
    pub fn run(&self, run: &RunContext<'_>) -> Result<()> {
        let started = Instant::now();
        debug!(task = %self.name, "full_check.task_started");
        let mut progress = run.progress.task(&self.name);
        let outcome = match &self.kind {
            TaskKind::Store(processor) => processor
                .process(
                    run.access,
                    run.mode,
                    run.chains,
                    ConsistencyReporter::new(run.report),
                    &mut progress,
                )
                .map(|_| ()),
            TaskKind::Obligations(registry) => {
                registry.resolve(&ConsistencyReporter::new(run.report));
                Ok(())
            }
            TaskKind::LabelScan { round } => with_round(run, *round, |slice, reporter| {
                let examined =
                    label_scan::check_round(run.stores.label_scan_store().as_ref(), slice, reporter)?;
                progress.add(examined);
                Ok(())
            }),
            TaskKind::Index { rule, round } => with_round(run, *round, |slice, reporter| {
                let examined = index::check_round(
                    run.access,
                    run.stores.indexes().as_ref(),
                    rule,
                    slice,
                    reporter,
                )?;
                progress.add(examined);
                Ok(())
            }),
        };
        let processed = progress.finish();
        debug!(
            task = %self.name,
            processed,
            ok = outcome.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "full_check.task_finished"
        );
        outcome
    }
}

fn with_round<F>(run: &RunContext<'_>, round: usize, body: F) -> Result<()>
where
    F: FnOnce(&NodeLabelSlice, &ConsistencyReporter<'_>) -> Result<()>,
{
    let outcome = run
        .caches
        .acquire_slice(round, run.access)
        .and_then(|slice| {
            let reporter = ConsistencyReporter::for_round(run.report, run.caches.round_range(round));
            body(&slice, &reporter)
        });
    run.caches.release_slice(round);
    outcome
}

fn store_task(
    name: impl Into<String>,
    check: RecordCheck,
    caches: &MultiPassCaches,
    categories: &[CacheCategory],
) -> CheckTask {
    CheckTask {
        name: name.into(),
        kind: TaskKind::Store(StoreProcessor::new(check, caches.caches_for(categories))),
        depends_on: Vec::new(),
    }
}

/// Builds the task list of one run.
///
/// Store sweeps come first, then the three schema passes, then one
/// label-scan task and one task per index rule for each node round. Every
/// round's slice is registered with the number of tasks that will use it,
/// and each round waits for all tasks of the round before it.
pub fn plan_tasks(
    caches: &MultiPassCaches,
    registry: &Arc<ObligationRegistry>,
    index_rules: &[SchemaRule],
) -> Vec<CheckTask> {
    use CacheCategory::{Arrays, Nodes, Properties, Relationships, Strings};

    let mut tasks = vec![
        store_task("NodeStore", RecordCheck::Node, caches, &[Properties, Relationships]),
        store_task(
            "RelationshipStore",
            RecordCheck::Relationship,
            caches,
            &[Nodes, Properties, Relationships],
        ),
        store_task("PropertyStore", RecordCheck::Property, caches, &[Properties, Strings, Arrays]),
        store_task("StringStore", RecordCheck::Dynamic(DynamicStore::String), caches, &[Strings]),
        store_task("ArrayStore", RecordCheck::Dynamic(DynamicStore::Array), caches, &[Arrays]),
    ];
    for (name, kind) in [
        ("PropertyKeyTokenStore", TokenKind::PropertyKey),
        ("RelationshipTypeTokenStore", TokenKind::RelationshipType),
        ("LabelTokenStore", TokenKind::Label),
    ] {
        tasks.push(store_task(name, RecordCheck::Token(kind), caches, &[]));
    }
    for (name, store) in [
        ("PropertyKeyNameStore", DynamicStore::PropertyKeyName),
        ("RelationshipTypeNameStore", DynamicStore::RelationshipTypeName),
        ("LabelNameStore", DynamicStore::LabelName),
        ("NodeDynamicLabelStore", DynamicStore::NodeLabel),
    ] {
        tasks.push(store_task(name, RecordCheck::Dynamic(store), caches, &[]));
    }

    let pass1 = tasks.len();
    tasks.push(store_task(
        "SchemaStore_Pass1",
        RecordCheck::Dynamic(DynamicStore::Schema),
        caches,
        &[],
    ));
    let mut pass2 = store_task(
        "SchemaStore_Pass2",
        RecordCheck::SchemaRule(Arc::clone(registry)),
        caches,
        &[],
    );
    pass2.depends_on.push(pass1);
    tasks.push(pass2);
    tasks.push(CheckTask {
        name: "SchemaStore_Pass3".to_owned(),
        kind: TaskKind::Obligations(Arc::clone(registry)),
        depends_on: vec![pass1 + 1],
    });

    // A round starts only after every task of the previous round finished,
    // so at most one node slice is loaded at a time.
    let mut previous_round: Vec<usize> = Vec::new();
    for round in 0..caches.round_count() {
        caches.expect_round_users(round, 1 + index_rules.len());
        let first = tasks.len();
        tasks.push(CheckTask {
            name: format!("LabelScanStore_{round}"),
            kind: TaskKind::LabelScan { round },
            depends_on: previous_round.clone(),
        });
        for rule in index_rules {
            tasks.push(CheckTask {
                name: format!("Index_{}_{round}", rule.id),
                kind: TaskKind::Index {
                    rule: rule.clone(),
                    round,
                },
                depends_on: previous_round.clone(),
            });
        }
        previous_round = (first..tasks.len()).collect();
    }
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::CacheSmallStoresRecordAccess;
    use crate::store::builder::StoreBuilder;

    #[test]
    fn schema_passes_are_chained() {
        let stores = StoreBuilder::demo().build_in_memory().unwrap();
        let access = CacheSmallStoresRecordAccess::new(stores.native_stores().clone()).unwrap();
        let caches = MultiPassCaches::build(&access, 1 << 20).unwrap();
        let registry = Arc::new(ObligationRegistry::new());
        let rules = vec![SchemaRule::index(0, 0, 0), SchemaRule::constraint_index(1, 1, 0, 2)];
        let tasks = plan_tasks(&caches, &registry, &rules);

        let position = |name: &str| tasks.iter().position(|t| t.name == name).unwrap();
        let pass1 = position("SchemaStore_Pass1");
        let pass2 = position("SchemaStore_Pass2");
        let pass3 = position("SchemaStore_Pass3");
        assert_eq!(tasks[pass2].depends_on, vec![pass1]);
        assert_eq!(tasks[pass3].depends_on, vec![pass2]);
        assert!(tasks
            .iter()
            .enumerate()
            .all(|(pos, task)| task.depends_on.iter().all(|dep| *dep < pos)));

        assert_eq!(caches.round_count(), 1);
        position("LabelScanStore_0");
        position("Index_0_0");
        position("Index_1_0");
    }

    #[test]
    fn tiny_budget_multiplies_round_tasks() {
        let stores = StoreBuilder::demo().build_in_memory().unwrap();
        let access = CacheSmallStoresRecordAccess::new(stores.native_stores().clone()).unwrap();
        let budget = 2 * 2 * MultiPassCaches::SLICE_ENTRY_BYTES;
        let caches = MultiPassCaches::build(&access, budget).unwrap();
        let registry = Arc::new(ObligationRegistry::new());
        let tasks = plan_tasks(&caches, &registry, &[SchemaRule::index(0, 0, 0)]);
        // five nodes, two per round
        assert_eq!(caches.round_count(), 3);
        let round_tasks = tasks
            .iter()
            .filter(|t| matches!(t.kind, TaskKind::LabelScan { .. } | TaskKind::Index { .. }))
            .count();
        assert_eq!(round_tasks, 6);

        let position = |name: &str| tasks.iter().position(|t| t.name == name).unwrap();
        assert!(tasks[position("LabelScanStore_0")].depends_on.is_empty());
        let round_zero = vec![position("LabelScanStore_0"), position("Index_0_0")];
        assert_eq!(tasks[position("LabelScanStore_1")].depends_on, round_zero);
        assert_eq!(tasks[position("Index_0_1")].depends_on, round_zero);
        let round_one = vec![position("LabelScanStore_1"), position("Index_0_1")];
        assert_eq!(tasks[position("Index_0_2")].depends_on, round_one);
    }
}
