//! The full consistency check: one run over every store and index.

pub mod execution;
pub mod multi_pass;
pub mod processor;
pub mod progress;
pub mod task;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use indicatif::ProgressBar;
use tracing::{debug, info};

use crate::access::{CacheSmallStoresRecordAccess, RecordAccess};
use crate::check::{ChainOwnership, CheckMode, ObligationRegistry, OwnerCheck};
use crate::config::CheckConfig;
use crate::error::{CheckError, Result};
use crate::report::{CheckSummary, ConsistencyReporter, InconsistencyLogger, InconsistencyReport};
use crate::store::schema::load_all_rules;
use crate::store::DirectStoreAccess;
use crate::types::{DynamicStore, StoreKind};

use self::multi_pass::MultiPassCaches;
use self::progress::ProgressAggregator;
use self::task::{plan_tasks, RunContext};

pub use self::processor::StoreProcessor;

/// Name under which a failing orphan audit is reported.
pub const ORPHAN_AUDIT_TASK: &str = "OwnerCheck_Orphans";
/// Name under which a failing continuation loop audit is reported.
pub const CYCLE_AUDIT_TASK: &str = "DynamicStore_Cycles";
/// Name under which a failing schema preload is reported.
pub const SCHEMA_PRELOAD_TASK: &str = "SchemaStore_Rules";

/// Runs every check against one store set.
///
/// ```no_run
/// use std::sync::Arc;
/// use sombra_consistency::report::TracingLogger;
/// use sombra_consistency::{CheckConfig, DirectStoreAccess, FullCheck};
///
/// let stores = DirectStoreAccess::open("graph.store")?;
/// let summary = FullCheck::new(CheckConfig::default()).execute(&stores, Arc::new(TracingLogger))?;
/// println!("{summary}");
/// # Ok::<(), sombra_consistency::CheckError>(())
/// ```
pub struct FullCheck {
    config: CheckConfig,
    progress: Option<ProgressBar>,
}

impl FullCheck {
    /// A check configured by `config`.
    pub fn new(config: CheckConfig) -> Self {
        Self {
            config,
            progress: None,
        }
    }

    /// Mirrors record counts onto `bar` while the run proceeds.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    /// The configuration in use.
    pub fn config(&self) -> &CheckConfig {
        &self.config
    }

    /// Checks `stores`, sending every finding to `logger`.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::Incomplete`] or [`CheckError::TaskPanicked`] when
    /// a task could not finish; no summary exists then. Inconsistencies are
    /// not errors.
    pub fn execute(
        &self,
        stores: &DirectStoreAccess,
        logger: Arc<dyn InconsistencyLogger>,
    ) -> Result<CheckSummary> {
        self.config.validate()?;
        let started = Instant::now();
        let access = CacheSmallStoresRecordAccess::new(stores.native_stores().clone())?;
        let report = InconsistencyReport::new(logger, self.config.max_retained_findings);
        let caches = MultiPassCaches::build(&access, self.config.total_mapped_memory_budget)?;
        let mode = if self.config.check_property_owners {
            CheckMode::OwnerAuditing(Arc::new(OwnerCheck::new(&access)))
        } else {
            CheckMode::Exhaustive
        };
        let chains = ChainOwnership::new(&access);
        let registry = Arc::new(ObligationRegistry::new());

        let schema = stores.native_stores().dynamic(DynamicStore::Schema);
        let index_rules: Vec<_> = load_all_rules(schema.as_ref())
            .map_err(|err| CheckError::incomplete(SCHEMA_PRELOAD_TASK, err))?
            .into_iter()
            .filter(|rule| rule.kind.is_index())
            .collect();
        let tasks = plan_tasks(&caches, &registry, &index_rules);
        debug!(
            tasks = tasks.len(),
            rounds = caches.round_count(),
            index_rules = index_rules.len(),
            projected_bytes = caches.bytes_used(),
            order = ?self.config.execution_order,
            "full_check.planned"
        );

        let progress = ProgressAggregator::new(self.progress.clone());
        progress.set_length(planned_records(&access));
        let run = RunContext {
            access: &access,
            stores,
            caches: &caches,
            mode: &mode,
            chains: &chains,
            report: &report,
            progress: &progress,
        };
        let outcome = execution::execute(
            &tasks,
            self.config.execution_order,
            self.config.workers(),
            &run,
        );
        progress.finish();
        outcome?;

        chains
            .audit_cycles(&access, &ConsistencyReporter::new(&report))
            .map_err(|err| CheckError::incomplete(CYCLE_AUDIT_TASK, err))?;
        if let Some(owners) = mode.owners() {
            owners
                .audit_orphans(&access, &ConsistencyReporter::new(&report))
                .map_err(|err| CheckError::incomplete(ORPHAN_AUDIT_TASK, err))?;
        }

        let summary = report.summary();
        if summary.total() == 0 {
            info!(
                records = progress.records(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "full_check.consistent"
            );
        } else {
            info!("Inconsistencies found: {summary}");
        }
        Ok(summary)
    }
}

impl fmt::Debug for FullCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FullCheck")
            .field("config", &self.config)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

// Records visited by store sweeps; the schema store is swept twice.
// Index entries are counted as they are read but not planned for.
fn planned_records(access: &dyn RecordAccess) -> u64 {
    let mut total = [
        StoreKind::Node,
        StoreKind::Relationship,
        StoreKind::Property,
        StoreKind::PropertyKey,
        StoreKind::RelationshipType,
        StoreKind::Label,
        StoreKind::Dynamic(DynamicStore::Schema),
    ]
    .into_iter()
    .map(|kind| access.high_id(kind))
    .sum::<u64>();
    for store in DynamicStore::ALL {
        total += access.high_id(StoreKind::Dynamic(store));
    }
    total
}
