use std::ops::Range;

use super::progress::TaskProgress;
use crate::access::DiffRecordAccess;
use crate::check::{ChainOwnership, CheckContext, CheckMode, RecordCheck};
use crate::full::multi_pass::CacheSet;
use crate::report::ConsistencyReporter;
use crate::store::Result;

/// Walks the records of one store in ascending id order and applies a check.
#[derive(Clone, Debug)]
pub struct StoreProcessor {
    check: RecordCheck,
    caches: CacheSet,
}

impl StoreProcessor {
    /// A processor applying `check` with the projections in `caches`.
    pub fn new(check: RecordCheck, caches: CacheSet) -> Self {
        Self { check, caches }
    }

    /// The check this processor applies.
    pub fn check(&self) -> &RecordCheck {
        &self.check
    }

    /// Records the processor will visit.
    pub fn high_id(&self, access: &dyn DiffRecordAccess) -> u64 {
        access.high_id(self.check.store())
    }

    /// Checks every record of the store.
    pub fn process(
        &self,
        access: &dyn DiffRecordAccess,
        mode: &CheckMode,
        chains: &ChainOwnership,
        reporter: ConsistencyReporter<'_>,
        progress: &mut TaskProgress<'_>,
    ) -> Result<u64> {
        let range = 0..self.high_id(access);
        self.process_range(access, mode, chains, reporter, range, progress)
    }

    /// Checks the records whose ids fall in `range`.
    pub fn process_range(
        &self,
        access: &dyn DiffRecordAccess,
        mode: &CheckMode,
        chains: &ChainOwnership,
        reporter: ConsistencyReporter<'_>,
        range: Range<u64>,
        progress: &mut TaskProgress<'_>,
    ) -> Result<u64> {
        let ctx = CheckContext {
            access,
            caches: &self.caches,
            mode,
            chains,
            reporter,
        };
        let mut visited = 0;
        for id in range {
            self.check.check_id(&ctx, id)?;
            progress.add(1);
            visited += 1;
        }
        Ok(visited)
    }
}
