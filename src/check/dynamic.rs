use rustc_hash::FxHashSet;
use tracing::debug;

use super::bitset::AtomicBitSet;
use super::CheckContext;
use crate::access::{referenced, RecordAccess};
use crate::report::{ConsistencyReporter, Inconsistency, InconsistencyKind, RecordType};
use crate::store::{DynamicRecord, Result};
use crate::types::{is_none, DynamicStore, StoreKind};

/// Which continuation blocks of each dynamic store have been claimed as the
/// `next` of some block, and which are reachable from a start block.
#[derive(Debug)]
pub struct ChainOwnership {
    claimed: [AtomicBitSet; 7],
    reached: [AtomicBitSet; 7],
}

impl ChainOwnership {
    /// Bitsets sized for the dynamic stores behind `access`.
    pub fn new(access: &dyn RecordAccess) -> Self {
        let sized = |pos: usize| {
            let store = DynamicStore::ALL[pos];
            AtomicBitSet::new(access.high_id(StoreKind::Dynamic(store)))
        };
        Self {
            claimed: std::array::from_fn(sized),
            reached: std::array::from_fn(sized),
        }
    }

    /// Claims block `id` of `store`; true when it was claimed before.
    pub fn claim(&self, store: DynamicStore, id: u64) -> bool {
        self.claimed[store.index()].set(id)
    }

    /// Marks block `id` of `store` reachable; true when it already was.
    pub fn reach(&self, store: DynamicStore, id: u64) -> bool {
        self.reached[store.index()].set(id)
    }

    /// Reports every loop of continuation blocks that no start block leads
    /// into, once per loop at its lowest id. Runs after every dynamic store
    /// was swept. Returns the number of loops found.
    pub fn audit_cycles(
        &self,
        access: &dyn RecordAccess,
        reporter: &ConsistencyReporter<'_>,
    ) -> Result<u64> {
        let mut cycles = 0;
        for store in DynamicStore::ALL {
            let reached = &self.reached[store.index()];
            let mut settled = FxHashSet::default();
            for id in self.claimed[store.index()].iter_ones() {
                if reached.get(id) || settled.contains(&id) {
                    continue;
                }
                let Some(members) = cycle_through(access, store, id)? else {
                    continue;
                };
                let lowest = members.iter().copied().min().unwrap_or(id);
                reporter.report(Inconsistency::new(
                    RecordType::of_dynamic(store),
                    lowest,
                    InconsistencyKind::ContinuationCycle,
                    "next",
                    "chain reachable from a start block",
                    format!("loop of {} blocks", members.len()),
                ));
                settled.extend(members);
                cycles += 1;
            }
        }
        debug!(cycles, "dynamic_check.cycles_audited");
        Ok(cycles)
    }
}

// Members of the loop of in-use continuation blocks that returns to `id`,
// or `None` when following `next` from `id` ends or joins a loop elsewhere.
fn cycle_through(access: &dyn RecordAccess, store: DynamicStore, id: u64) -> Result<Option<Vec<u64>>> {
    let mut members = vec![id];
    let mut seen = FxHashSet::default();
    seen.insert(id);
    let mut current = id;
    loop {
        let Some(record) = referenced(access.dynamic(store, current))? else {
            return Ok(None);
        };
        if !record.in_use || record.start || is_none(record.next) {
            return Ok(None);
        }
        if record.next == id {
            return Ok(Some(members));
        }
        if !seen.insert(record.next) {
            return Ok(None);
        }
        members.push(record.next);
        current = record.next;
    }
}

// Marks the continuations of the chain starting at `head` reachable, stopping
// where a walk from another start block already passed.
fn mark_reachable(ctx: &CheckContext<'_>, store: DynamicStore, head: &DynamicRecord) -> Result<()> {
    let mut next = head.next;
    while !is_none(next) && !ctx.chains.reach(store, next) {
        match ctx.dynamic_view(store, next)? {
            Some(view) if view.in_use && !view.start => next = view.next,
            _ => break,
        }
    }
    Ok(())
}

/// Checks the chain structure around one dynamic block.
pub fn check(ctx: &CheckContext<'_>, store: DynamicStore, record: &DynamicRecord) -> Result<()> {
    if !record.in_use {
        return Ok(());
    }
    if record.start {
        mark_reachable(ctx, store, record)?;
    }
    let record_type = RecordType::of_dynamic(store);
    let id = record.id;
    if record.data.is_empty() {
        ctx.report(Inconsistency::new(
            record_type,
            id,
            InconsistencyKind::EmptyBlock,
            "length",
            "non-empty payload",
            0,
        ));
    }
    if is_none(record.next) {
        return Ok(());
    }
    if record.next == id {
        ctx.report(Inconsistency::new(
            record_type,
            id,
            InconsistencyKind::SelfReferencingBlock,
            "next",
            "another block",
            id,
        ));
        return Ok(());
    }
    if record.data.len() < store.data_size() {
        ctx.report(Inconsistency::new(
            record_type,
            id,
            InconsistencyKind::NotFullBlock,
            "length",
            store.data_size(),
            record.data.len(),
        ));
    }
    let Some(next) = ctx.dynamic_view(store, record.next)? else {
        return Ok(());
    };
    if !next.in_use {
        ctx.report(Inconsistency::new(
            record_type,
            id,
            InconsistencyKind::ReferenceNotInUse,
            "next",
            format!("in-use {store} record"),
            Inconsistency::id_text(record.next),
        ));
        return Ok(());
    }
    if next.start {
        ctx.report(Inconsistency::new(
            record_type,
            id,
            InconsistencyKind::NextIsStartRecord,
            "next",
            "continuation block",
            format!("start block {}", record.next),
        ));
        return Ok(());
    }
    if ctx.chains.claim(store, record.next) {
        ctx.report(Inconsistency::new(
            record_type,
            id,
            InconsistencyKind::SharedContinuation,
            "next",
            "continuation block claimed once",
            format!("block {} already claimed", record.next),
        ));
    }
    Ok(())
}
