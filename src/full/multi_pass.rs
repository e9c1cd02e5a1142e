//! Bounded in-memory projections used for cross-store checks.
//!
//! Five categories can be projected: nodes, relationships, properties,
//! strings and arrays. Each projection keeps only the fields cross-checks
//! read. A category whose projection does not fit in what is left of the
//! memory budget is not built; lookups for it fall back to the record access
//! layer. Projections are built once before any task starts and are only
//! read afterwards.
//!
//! Node label sets are handled separately as per-round slices: the node id
//! space is cut into contiguous rounds small enough that one slice fits the
//! budget, and a slice lives only while the tasks of its round run.

use std::mem::size_of;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::debug;

use crate::access::{node_labels, RecordAccess};
use crate::store::record::Side;
use crate::store::{
    DynamicRecord, NodeRecord, PropertyRecord, RelationshipRecord, Result, StoreError,
};
use crate::types::{DynamicStore, StoreKind, NO_ID};

/// Projected node fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeView {
    /// In-use flag.
    pub in_use: bool,
    /// First relationship.
    pub next_rel: u64,
    /// Property chain head.
    pub next_prop: u64,
}

impl From<&NodeRecord> for NodeView {
    fn from(record: &NodeRecord) -> Self {
        Self {
            in_use: record.in_use,
            next_rel: record.next_rel,
            next_prop: record.next_prop,
        }
    }
}

/// Projected relationship chain pointers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelationshipView {
    /// In-use flag.
    pub in_use: bool,
    /// Source node.
    pub first_node: u64,
    /// Target node.
    pub second_node: u64,
    /// Source chain previous.
    pub first_prev: u64,
    /// Source chain next.
    pub first_next: u64,
    /// Target chain previous.
    pub second_prev: u64,
    /// Target chain next.
    pub second_next: u64,
}

impl RelationshipView {
    /// Side through which `node` participates, source winning for self-loops.
    pub fn side_of(&self, node: u64) -> Option<Side> {
        if self.first_node == node {
            Some(Side::Source)
        } else if self.second_node == node {
            Some(Side::Target)
        } else {
            None
        }
    }

    /// Previous pointer on `side`.
    pub fn prev(&self, side: Side) -> u64 {
        match side {
            Side::Source => self.first_prev,
            Side::Target => self.second_prev,
        }
    }

    /// Next pointer on `side`.
    pub fn next(&self, side: Side) -> u64 {
        match side {
            Side::Source => self.first_next,
            Side::Target => self.second_next,
        }
    }
}

impl From<&RelationshipRecord> for RelationshipView {
    fn from(record: &RelationshipRecord) -> Self {
        Self {
            in_use: record.in_use,
            first_node: record.first_node,
            second_node: record.second_node,
            first_prev: record.first_prev,
            first_next: record.first_next,
            second_prev: record.second_prev,
            second_next: record.second_next,
        }
    }
}

/// Projected property chain pointers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PropertyView {
    /// In-use flag.
    pub in_use: bool,
    /// Previous record.
    pub prev: u64,
    /// Next record.
    pub next: u64,
}

impl From<&PropertyRecord> for PropertyView {
    fn from(record: &PropertyRecord) -> Self {
        Self {
            in_use: record.in_use,
            prev: record.prev,
            next: record.next,
        }
    }
}

/// Projected dynamic block header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DynamicView {
    /// In-use flag.
    pub in_use: bool,
    /// Start-of-chain flag.
    pub start: bool,
    /// Next block.
    pub next: u64,
}

impl From<&DynamicRecord> for DynamicView {
    fn from(record: &DynamicRecord) -> Self {
        Self {
            in_use: record.in_use,
            start: record.start,
            next: record.next,
        }
    }
}

/// Views that have a well-defined "absent record" value.
pub trait View: Copy + Send + Sync + 'static {
    /// View of an id past the high-water mark.
    fn absent() -> Self;
}

impl View for NodeView {
    fn absent() -> Self {
        Self {
            in_use: false,
            next_rel: NO_ID,
            next_prop: NO_ID,
        }
    }
}

impl View for RelationshipView {
    fn absent() -> Self {
        Self {
            in_use: false,
            first_node: NO_ID,
            second_node: NO_ID,
            first_prev: NO_ID,
            first_next: NO_ID,
            second_prev: NO_ID,
            second_next: NO_ID,
        }
    }
}

impl View for PropertyView {
    fn absent() -> Self {
        Self {
            in_use: false,
            prev: NO_ID,
            next: NO_ID,
        }
    }
}

impl View for DynamicView {
    fn absent() -> Self {
        Self {
            in_use: false,
            start: false,
            next: NO_ID,
        }
    }
}

/// One category's projection, indexed by record id.
#[derive(Debug)]
pub struct Projection<V> {
    views: Vec<Option<V>>,
}

impl<V: View> Projection<V> {
    fn build<R>(
        high_id: u64,
        mut read: impl FnMut(u64) -> Result<R>,
        project: impl Fn(&R) -> V,
    ) -> Result<Self> {
        let mut views = Vec::with_capacity(high_id as usize);
        for id in 0..high_id {
            match read(id) {
                Ok(record) => views.push(Some(project(&record))),
                Err(err) if err.is_decode_failure() => views.push(None),
                Err(err) => return Err(err),
            }
        }
        Ok(Self { views })
    }

    /// View of record `id`; `None` when the record does not decode.
    pub fn get(&self, id: u64) -> Option<V> {
        match self.views.get(id as usize) {
            Some(view) => *view,
            None => Some(V::absent()),
        }
    }

    /// Number of projected records.
    pub fn len(&self) -> usize {
        self.views.len()
    }

    /// True when nothing was projected.
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

/// The projectable categories.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CacheCategory {
    /// Node views.
    Nodes,
    /// Relationship views.
    Relationships,
    /// Property views.
    Properties,
    /// String block views.
    Strings,
    /// Array block views.
    Arrays,
}

impl CacheCategory {
    /// Every category, in build order.
    pub const ALL: [CacheCategory; 5] = [
        CacheCategory::Nodes,
        CacheCategory::Relationships,
        CacheCategory::Properties,
        CacheCategory::Strings,
        CacheCategory::Arrays,
    ];

    /// Store whose records the category projects.
    pub const fn store(self) -> StoreKind {
        match self {
            CacheCategory::Nodes => StoreKind::Node,
            CacheCategory::Relationships => StoreKind::Relationship,
            CacheCategory::Properties => StoreKind::Property,
            CacheCategory::Strings => StoreKind::Dynamic(DynamicStore::String),
            CacheCategory::Arrays => StoreKind::Dynamic(DynamicStore::Array),
        }
    }

    /// Bytes one projected record occupies.
    pub const fn bytes_per_record(self) -> usize {
        match self {
            CacheCategory::Nodes => size_of::<Option<NodeView>>(),
            CacheCategory::Relationships => size_of::<Option<RelationshipView>>(),
            CacheCategory::Properties => size_of::<Option<PropertyView>>(),
            CacheCategory::Strings | CacheCategory::Arrays => size_of::<Option<DynamicView>>(),
        }
    }
}

/// The projections one task may consult. Missing categories fall back to
/// record lookups.
#[derive(Clone, Debug, Default)]
pub struct CacheSet {
    nodes: Option<Arc<Projection<NodeView>>>,
    relationships: Option<Arc<Projection<RelationshipView>>>,
    properties: Option<Arc<Projection<PropertyView>>>,
    strings: Option<Arc<Projection<DynamicView>>>,
    arrays: Option<Arc<Projection<DynamicView>>>,
}

impl CacheSet {
    /// No projections at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Node projection, if supplied.
    pub fn nodes(&self) -> Option<&Projection<NodeView>> {
        self.nodes.as_deref()
    }

    /// Relationship projection, if supplied.
    pub fn relationships(&self) -> Option<&Projection<RelationshipView>> {
        self.relationships.as_deref()
    }

    /// Property projection, if supplied.
    pub fn properties(&self) -> Option<&Projection<PropertyView>> {
        self.properties.as_deref()
    }

    /// Projection of `store`, if it is a projectable dynamic store and supplied.
    pub fn dynamic(&self, store: DynamicStore) -> Option<&Projection<DynamicView>> {
        match store {
            DynamicStore::String => self.strings.as_deref(),
            DynamicStore::Array => self.arrays.as_deref(),
            _ => None,
        }
    }

    /// Whether `category` is supplied.
    pub fn contains(&self, category: CacheCategory) -> bool {
        match category {
            CacheCategory::Nodes => self.nodes.is_some(),
            CacheCategory::Relationships => self.relationships.is_some(),
            CacheCategory::Properties => self.properties.is_some(),
            CacheCategory::Strings => self.strings.is_some(),
            CacheCategory::Arrays => self.arrays.is_some(),
        }
    }
}

/// Label-set slice entry of one node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SliceEntry {
    /// The node is not in use.
    NotInUse,
    /// The node record or its label chain could not be read.
    Unreadable,
    /// An in-use node.
    Labels {
        /// Label ids, sorted.
        labels: SmallVec<[u32; 3]>,
        /// Property chain head.
        next_prop: u64,
    },
}

static NOT_IN_USE: SliceEntry = SliceEntry::NotInUse;

/// Label sets of one contiguous range of node ids.
#[derive(Debug)]
pub struct NodeLabelSlice {
    start: u64,
    entries: Vec<SliceEntry>,
}

impl NodeLabelSlice {
    /// Loads the nodes of `range` that exist in the store.
    pub fn load(access: &dyn RecordAccess, range: Range<u64>) -> Result<Self> {
        let end = range.end.min(access.high_id(StoreKind::Node));
        let start = range.start.min(end);
        let mut entries = Vec::with_capacity((end - start) as usize);
        for id in start..end {
            let node = match access.node(id) {
                Ok(node) => node,
                Err(err) if err.is_decode_failure() => {
                    entries.push(SliceEntry::Unreadable);
                    continue;
                }
                Err(err) => return Err(err),
            };
            if !node.in_use {
                entries.push(SliceEntry::NotInUse);
                continue;
            }
            let entry = match node_labels(access, &node)? {
                Some(mut labels) => {
                    labels.sort_unstable();
                    SliceEntry::Labels {
                        labels: labels.into_iter().collect(),
                        next_prop: node.next_prop,
                    }
                }
                None => SliceEntry::Unreadable,
            };
            entries.push(entry);
        }
        Ok(Self { start, entries })
    }

    /// Entry of `node`; nodes outside the slice read as not in use.
    pub fn get(&self, node: u64) -> &SliceEntry {
        node.checked_sub(self.start)
            .and_then(|offset| self.entries.get(offset as usize))
            .unwrap_or(&NOT_IN_USE)
    }

    /// Node ids and entries held by the slice.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &SliceEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(move |(pos, entry)| (self.start + pos as u64, entry))
    }
}

struct RoundSlot {
    range: Range<u64>,
    slice: Mutex<Option<Arc<NodeLabelSlice>>>,
    pending: AtomicUsize,
}

/// Projections built for one run plus the node-round plan.
pub struct MultiPassCaches {
    built: CacheSet,
    rounds: Vec<RoundSlot>,
    bytes_used: u64,
    loaded: AtomicUsize,
    peak_loaded: AtomicUsize,
}

impl MultiPassCaches {
    /// Bytes of one node label slice entry.
    pub const SLICE_ENTRY_BYTES: u64 = size_of::<SliceEntry>() as u64;

    /// Plans rounds and builds every projection that fits in `budget`.
    ///
    /// Half the budget is reserved for one round's node slice; projections
    /// share the rest in build order.
    pub fn build(access: &dyn RecordAccess, budget: u64) -> Result<Self> {
        let slice_budget = budget / 2;
        let mut remaining = budget - slice_budget;
        let node_high = access.high_id(StoreKind::Node);
        let rounds = plan_rounds(node_high, slice_budget)
            .into_iter()
            .map(|range| RoundSlot {
                range,
                slice: Mutex::new(None),
                pending: AtomicUsize::new(0),
            })
            .collect();

        let mut built = CacheSet::empty();
        let mut bytes_used = 0;
        for category in CacheCategory::ALL {
            let high = access.high_id(category.store());
            let cost = high.saturating_mul(category.bytes_per_record() as u64);
            if cost > remaining {
                debug!(?category, cost, remaining, "multi_pass.category_degraded");
                continue;
            }
            remaining -= cost;
            bytes_used += cost;
            match category {
                CacheCategory::Nodes => {
                    built.nodes = Some(Arc::new(Projection::build(
                        high,
                        |id| access.node(id),
                        |record: &NodeRecord| NodeView::from(record),
                    )?));
                }
                CacheCategory::Relationships => {
                    built.relationships = Some(Arc::new(Projection::build(
                        high,
                        |id| access.relationship(id),
                        |record: &RelationshipRecord| RelationshipView::from(record),
                    )?));
                }
                CacheCategory::Properties => {
                    built.properties = Some(Arc::new(Projection::build(
                        high,
                        |id| access.property(id),
                        |record: &PropertyRecord| PropertyView::from(record),
                    )?));
                }
                CacheCategory::Strings => {
                    built.strings = Some(Arc::new(Projection::build(
                        high,
                        |id| access.dynamic(DynamicStore::String, id),
                        |record: &DynamicRecord| DynamicView::from(record),
                    )?));
                }
                CacheCategory::Arrays => {
                    built.arrays = Some(Arc::new(Projection::build(
                        high,
                        |id| access.dynamic(DynamicStore::Array, id),
                        |record: &DynamicRecord| DynamicView::from(record),
                    )?));
                }
            }
            debug!(?category, records = high, bytes = cost, "multi_pass.category_built");
        }
        Ok(Self {
            built,
            rounds,
            bytes_used,
            loaded: AtomicUsize::new(0),
            peak_loaded: AtomicUsize::new(0),
        })
    }

    /// The subset of built projections listed in `categories`.
    pub fn caches_for(&self, categories: &[CacheCategory]) -> CacheSet {
        let mut set = CacheSet::empty();
        for category in categories {
            match category {
                CacheCategory::Nodes => set.nodes = self.built.nodes.clone(),
                CacheCategory::Relationships => set.relationships = self.built.relationships.clone(),
                CacheCategory::Properties => set.properties = self.built.properties.clone(),
                CacheCategory::Strings => set.strings = self.built.strings.clone(),
                CacheCategory::Arrays => set.arrays = self.built.arrays.clone(),
            }
        }
        set
    }

    /// Bytes held by projections.
    pub fn bytes_used(&self) -> u64 {
        self.bytes_used
    }

    /// Number of node rounds.
    pub fn round_count(&self) -> usize {
        self.rounds.len()
    }

    /// Node id range of `round`.
    pub fn round_range(&self, round: usize) -> Range<u64> {
        self.rounds
            .get(round)
            .map_or(0..0, |slot| slot.range.clone())
    }

    /// Declares that `tasks` tasks will use the slice of `round`.
    pub fn expect_round_users(&self, round: usize, tasks: usize) {
        if let Some(slot) = self.rounds.get(round) {
            slot.pending.fetch_add(tasks, Ordering::AcqRel);
        }
    }

    /// Slice of `round`, loaded by the first task that asks.
    pub fn acquire_slice(&self, round: usize, access: &dyn RecordAccess) -> Result<Arc<NodeLabelSlice>> {
        let slot = self
            .rounds
            .get(round)
            .ok_or(StoreError::Invalid("unknown node round"))?;
        let mut guard = slot.slice.lock();
        if let Some(slice) = guard.as_ref() {
            return Ok(Arc::clone(slice));
        }
        let slice = Arc::new(NodeLabelSlice::load(access, slot.range.clone())?);
        *guard = Some(Arc::clone(&slice));
        let live = self.loaded.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_loaded.fetch_max(live, Ordering::AcqRel);
        debug!(round, start = slot.range.start, live, "multi_pass.slice_loaded");
        Ok(slice)
    }

    /// Marks one user of `round` finished; the last one drops the slice.
    pub fn release_slice(&self, round: usize) {
        let Some(slot) = self.rounds.get(round) else {
            return;
        };
        if slot.pending.fetch_sub(1, Ordering::AcqRel) == 1 && slot.slice.lock().take().is_some() {
            self.loaded.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Most round slices ever held at once during this run.
    pub fn peak_loaded_slices(&self) -> usize {
        self.peak_loaded.load(Ordering::Acquire)
    }

    /// Whether the slice of `round` is currently loaded.
    pub fn slice_loaded(&self, round: usize) -> bool {
        self.rounds
            .get(round)
            .is_some_and(|slot| slot.slice.lock().is_some())
    }
}

/// Cuts `0..node_high` into rounds whose slices fit `budget` bytes.
///
/// The last round is open-ended so entries naming nodes past the high-water
/// mark are still examined exactly once.
pub fn plan_rounds(node_high: u64, budget: u64) -> Vec<Range<u64>> {
    let per_round = (budget / MultiPassCaches::SLICE_ENTRY_BYTES).max(1);
    let count = node_high.div_ceil(per_round).max(1);
    (0..count)
        .map(|k| {
            let start = k * per_round;
            let end = if k + 1 == count { u64::MAX } else { start + per_round };
            start..end
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::DirectRecordAccess;
    use crate::store::builder::StoreBuilder;

    fn demo_access() -> DirectRecordAccess {
        let access = StoreBuilder::demo().build_in_memory().unwrap();
        DirectRecordAccess::new(access.native_stores().clone())
    }

    #[test]
    fn rounds_cover_the_id_space_once() {
        let entry = MultiPassCaches::SLICE_ENTRY_BYTES;
        let rounds = plan_rounds(10, entry * 4);
        assert_eq!(rounds, vec![0..4, 4..8, 8..u64::MAX]);
        assert_eq!(plan_rounds(0, 1), vec![0..u64::MAX]);
        assert_eq!(plan_rounds(3, 0).len(), 3);
    }

    #[test]
    fn generous_budget_builds_everything() -> Result<()> {
        let access = demo_access();
        let caches = MultiPassCaches::build(&access, 1 << 20)?;
        let all = caches.caches_for(&CacheCategory::ALL);
        for category in CacheCategory::ALL {
            assert!(all.contains(category), "{category:?} missing");
        }
        assert_eq!(caches.round_count(), 1);
        let node = all.nodes().and_then(|p| p.get(0));
        assert_eq!(node.map(|n| n.in_use), Some(true));
        assert_eq!(all.nodes().and_then(|p| p.get(10_000)), Some(NodeView::absent()));
        Ok(())
    }

    #[test]
    fn tiny_budget_degrades_to_lookups() -> Result<()> {
        let access = demo_access();
        let caches = MultiPassCaches::build(&access, 1)?;
        let all = caches.caches_for(&CacheCategory::ALL);
        assert!(CacheCategory::ALL.iter().all(|c| !all.contains(*c)));
        assert_eq!(caches.bytes_used(), 0);
        assert_eq!(caches.round_count(), 5);
        Ok(())
    }

    #[test]
    fn subsets_only_expose_requested_categories() -> Result<()> {
        let access = demo_access();
        let caches = MultiPassCaches::build(&access, 1 << 20)?;
        let subset = caches.caches_for(&[CacheCategory::Properties]);
        assert!(subset.properties().is_some());
        assert!(subset.nodes().is_none());
        assert!(subset.dynamic(DynamicStore::String).is_none());
        Ok(())
    }

    #[test]
    fn slices_are_shared_and_dropped_by_last_user() -> Result<()> {
        let access = demo_access();
        let caches = MultiPassCaches::build(&access, 1 << 20)?;
        caches.expect_round_users(0, 2);
        let first = caches.acquire_slice(0, &access)?;
        let second = caches.acquire_slice(0, &access)?;
        assert!(Arc::ptr_eq(&first, &second));
        assert!(matches!(first.get(0), SliceEntry::Labels { .. }));
        assert_eq!(first.get(99), &SliceEntry::NotInUse);
        caches.release_slice(0);
        assert!(caches.slice_loaded(0));
        caches.release_slice(0);
        assert!(!caches.slice_loaded(0));
        assert_eq!(caches.peak_loaded_slices(), 1);
        Ok(())
    }
}
