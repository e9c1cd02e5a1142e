//! Ownership tracking for property chains and dynamic value chains.
//!
//! During the sweep every node and relationship claims its property chain
//! head, property blocks claim their string/array chains and tokens claim
//! their names. A second claim on the same record is a `MultipleOwners`
//! finding. After the sweep, [`OwnerCheck::audit_orphans`] reports property
//! chain heads nobody claimed.

use tracing::debug;

use super::bitset::AtomicBitSet;
use crate::access::{referenced, DiffRecordAccess};
use crate::report::{ConsistencyReporter, Inconsistency, InconsistencyKind, RecordType};
use crate::store::Result;
use crate::types::{is_none, DynamicStore, StoreKind};

/// Owner bits for one run.
#[derive(Debug)]
pub struct OwnerCheck {
    properties: AtomicBitSet,
    property_heads: AtomicBitSet,
    dynamic: [Option<AtomicBitSet>; 7],
}

impl OwnerCheck {
    /// Bitsets sized for the stores behind `access`.
    pub fn new(access: &dyn DiffRecordAccess) -> Self {
        let dynamic = std::array::from_fn(|pos| {
            let store = DynamicStore::ALL[pos];
            match store {
                DynamicStore::Schema => None,
                _ => Some(AtomicBitSet::new(access.high_id(StoreKind::Dynamic(store)))),
            }
        });
        Self {
            properties: AtomicBitSet::new(access.high_id(StoreKind::Property)),
            property_heads: AtomicBitSet::new(access.high_id(StoreKind::Property)),
            dynamic,
        }
    }

    /// Claims property record `head` for a `claimant` record, reporting a
    /// second claim.
    pub fn claim_property(
        &self,
        head: u64,
        claimant: RecordType,
        reporter: &ConsistencyReporter<'_>,
    ) {
        if is_none(head) {
            return;
        }
        if self.properties.set(head) {
            reporter.report(multiple_owners(RecordType::Property, head, claimant));
        }
    }

    /// Claims the head of a chain in `store` for a `claimant` record.
    pub fn claim_dynamic(
        &self,
        store: DynamicStore,
        head: u64,
        claimant: RecordType,
        reporter: &ConsistencyReporter<'_>,
    ) {
        if is_none(head) {
            return;
        }
        let Some(bits) = &self.dynamic[store.index()] else {
            return;
        };
        if bits.set(head) {
            reporter.report(multiple_owners(RecordType::of_dynamic(store), head, claimant));
        }
    }

    /// Notes that in-use property record `id` heads a chain.
    pub fn mark_property_head(&self, id: u64) {
        self.property_heads.set(id);
    }

    /// Whether property record `id` was claimed.
    pub fn property_owned(&self, id: u64) -> bool {
        self.properties.get(id)
    }

    /// Reports every chain head that was never claimed, confirming each
    /// against the persisted records first. Returns the number reported.
    pub fn audit_orphans(
        &self,
        access: &dyn DiffRecordAccess,
        reporter: &ConsistencyReporter<'_>,
    ) -> Result<u64> {
        let persisted = access.persisted();
        let mut orphans = 0;
        for id in self.property_heads.iter_ones() {
            if self.properties.get(id) {
                continue;
            }
            let Some(record) = referenced(persisted.property(id))? else {
                continue;
            };
            if !record.in_use || !is_none(record.prev) {
                continue;
            }
            reporter.report(Inconsistency::new(
                RecordType::Property,
                id,
                InconsistencyKind::OrphanPropertyChain,
                "owner",
                "node or relationship",
                "none",
            ));
            orphans += 1;
        }
        debug!(orphans, heads = self.property_heads.count_ones(), "owner_check.audited");
        Ok(orphans)
    }
}

// Which claimant comes second depends on task scheduling, so it only goes
// to the log and the finding itself stays the same across runs.
fn multiple_owners(record_type: RecordType, id: u64, claimant: RecordType) -> Inconsistency {
    debug!(%record_type, id, %claimant, "owner_check.second_claim");
    Inconsistency::new(
        record_type,
        id,
        InconsistencyKind::MultipleOwners,
        "owner",
        "single owner",
        "claimed more than once",
    )
}
