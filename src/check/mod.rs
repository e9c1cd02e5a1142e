//! Per-record consistency checks.
//!
//! Each store is swept by one [`RecordCheck`] variant. Checks look at the
//! record itself, at records it references (through the projections a task was
//! given, or the record access layer when a projection is absent) and report
//! every mismatch through the task's reporter. A check only fails for I/O
//! errors; everything else becomes a finding.

pub mod bitset;
pub mod dynamic;
pub mod index;
pub mod label_scan;
pub mod node;
pub mod owner;
pub mod property;
pub mod relationship;
pub mod schema;
pub mod token;

use std::fmt;
use std::sync::Arc;

pub use dynamic::ChainOwnership;
pub use owner::OwnerCheck;
pub use schema::ObligationRegistry;

use crate::access::{referenced, DiffRecordAccess};
use crate::full::multi_pass::{CacheSet, DynamicView, NodeView, PropertyView, RelationshipView};
use crate::report::{ConsistencyReporter, Inconsistency, InconsistencyKind, RecordType};
use crate::store::{Result, StoreError, TokenRecord};
use crate::types::{DynamicStore, StoreKind, TokenKind};

/// How thoroughly ownership is tracked during a run.
#[derive(Clone, Default)]
pub enum CheckMode {
    /// Every per-record check, no ownership bookkeeping.
    #[default]
    Exhaustive,
    /// Per-record checks plus ownership claims for the post-sweep audit.
    OwnerAuditing(Arc<OwnerCheck>),
}

impl CheckMode {
    /// Owner bookkeeping, when enabled.
    pub fn owners(&self) -> Option<&OwnerCheck> {
        match self {
            CheckMode::Exhaustive => None,
            CheckMode::OwnerAuditing(owners) => Some(owners),
        }
    }
}

impl fmt::Debug for CheckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckMode::Exhaustive => f.write_str("Exhaustive"),
            CheckMode::OwnerAuditing(_) => f.write_str("OwnerAuditing"),
        }
    }
}

/// Everything a record check may consult while checking one record.
pub struct CheckContext<'a> {
    /// Record lookups.
    pub access: &'a dyn DiffRecordAccess,
    /// Projections supplied to the current task.
    pub caches: &'a CacheSet,
    /// Ownership mode.
    pub mode: &'a CheckMode,
    /// Continuation claims of dynamic chains.
    pub chains: &'a ChainOwnership,
    /// Where findings go.
    pub reporter: ConsistencyReporter<'a>,
}

impl<'a> CheckContext<'a> {
    /// Node `id` as projected, `None` when it does not decode.
    pub fn node_view(&self, id: u64) -> Result<Option<NodeView>> {
        if let Some(cache) = self.caches.nodes() {
            return Ok(cache.get(id));
        }
        Ok(referenced(self.access.node(id))?.map(|r| NodeView::from(&r)))
    }

    /// Relationship `id` as projected, `None` when it does not decode.
    pub fn relationship_view(&self, id: u64) -> Result<Option<RelationshipView>> {
        if let Some(cache) = self.caches.relationships() {
            return Ok(cache.get(id));
        }
        Ok(referenced(self.access.relationship(id))?.map(|r| RelationshipView::from(&r)))
    }

    /// Property record `id` as projected, `None` when it does not decode.
    pub fn property_view(&self, id: u64) -> Result<Option<PropertyView>> {
        if let Some(cache) = self.caches.properties() {
            return Ok(cache.get(id));
        }
        Ok(referenced(self.access.property(id))?.map(|r| PropertyView::from(&r)))
    }

    /// Dynamic block `id` of `store` as projected, `None` when it does not decode.
    pub fn dynamic_view(&self, store: DynamicStore, id: u64) -> Result<Option<DynamicView>> {
        if let Some(cache) = self.caches.dynamic(store) {
            return Ok(cache.get(id));
        }
        Ok(referenced(self.access.dynamic(store, id))?.map(|r| DynamicView::from(&r)))
    }

    /// Token `id` of `kind`, `None` when it does not decode.
    pub fn token(&self, kind: TokenKind, id: u64) -> Result<Option<TokenRecord>> {
        referenced(self.access.token(kind, id))
    }

    /// Records one finding.
    pub fn report(&self, finding: Inconsistency) {
        self.reporter.report(finding);
    }

    /// Claims a property chain head when ownership is tracked.
    pub fn claim_property(&self, head: u64, claimant: RecordType) {
        if let Some(owners) = self.mode.owners() {
            owners.claim_property(head, claimant, &self.reporter);
        }
    }

    /// Claims a dynamic chain head when ownership is tracked.
    pub fn claim_dynamic(&self, store: DynamicStore, head: u64, claimant: RecordType) {
        if let Some(owners) = self.mode.owners() {
            owners.claim_dynamic(store, head, claimant, &self.reporter);
        }
    }

    /// Checks a reference to a token that must be in use.
    pub fn check_token_reference(
        &self,
        record_type: RecordType,
        id: u64,
        field: &str,
        kind: TokenKind,
        token: u64,
    ) -> Result<()> {
        if let Some(record) = self.token(kind, token)? {
            if !record.in_use {
                self.report(Inconsistency::new(
                    record_type,
                    id,
                    InconsistencyKind::ReferenceNotInUse,
                    field,
                    format!("in-use {} token", kind.store()),
                    Inconsistency::id_text(token),
                ));
            }
        }
        Ok(())
    }

    /// Checks a reference to the head of a chain in `store`.
    ///
    /// Returns whether the head is usable, so callers can claim it.
    pub fn check_dynamic_head(
        &self,
        record_type: RecordType,
        id: u64,
        field: &str,
        store: DynamicStore,
        head: u64,
    ) -> Result<bool> {
        let Some(view) = self.dynamic_view(store, head)? else {
            return Ok(false);
        };
        if !view.in_use {
            self.report(Inconsistency::new(
                record_type,
                id,
                InconsistencyKind::ReferenceNotInUse,
                field,
                format!("in-use {store} record"),
                Inconsistency::id_text(head),
            ));
            return Ok(false);
        }
        if !view.start {
            self.report(Inconsistency::new(
                record_type,
                id,
                InconsistencyKind::NotStartRecord,
                field,
                "start of chain",
                format!("continuation block {head}"),
            ));
            return Ok(false);
        }
        Ok(true)
    }
}

/// The check applied to every record of one store.
#[derive(Clone, Debug)]
pub enum RecordCheck {
    /// Node store.
    Node,
    /// Relationship store.
    Relationship,
    /// Property store.
    Property,
    /// A token store.
    Token(TokenKind),
    /// Chain structure of a dynamic store.
    Dynamic(DynamicStore),
    /// Schema rule decoding and obligation registration.
    SchemaRule(Arc<ObligationRegistry>),
}

impl RecordCheck {
    /// Store swept by this check.
    pub fn store(&self) -> StoreKind {
        match self {
            RecordCheck::Node => StoreKind::Node,
            RecordCheck::Relationship => StoreKind::Relationship,
            RecordCheck::Property => StoreKind::Property,
            RecordCheck::Token(kind) => kind.store(),
            RecordCheck::Dynamic(store) => StoreKind::Dynamic(*store),
            RecordCheck::SchemaRule(_) => StoreKind::Dynamic(DynamicStore::Schema),
        }
    }

    /// Category findings about the swept records fall under.
    pub fn record_type(&self) -> RecordType {
        match self {
            RecordCheck::Node => RecordType::Node,
            RecordCheck::Relationship => RecordType::Relationship,
            RecordCheck::Property => RecordType::Property,
            RecordCheck::Token(kind) => RecordType::of_token(*kind),
            RecordCheck::Dynamic(store) => RecordType::of_dynamic(*store),
            RecordCheck::SchemaRule(_) => RecordType::Schema,
        }
    }

    /// Reads record `id` and checks it.
    ///
    /// Not-in-use records produce no findings of their own; references to
    /// them are reported by the in-use record holding the reference.
    pub fn check_id(&self, ctx: &CheckContext<'_>, id: u64) -> Result<()> {
        let outcome = match self {
            RecordCheck::Node => ctx.access.node(id).and_then(|r| node::check(ctx, &r)),
            RecordCheck::Relationship => ctx
                .access
                .relationship(id)
                .and_then(|r| relationship::check(ctx, &r)),
            RecordCheck::Property => ctx.access.property(id).and_then(|r| property::check(ctx, &r)),
            RecordCheck::Token(kind) => ctx
                .access
                .token(*kind, id)
                .and_then(|r| token::check(ctx, *kind, &r)),
            RecordCheck::Dynamic(store) => ctx
                .access
                .dynamic(*store, id)
                .and_then(|r| dynamic::check(ctx, *store, &r)),
            RecordCheck::SchemaRule(registry) => {
                return match ctx.access.dynamic(DynamicStore::Schema, id) {
                    Ok(record) => schema::check_rule_record(ctx, registry, &record),
                    // reported by the chain pass
                    Err(err) if err.is_decode_failure() => Ok(()),
                    Err(err) => Err(err),
                };
            }
        };
        match outcome {
            Err(StoreError::Corruption(reason)) => {
                ctx.report(Inconsistency::new(
                    self.record_type(),
                    id,
                    InconsistencyKind::RecordNotDecodable,
                    "record",
                    "decodable record",
                    reason,
                ));
                Ok(())
            }
            other => other,
        }
    }
}
