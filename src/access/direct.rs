use super::{DiffRecordAccess, RecordAccess};
use crate::store::{
    DynamicRecord, NodeRecord, PropertyRecord, RelationshipRecord, Result, StoreSet, TokenRecord,
};
use crate::types::{DynamicStore, StoreKind, TokenKind};

/// Reads every record straight from its store.
#[derive(Clone, Debug)]
pub struct DirectRecordAccess {
    stores: StoreSet,
}

impl DirectRecordAccess {
    /// Access over `stores`.
    pub fn new(stores: StoreSet) -> Self {
        Self { stores }
    }

    /// Underlying stores.
    pub fn stores(&self) -> &StoreSet {
        &self.stores
    }
}

impl RecordAccess for DirectRecordAccess {
    fn node(&self, id: u64) -> Result<NodeRecord> {
        self.stores.nodes.record(id)
    }

    fn relationship(&self, id: u64) -> Result<RelationshipRecord> {
        self.stores.relationships.record(id)
    }

    fn property(&self, id: u64) -> Result<PropertyRecord> {
        self.stores.properties.record(id)
    }

    fn token(&self, kind: TokenKind, id: u64) -> Result<TokenRecord> {
        self.stores.tokens(kind).record(id)
    }

    fn dynamic(&self, store: DynamicStore, id: u64) -> Result<DynamicRecord> {
        self.stores.dynamic(store).record(id)
    }

    fn high_id(&self, kind: StoreKind) -> u64 {
        self.stores.high_id(kind)
    }
}

impl DiffRecordAccess for DirectRecordAccess {
    fn persisted(&self) -> &dyn RecordAccess {
        self
    }
}
