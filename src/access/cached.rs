use std::fmt;

use super::{preload_error, DiffRecordAccess, DirectRecordAccess, RecordAccess};
use crate::store::{
    DynamicRecord, NodeRecord, PropertyRecord, RelationshipRecord, Result, StoreError, StoreSet,
    TokenRecord,
};
use crate::types::{DynamicStore, StoreKind, TokenKind};

type Slot = std::result::Result<TokenRecord, &'static str>;

/// Keeps the three token stores in memory and reads everything else directly.
///
/// Token stores are tiny and consulted by almost every record check, so they
/// are loaded once at construction. Decode failures are kept per slot and
/// replayed on lookup; an I/O failure while loading fails construction.
pub struct CacheSmallStoresRecordAccess {
    direct: DirectRecordAccess,
    tokens: [Vec<Slot>; 3],
}

fn slot(kind: TokenKind) -> usize {
    match kind {
        TokenKind::PropertyKey => 0,
        TokenKind::RelationshipType => 1,
        TokenKind::Label => 2,
    }
}

impl CacheSmallStoresRecordAccess {
    /// Loads the token stores of `stores`.
    pub fn new(stores: StoreSet) -> Result<Self> {
        let direct = DirectRecordAccess::new(stores);
        let load = |kind: TokenKind| -> Result<Vec<Slot>> {
            let store = direct.stores().tokens(kind);
            (0..store.high_id())
                .map(|id| match store.record(id) {
                    Ok(record) => Ok(Ok(record)),
                    Err(StoreError::Corruption(reason)) => Ok(Err(reason)),
                    Err(err) => Err(preload_error(kind, err)),
                })
                .collect()
        };
        let tokens = [
            load(TokenKind::PropertyKey)?,
            load(TokenKind::RelationshipType)?,
            load(TokenKind::Label)?,
        ];
        Ok(Self { direct, tokens })
    }

    /// Number of preloaded token records.
    pub fn cached_tokens(&self) -> usize {
        self.tokens.iter().map(Vec::len).sum()
    }
}

impl fmt::Debug for CacheSmallStoresRecordAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheSmallStoresRecordAccess")
            .field("cached_tokens", &self.cached_tokens())
            .finish()
    }
}

impl RecordAccess for CacheSmallStoresRecordAccess {
    fn node(&self, id: u64) -> Result<NodeRecord> {
        self.direct.node(id)
    }

    fn relationship(&self, id: u64) -> Result<RelationshipRecord> {
        self.direct.relationship(id)
    }

    fn property(&self, id: u64) -> Result<PropertyRecord> {
        self.direct.property(id)
    }

    fn token(&self, kind: TokenKind, id: u64) -> Result<TokenRecord> {
        match self.tokens[slot(kind)].get(id as usize) {
            Some(Ok(record)) => Ok(record.clone()),
            Some(Err(reason)) => Err(StoreError::Corruption(reason)),
            None => Ok(TokenRecord::absent(id)),
        }
    }

    fn dynamic(&self, store: DynamicStore, id: u64) -> Result<DynamicRecord> {
        self.direct.dynamic(store, id)
    }

    fn high_id(&self, kind: StoreKind) -> u64 {
        self.direct.high_id(kind)
    }
}

impl DiffRecordAccess for CacheSmallStoresRecordAccess {
    fn persisted(&self) -> &dyn RecordAccess {
        &self.direct
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::builder::StoreBuilder;

    #[test]
    fn tokens_are_served_from_memory() -> Result<()> {
        let mut b = StoreBuilder::new();
        let label = b.add_label("Person");
        b.add_property_key("name");
        let access = CacheSmallStoresRecordAccess::new(b.build_in_memory()?.native_stores().clone())?;
        assert_eq!(access.cached_tokens(), 2);
        assert!(access.token(TokenKind::Label, label as u64)?.in_use);
        assert!(!access.token(TokenKind::Label, 7)?.in_use);
        assert!(!access.token(TokenKind::RelationshipType, 0)?.in_use);
        Ok(())
    }

    #[test]
    fn persisted_view_reads_the_same_records() -> Result<()> {
        let b = StoreBuilder::demo();
        let access = CacheSmallStoresRecordAccess::new(b.build_in_memory()?.native_stores().clone())?;
        assert_eq!(access.persisted().node(2)?, access.node(2)?);
        assert_eq!(
            access.persisted().token(TokenKind::PropertyKey, 1)?,
            access.token(TokenKind::PropertyKey, 1)?
        );
        Ok(())
    }
}
