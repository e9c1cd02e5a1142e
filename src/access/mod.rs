//! Layered, read-only record lookup used by every check.
//!
//! [`DirectRecordAccess`] reads straight from the stores. The small-store
//! cache in [`cached`] preloads the token stores and delegates everything else.
//! Both expose the on-disk view through [`DiffRecordAccess::persisted`].

pub mod cached;
pub mod direct;

pub use cached::CacheSmallStoresRecordAccess;
pub use direct::DirectRecordAccess;

use crate::store::builder::decode_int_array;
use crate::store::{
    DynamicRecord, NodeLabels, NodeRecord, PropertyRecord, PropertyValue, RelationshipRecord,
    Result, StoreError, TokenRecord,
};
use crate::types::{is_none, DynamicStore, StoreKind, TokenKind};

/// Read access to every record store by id.
pub trait RecordAccess: Send + Sync {
    /// Node `id`.
    fn node(&self, id: u64) -> Result<NodeRecord>;
    /// Relationship `id`.
    fn relationship(&self, id: u64) -> Result<RelationshipRecord>;
    /// Property record `id`.
    fn property(&self, id: u64) -> Result<PropertyRecord>;
    /// Token `id` of `kind`.
    fn token(&self, kind: TokenKind, id: u64) -> Result<TokenRecord>;
    /// Dynamic record `id` of `store`.
    fn dynamic(&self, store: DynamicStore, id: u64) -> Result<DynamicRecord>;
    /// High-water id of `kind`.
    fn high_id(&self, kind: StoreKind) -> u64;
}

/// Record access that can also hand out the unlayered on-disk view.
pub trait DiffRecordAccess: RecordAccess {
    /// The records exactly as persisted, bypassing any in-run overlay.
    fn persisted(&self) -> &dyn RecordAccess;
}

/// Turns decode failures of a referenced record into `None`.
///
/// A referenced record that cannot be decoded is reported by its own store's
/// sweep; the referencing check only needs to know it is unusable.
pub fn referenced<T>(lookup: Result<T>) -> Result<Option<T>> {
    match lookup {
        Ok(record) => Ok(Some(record)),
        Err(err) if err.is_decode_failure() => Ok(None),
        Err(err) => Err(err),
    }
}

/// Reads the payload of a dynamic chain through `access`.
///
/// `Ok(None)` means the chain is broken: a link is unreadable, not in use or
/// the chain cycles.
pub fn read_dynamic_chain(
    access: &dyn RecordAccess,
    store: DynamicStore,
    head: u64,
) -> Result<Option<Vec<u8>>> {
    let limit = access.high_id(StoreKind::Dynamic(store));
    let mut payload = Vec::new();
    let mut next = head;
    let mut steps = 0u64;
    while !is_none(next) {
        if steps > limit {
            return Ok(None);
        }
        let Some(record) = referenced(access.dynamic(store, next))? else {
            return Ok(None);
        };
        if !record.in_use {
            return Ok(None);
        }
        payload.extend_from_slice(&record.data);
        next = record.next;
        steps += 1;
    }
    Ok(Some(payload))
}

/// Label set of `node`, `Ok(None)` when a dynamic label chain is unreadable.
pub fn node_labels(access: &dyn RecordAccess, node: &NodeRecord) -> Result<Option<Vec<u32>>> {
    match &node.labels {
        NodeLabels::Inline(labels) => Ok(Some(labels.to_vec())),
        NodeLabels::Dynamic(head) => {
            let Some(payload) = read_dynamic_chain(access, DynamicStore::NodeLabel, *head)? else {
                return Ok(None);
            };
            Ok(decode_label_ids(&payload))
        }
    }
}

/// Decodes a node-label chain payload into label ids.
pub fn decode_label_ids(payload: &[u8]) -> Option<Vec<u32>> {
    if payload.len() % 4 != 0 {
        return None;
    }
    Some(
        payload
            .chunks_exact(4)
            .map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

/// Finds the value of `key` in the property chain starting at `head`.
///
/// The walk stops at the first unusable link; what was not reached counts as
/// absent.
pub fn find_property(
    access: &dyn RecordAccess,
    head: u64,
    key: u32,
) -> Result<Option<PropertyValue>> {
    let limit = access.high_id(StoreKind::Property);
    let mut next = head;
    let mut steps = 0u64;
    while !is_none(next) && steps <= limit {
        let Some(record) = referenced(access.property(next))? else {
            return Ok(None);
        };
        if !record.in_use {
            return Ok(None);
        }
        if let Some(block) = record.blocks.iter().find(|block| block.key == key) {
            return Ok(Some(block.value.clone()));
        }
        next = record.next;
        steps += 1;
    }
    Ok(None)
}

/// A property value with any dynamic chain resolved.
#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedValue {
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
    /// String, inline or from the string store.
    String(String),
    /// Integer array from the array store.
    Array(Vec<i64>),
}

/// Resolves `value`, `Ok(None)` when its chain is broken or undecodable.
pub fn resolve_value(access: &dyn RecordAccess, value: &PropertyValue) -> Result<Option<ResolvedValue>> {
    Ok(match value {
        PropertyValue::Bool(v) => Some(ResolvedValue::Bool(*v)),
        PropertyValue::Int(v) => Some(ResolvedValue::Int(*v)),
        PropertyValue::Float(v) => Some(ResolvedValue::Float(*v)),
        PropertyValue::ShortString(v) => Some(ResolvedValue::String(v.clone())),
        PropertyValue::String(head) => read_dynamic_chain(access, DynamicStore::String, *head)?
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .map(ResolvedValue::String),
        PropertyValue::Array(head) => read_dynamic_chain(access, DynamicStore::Array, *head)?
            .and_then(|bytes| decode_int_array(&bytes))
            .map(ResolvedValue::Array),
    })
}

/// Converts a store error raised while preloading into a typed failure.
pub(crate) fn preload_error(kind: TokenKind, err: StoreError) -> StoreError {
    match err {
        StoreError::Io(io) => StoreError::Io(std::io::Error::new(
            io.kind(),
            format!("preloading {}: {io}", kind.store()),
        )),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::builder::{StoreBuilder, Value};

    #[test]
    fn decode_failures_become_absent_references() -> Result<()> {
        assert_eq!(referenced::<u8>(Err(StoreError::Corruption("x")))?, None);
        assert!(referenced::<u8>(Err(StoreError::Invalid("x"))).is_err());
        Ok(())
    }

    #[test]
    fn property_lookup_walks_the_chain() -> Result<()> {
        let mut b = StoreBuilder::new();
        let keys: Vec<u32> = (0..6).map(|i| b.add_property_key(&format!("k{i}"))).collect();
        let props: Vec<(u32, Value)> = keys.iter().map(|k| (*k, Value::Int(*k as i64 * 10))).collect();
        let node = b.add_node(&[], &props);
        let access = DirectRecordAccess::new(b.build_in_memory()?.native_stores().clone());
        let head = access.node(node)?.next_prop;
        assert_eq!(find_property(&access, head, keys[5])?, Some(PropertyValue::Int(50)));
        assert_eq!(find_property(&access, head, 99)?, None);
        Ok(())
    }

    #[test]
    fn dynamic_labels_resolve_through_chain() -> Result<()> {
        let mut b = StoreBuilder::new();
        let labels: Vec<u32> = (0..5).map(|i| b.add_label(&format!("L{i}"))).collect();
        let node = b.add_node(&labels, &[]);
        let access = DirectRecordAccess::new(b.build_in_memory()?.native_stores().clone());
        let record = access.node(node)?;
        assert!(matches!(record.labels, NodeLabels::Dynamic(_)));
        assert_eq!(node_labels(&access, &record)?, Some(labels));
        Ok(())
    }

    #[test]
    fn long_strings_resolve() -> Result<()> {
        let mut b = StoreBuilder::new();
        let key = b.add_property_key("bio");
        let text = "y".repeat(250);
        let node = b.add_node(&[], &[(key, Value::String(text.clone()))]);
        let access = DirectRecordAccess::new(b.build_in_memory()?.native_stores().clone());
        let head = access.node(node)?.next_prop;
        let value = find_property(&access, head, key)?.expect("bio present");
        assert_eq!(resolve_value(&access, &value)?, Some(ResolvedValue::String(text)));
        Ok(())
    }
}
