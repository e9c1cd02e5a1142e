//! Identifiers and store kinds shared by every layer of the checker.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sentinel stored in any id field that does not reference a record.
pub const NO_ID: u64 = u64::MAX;

/// Returns true when `id` is the "none" sentinel.
#[inline]
pub const fn is_none(id: u64) -> bool {
    id == NO_ID
}

/// Every record store that makes up a store set.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Node records.
    Node,
    /// Relationship records.
    Relationship,
    /// Property records.
    Property,
    /// Property-key tokens.
    PropertyKey,
    /// Relationship-type tokens.
    RelationshipType,
    /// Label tokens.
    Label,
    /// A dynamic (chained, variable-length) store.
    Dynamic(DynamicStore),
}

impl StoreKind {
    /// File name used by the on-disk layout.
    pub const fn file_name(self) -> &'static str {
        match self {
            StoreKind::Node => "nodes.db",
            StoreKind::Relationship => "relationships.db",
            StoreKind::Property => "properties.db",
            StoreKind::PropertyKey => "property_keys.db",
            StoreKind::RelationshipType => "relationship_types.db",
            StoreKind::Label => "labels.db",
            StoreKind::Dynamic(store) => store.file_name(),
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Node => f.write_str("NodeStore"),
            StoreKind::Relationship => f.write_str("RelationshipStore"),
            StoreKind::Property => f.write_str("PropertyStore"),
            StoreKind::PropertyKey => f.write_str("PropertyKeyTokenStore"),
            StoreKind::RelationshipType => f.write_str("RelationshipTypeTokenStore"),
            StoreKind::Label => f.write_str("LabelTokenStore"),
            StoreKind::Dynamic(store) => fmt::Display::fmt(store, f),
        }
    }
}

/// Dynamic stores hold chains of fixed-size blocks carrying variable-length payloads.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicStore {
    /// Long string property values.
    String,
    /// Array property values.
    Array,
    /// Property-key token names.
    PropertyKeyName,
    /// Relationship-type token names.
    RelationshipTypeName,
    /// Label token names.
    LabelName,
    /// Node label sets too large to inline.
    NodeLabel,
    /// Serialized schema rules.
    Schema,
}

impl DynamicStore {
    /// All dynamic stores, in file order.
    pub const ALL: [DynamicStore; 7] = [
        DynamicStore::String,
        DynamicStore::Array,
        DynamicStore::PropertyKeyName,
        DynamicStore::RelationshipTypeName,
        DynamicStore::LabelName,
        DynamicStore::NodeLabel,
        DynamicStore::Schema,
    ];

    /// Payload bytes carried by a single block of this store.
    pub const fn data_size(self) -> usize {
        match self {
            DynamicStore::String | DynamicStore::Array => 120,
            DynamicStore::PropertyKeyName
            | DynamicStore::RelationshipTypeName
            | DynamicStore::LabelName => 30,
            DynamicStore::NodeLabel => 60,
            DynamicStore::Schema => 56,
        }
    }

    /// File name used by the on-disk layout.
    pub const fn file_name(self) -> &'static str {
        match self {
            DynamicStore::String => "strings.db",
            DynamicStore::Array => "arrays.db",
            DynamicStore::PropertyKeyName => "property_key_names.db",
            DynamicStore::RelationshipTypeName => "relationship_type_names.db",
            DynamicStore::LabelName => "label_names.db",
            DynamicStore::NodeLabel => "node_labels.db",
            DynamicStore::Schema => "schema.db",
        }
    }

    /// Dense index, usable for per-store tables.
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for DynamicStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DynamicStore::String => "StringStore",
            DynamicStore::Array => "ArrayStore",
            DynamicStore::PropertyKeyName => "PropertyKeyNameStore",
            DynamicStore::RelationshipTypeName => "RelationshipTypeNameStore",
            DynamicStore::LabelName => "LabelNameStore",
            DynamicStore::NodeLabel => "NodeDynamicLabelStore",
            DynamicStore::Schema => "SchemaStore",
        };
        f.write_str(name)
    }
}

/// The three token stores.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Property keys.
    PropertyKey,
    /// Relationship types.
    RelationshipType,
    /// Labels.
    Label,
}

impl TokenKind {
    /// Dynamic store holding this token kind's names.
    pub const fn name_store(self) -> DynamicStore {
        match self {
            TokenKind::PropertyKey => DynamicStore::PropertyKeyName,
            TokenKind::RelationshipType => DynamicStore::RelationshipTypeName,
            TokenKind::Label => DynamicStore::LabelName,
        }
    }

    /// Store kind of the token records themselves.
    pub const fn store(self) -> StoreKind {
        match self {
            TokenKind::PropertyKey => StoreKind::PropertyKey,
            TokenKind::RelationshipType => StoreKind::RelationshipType,
            TokenKind::Label => StoreKind::Label,
        }
    }
}
