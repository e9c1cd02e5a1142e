//! Read-only access to the record files of a store set.
//!
//! Every store is a dense array of fixed-size records addressed by id. The
//! checker only reads through [`RecordStore`]; the [`builder`] module is the
//! sole writer and only ever creates fresh store sets (fixtures, demos).

pub mod builder;
pub mod file;
pub mod format;
pub mod index;
pub mod io;
pub mod record;
pub mod schema;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::types::{is_none, DynamicStore, StoreKind, TokenKind};

pub use file::RecordFile;
pub use format::{DynamicFormat, NodeFormat, PropertyFormat, RecordFormat, RelationshipFormat, TokenFormat};
pub use index::{
    EntryIter, IndexAccessors, IndexEntry, IndexValue, JsonLinesIndexes, JsonLinesLabelScan,
    LabelScanStore, MemoryIndexes, MemoryLabelScan, NodeLabelEntry,
};
pub use record::{
    DynamicRecord, NodeLabels, NodeRecord, PropertyBlock, PropertyRecord, PropertyValue, Record,
    RelationshipRecord, TokenRecord,
};
pub use schema::{SchemaRule, SchemaRuleKind};

/// Errors raised by the store layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage medium failed to read.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// Bytes were read but do not decode to a valid record.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// A caller supplied an argument the store cannot honour.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// A store file required by the layout is missing.
    #[error("store file not found: {}", .0.display())]
    Missing(PathBuf),
    /// An index or label-scan entry sequence could not be read.
    #[error("entry sequence {source_name} unreadable: {message}")]
    Entry {
        /// Entry sequence that failed.
        source_name: String,
        /// Reason reported by the reader.
        message: String,
    },
}

impl StoreError {
    /// True for decode failures, which the checker reports rather than raises.
    pub fn is_decode_failure(&self) -> bool {
        matches!(self, StoreError::Corruption(_))
    }
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// A dense, id-addressed sequence of fixed-size records.
pub trait RecordStore<R>: Send + Sync {
    /// One past the highest id the store has ever handed out.
    fn high_id(&self) -> u64;

    /// Bytes occupied by one record.
    fn record_size(&self) -> usize;

    /// Reads record `id`.
    ///
    /// Ids at or beyond [`high_id`](Self::high_id) yield an absent, not-in-use
    /// record. Undecodable bytes yield [`StoreError::Corruption`]; a failing
    /// medium yields [`StoreError::Io`].
    fn record(&self, id: u64) -> Result<R>;
}

/// Shared handle to a record store.
pub type StoreHandle<R> = Arc<dyn RecordStore<R>>;

/// The complete set of record stores making up one graph.
#[derive(Clone)]
pub struct StoreSet {
    /// Node store.
    pub nodes: StoreHandle<NodeRecord>,
    /// Relationship store.
    pub relationships: StoreHandle<RelationshipRecord>,
    /// Property store.
    pub properties: StoreHandle<PropertyRecord>,
    /// Property-key token store.
    pub property_keys: StoreHandle<TokenRecord>,
    /// Relationship-type token store.
    pub relationship_types: StoreHandle<TokenRecord>,
    /// Label token store.
    pub labels: StoreHandle<TokenRecord>,
    dynamic: [StoreHandle<DynamicRecord>; 7],
}

impl StoreSet {
    /// Assembles a store set from individual handles.
    ///
    /// `dynamic` must be ordered as [`DynamicStore::ALL`].
    pub fn new(
        nodes: StoreHandle<NodeRecord>,
        relationships: StoreHandle<RelationshipRecord>,
        properties: StoreHandle<PropertyRecord>,
        tokens: [StoreHandle<TokenRecord>; 3],
        dynamic: [StoreHandle<DynamicRecord>; 7],
    ) -> Self {
        let [property_keys, relationship_types, labels] = tokens;
        Self {
            nodes,
            relationships,
            properties,
            property_keys,
            relationship_types,
            labels,
            dynamic,
        }
    }

    /// Opens every store file under `dir` read-only.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let path = |kind: StoreKind| dir.join(kind.file_name());
        let token = |kind: TokenKind| -> Result<StoreHandle<TokenRecord>> {
            Ok(Arc::new(RecordFile::open(path(kind.store()), TokenFormat)?))
        };
        let dynamic = |store: DynamicStore| -> Result<StoreHandle<DynamicRecord>> {
            Ok(Arc::new(RecordFile::open(
                path(StoreKind::Dynamic(store)),
                DynamicFormat::new(store),
            )?))
        };
        Ok(Self::new(
            Arc::new(RecordFile::open(path(StoreKind::Node), NodeFormat)?),
            Arc::new(RecordFile::open(path(StoreKind::Relationship), RelationshipFormat)?),
            Arc::new(RecordFile::open(path(StoreKind::Property), PropertyFormat)?),
            [
                token(TokenKind::PropertyKey)?,
                token(TokenKind::RelationshipType)?,
                token(TokenKind::Label)?,
            ],
            [
                dynamic(DynamicStore::String)?,
                dynamic(DynamicStore::Array)?,
                dynamic(DynamicStore::PropertyKeyName)?,
                dynamic(DynamicStore::RelationshipTypeName)?,
                dynamic(DynamicStore::LabelName)?,
                dynamic(DynamicStore::NodeLabel)?,
                dynamic(DynamicStore::Schema)?,
            ],
        ))
    }

    /// Token store of the given kind.
    pub fn tokens(&self, kind: TokenKind) -> &StoreHandle<TokenRecord> {
        match kind {
            TokenKind::PropertyKey => &self.property_keys,
            TokenKind::RelationshipType => &self.relationship_types,
            TokenKind::Label => &self.labels,
        }
    }

    /// Dynamic store of the given kind.
    pub fn dynamic(&self, store: DynamicStore) -> &StoreHandle<DynamicRecord> {
        &self.dynamic[store.index()]
    }

    /// High-water id of any store in the set.
    pub fn high_id(&self, kind: StoreKind) -> u64 {
        match kind {
            StoreKind::Node => self.nodes.high_id(),
            StoreKind::Relationship => self.relationships.high_id(),
            StoreKind::Property => self.properties.high_id(),
            StoreKind::PropertyKey => self.property_keys.high_id(),
            StoreKind::RelationshipType => self.relationship_types.high_id(),
            StoreKind::Label => self.labels.high_id(),
            StoreKind::Dynamic(store) => self.dynamic(store).high_id(),
        }
    }

    /// Record size of any store in the set.
    pub fn record_size(&self, kind: StoreKind) -> usize {
        match kind {
            StoreKind::Node => self.nodes.record_size(),
            StoreKind::Relationship => self.relationships.record_size(),
            StoreKind::Property => self.properties.record_size(),
            StoreKind::PropertyKey => self.property_keys.record_size(),
            StoreKind::RelationshipType => self.relationship_types.record_size(),
            StoreKind::Label => self.labels.record_size(),
            StoreKind::Dynamic(store) => self.dynamic(store).record_size(),
        }
    }
}

impl fmt::Debug for StoreSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSet")
            .field("nodes", &self.nodes.high_id())
            .field("relationships", &self.relationships.high_id())
            .field("properties", &self.properties.high_id())
            .finish_non_exhaustive()
    }
}

/// Read-only handle over native stores, the label-scan index and the
/// secondary indexes of one database.
#[derive(Clone)]
pub struct DirectStoreAccess {
    stores: StoreSet,
    label_scan: Arc<dyn LabelScanStore>,
    indexes: Arc<dyn IndexAccessors>,
}

impl DirectStoreAccess {
    /// File name of the label-scan entry sequence.
    pub const LABEL_SCAN_FILE: &'static str = "labelscan.jsonl";
    /// Directory holding one entry file per index rule.
    pub const INDEX_DIR: &'static str = "indexes";

    /// Bundles stores and index readers.
    pub fn new(
        stores: StoreSet,
        label_scan: Arc<dyn LabelScanStore>,
        indexes: Arc<dyn IndexAccessors>,
    ) -> Self {
        Self {
            stores,
            label_scan,
            indexes,
        }
    }

    /// Opens a store directory laid out by [`builder::StoreBuilder::write_to`].
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(StoreError::Missing(dir.to_path_buf()));
        }
        let stores = StoreSet::open(dir)?;
        let label_scan = Arc::new(JsonLinesLabelScan::new(dir.join(Self::LABEL_SCAN_FILE)));
        let indexes = Arc::new(JsonLinesIndexes::new(dir.join(Self::INDEX_DIR)));
        Ok(Self::new(stores, label_scan, indexes))
    }

    /// The native record stores.
    pub fn native_stores(&self) -> &StoreSet {
        &self.stores
    }

    /// Label-scan index reader.
    pub fn label_scan_store(&self) -> &Arc<dyn LabelScanStore> {
        &self.label_scan
    }

    /// Secondary index readers.
    pub fn indexes(&self) -> &Arc<dyn IndexAccessors> {
        &self.indexes
    }
}

/// Reads and concatenates the payload of the dynamic chain starting at `head`.
///
/// Fails with [`StoreError::Corruption`] when the chain references a record
/// that is not in use or loops back on itself.
pub fn read_chain(store: &dyn RecordStore<DynamicRecord>, head: u64) -> Result<Vec<u8>> {
    let limit = store.high_id();
    let mut payload = Vec::new();
    let mut next = head;
    let mut steps = 0u64;
    while !is_none(next) {
        if steps > limit {
            return Err(StoreError::Corruption("dynamic chain cycles"));
        }
        let record = store.record(next)?;
        if !record.in_use {
            return Err(StoreError::Corruption("dynamic chain references unused record"));
        }
        payload.extend_from_slice(&record.data);
        next = record.next;
        steps += 1;
    }
    Ok(payload)
}
