//! Assembles store sets from typed records.
//!
//! The builder is the only writer in the crate. It keeps every record in
//! memory, links relationship and property chains as records are added and
//! derives label-scan and index entries from what callers asked for. The
//! `*_mut` accessors deliberately bypass all of that so fixtures can plant
//! specific defects.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use tracing::debug;

use super::file::{encode_records, RecordFile};
use super::format::{
    short_string_capacity, DynamicFormat, NodeFormat, PropertyFormat, RelationshipFormat,
    TokenFormat,
};
use super::index::{
    IndexEntry, IndexValue, JsonLinesIndexes, MemoryIndexes, MemoryLabelScan, NodeLabelEntry,
};
use super::record::{
    DynamicRecord, NodeLabels, NodeRecord, PropertyBlock, PropertyRecord, PropertyValue,
    RelationshipRecord, TokenRecord,
};
use super::schema::SchemaRule;
use super::{DirectStoreAccess, Result, StoreError, StoreHandle, StoreSet};
use crate::types::{is_none, DynamicStore, StoreKind, TokenKind, NO_ID};

/// A property value as supplied by callers of the builder.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
    /// String; long strings are moved to the string store.
    String(String),
    /// Integer array, always kept in the array store.
    Array(Vec<i64>),
}

impl Value {
    fn index_value(&self) -> Option<IndexValue> {
        match self {
            Value::Bool(value) => Some(IndexValue::Bool(*value)),
            Value::Int(value) => Some(IndexValue::Int(*value)),
            Value::String(value) => Some(IndexValue::String(value.clone())),
            Value::Float(_) | Value::Array(_) => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

struct NodeIntent {
    id: u64,
    labels: Vec<u32>,
    properties: Vec<(u32, Value)>,
}

/// Builder for a complete store set plus its label-scan and index entries.
#[derive(Default)]
pub struct StoreBuilder {
    nodes: Vec<NodeRecord>,
    relationships: Vec<RelationshipRecord>,
    properties: Vec<PropertyRecord>,
    tokens: [Vec<TokenRecord>; 3],
    dynamic: [Vec<DynamicRecord>; 7],
    intents: Vec<NodeIntent>,
    label_scan_override: Option<Vec<NodeLabelEntry>>,
    index_overrides: FxHashMap<u64, Vec<IndexEntry>>,
    failing_indexes: FxHashSet<u64>,
}

fn token_slot(kind: TokenKind) -> usize {
    match kind {
        TokenKind::PropertyKey => 0,
        TokenKind::RelationshipType => 1,
        TokenKind::Label => 2,
    }
}

impl StoreBuilder {
    /// An empty store set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a property-key token named `name`.
    pub fn add_property_key(&mut self, name: &str) -> u32 {
        self.add_token(TokenKind::PropertyKey, name)
    }

    /// Adds a label token named `name`.
    pub fn add_label(&mut self, name: &str) -> u32 {
        self.add_token(TokenKind::Label, name)
    }

    /// Adds a relationship-type token named `name`.
    pub fn add_relationship_type(&mut self, name: &str) -> u32 {
        self.add_token(TokenKind::RelationshipType, name)
    }

    fn add_token(&mut self, kind: TokenKind, name: &str) -> u32 {
        let name_id = self.push_chain(kind.name_store(), name.as_bytes());
        let tokens = &mut self.tokens[token_slot(kind)];
        let id = tokens.len() as u64;
        tokens.push(TokenRecord::new(id, name_id));
        id as u32
    }

    /// Adds an in-use node with `labels` and `properties`.
    pub fn add_node(&mut self, labels: &[u32], properties: &[(u32, Value)]) -> u64 {
        let id = self.nodes.len() as u64;
        let mut node = NodeRecord::new(id);
        node.labels = if labels.len() <= 3 {
            NodeLabels::Inline(labels.iter().copied().collect())
        } else {
            let payload: Vec<u8> = labels.iter().flat_map(|l| l.to_be_bytes()).collect();
            NodeLabels::Dynamic(self.push_chain(DynamicStore::NodeLabel, &payload))
        };
        node.next_prop = self.push_property_chain(properties);
        self.nodes.push(node);
        self.intents.push(NodeIntent {
            id,
            labels: labels.to_vec(),
            properties: properties.to_vec(),
        });
        id
    }

    /// Adds a relationship and links it at the head of both endpoint chains.
    ///
    /// A self-loop is linked once, through its source side.
    pub fn add_relationship(
        &mut self,
        first: u64,
        second: u64,
        rel_type: u32,
        properties: &[(u32, Value)],
    ) -> u64 {
        let id = self.relationships.len() as u64;
        let mut rel = RelationshipRecord::new(id, first, second, rel_type);
        rel.next_prop = self.push_property_chain(properties);
        let endpoints: SmallVec<[u64; 2]> = if first == second {
            SmallVec::from_slice(&[first])
        } else {
            SmallVec::from_slice(&[first, second])
        };
        for node_id in endpoints {
            let Some(side) = rel.side_of(node_id) else {
                continue;
            };
            let Some(node) = self.nodes.get_mut(node_id as usize) else {
                continue;
            };
            let old_head = node.next_rel;
            node.next_rel = id;
            *rel.next_mut(side) = old_head;
            if let Some(head) = self.relationships.get_mut(old_head as usize) {
                if let Some(head_side) = head.side_of(node_id) {
                    *head.prev_mut(head_side) = id;
                }
            }
        }
        self.relationships.push(rel);
        id
    }

    /// Adds a plain index on `(label, property_key)` and returns its rule id.
    pub fn add_index(&mut self, label: u32, property_key: u32) -> u64 {
        let id = self.next_schema_id();
        self.add_schema_rule(SchemaRule::index(id, label, property_key))
    }

    /// Adds a uniqueness constraint with its backing constraint index.
    ///
    /// Returns `(constraint_id, index_id)`.
    pub fn add_unique_constraint(&mut self, label: u32, property_key: u32) -> (u64, u64) {
        let index_id = self.next_schema_id();
        let constraint_id = index_id + 1;
        self.add_schema_rule(SchemaRule::constraint_index(
            index_id,
            label,
            property_key,
            constraint_id,
        ));
        self.add_schema_rule(SchemaRule::uniqueness_constraint(
            constraint_id,
            label,
            property_key,
            index_id,
        ));
        (constraint_id, index_id)
    }

    /// Id the next schema rule written through [`add_schema_rule`](Self::add_schema_rule) gets.
    pub fn next_schema_id(&self) -> u64 {
        self.dynamic[DynamicStore::Schema.index()].len() as u64
    }

    /// Writes `rule` as-is, ignoring its `id`, and returns the id it was stored under.
    pub fn add_schema_rule(&mut self, rule: SchemaRule) -> u64 {
        self.push_chain(DynamicStore::Schema, &rule.encode())
    }

    /// Appends a raw property record, unlinked from any owner.
    pub fn push_property(&mut self, mut record: PropertyRecord) -> u64 {
        let id = self.properties.len() as u64;
        record.id = id;
        self.properties.push(record);
        id
    }

    /// Appends a raw dynamic record to `store`.
    pub fn push_dynamic(&mut self, store: DynamicStore, mut record: DynamicRecord) -> u64 {
        let records = &mut self.dynamic[store.index()];
        let id = records.len() as u64;
        record.id = id;
        records.push(record);
        id
    }

    /// Appends a not-in-use node slot.
    pub fn push_free_node(&mut self) -> u64 {
        let id = self.nodes.len() as u64;
        self.nodes.push(NodeRecord::absent(id));
        id
    }

    /// Node record `id`.
    pub fn node(&self, id: u64) -> Option<&NodeRecord> {
        self.nodes.get(id as usize)
    }

    /// Mutable node record `id`.
    pub fn node_mut(&mut self, id: u64) -> Option<&mut NodeRecord> {
        self.nodes.get_mut(id as usize)
    }

    /// Relationship record `id`.
    pub fn relationship(&self, id: u64) -> Option<&RelationshipRecord> {
        self.relationships.get(id as usize)
    }

    /// Mutable relationship record `id`.
    pub fn relationship_mut(&mut self, id: u64) -> Option<&mut RelationshipRecord> {
        self.relationships.get_mut(id as usize)
    }

    /// Mutable property record `id`.
    pub fn property_mut(&mut self, id: u64) -> Option<&mut PropertyRecord> {
        self.properties.get_mut(id as usize)
    }

    /// Mutable token record `id` of `kind`.
    pub fn token_mut(&mut self, kind: TokenKind, id: u64) -> Option<&mut TokenRecord> {
        self.tokens[token_slot(kind)].get_mut(id as usize)
    }

    /// Mutable dynamic record `id` of `store`.
    pub fn dynamic_mut(&mut self, store: DynamicStore, id: u64) -> Option<&mut DynamicRecord> {
        self.dynamic[store.index()].get_mut(id as usize)
    }

    /// Value of `key` stored in `node`'s property chain, for in-place edits.
    pub fn property_value_mut(&mut self, node: u64, key: u32) -> Option<&mut PropertyValue> {
        let mut next = self.nodes.get(node as usize)?.next_prop;
        let mut found = None;
        let mut steps = 0;
        while !is_none(next) && steps <= self.properties.len() {
            let record = self.properties.get(next as usize)?;
            if let Some(pos) = record.blocks.iter().position(|b| b.key == key) {
                found = Some((next as usize, pos));
                break;
            }
            next = record.next;
            steps += 1;
        }
        let (record, pos) = found?;
        Some(&mut self.properties[record].blocks[pos].value)
    }

    /// Replaces the derived label-scan entries.
    pub fn set_label_scan_entries(&mut self, entries: Vec<NodeLabelEntry>) {
        self.label_scan_override = Some(entries);
    }

    /// Replaces the derived entries of index `rule_id`.
    pub fn set_index_entries(&mut self, rule_id: u64, entries: Vec<IndexEntry>) {
        self.index_overrides.insert(rule_id, entries);
    }

    /// Makes the entry sequence of index `rule_id` unreadable after one entry.
    pub fn fail_index_reads(&mut self, rule_id: u64) {
        self.failing_indexes.insert(rule_id);
    }

    /// Label-scan entries derived from the labels nodes were added with.
    pub fn label_scan_entries(&self) -> Vec<NodeLabelEntry> {
        if let Some(entries) = &self.label_scan_override {
            return entries.clone();
        }
        self.intents
            .iter()
            .filter(|intent| !intent.labels.is_empty())
            .map(|intent| NodeLabelEntry {
                node: intent.id,
                labels: intent.labels.clone(),
            })
            .collect()
    }

    /// Entries of every index rule, derived from the nodes as they were added.
    pub fn index_entries(&self) -> Vec<(u64, Vec<IndexEntry>)> {
        self.index_rules()
            .into_iter()
            .map(|rule| {
                if let Some(entries) = self.index_overrides.get(&rule.id) {
                    return (rule.id, entries.clone());
                }
                let entries = self
                    .intents
                    .iter()
                    .filter(|intent| intent.labels.contains(&rule.label))
                    .filter_map(|intent| {
                        let (_, value) = intent
                            .properties
                            .iter()
                            .find(|(key, _)| *key == rule.property_key)?;
                        Some(IndexEntry {
                            node: intent.id,
                            value: value.index_value()?,
                        })
                    })
                    .collect();
                (rule.id, entries)
            })
            .collect()
    }

    fn index_rules(&self) -> Vec<SchemaRule> {
        let records = &self.dynamic[DynamicStore::Schema.index()];
        records
            .iter()
            .filter(|record| record.in_use && record.start)
            .filter_map(|record| SchemaRule::decode(record.id, &record.data).ok())
            .filter(|rule| rule.kind.is_index())
            .collect()
    }

    fn store_images(&self) -> Result<Vec<(StoreKind, Vec<u8>)>> {
        let mut images = vec![
            (StoreKind::Node, encode_records(&NodeFormat, &self.nodes)?),
            (
                StoreKind::Relationship,
                encode_records(&RelationshipFormat, &self.relationships)?,
            ),
            (
                StoreKind::Property,
                encode_records(&PropertyFormat, &self.properties)?,
            ),
        ];
        for kind in [TokenKind::PropertyKey, TokenKind::RelationshipType, TokenKind::Label] {
            images.push((
                kind.store(),
                encode_records(&TokenFormat, &self.tokens[token_slot(kind)])?,
            ));
        }
        for store in DynamicStore::ALL {
            images.push((
                StoreKind::Dynamic(store),
                encode_records(&DynamicFormat::new(store), &self.dynamic[store.index()])?,
            ));
        }
        Ok(images)
    }

    /// Builds an in-memory store set.
    pub fn build_in_memory(&self) -> Result<DirectStoreAccess> {
        let mut images: FxHashMap<StoreKind, Vec<u8>> = self.store_images()?.into_iter().collect();
        let mut take = |kind: StoreKind| images.remove(&kind).unwrap_or_default();
        let token = |bytes: Vec<u8>| -> Result<StoreHandle<TokenRecord>> {
            Ok(Arc::new(RecordFile::in_memory(TokenFormat, bytes)?))
        };
        let nodes = RecordFile::in_memory(NodeFormat, take(StoreKind::Node))?;
        let relationships = RecordFile::in_memory(RelationshipFormat, take(StoreKind::Relationship))?;
        let properties = RecordFile::in_memory(PropertyFormat, take(StoreKind::Property))?;
        let tokens = [
            token(take(StoreKind::PropertyKey))?,
            token(take(StoreKind::RelationshipType))?,
            token(take(StoreKind::Label))?,
        ];
        let mut dynamic: Vec<StoreHandle<DynamicRecord>> = Vec::with_capacity(7);
        for store in DynamicStore::ALL {
            let bytes = take(StoreKind::Dynamic(store));
            dynamic.push(Arc::new(RecordFile::in_memory(DynamicFormat::new(store), bytes)?));
        }
        let dynamic: [StoreHandle<DynamicRecord>; 7] = dynamic
            .try_into()
            .map_err(|_| StoreError::Invalid("dynamic store count mismatch"))?;
        let stores = StoreSet::new(
            Arc::new(nodes),
            Arc::new(relationships),
            Arc::new(properties),
            tokens,
            dynamic,
        );

        let mut indexes = MemoryIndexes::new();
        for (rule_id, entries) in self.index_entries() {
            indexes.insert(rule_id, entries);
        }
        for rule_id in &self.failing_indexes {
            indexes.fail_reads(*rule_id);
        }
        Ok(DirectStoreAccess::new(
            stores,
            Arc::new(MemoryLabelScan::new(self.label_scan_entries())),
            Arc::new(indexes),
        ))
    }

    /// Writes the store set into `dir`, creating it if needed.
    ///
    /// Refuses to touch a directory that already holds a node store.
    pub fn write_to(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        if dir.join(StoreKind::Node.file_name()).exists() {
            return Err(StoreError::Invalid("target directory already contains a store"));
        }
        fs::create_dir_all(dir)?;
        for (kind, bytes) in self.store_images()? {
            fs::write(dir.join(kind.file_name()), bytes)?;
        }

        let mut scan = String::new();
        for entry in self.label_scan_entries() {
            scan.push_str(&to_json_line(&entry)?);
        }
        fs::write(dir.join(DirectStoreAccess::LABEL_SCAN_FILE), scan)?;

        let index_dir = dir.join(DirectStoreAccess::INDEX_DIR);
        fs::create_dir_all(&index_dir)?;
        for (rule_id, mut entries) in self.index_entries() {
            entries.sort_by_key(|entry| entry.node);
            let mut text = String::new();
            for (pos, entry) in entries.iter().enumerate() {
                text.push_str(&to_json_line(entry)?);
                if pos == 0 && self.failing_indexes.contains(&rule_id) {
                    text.push_str("{truncated\n");
                }
            }
            fs::write(JsonLinesIndexes::entry_file(&index_dir, rule_id), text)?;
        }
        debug!(
            dir = %dir.display(),
            nodes = self.nodes.len(),
            relationships = self.relationships.len(),
            properties = self.properties.len(),
            "store.builder.written"
        );
        Ok(())
    }

    /// A small, fully consistent social graph.
    pub fn demo() -> Self {
        let mut b = Self::new();
        let person = b.add_label("Person");
        let city = b.add_label("City");
        let name = b.add_property_key("name");
        let age = b.add_property_key("age");
        let bio = b.add_property_key("bio");
        let scores = b.add_property_key("scores");
        let knows = b.add_relationship_type("KNOWS");
        let lives_in = b.add_relationship_type("LIVES_IN");
        b.add_index(person, name);
        b.add_unique_constraint(city, name);

        let ada = b.add_node(
            &[person],
            &[
                (name, "Ada".into()),
                (age, Value::Int(36)),
                (
                    bio,
                    Value::String(
                        "Wrote the first published algorithm intended for a machine, \
                         decades before such a machine existed, and speculated about \
                         composing music with it."
                            .into(),
                    ),
                ),
            ],
        );
        let grace = b.add_node(
            &[person],
            &[
                (name, "Grace".into()),
                (age, Value::Int(85)),
                (scores, Value::Array(vec![3, 1, 4, 1, 5])),
            ],
        );
        let alan = b.add_node(&[person], &[(name, "Alan".into()), (age, Value::Int(41))]);
        let london = b.add_node(&[city], &[(name, "London".into())]);
        let nyc = b.add_node(&[city], &[(name, "New York".into())]);

        b.add_relationship(ada, grace, knows, &[(age, Value::Int(3))]);
        b.add_relationship(grace, alan, knows, &[]);
        b.add_relationship(alan, ada, knows, &[]);
        b.add_relationship(ada, london, lives_in, &[]);
        b.add_relationship(alan, london, lives_in, &[]);
        b.add_relationship(grace, nyc, lives_in, &[]);
        b
    }

    fn push_chain(&mut self, store: DynamicStore, payload: &[u8]) -> u64 {
        let capacity = store.data_size();
        let records = &mut self.dynamic[store.index()];
        let head = records.len() as u64;
        let chunks: Vec<&[u8]> = if payload.is_empty() {
            vec![payload]
        } else {
            payload.chunks(capacity).collect()
        };
        let count = chunks.len();
        for (pos, chunk) in chunks.into_iter().enumerate() {
            let id = head + pos as u64;
            let mut record = DynamicRecord::new(id, pos == 0, chunk.to_vec());
            if pos + 1 < count {
                record.next = id + 1;
            }
            records.push(record);
        }
        head
    }

    fn push_property_chain(&mut self, properties: &[(u32, Value)]) -> u64 {
        if properties.is_empty() {
            return NO_ID;
        }
        let mut blocks = Vec::with_capacity(properties.len());
        for (key, value) in properties {
            let value = match value {
                Value::Bool(v) => PropertyValue::Bool(*v),
                Value::Int(v) => PropertyValue::Int(*v),
                Value::Float(v) => PropertyValue::Float(*v),
                Value::String(v) if v.len() <= short_string_capacity() => {
                    PropertyValue::ShortString(v.clone())
                }
                Value::String(v) => {
                    PropertyValue::String(self.push_chain(DynamicStore::String, v.as_bytes()))
                }
                Value::Array(items) => {
                    let mut payload = (items.len() as u32).to_be_bytes().to_vec();
                    payload.extend(items.iter().flat_map(|item| item.to_be_bytes()));
                    PropertyValue::Array(self.push_chain(DynamicStore::Array, &payload))
                }
            };
            blocks.push(PropertyBlock { key: *key, value });
        }
        let head = self.properties.len() as u64;
        let groups: Vec<&[PropertyBlock]> = blocks.chunks(PropertyRecord::MAX_BLOCKS).collect();
        let count = groups.len() as u64;
        for (pos, group) in groups.into_iter().enumerate() {
            let id = head + pos as u64;
            let mut record = PropertyRecord::new(id);
            record.blocks = group.iter().cloned().collect();
            if pos > 0 {
                record.prev = id - 1;
            }
            if (pos as u64) + 1 < count {
                record.next = id + 1;
            }
            self.properties.push(record);
        }
        head
    }
}

fn to_json_line<T: serde::Serialize>(entry: &T) -> Result<String> {
    let mut line = serde_json::to_string(entry)
        .map_err(|_| StoreError::Invalid("entry cannot be serialized"))?;
    line.push('\n');
    Ok(line)
}

/// Decodes the payload of an array chain written by the builder.
pub fn decode_int_array(payload: &[u8]) -> Option<Vec<i64>> {
    let count = u32::from_be_bytes(payload.get(..4)?.try_into().ok()?) as usize;
    let body = payload.get(4..)?;
    if body.len() != count * 8 {
        return None;
    }
    Some(
        body.chunks_exact(8)
            .map(|chunk| {
                let mut arr = [0u8; 8];
                arr.copy_from_slice(chunk);
                i64::from_be_bytes(arr)
            })
            .collect(),
    )
}
