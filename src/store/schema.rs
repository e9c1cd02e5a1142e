//! Schema rules serialized into chains of the schema dynamic store.

use serde::{Deserialize, Serialize};

use super::{read_chain, RecordStore, Result, StoreError};
use super::record::DynamicRecord;
use crate::types::{is_none, NO_ID};

const KIND_INDEX: u8 = 1;
const KIND_CONSTRAINT_INDEX: u8 = 2;
const KIND_UNIQUENESS: u8 = 3;
const PAYLOAD_LEN: usize = 17;

/// The three kinds of schema rule.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaRuleKind {
    /// A plain secondary index.
    Index,
    /// An index owned by a uniqueness constraint.
    ConstraintIndex,
    /// A uniqueness constraint backed by a constraint index.
    UniquenessConstraint,
}

impl SchemaRuleKind {
    /// True for rules that have index entries.
    pub const fn is_index(self) -> bool {
        matches!(self, SchemaRuleKind::Index | SchemaRuleKind::ConstraintIndex)
    }

    fn tag(self) -> u8 {
        match self {
            SchemaRuleKind::Index => KIND_INDEX,
            SchemaRuleKind::ConstraintIndex => KIND_CONSTRAINT_INDEX,
            SchemaRuleKind::UniquenessConstraint => KIND_UNIQUENESS,
        }
    }
}

/// A decoded schema rule. Its id is the id of its chain's start record.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SchemaRule {
    /// Rule id.
    pub id: u64,
    /// Rule kind.
    pub kind: SchemaRuleKind,
    /// Label token the rule applies to.
    pub label: u32,
    /// Property-key token the rule applies to.
    pub property_key: u32,
    /// Owning constraint (constraint index) or owned index (constraint).
    pub reference: u64,
}

impl SchemaRule {
    /// A plain index on `(label, property_key)`.
    pub fn index(id: u64, label: u32, property_key: u32) -> Self {
        Self {
            id,
            kind: SchemaRuleKind::Index,
            label,
            property_key,
            reference: NO_ID,
        }
    }

    /// A constraint index owned by constraint `owner`.
    pub fn constraint_index(id: u64, label: u32, property_key: u32, owner: u64) -> Self {
        Self {
            id,
            kind: SchemaRuleKind::ConstraintIndex,
            label,
            property_key,
            reference: owner,
        }
    }

    /// A uniqueness constraint backed by index `owned_index`.
    pub fn uniqueness_constraint(id: u64, label: u32, property_key: u32, owned_index: u64) -> Self {
        Self {
            id,
            kind: SchemaRuleKind::UniquenessConstraint,
            label,
            property_key,
            reference: owned_index,
        }
    }

    /// Owning constraint id of a constraint index.
    pub fn owning_constraint(&self) -> Option<u64> {
        (self.kind == SchemaRuleKind::ConstraintIndex && !is_none(self.reference))
            .then_some(self.reference)
    }

    /// Backing index id of a uniqueness constraint.
    pub fn owned_index(&self) -> Option<u64> {
        (self.kind == SchemaRuleKind::UniquenessConstraint && !is_none(self.reference))
            .then_some(self.reference)
    }

    /// Decodes a rule from its chain payload.
    pub fn decode(id: u64, payload: &[u8]) -> Result<Self> {
        if payload.len() != PAYLOAD_LEN {
            return Err(StoreError::Corruption("schema rule payload has wrong length"));
        }
        let kind = match payload[0] {
            KIND_INDEX => SchemaRuleKind::Index,
            KIND_CONSTRAINT_INDEX => SchemaRuleKind::ConstraintIndex,
            KIND_UNIQUENESS => SchemaRuleKind::UniquenessConstraint,
            _ => return Err(StoreError::Corruption("unknown schema rule kind")),
        };
        let mut label = [0u8; 4];
        label.copy_from_slice(&payload[1..5]);
        let mut key = [0u8; 4];
        key.copy_from_slice(&payload[5..9]);
        let mut reference = [0u8; 8];
        reference.copy_from_slice(&payload[9..17]);
        Ok(Self {
            id,
            kind,
            label: u32::from_be_bytes(label),
            property_key: u32::from_be_bytes(key),
            reference: u64::from_be_bytes(reference),
        })
    }

    /// Serializes the rule into its chain payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PAYLOAD_LEN);
        out.push(self.kind.tag());
        out.extend_from_slice(&self.label.to_be_bytes());
        out.extend_from_slice(&self.property_key.to_be_bytes());
        out.extend_from_slice(&self.reference.to_be_bytes());
        out
    }
}

/// Reads the rule whose chain starts at `id`.
pub fn read_rule(store: &dyn RecordStore<DynamicRecord>, id: u64) -> Result<SchemaRule> {
    let payload = read_chain(store, id)?;
    SchemaRule::decode(id, &payload)
}

/// Loads every decodable rule of the schema store in id order.
///
/// Rules whose chain or payload is corrupt are skipped; they are reported by
/// the schema checks. Only I/O failures are returned.
pub fn load_all_rules(store: &dyn RecordStore<DynamicRecord>) -> Result<Vec<SchemaRule>> {
    let mut rules = Vec::new();
    for id in 0..store.high_id() {
        let record = match store.record(id) {
            Ok(record) => record,
            Err(err) if err.is_decode_failure() => continue,
            Err(err) => return Err(err),
        };
        if !record.in_use || !record.start {
            continue;
        }
        match read_rule(store, id) {
            Ok(rule) => rules.push(rule),
            Err(err) if err.is_decode_failure() => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(rules)
}
