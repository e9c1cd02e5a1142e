//! Inconsistency records, the shared report sink and the run summary.

mod sink;
mod summary;

pub use sink::{
    CollectingLogger, ConsistencyReporter, InconsistencyLogger, InconsistencyReport, TracingLogger,
};
pub use summary::CheckSummary;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{DynamicStore, TokenKind};

/// Category a finding is tallied under.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// Node store.
    Node,
    /// Relationship store.
    Relationship,
    /// Property store.
    Property,
    /// String value store.
    String,
    /// Array value store.
    Array,
    /// Property-key tokens.
    PropertyKey,
    /// Relationship-type tokens.
    RelationshipType,
    /// Label tokens.
    Label,
    /// Property-key names.
    PropertyKeyName,
    /// Relationship-type names.
    RelationshipTypeName,
    /// Label names.
    LabelName,
    /// Dynamic node label sets.
    NodeDynamicLabel,
    /// Schema rules.
    Schema,
    /// Label-scan index entries.
    LabelScan,
    /// Secondary index entries.
    Index,
}

impl RecordType {
    /// Every category, in summary order.
    pub const ALL: [RecordType; 15] = [
        RecordType::Node,
        RecordType::Relationship,
        RecordType::Property,
        RecordType::String,
        RecordType::Array,
        RecordType::PropertyKey,
        RecordType::RelationshipType,
        RecordType::Label,
        RecordType::PropertyKeyName,
        RecordType::RelationshipTypeName,
        RecordType::LabelName,
        RecordType::NodeDynamicLabel,
        RecordType::Schema,
        RecordType::LabelScan,
        RecordType::Index,
    ];

    /// Dense position within [`RecordType::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Category of records held in a dynamic store.
    pub const fn of_dynamic(store: DynamicStore) -> Self {
        match store {
            DynamicStore::String => RecordType::String,
            DynamicStore::Array => RecordType::Array,
            DynamicStore::PropertyKeyName => RecordType::PropertyKeyName,
            DynamicStore::RelationshipTypeName => RecordType::RelationshipTypeName,
            DynamicStore::LabelName => RecordType::LabelName,
            DynamicStore::NodeLabel => RecordType::NodeDynamicLabel,
            DynamicStore::Schema => RecordType::Schema,
        }
    }

    /// Category of a token store.
    pub const fn of_token(kind: TokenKind) -> Self {
        match kind {
            TokenKind::PropertyKey => RecordType::PropertyKey,
            TokenKind::RelationshipType => RecordType::RelationshipType,
            TokenKind::Label => RecordType::Label,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How serious a finding is. Only errors make a store set inconsistent.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Structural damage.
    Error,
    /// Suspicious but readable state.
    Warning,
}

/// Every class of defect the checker can report.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InconsistencyKind {
    /// Bytes of an in-range record do not decode.
    RecordNotDecodable,
    /// A reference names a record that is not in use or does not exist.
    ReferenceNotInUse,
    /// A chain head reference names a record that is not the head of its chain.
    NotChainHead,
    /// A node's relationship chain starts at a relationship not touching it.
    NotAnEndpoint,
    /// A doubly-linked chain's back pointer does not match.
    ChainLinkMismatch,
    /// A label appears twice in one node's label set.
    DuplicateLabel,
    /// An in-use property record carries no blocks.
    EmptyPropertyRecord,
    /// A dynamic chain reference names a continuation block.
    NotStartRecord,
    /// An in-use dynamic block carries no data.
    EmptyBlock,
    /// A dynamic block links to a block that starts a chain.
    NextIsStartRecord,
    /// A dynamic block links to itself.
    SelfReferencingBlock,
    /// A dynamic block links onward without being full.
    NotFullBlock,
    /// A continuation block is linked from more than one block.
    SharedContinuation,
    /// Continuation blocks link into a loop no start block leads to.
    ContinuationCycle,
    /// A dynamic label payload or token name does not decode.
    UndecodablePayload,
    /// A record is claimed by more than one owner.
    MultipleOwners,
    /// A property chain is not owned by any node or relationship.
    OrphanPropertyChain,
    /// A schema rule chain does not decode into a rule.
    MalformedSchemaRule,
    /// A schema rule's counterpart does not exist.
    MissingObligation,
    /// Two schema rules carry the same semantic content.
    DuplicateRuleContent,
    /// A constraint index's owner does not reference it.
    ConstraintIndexNotReferencingBack,
    /// A constraint's backing index does not reference it.
    UniquenessConstraintNotReferencingBack,
    /// An index entry names a node that is not in use.
    NodeNotInUse,
    /// The label-scan index disagrees with a node's label set.
    LabelScanMismatch,
    /// A labelled node has no label-scan entry.
    LabelScanMissingEntry,
    /// An index entry names a node lacking the rule's label.
    IndexMissingLabel,
    /// An index entry names a node lacking the rule's property.
    IndexMissingProperty,
    /// An index entry's value differs from the node's property value.
    IndexValueMismatch,
}

impl InconsistencyKind {
    /// Every kind, in declaration order.
    pub const ALL: [InconsistencyKind; 28] = [
        InconsistencyKind::RecordNotDecodable,
        InconsistencyKind::ReferenceNotInUse,
        InconsistencyKind::NotChainHead,
        InconsistencyKind::NotAnEndpoint,
        InconsistencyKind::ChainLinkMismatch,
        InconsistencyKind::DuplicateLabel,
        InconsistencyKind::EmptyPropertyRecord,
        InconsistencyKind::NotStartRecord,
        InconsistencyKind::EmptyBlock,
        InconsistencyKind::NextIsStartRecord,
        InconsistencyKind::SelfReferencingBlock,
        InconsistencyKind::NotFullBlock,
        InconsistencyKind::SharedContinuation,
        InconsistencyKind::ContinuationCycle,
        InconsistencyKind::UndecodablePayload,
        InconsistencyKind::MultipleOwners,
        InconsistencyKind::OrphanPropertyChain,
        InconsistencyKind::MalformedSchemaRule,
        InconsistencyKind::MissingObligation,
        InconsistencyKind::DuplicateRuleContent,
        InconsistencyKind::ConstraintIndexNotReferencingBack,
        InconsistencyKind::UniquenessConstraintNotReferencingBack,
        InconsistencyKind::NodeNotInUse,
        InconsistencyKind::LabelScanMismatch,
        InconsistencyKind::LabelScanMissingEntry,
        InconsistencyKind::IndexMissingLabel,
        InconsistencyKind::IndexMissingProperty,
        InconsistencyKind::IndexValueMismatch,
    ];

    /// Dense position within [`InconsistencyKind::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Severity findings of this kind carry.
    pub const fn severity(self) -> Severity {
        match self {
            InconsistencyKind::EmptyPropertyRecord | InconsistencyKind::NotFullBlock => {
                Severity::Warning
            }
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for InconsistencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One structural defect.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Inconsistency {
    /// Category the finding is tallied under.
    pub record_type: RecordType,
    /// Id of the offending record (rule id for index findings).
    pub id: u64,
    /// Defect class.
    pub kind: InconsistencyKind,
    /// Field that holds the bad value.
    pub field: String,
    /// What the field should have held.
    pub expected: String,
    /// What it actually held.
    pub actual: String,
    /// Severity.
    pub severity: Severity,
}

impl Inconsistency {
    /// A finding with the kind's default severity.
    pub fn new(
        record_type: RecordType,
        id: u64,
        kind: InconsistencyKind,
        field: impl Into<String>,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> Self {
        Self {
            record_type,
            id,
            kind,
            field: field.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
            severity: kind.severity(),
        }
    }

    /// Renders a reference id, spelling out the "none" sentinel.
    pub fn id_text(id: u64) -> String {
        if crate::types::is_none(id) {
            "none".to_owned()
        } else {
            id.to_string()
        }
    }
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}] {}: {} expected {}, actual {}",
            self.record_type, self.id, self.kind, self.field, self.expected, self.actual
        )
    }
}
