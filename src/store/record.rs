//! Typed records of every store.
//!
//! Records never hold references to each other; every cross-record link is
//! an id that must be looked up through a record store.

use smallvec::SmallVec;

use crate::types::NO_ID;

/// Common surface of every record type.
pub trait Record: Clone + Send + Sync + 'static {
    /// Id of the record within its store.
    fn id(&self) -> u64;
    /// Whether the record currently represents live data.
    fn in_use(&self) -> bool;
}

/// Label set carried by a node record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeLabels {
    /// Up to three label ids stored in the record itself.
    Inline(SmallVec<[u32; 3]>),
    /// Head of a chain in the node-label dynamic store.
    Dynamic(u64),
}

impl Default for NodeLabels {
    fn default() -> Self {
        NodeLabels::Inline(SmallVec::new())
    }
}

/// A node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeRecord {
    /// Record id.
    pub id: u64,
    /// In-use flag.
    pub in_use: bool,
    /// First relationship in this node's relationship chain.
    pub next_rel: u64,
    /// Head of this node's property chain.
    pub next_prop: u64,
    /// Label set.
    pub labels: NodeLabels,
}

impl NodeRecord {
    /// An in-use node without relationships, properties or labels.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            in_use: true,
            next_rel: NO_ID,
            next_prop: NO_ID,
            labels: NodeLabels::default(),
        }
    }

    /// A not-in-use slot.
    pub fn absent(id: u64) -> Self {
        Self {
            in_use: false,
            ..Self::new(id)
        }
    }
}

impl Record for NodeRecord {
    fn id(&self) -> u64 {
        self.id
    }

    fn in_use(&self) -> bool {
        self.in_use
    }
}

/// A relationship, linked into the relationship chains of both endpoints.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationshipRecord {
    /// Record id.
    pub id: u64,
    /// In-use flag.
    pub in_use: bool,
    /// Source node.
    pub first_node: u64,
    /// Target node.
    pub second_node: u64,
    /// Relationship-type token id.
    pub rel_type: u32,
    /// Previous relationship in the source node's chain.
    pub first_prev: u64,
    /// Next relationship in the source node's chain.
    pub first_next: u64,
    /// Previous relationship in the target node's chain.
    pub second_prev: u64,
    /// Next relationship in the target node's chain.
    pub second_next: u64,
    /// Head of this relationship's property chain.
    pub next_prop: u64,
}

/// Which endpoint of a relationship a chain pointer belongs to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Side {
    /// The source endpoint.
    Source,
    /// The target endpoint.
    Target,
}

impl RelationshipRecord {
    /// An in-use relationship between two nodes, unlinked from any chain.
    pub fn new(id: u64, first_node: u64, second_node: u64, rel_type: u32) -> Self {
        Self {
            id,
            in_use: true,
            first_node,
            second_node,
            rel_type,
            first_prev: NO_ID,
            first_next: NO_ID,
            second_prev: NO_ID,
            second_next: NO_ID,
            next_prop: NO_ID,
        }
    }

    /// A not-in-use slot.
    pub fn absent(id: u64) -> Self {
        Self {
            in_use: false,
            ..Self::new(id, NO_ID, NO_ID, 0)
        }
    }

    /// Side through which `node` participates, source winning for self-loops.
    pub fn side_of(&self, node: u64) -> Option<Side> {
        if self.first_node == node {
            Some(Side::Source)
        } else if self.second_node == node {
            Some(Side::Target)
        } else {
            None
        }
    }

    /// Endpoint node on `side`.
    pub fn node(&self, side: Side) -> u64 {
        match side {
            Side::Source => self.first_node,
            Side::Target => self.second_node,
        }
    }

    /// Previous pointer of the chain on `side`.
    pub fn prev(&self, side: Side) -> u64 {
        match side {
            Side::Source => self.first_prev,
            Side::Target => self.second_prev,
        }
    }

    /// Next pointer of the chain on `side`.
    pub fn next(&self, side: Side) -> u64 {
        match side {
            Side::Source => self.first_next,
            Side::Target => self.second_next,
        }
    }

    /// Mutable previous pointer on `side`.
    pub fn prev_mut(&mut self, side: Side) -> &mut u64 {
        match side {
            Side::Source => &mut self.first_prev,
            Side::Target => &mut self.second_prev,
        }
    }

    /// Mutable next pointer on `side`.
    pub fn next_mut(&mut self, side: Side) -> &mut u64 {
        match side {
            Side::Source => &mut self.first_next,
            Side::Target => &mut self.second_next,
        }
    }
}

impl Record for RelationshipRecord {
    fn id(&self) -> u64 {
        self.id
    }

    fn in_use(&self) -> bool {
        self.in_use
    }
}

/// Value held by a property block.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    /// Boolean.
    Bool(bool),
    /// 64-bit integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// String short enough to live inside the block.
    ShortString(String),
    /// Head of a chain in the string store.
    String(u64),
    /// Head of a chain in the array store.
    Array(u64),
}

/// One key/value slot of a property record.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyBlock {
    /// Property-key token id.
    pub key: u32,
    /// Value.
    pub value: PropertyValue,
}

/// A record in a property chain.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyRecord {
    /// Record id.
    pub id: u64,
    /// In-use flag.
    pub in_use: bool,
    /// Previous record in the chain.
    pub prev: u64,
    /// Next record in the chain.
    pub next: u64,
    /// Property blocks, at most [`PropertyRecord::MAX_BLOCKS`].
    pub blocks: SmallVec<[PropertyBlock; 4]>,
}

impl PropertyRecord {
    /// Blocks a single property record can carry.
    pub const MAX_BLOCKS: usize = 4;

    /// An in-use, unlinked, empty property record.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            in_use: true,
            prev: NO_ID,
            next: NO_ID,
            blocks: SmallVec::new(),
        }
    }

    /// A not-in-use slot.
    pub fn absent(id: u64) -> Self {
        Self {
            in_use: false,
            ..Self::new(id)
        }
    }
}

impl Record for PropertyRecord {
    fn id(&self) -> u64 {
        self.id
    }

    fn in_use(&self) -> bool {
        self.in_use
    }
}

/// A token: property key, relationship type or label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenRecord {
    /// Record id (the token id).
    pub id: u64,
    /// In-use flag.
    pub in_use: bool,
    /// Head of the name chain in the token kind's name store.
    pub name_id: u64,
}

impl TokenRecord {
    /// An in-use token whose name lives at `name_id`.
    pub fn new(id: u64, name_id: u64) -> Self {
        Self {
            id,
            in_use: true,
            name_id,
        }
    }

    /// A not-in-use slot.
    pub fn absent(id: u64) -> Self {
        Self {
            id,
            in_use: false,
            name_id: NO_ID,
        }
    }
}

impl Record for TokenRecord {
    fn id(&self) -> u64 {
        self.id
    }

    fn in_use(&self) -> bool {
        self.in_use
    }
}

/// One block of a dynamic chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DynamicRecord {
    /// Record id.
    pub id: u64,
    /// In-use flag.
    pub in_use: bool,
    /// Whether this block starts a chain.
    pub start: bool,
    /// Next block of the chain.
    pub next: u64,
    /// Payload carried by this block.
    pub data: Vec<u8>,
}

impl DynamicRecord {
    /// An in-use block carrying `data`.
    pub fn new(id: u64, start: bool, data: Vec<u8>) -> Self {
        Self {
            id,
            in_use: true,
            start,
            next: NO_ID,
            data,
        }
    }

    /// A not-in-use slot.
    pub fn absent(id: u64) -> Self {
        Self {
            id,
            in_use: false,
            start: false,
            next: NO_ID,
            data: Vec::new(),
        }
    }
}

impl Record for DynamicRecord {
    fn id(&self) -> u64 {
        self.id
    }

    fn in_use(&self) -> bool {
        self.in_use
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_lookup_prefers_source_for_loops() {
        let rel = RelationshipRecord::new(0, 4, 4, 1);
        assert_eq!(rel.side_of(4), Some(Side::Source));
        let rel = RelationshipRecord::new(0, 4, 9, 1);
        assert_eq!(rel.side_of(9), Some(Side::Target));
        assert_eq!(rel.side_of(1), None);
    }

    #[test]
    fn side_accessors_address_the_right_fields() {
        let mut rel = RelationshipRecord::new(3, 1, 2, 0);
        *rel.next_mut(Side::Target) = 8;
        *rel.prev_mut(Side::Source) = 5;
        assert_eq!(rel.second_next, 8);
        assert_eq!(rel.first_prev, 5);
        assert_eq!(rel.next(Side::Source), NO_ID);
    }
}
