#![forbid(unsafe_code)]

//! Read-only record views checked by the engine.
//!
//! References between records are stored as `i64`; [`NULL_REFERENCE`] marks an absent
//! link and any other negative value is illegal.

use serde::Serialize;
use smallvec::SmallVec;

use super::value::PropertyBlockValue;

/// Reference value meaning "no record".
pub const NULL_REFERENCE: i64 = -1;

/// Converts a stored reference into a record id, rejecting null and illegal values.
#[inline]
pub fn reference(value: i64) -> Option<u64> {
    u64::try_from(value).ok()
}

/// Common surface of every record kind.
pub trait Record: Clone + Send + Sync + 'static {
    /// Record id.
    fn id(&self) -> u64;
    /// Whether the record slot currently holds live data.
    fn in_use(&self) -> bool;
    /// Blank, not-in-use record with the given id.
    fn unused(id: u64) -> Self;
}

/// Label storage on a node record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LabelField {
    /// Label ids stored in the record, in raw stored order.
    Inline(SmallVec<[i64; 4]>),
    /// First record of the label overflow chain.
    Dynamic(i64),
}

impl Default for LabelField {
    fn default() -> Self {
        LabelField::Inline(SmallVec::new())
    }
}

/// Node record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeRecord {
    /// Record id.
    pub id: u64,
    /// Live flag.
    pub in_use: bool,
    /// Dense nodes point at a relationship group chain instead of a relationship.
    pub dense: bool,
    /// First relationship, or first relationship group when dense.
    pub next_rel: i64,
    /// First property record.
    pub next_prop: i64,
    /// Labels.
    pub labels: LabelField,
}

impl NodeRecord {
    /// In-use node without relationships, properties or labels.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            in_use: true,
            dense: false,
            next_rel: NULL_REFERENCE,
            next_prop: NULL_REFERENCE,
            labels: LabelField::default(),
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
    fn unused(id: u64) -> Self {
        Self {
            in_use: false,
            ..Self::new(id)
        }
    }
}

/// Relationship record.
///
/// A relationship sits in two chains, one per endpoint. When it is first in a chain,
/// that chain's `prev` field holds the chain degree instead of a relationship id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationshipRecord {
    /// Record id.
    pub id: u64,
    /// Live flag.
    pub in_use: bool,
    /// Source node.
    pub first_node: i64,
    /// Target node.
    pub second_node: i64,
    /// Relationship type token.
    pub type_id: i64,
    /// Previous relationship in the source node's chain (degree when first).
    pub first_prev_rel: i64,
    /// Next relationship in the source node's chain.
    pub first_next_rel: i64,
    /// Previous relationship in the target node's chain (degree when first).
    pub second_prev_rel: i64,
    /// Next relationship in the target node's chain.
    pub second_next_rel: i64,
    /// First in the source node's chain.
    pub first_in_first_chain: bool,
    /// First in the target node's chain.
    pub first_in_second_chain: bool,
    /// First property record.
    pub next_prop: i64,
}

impl RelationshipRecord {
    /// In-use, unlinked relationship.
    pub fn new(id: u64, first_node: i64, second_node: i64, type_id: i64) -> Self {
        Self {
            id,
            in_use: true,
            first_node,
            second_node,
            type_id,
            first_prev_rel: 1,
            first_next_rel: NULL_REFERENCE,
            second_prev_rel: 1,
            second_next_rel: NULL_REFERENCE,
            first_in_first_chain: true,
            first_in_second_chain: true,
            next_prop: NULL_REFERENCE,
        }
    }

    /// Endpoint node on the given side.
    pub fn node(&self, end: NodeEnd) -> i64 {
        match end {
            NodeEnd::Source => self.first_node,
            NodeEnd::Target => self.second_node,
        }
    }

    /// Previous link (or degree) on the given side.
    pub fn prev(&self, end: NodeEnd) -> i64 {
        match end {
            NodeEnd::Source => self.first_prev_rel,
            NodeEnd::Target => self.second_prev_rel,
        }
    }

    /// Next link on the given side.
    pub fn next(&self, end: NodeEnd) -> i64 {
        match end {
            NodeEnd::Source => self.first_next_rel,
            NodeEnd::Target => self.second_next_rel,
        }
    }

    /// First-in-chain flag on the given side.
    pub fn first_in_chain(&self, end: NodeEnd) -> bool {
        match end {
            NodeEnd::Source => self.first_in_first_chain,
            NodeEnd::Target => self.first_in_second_chain,
        }
    }

    /// Mutable previous link on the given side.
    pub fn prev_mut(&mut self, end: NodeEnd) -> &mut i64 {
        match end {
            NodeEnd::Source => &mut self.first_prev_rel,
            NodeEnd::Target => &mut self.second_prev_rel,
        }
    }

    /// Mutable next link on the given side.
    pub fn next_mut(&mut self, end: NodeEnd) -> &mut i64 {
        match end {
            NodeEnd::Source => &mut self.first_next_rel,
            NodeEnd::Target => &mut self.second_next_rel,
        }
    }

    /// Mutable first-in-chain flag on the given side.
    pub fn first_in_chain_mut(&mut self, end: NodeEnd) -> &mut bool {
        match end {
            NodeEnd::Source => &mut self.first_in_first_chain,
            NodeEnd::Target => &mut self.first_in_second_chain,
        }
    }

    /// Side whose endpoint is `node`, preferring the source side for loops.
    pub fn side_of(&self, node: i64) -> Option<NodeEnd> {
        if self.first_node == node {
            Some(NodeEnd::Source)
        } else if self.second_node == node {
            Some(NodeEnd::Target)
        } else {
            None
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
    fn unused(id: u64) -> Self {
        Self {
            in_use: false,
            ..Self::new(id, NULL_REFERENCE, NULL_REFERENCE, NULL_REFERENCE)
        }
    }
}

/// Endpoint side of a relationship.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeEnd {
    /// First node, chain linked through `first_*` fields.
    Source,
    /// Second node, chain linked through `second_*` fields.
    Target,
}

impl NodeEnd {
    /// Both sides, source first.
    pub const BOTH: [NodeEnd; 2] = [NodeEnd::Source, NodeEnd::Target];
}

/// Direction bucket within a relationship group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupDirection {
    /// Owner is source only.
    Outgoing,
    /// Owner is target only.
    Incoming,
    /// Owner is both source and target.
    Loop,
}

impl GroupDirection {
    /// All buckets in storage order.
    pub const ALL: [GroupDirection; 3] = [
        GroupDirection::Outgoing,
        GroupDirection::Incoming,
        GroupDirection::Loop,
    ];

    /// Bucket a relationship falls into from the point of view of `owner`.
    pub fn of(relationship: &RelationshipRecord, owner: i64) -> Option<GroupDirection> {
        match (
            relationship.first_node == owner,
            relationship.second_node == owner,
        ) {
            (true, true) => Some(GroupDirection::Loop),
            (true, false) => Some(GroupDirection::Outgoing),
            (false, true) => Some(GroupDirection::Incoming),
            (false, false) => None,
        }
    }
}

/// Relationship group record: per-type chain heads of a dense node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationshipGroupRecord {
    /// Record id.
    pub id: u64,
    /// Live flag.
    pub in_use: bool,
    /// Relationship type token.
    pub type_id: i64,
    /// Next group of the same owner, in ascending type order.
    pub next: i64,
    /// First outgoing relationship.
    pub first_out: i64,
    /// First incoming relationship.
    pub first_in: i64,
    /// First loop relationship.
    pub first_loop: i64,
    /// Owning dense node.
    pub owning_node: i64,
}

impl RelationshipGroupRecord {
    /// In-use, empty group.
    pub fn new(id: u64, type_id: i64, owning_node: i64) -> Self {
        Self {
            id,
            in_use: true,
            type_id,
            next: NULL_REFERENCE,
            first_out: NULL_REFERENCE,
            first_in: NULL_REFERENCE,
            first_loop: NULL_REFERENCE,
            owning_node,
        }
    }

    /// Chain head for a direction bucket.
    pub fn first(&self, direction: GroupDirection) -> i64 {
        match direction {
            GroupDirection::Outgoing => self.first_out,
            GroupDirection::Incoming => self.first_in,
            GroupDirection::Loop => self.first_loop,
        }
    }

    /// Mutable chain head for a direction bucket.
    pub fn first_mut(&mut self, direction: GroupDirection) -> &mut i64 {
        match direction {
            GroupDirection::Outgoing => &mut self.first_out,
            GroupDirection::Incoming => &mut self.first_in,
            GroupDirection::Loop => &mut self.first_loop,
        }
    }
}

impl Record for RelationshipGroupRecord {
    fn id(&self) -> u64 {
        self.id
    }
    fn in_use(&self) -> bool {
        self.in_use
    }
    fn unused(id: u64) -> Self {
        Self {
            in_use: false,
            ..Self::new(id, NULL_REFERENCE, NULL_REFERENCE)
        }
    }
}

/// One key/value slot of a property record.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyBlock {
    /// Property key token.
    pub key: i32,
    /// Stored value or pointer to its dynamic chain.
    pub value: PropertyBlockValue,
}

/// Property record.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropertyRecord {
    /// Record id.
    pub id: u64,
    /// Live flag.
    pub in_use: bool,
    /// Previous record in the owner's chain.
    pub prev_prop: i64,
    /// Next record in the owner's chain.
    pub next_prop: i64,
    /// Blocks held by this record.
    pub blocks: Vec<PropertyBlock>,
}

impl PropertyRecord {
    /// In-use, unlinked, empty property record.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            in_use: true,
            prev_prop: NULL_REFERENCE,
            next_prop: NULL_REFERENCE,
            blocks: Vec::new(),
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
    fn unused(id: u64) -> Self {
        Self {
            in_use: false,
            ..Self::new(id)
        }
    }
}

/// Block of a dynamic (overflow) chain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DynamicRecord {
    /// Record id.
    pub id: u64,
    /// Live flag.
    pub in_use: bool,
    /// Whether this block starts a chain.
    pub start_record: bool,
    /// Next block.
    pub next: i64,
    /// Payload bytes.
    pub data: Vec<u8>,
}

impl DynamicRecord {
    /// In-use block with payload and no successor.
    pub fn new(id: u64, start_record: bool, data: Vec<u8>) -> Self {
        Self {
            id,
            in_use: true,
            start_record,
            next: NULL_REFERENCE,
            data,
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
    fn unused(id: u64) -> Self {
        Self {
            in_use: false,
            ..Self::new(id, false, Vec::new())
        }
    }
}

/// Token record (label, relationship type or property key).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenRecord {
    /// Token id.
    pub id: u64,
    /// Live flag.
    pub in_use: bool,
    /// Internal tokens may not be used by graph entities.
    pub internal: bool,
    /// First record of the name chain.
    pub name_id: i64,
}

impl TokenRecord {
    /// In-use public token with the given name chain.
    pub fn new(id: u64, name_id: i64) -> Self {
        Self {
            id,
            in_use: true,
            internal: false,
            name_id,
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
    fn unused(id: u64) -> Self {
        Self {
            in_use: false,
            ..Self::new(id, NULL_REFERENCE)
        }
    }
}

/// Schema record holding an encoded schema rule.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchemaRecord {
    /// Rule id.
    pub id: u64,
    /// Live flag.
    pub in_use: bool,
    /// Encoded rule.
    pub data: Vec<u8>,
}

impl Record for SchemaRecord {
    fn id(&self) -> u64 {
        self.id
    }
    fn in_use(&self) -> bool {
        self.in_use
    }
    fn unused(id: u64) -> Self {
        Self {
            id,
            in_use: false,
            data: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_reject_null_and_negative() {
        assert_eq!(reference(NULL_REFERENCE), None);
        assert_eq!(reference(-7), None);
        assert_eq!(reference(0), Some(0));
        assert_eq!(reference(42), Some(42));
    }

    #[test]
    fn group_direction_classifies_endpoints() {
        let out = RelationshipRecord::new(0, 1, 2, 0);
        assert_eq!(GroupDirection::of(&out, 1), Some(GroupDirection::Outgoing));
        assert_eq!(GroupDirection::of(&out, 2), Some(GroupDirection::Incoming));
        assert_eq!(GroupDirection::of(&out, 3), None);
        let looped = RelationshipRecord::new(1, 4, 4, 0);
        assert_eq!(GroupDirection::of(&looped, 4), Some(GroupDirection::Loop));
        assert_eq!(looped.side_of(4), Some(NodeEnd::Source));
    }
}
