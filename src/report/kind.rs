use std::fmt;

use serde::Serialize;

use crate::store::{GroupDirection, NodeEnd, Value};

/// Kind of record a finding is reported against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    /// Node record.
    Node,
    /// Relationship record.
    Relationship,
    /// Relationship group record.
    RelationshipGroup,
    /// Property record.
    Property,
    /// String chain record.
    StringProperty,
    /// Array chain record.
    ArrayProperty,
    /// Node label overflow record.
    NodeDynamicLabel,
    /// Label token.
    LabelToken,
    /// Relationship type token.
    RelationshipTypeToken,
    /// Property key token.
    PropertyKeyToken,
    /// Label token name record.
    LabelTokenName,
    /// Relationship type token name record.
    RelationshipTypeTokenName,
    /// Property key token name record.
    PropertyKeyTokenName,
    /// Schema rule.
    Schema,
    /// Value index entry; the id is the index rule id.
    Index,
    /// Label index entry; the id is the node id.
    LabelScanDocument,
    /// Relationship type index entry; the id is the relationship id.
    RelationshipTypeScanDocument,
}

/// Number of [`RecordType`] variants.
pub const RECORD_TYPE_COUNT: usize = 17;

impl RecordType {
    /// Every record type in declaration order.
    pub const ALL: [RecordType; RECORD_TYPE_COUNT] = [
        RecordType::Node,
        RecordType::Relationship,
        RecordType::RelationshipGroup,
        RecordType::Property,
        RecordType::StringProperty,
        RecordType::ArrayProperty,
        RecordType::NodeDynamicLabel,
        RecordType::LabelToken,
        RecordType::RelationshipTypeToken,
        RecordType::PropertyKeyToken,
        RecordType::LabelTokenName,
        RecordType::RelationshipTypeTokenName,
        RecordType::PropertyKeyTokenName,
        RecordType::Schema,
        RecordType::Index,
        RecordType::LabelScanDocument,
        RecordType::RelationshipTypeScanDocument,
    ];

    /// Dense position of this type in [`RecordType::ALL`].
    pub fn ordinal(self) -> usize {
        self as usize
    }

    /// Lower-case name used in logs and summaries.
    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::Node => "node",
            RecordType::Relationship => "relationship",
            RecordType::RelationshipGroup => "relationship_group",
            RecordType::Property => "property",
            RecordType::StringProperty => "string_property",
            RecordType::ArrayProperty => "array_property",
            RecordType::NodeDynamicLabel => "node_dynamic_label",
            RecordType::LabelToken => "label_token",
            RecordType::RelationshipTypeToken => "relationship_type_token",
            RecordType::PropertyKeyToken => "property_key_token",
            RecordType::LabelTokenName => "label_token_name",
            RecordType::RelationshipTypeTokenName => "relationship_type_token_name",
            RecordType::PropertyKeyTokenName => "property_key_token_name",
            RecordType::Schema => "schema",
            RecordType::Index => "index",
            RecordType::LabelScanDocument => "label_scan_document",
            RecordType::RelationshipTypeScanDocument => "relationship_type_scan_document",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How bad a finding is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Suspicious but readable.
    Warning,
    /// Inconsistent.
    Error,
}

/// Which link of a relationship chain a finding is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainLink {
    /// The `prev` pointer.
    Prev,
    /// The `next` pointer.
    Next,
}

/// Every inconsistency the checker can report.
///
/// Fields name the other record involved; the record the finding is reported on is
/// carried by the enclosing [`Finding`](super::Finding).
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Inconsistency {
    // any record
    /// The record could only be partially decoded.
    RecordNotDecodable { detail: String },

    // nodes
    /// Negative label id.
    IllegalLabel { label: i64 },
    /// Label token not in use or internal.
    LabelNotInUse { label: i64 },
    /// Label stored twice.
    LabelDuplicate { label: i64 },
    /// Adjacent labels in descending order.
    LabelsOutOfOrder { largest: i64, smallest: i64 },
    /// First label overflow record not in use.
    DynamicLabelRecordNotInUse { record: i64 },
    /// Referenced relationship not in use.
    RelationshipNotInUse { relationship: i64 },
    /// Referenced relationship does not involve this node.
    RelationshipForOtherNode { relationship: i64 },
    /// Node references a relationship that is not first in this node's chain.
    RelationshipNotFirstInChain { end: NodeEnd, relationship: i64 },
    /// Referenced relationship group not in use.
    RelationshipGroupNotInUse { group: i64 },
    /// Referenced relationship group belongs to another node.
    RelationshipGroupHasOtherOwner { group: i64, owner: i64 },
    /// Node label missing from the label index.
    NodeLabelNotInIndex { label: i64 },
    /// Required property absent.
    MissingMandatoryProperty { key: i32 },
    /// Entity missing from an index it qualifies for.
    NotIndexed { index: u64, values: Vec<Value> },
    /// Entity indexed more than once.
    IndexedMultipleTimes { index: u64, count: u64 },
    /// Another entity holds the same values in a unique index.
    UniqueIndexNotUnique { index: u64, duplicate: u64 },

    // node label overflow
    /// Label overflow record whose payload names another owner.
    OrphanDynamicLabelRecordDueToInvalidOwner { owner: i64 },

    // relationships
    /// Negative endpoint.
    IllegalNode { end: NodeEnd, node: i64 },
    /// Endpoint node not in use.
    NodeNotInUse { end: NodeEnd, node: i64 },
    /// Endpoint node has no relationships.
    NodeHasNoRelationships { end: NodeEnd, node: i64 },
    /// Relationship is first in chain but the node references another one.
    NodeDoesNotReferenceBack { end: NodeEnd, node: i64 },
    /// Negative relationship type.
    IllegalRelationshipType { type_id: i64 },
    /// Relationship type token not in use.
    RelationshipTypeNotInUse { type_id: i64 },
    /// Chain neighbour not in use.
    RelationshipChainNotInUse {
        end: NodeEnd,
        link: ChainLink,
        relationship: i64,
    },
    /// Chain neighbour shares no endpoint with this side.
    RelationshipChainReferencesOtherNodes {
        end: NodeEnd,
        link: ChainLink,
        relationship: i64,
    },
    /// Chain neighbour's opposite pointer is not this relationship.
    RelationshipChainDoesNotReferenceBack {
        end: NodeEnd,
        link: ChainLink,
        relationship: i64,
    },
    /// Relationship missing from the relationship type index.
    RelationshipTypeNotInIndex { type_id: i64 },

    // token index entries
    /// Label index entry for a node that is not in use.
    IndexedNodeNotInUse { node: u64 },
    /// Label index lists a label the node does not have.
    NodeDoesNotHaveExpectedLabel { label: i64 },
    /// Type index entry for a relationship that is not in use.
    IndexedRelationshipNotInUse { relationship: u64 },
    /// Type index lists a type the relationship does not have.
    RelationshipDoesNotHaveExpectedRelationshipType { type_id: i64 },

    // relationship groups
    /// Negative owner.
    IllegalOwner { owner: i64 },
    /// Owner node not in use.
    OwnerNotInUse { owner: i64 },
    /// Next group not in use.
    NextGroupNotInUse { group: i64 },
    /// Next group belongs to another node.
    NextGroupHasOtherOwner { group: i64, owner: i64 },
    /// Next group's type is not greater than this one's.
    InvalidTypeSortOrder { group: i64 },
    /// Chain head not in use.
    FirstRelationshipNotInUse {
        direction: GroupDirection,
        relationship: i64,
    },
    /// Chain head has another type.
    FirstRelationshipOfOtherType {
        direction: GroupDirection,
        relationship: i64,
    },
    /// Chain head is not first in the owner's chain for this direction.
    FirstRelationshipNotFirstInChain {
        direction: GroupDirection,
        relationship: i64,
    },

    // property chains, reported on the owner
    /// Property record not in use.
    PropertyNotInUse { property: i64 },
    /// First property record has a previous record.
    PropertyNotFirstInChain { property: i64 },
    /// Property chain loops.
    PropertyChainContainsCircularReference { property: i64 },
    /// Key appears twice in one chain.
    PropertyKeyNotUniqueInChain { key: i32 },

    // property records
    /// Negative property key.
    InvalidPropertyKey { key: i32 },
    /// Property key token not in use.
    KeyNotInUse { key: i32 },
    /// Unknown value type.
    InvalidPropertyType { tag: u8 },
    /// Value could not be decoded.
    InvalidPropertyValue { detail: String },
    /// First string record not in use.
    StringNotInUse { record: i64 },
    /// First string record empty.
    StringEmpty { record: i64 },
    /// First array record not in use.
    ArrayNotInUse { record: i64 },
    /// First array record empty.
    ArrayEmpty { record: i64 },
    /// Previous record not in use.
    PrevNotInUse { property: i64 },
    /// Previous record's next is not this record.
    PreviousDoesNotReferenceBack { property: i64 },
    /// Next record not in use.
    NextNotInUse { property: i64 },
    /// Next record's prev is not this record.
    NextDoesNotReferenceBack { property: i64 },

    // dynamic records
    /// Next block not in use.
    DynamicNextNotInUse { next: i64 },
    /// First block has no data.
    EmptyBlock,
    /// Later block has no data.
    EmptyNextBlock { next: i64 },
    /// Block not full but has a successor.
    RecordNotFullReferencesNext { next: i64 },
    /// Block names itself as next.
    SelfReferentialNext,
    /// Chain revisits an earlier block.
    DynamicRecordChainCycle { next: i64 },

    // tokens
    /// First name record not in use.
    NameBlockNotInUse { record: i64 },
    /// Token name is empty.
    EmptyName,

    // schema
    /// Schema record could not be decoded.
    MalformedSchemaRule { detail: String },
    /// Same content as an earlier rule.
    DuplicateRuleContent { canonical: u64 },
    /// Index is not online.
    SchemaRuleNotOnline { constraint_index: bool },
    /// Property key token not in use.
    PropertyKeyNotInUse { key: i32 },
    /// Referenced obligation (owning constraint or owned index) is missing.
    MissingObligation { obligation: Option<u64> },
    /// Constraint does not own the index that claims it.
    ConstraintIndexRuleNotReferencingBack { index: u64 },
    /// Index does not claim the constraint that owns it.
    UniquenessConstraintNotReferencingBack { constraint: u64 },
    /// Owned index has the wrong type or uniqueness.
    UniquenessConstraintReferencingIndexOfWrongType { index: u64 },
    /// Another rule already claims the same obligation.
    DuplicateObligation { obligation: u64, other: u64 },

    // value index entries, reported on the index
    /// Entry for an entity that is not in use.
    IndexedEntityNotInUse { entity: u64 },
    /// Entry for an entity without the schema token.
    IndexedEntityDoesNotHaveExpectedToken { entity: u64, token: i32 },
    /// Entry values differ from the entity's properties.
    IndexEntryValueMismatch { entity: u64 },
}

impl Inconsistency {
    /// Severity of this kind.
    pub fn severity(&self) -> Severity {
        match self {
            Inconsistency::RecordNotFullReferencesNext { .. }
            | Inconsistency::EmptyName
            | Inconsistency::SchemaRuleNotOnline {
                constraint_index: false,
            } => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

fn end_name(end: NodeEnd) -> &'static str {
    match end {
        NodeEnd::Source => "source",
        NodeEnd::Target => "target",
    }
}

fn link_name(link: ChainLink) -> &'static str {
    match link {
        ChainLink::Prev => "prev",
        ChainLink::Next => "next",
    }
}

fn direction_name(direction: GroupDirection) -> &'static str {
    match direction {
        GroupDirection::Outgoing => "outgoing",
        GroupDirection::Incoming => "incoming",
        GroupDirection::Loop => "loop",
    }
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Inconsistency::*;
        match self {
            RecordNotDecodable { detail } => write!(f, "record not decodable: {detail}"),
            IllegalLabel { label } => write!(f, "illegal label id {label}"),
            LabelNotInUse { label } => write!(f, "label {label} not in use"),
            LabelDuplicate { label } => write!(f, "label {label} stored more than once"),
            LabelsOutOfOrder { largest, smallest } => {
                write!(f, "labels out of order: {largest} before {smallest}")
            }
            DynamicLabelRecordNotInUse { record } => {
                write!(f, "dynamic label record {record} not in use")
            }
            RelationshipNotInUse { relationship } => {
                write!(f, "relationship {relationship} not in use")
            }
            RelationshipForOtherNode { relationship } => {
                write!(f, "relationship {relationship} is for another node")
            }
            RelationshipNotFirstInChain { end, relationship } => write!(
                f,
                "relationship {relationship} is not first in {} chain",
                end_name(*end)
            ),
            RelationshipGroupNotInUse { group } => {
                write!(f, "relationship group {group} not in use")
            }
            RelationshipGroupHasOtherOwner { group, owner } => {
                write!(f, "relationship group {group} is owned by node {owner}")
            }
            NodeLabelNotInIndex { label } => write!(f, "label {label} missing from label index"),
            MissingMandatoryProperty { key } => write!(f, "mandatory property {key} missing"),
            NotIndexed { index, values } => write!(f, "not indexed in {index} under {values:?}"),
            IndexedMultipleTimes { index, count } => {
                write!(f, "indexed {count} times in {index}")
            }
            UniqueIndexNotUnique { index, duplicate } => {
                write!(f, "unique index {index} also holds entity {duplicate}")
            }
            OrphanDynamicLabelRecordDueToInvalidOwner { owner } => {
                write!(f, "label record owned by node {owner} which does not reference it")
            }
            IllegalNode { end, node } => write!(f, "illegal {} node {node}", end_name(*end)),
            NodeNotInUse { end, node } => {
                write!(f, "{} node {node} not in use", end_name(*end))
            }
            NodeHasNoRelationships { end, node } => {
                write!(f, "{} node {node} has no relationships", end_name(*end))
            }
            NodeDoesNotReferenceBack { end, node } => write!(
                f,
                "{} node {node} does not reference back",
                end_name(*end)
            ),
            IllegalRelationshipType { type_id } => {
                write!(f, "illegal relationship type {type_id}")
            }
            RelationshipTypeNotInUse { type_id } => {
                write!(f, "relationship type {type_id} not in use")
            }
            RelationshipChainNotInUse {
                end,
                link,
                relationship,
            } => write!(
                f,
                "{} {} relationship {relationship} not in use",
                end_name(*end),
                link_name(*link)
            ),
            RelationshipChainReferencesOtherNodes {
                end,
                link,
                relationship,
            } => write!(
                f,
                "{} {} relationship {relationship} references other nodes",
                end_name(*end),
                link_name(*link)
            ),
            RelationshipChainDoesNotReferenceBack {
                end,
                link,
                relationship,
            } => write!(
                f,
                "{} {} relationship {relationship} does not reference back",
                end_name(*end),
                link_name(*link)
            ),
            RelationshipTypeNotInIndex { type_id } => {
                write!(f, "type {type_id} missing from relationship type index")
            }
            IndexedNodeNotInUse { node } => write!(f, "indexed node {node} not in use"),
            NodeDoesNotHaveExpectedLabel { label } => {
                write!(f, "node does not have indexed label {label}")
            }
            IndexedRelationshipNotInUse { relationship } => {
                write!(f, "indexed relationship {relationship} not in use")
            }
            RelationshipDoesNotHaveExpectedRelationshipType { type_id } => {
                write!(f, "relationship does not have indexed type {type_id}")
            }
            IllegalOwner { owner } => write!(f, "illegal owner {owner}"),
            OwnerNotInUse { owner } => write!(f, "owner {owner} not in use"),
            NextGroupNotInUse { group } => write!(f, "next group {group} not in use"),
            NextGroupHasOtherOwner { group, owner } => {
                write!(f, "next group {group} is owned by node {owner}")
            }
            InvalidTypeSortOrder { group } => {
                write!(f, "next group {group} breaks type sort order")
            }
            FirstRelationshipNotInUse {
                direction,
                relationship,
            } => write!(
                f,
                "first {} relationship {relationship} not in use",
                direction_name(*direction)
            ),
            FirstRelationshipOfOtherType {
                direction,
                relationship,
            } => write!(
                f,
                "first {} relationship {relationship} has another type",
                direction_name(*direction)
            ),
            FirstRelationshipNotFirstInChain {
                direction,
                relationship,
            } => write!(
                f,
                "first {} relationship {relationship} is not first in chain",
                direction_name(*direction)
            ),
            PropertyNotInUse { property } => write!(f, "property {property} not in use"),
            PropertyNotFirstInChain { property } => {
                write!(f, "property {property} is not first in chain")
            }
            PropertyChainContainsCircularReference { property } => {
                write!(f, "property chain loops back to {property}")
            }
            PropertyKeyNotUniqueInChain { key } => {
                write!(f, "property key {key} repeated in chain")
            }
            InvalidPropertyKey { key } => write!(f, "invalid property key {key}"),
            KeyNotInUse { key } => write!(f, "property key {key} not in use"),
            InvalidPropertyType { tag } => write!(f, "invalid property type {tag}"),
            InvalidPropertyValue { detail } => write!(f, "invalid property value: {detail}"),
            StringNotInUse { record } => write!(f, "string record {record} not in use"),
            StringEmpty { record } => write!(f, "string record {record} is empty"),
            ArrayNotInUse { record } => write!(f, "array record {record} not in use"),
            ArrayEmpty { record } => write!(f, "array record {record} is empty"),
            PrevNotInUse { property } => write!(f, "previous property {property} not in use"),
            PreviousDoesNotReferenceBack { property } => {
                write!(f, "previous property {property} does not reference back")
            }
            NextNotInUse { property } => write!(f, "next property {property} not in use"),
            NextDoesNotReferenceBack { property } => {
                write!(f, "next property {property} does not reference back")
            }
            DynamicNextNotInUse { next } => write!(f, "next block {next} not in use"),
            EmptyBlock => f.write_str("empty block"),
            EmptyNextBlock { next } => write!(f, "next block {next} is empty"),
            RecordNotFullReferencesNext { next } => {
                write!(f, "block not full but references next {next}")
            }
            SelfReferentialNext => f.write_str("block references itself as next"),
            DynamicRecordChainCycle { next } => write!(f, "chain cycles back to {next}"),
            NameBlockNotInUse { record } => write!(f, "name record {record} not in use"),
            EmptyName => f.write_str("empty token name"),
            MalformedSchemaRule { detail } => write!(f, "malformed schema rule: {detail}"),
            DuplicateRuleContent { canonical } => {
                write!(f, "same content as schema rule {canonical}")
            }
            SchemaRuleNotOnline { constraint_index } => {
                if *constraint_index {
                    f.write_str("constraint index not online")
                } else {
                    f.write_str("index not online")
                }
            }
            PropertyKeyNotInUse { key } => write!(f, "property key {key} not in use"),
            MissingObligation { obligation } => match obligation {
                Some(id) => write!(f, "obligation {id} missing"),
                None => f.write_str("constraint index obligation missing"),
            },
            ConstraintIndexRuleNotReferencingBack { index } => {
                write!(f, "constraint does not own index {index} which claims it")
            }
            UniquenessConstraintNotReferencingBack { constraint } => write!(
                f,
                "index does not claim constraint {constraint} which owns it"
            ),
            UniquenessConstraintReferencingIndexOfWrongType { index } => {
                write!(f, "constraint owns index {index} of the wrong type")
            }
            DuplicateObligation { obligation, other } => {
                write!(f, "obligation {obligation} also claimed by rule {other}")
            }
            IndexedEntityNotInUse { entity } => write!(f, "indexed entity {entity} not in use"),
            IndexedEntityDoesNotHaveExpectedToken { entity, token } => {
                write!(f, "indexed entity {entity} lacks token {token}")
            }
            IndexEntryValueMismatch { entity } => {
                write!(f, "index entry values differ from entity {entity}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_are_the_exception() {
        assert_eq!(Inconsistency::EmptyName.severity(), Severity::Warning);
        assert_eq!(
            Inconsistency::RecordNotFullReferencesNext { next: 3 }.severity(),
            Severity::Warning
        );
        assert_eq!(
            Inconsistency::SchemaRuleNotOnline {
                constraint_index: true
            }
            .severity(),
            Severity::Error
        );
        assert_eq!(
            Inconsistency::LabelNotInUse { label: 1 }.severity(),
            Severity::Error
        );
    }

    #[test]
    fn ordinals_follow_all() {
        for (i, record_type) in RecordType::ALL.iter().enumerate() {
            assert_eq!(record_type.ordinal(), i);
        }
    }

    #[test]
    fn display_names_sides() {
        let kind = Inconsistency::RelationshipChainDoesNotReferenceBack {
            end: NodeEnd::Target,
            link: ChainLink::Prev,
            relationship: 9,
        };
        assert_eq!(
            kind.to_string(),
            "target prev relationship 9 does not reference back"
        );
    }
}
