//! Schema rules (indexes and constraints) and their record encoding.

#![forbid(unsafe_code)]

use serde::Serialize;
use thiserror::Error;

const KIND_INDEX: u8 = 1;
const KIND_CONSTRAINT: u8 = 2;

/// Entity kind a schema rule applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// Rule over a label.
    Node,
    /// Rule over a relationship type.
    Relationship,
}

impl EntityType {
    fn to_byte(self) -> u8 {
        match self {
            EntityType::Node => 0,
            EntityType::Relationship => 1,
        }
    }

    fn from_byte(byte: u8) -> Result<Self, SchemaRuleDecodeError> {
        match byte {
            0 => Ok(EntityType::Node),
            1 => Ok(EntityType::Relationship),
            other => Err(SchemaRuleDecodeError::UnknownEntityType(other)),
        }
    }
}

/// The `(token, property keys)` pair a rule covers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct SchemaDescriptor {
    /// Node or relationship.
    pub entity: EntityType,
    /// Label or relationship type token.
    pub token_id: i32,
    /// Property key tokens, in index key order.
    pub property_keys: Vec<i32>,
}

impl SchemaDescriptor {
    /// Descriptor over a label.
    pub fn for_label(label: i32, property_keys: &[i32]) -> Self {
        Self {
            entity: EntityType::Node,
            token_id: label,
            property_keys: property_keys.to_vec(),
        }
    }

    /// Descriptor over a relationship type.
    pub fn for_relationship_type(type_id: i32, property_keys: &[i32]) -> Self {
        Self {
            entity: EntityType::Relationship,
            token_id: type_id,
            property_keys: property_keys.to_vec(),
        }
    }
}

/// Physical index kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexType {
    /// Ordered value index; the only kind that can back a constraint.
    Range,
    /// Text index.
    Text,
    /// Spatial index.
    Point,
}

impl IndexType {
    fn to_byte(self) -> u8 {
        match self {
            IndexType::Range => 0,
            IndexType::Text => 1,
            IndexType::Point => 2,
        }
    }

    fn from_byte(byte: u8) -> Result<Self, SchemaRuleDecodeError> {
        match byte {
            0 => Ok(IndexType::Range),
            1 => Ok(IndexType::Text),
            2 => Ok(IndexType::Point),
            other => Err(SchemaRuleDecodeError::UnknownIndexType(other)),
        }
    }
}

/// Index rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IndexDescriptor {
    /// Rule id (schema record id).
    pub id: u64,
    /// User-facing name.
    pub name: String,
    /// Covered schema.
    pub schema: SchemaDescriptor,
    /// Physical kind.
    pub index_type: IndexType,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
    /// Constraint this index backs.
    pub owning_constraint: Option<u64>,
}

/// Constraint flavour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// Values are unique among entities with the token.
    Uniqueness,
    /// Values exist and are unique.
    NodeKey,
    /// Values exist.
    Existence,
}

impl ConstraintKind {
    /// Whether the constraint is enforced through an owned index.
    pub fn is_index_backed(self) -> bool {
        matches!(self, ConstraintKind::Uniqueness | ConstraintKind::NodeKey)
    }

    /// Whether the constraint requires every key to be present.
    pub fn requires_existence(self) -> bool {
        matches!(self, ConstraintKind::NodeKey | ConstraintKind::Existence)
    }

    fn to_byte(self) -> u8 {
        match self {
            ConstraintKind::Uniqueness => 1,
            ConstraintKind::NodeKey => 2,
            ConstraintKind::Existence => 3,
        }
    }

    fn from_byte(byte: u8) -> Result<Self, SchemaRuleDecodeError> {
        match byte {
            1 => Ok(ConstraintKind::Uniqueness),
            2 => Ok(ConstraintKind::NodeKey),
            3 => Ok(ConstraintKind::Existence),
            other => Err(SchemaRuleDecodeError::UnknownConstraintKind(other)),
        }
    }
}

/// Constraint rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConstraintDescriptor {
    /// Rule id (schema record id).
    pub id: u64,
    /// User-facing name.
    pub name: String,
    /// Covered schema.
    pub schema: SchemaDescriptor,
    /// Flavour.
    pub kind: ConstraintKind,
    /// Index type required of the owned index.
    pub index_type: IndexType,
    /// Index backing this constraint.
    pub owned_index: Option<u64>,
}

/// A decoded schema record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaRule {
    /// Index rule.
    Index(IndexDescriptor),
    /// Constraint rule.
    Constraint(ConstraintDescriptor),
}

/// Identity of a rule ignoring its id, name and obligations; equal content means
/// duplicate rules.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RuleContent {
    /// Index content.
    Index {
        /// Schema.
        schema: SchemaDescriptor,
        /// Physical kind.
        index_type: IndexType,
        /// Uniqueness.
        unique: bool,
    },
    /// Constraint content.
    Constraint {
        /// Schema.
        schema: SchemaDescriptor,
        /// Flavour.
        kind: ConstraintKind,
    },
}

/// Errors raised while decoding a schema record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaRuleDecodeError {
    /// Record ended early.
    #[error("schema rule truncated")]
    Truncated,
    /// Unknown rule kind byte.
    #[error("unknown schema rule kind {0}")]
    UnknownKind(u8),
    /// Unknown entity type byte.
    #[error("unknown entity type {0}")]
    UnknownEntityType(u8),
    /// Unknown index type byte.
    #[error("unknown index type {0}")]
    UnknownIndexType(u8),
    /// Unknown constraint kind byte.
    #[error("unknown constraint kind {0}")]
    UnknownConstraintKind(u8),
    /// Rule name is not UTF-8.
    #[error("rule name is not valid UTF-8")]
    InvalidName,
    /// Bytes left after the rule.
    #[error("{0} trailing bytes after schema rule")]
    TrailingBytes(usize),
}

impl SchemaRule {
    /// Rule id.
    pub fn id(&self) -> u64 {
        match self {
            SchemaRule::Index(index) => index.id,
            SchemaRule::Constraint(constraint) => constraint.id,
        }
    }

    /// Rule name.
    pub fn name(&self) -> &str {
        match self {
            SchemaRule::Index(index) => &index.name,
            SchemaRule::Constraint(constraint) => &constraint.name,
        }
    }

    /// Covered schema.
    pub fn schema(&self) -> &SchemaDescriptor {
        match self {
            SchemaRule::Index(index) => &index.schema,
            SchemaRule::Constraint(constraint) => &constraint.schema,
        }
    }

    /// Duplicate-detection key.
    pub fn content(&self) -> RuleContent {
        match self {
            SchemaRule::Index(index) => RuleContent::Index {
                schema: index.schema.clone(),
                index_type: index.index_type,
                unique: index.unique,
            },
            SchemaRule::Constraint(constraint) => RuleContent::Constraint {
                schema: constraint.schema.clone(),
                kind: constraint.kind,
            },
        }
    }

    /// Encodes the rule for a schema record.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64);
        let schema = self.schema();
        match self {
            SchemaRule::Index(_) => out.push(KIND_INDEX),
            SchemaRule::Constraint(_) => out.push(KIND_CONSTRAINT),
        }
        out.push(schema.entity.to_byte());
        out.extend_from_slice(&schema.token_id.to_le_bytes());
        out.extend_from_slice(&(schema.property_keys.len() as u16).to_le_bytes());
        for key in &schema.property_keys {
            out.extend_from_slice(&key.to_le_bytes());
        }
        match self {
            SchemaRule::Index(index) => {
                out.push(index.index_type.to_byte());
                out.push(index.unique as u8);
                out.extend_from_slice(&encode_ref(index.owning_constraint).to_le_bytes());
            }
            SchemaRule::Constraint(constraint) => {
                out.push(constraint.kind.to_byte());
                out.push(constraint.index_type.to_byte());
                out.extend_from_slice(&encode_ref(constraint.owned_index).to_le_bytes());
            }
        }
        let name = self.name().as_bytes();
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(name);
        out
    }

    /// Decodes the rule stored in schema record `id`.
    pub fn decode(id: u64, bytes: &[u8]) -> Result<Self, SchemaRuleDecodeError> {
        let mut reader = Reader { bytes, pos: 0 };
        let kind = reader.u8()?;
        let entity = EntityType::from_byte(reader.u8()?)?;
        let token_id = reader.i32()?;
        let key_count = reader.u16()? as usize;
        let mut property_keys = Vec::with_capacity(key_count.min(bytes.len() / 4));
        for _ in 0..key_count {
            property_keys.push(reader.i32()?);
        }
        let schema = SchemaDescriptor {
            entity,
            token_id,
            property_keys,
        };
        let rule = match kind {
            KIND_INDEX => {
                let index_type = IndexType::from_byte(reader.u8()?)?;
                let unique = reader.u8()? != 0;
                let owning_constraint = decode_ref(reader.i64()?);
                let name = reader.name()?;
                SchemaRule::Index(IndexDescriptor {
                    id,
                    name,
                    schema,
                    index_type,
                    unique,
                    owning_constraint,
                })
            }
            KIND_CONSTRAINT => {
                let kind = ConstraintKind::from_byte(reader.u8()?)?;
                let index_type = IndexType::from_byte(reader.u8()?)?;
                let owned_index = decode_ref(reader.i64()?);
                let name = reader.name()?;
                SchemaRule::Constraint(ConstraintDescriptor {
                    id,
                    name,
                    schema,
                    kind,
                    index_type,
                    owned_index,
                })
            }
            other => return Err(SchemaRuleDecodeError::UnknownKind(other)),
        };
        match bytes.len() - reader.pos {
            0 => Ok(rule),
            rest => Err(SchemaRuleDecodeError::TrailingBytes(rest)),
        }
    }
}

fn encode_ref(value: Option<u64>) -> i64 {
    value.map_or(-1, |id| id as i64)
}

fn decode_ref(value: i64) -> Option<u64> {
    u64::try_from(value).ok()
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], SchemaRuleDecodeError> {
        let end = self.pos + N;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or(SchemaRuleDecodeError::Truncated)?;
        self.pos = end;
        let mut buf = [0u8; N];
        buf.copy_from_slice(slice);
        Ok(buf)
    }

    fn u8(&mut self) -> Result<u8, SchemaRuleDecodeError> {
        Ok(self.take::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, SchemaRuleDecodeError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    fn i32(&mut self) -> Result<i32, SchemaRuleDecodeError> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    fn i64(&mut self) -> Result<i64, SchemaRuleDecodeError> {
        Ok(i64::from_le_bytes(self.take()?))
    }

    fn name(&mut self) -> Result<String, SchemaRuleDecodeError> {
        let len = self.u16()? as usize;
        let end = self.pos + len;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or(SchemaRuleDecodeError::Truncated)?;
        self.pos = end;
        String::from_utf8(slice.to_vec()).map_err(|_| SchemaRuleDecodeError::InvalidName)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_index() -> SchemaRule {
        SchemaRule::Index(IndexDescriptor {
            id: 4,
            name: "person_email".into(),
            schema: SchemaDescriptor::for_label(1, &[2]),
            index_type: IndexType::Range,
            unique: true,
            owning_constraint: Some(5),
        })
    }

    #[test]
    fn decodes_what_it_encodes() {
        let rule = unique_index();
        assert_eq!(SchemaRule::decode(4, &rule.encode()), Ok(rule));
    }

    #[test]
    fn malformed_bytes_are_rejected() {
        let mut bytes = unique_index().encode();
        bytes.push(0);
        assert_eq!(
            SchemaRule::decode(4, &bytes),
            Err(SchemaRuleDecodeError::TrailingBytes(1))
        );
        assert_eq!(
            SchemaRule::decode(4, &bytes[..5]),
            Err(SchemaRuleDecodeError::Truncated)
        );
        assert_eq!(
            SchemaRule::decode(4, &[9, 0]),
            Err(SchemaRuleDecodeError::UnknownKind(9))
        );
    }

    #[test]
    fn content_ignores_id_name_and_owner() {
        let a = unique_index();
        let b = match unique_index() {
            SchemaRule::Index(mut index) => {
                index.id = 9;
                index.name = "other".into();
                index.owning_constraint = None;
                SchemaRule::Index(index)
            }
            other => other,
        };
        assert_eq!(a.content(), b.content());
    }
}
