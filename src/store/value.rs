//! Property values and the payload codecs of dynamic chains.

use serde::Serialize;
use thiserror::Error;
use xxhash_rust::xxh64::Xxh64;

const ARRAY_BOOL: u8 = 1;
const ARRAY_INT: u8 = 2;
const ARRAY_FLOAT: u8 = 3;
const ARRAY_STRING: u8 = 4;

/// Maximum UTF-8 length stored inline in a property block.
pub const SHORT_STRING_MAX: usize = 7;

/// Decoded property value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Float.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Boolean array.
    BoolArray(Vec<bool>),
    /// Integer array.
    IntArray(Vec<i64>),
    /// Float array.
    FloatArray(Vec<f64>),
    /// String array.
    StringArray(Vec<String>),
}

impl Value {
    /// Whether the value is stored through the array store.
    pub fn is_array(&self) -> bool {
        matches!(
            self,
            Value::BoolArray(_) | Value::IntArray(_) | Value::FloatArray(_) | Value::StringArray(_)
        )
    }

    fn hash_into(&self, hasher: &mut Xxh64) {
        match self {
            Value::Bool(v) => {
                hasher.update(&[0x10, *v as u8]);
            }
            Value::Int(v) => {
                hasher.update(&[0x11]);
                hasher.update(&v.to_le_bytes());
            }
            Value::Float(v) => {
                hasher.update(&[0x12]);
                hasher.update(&v.to_bits().to_le_bytes());
            }
            Value::String(v) => {
                hasher.update(&[0x13]);
                hasher.update(&(v.len() as u32).to_le_bytes());
                hasher.update(v.as_bytes());
            }
            array => {
                if let Some(bytes) = encode_array(array) {
                    hasher.update(&[0x14]);
                    hasher.update(&bytes);
                }
            }
        }
    }
}

/// Hash of an index entry's value tuple, stable across runs.
pub fn hash_values(values: &[Value]) -> u64 {
    let mut hasher = Xxh64::new(0);
    hasher.update(&(values.len() as u32).to_le_bytes());
    for value in values {
        value.hash_into(&mut hasher);
    }
    hasher.digest()
}

/// Value slot of a property block.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyBlockValue {
    /// Inline boolean.
    Bool(bool),
    /// Inline integer.
    Int(i64),
    /// Inline float.
    Float(f64),
    /// Inline short string.
    ShortString(String),
    /// First record of a string chain.
    String(i64),
    /// First record of an array chain.
    Array(i64),
    /// Unknown type tag.
    Invalid(u8),
}

/// Errors raised while decoding a dynamic payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValueDecodeError {
    /// Payload ended early.
    #[error("payload truncated")]
    Truncated,
    /// Unknown array element tag.
    #[error("unknown array type tag {0}")]
    UnknownTag(u8),
    /// String bytes were not UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    /// Bytes left over after decoding.
    #[error("{0} trailing bytes")]
    TrailingBytes(usize),
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ValueDecodeError> {
        let end = self.pos.checked_add(len).ok_or(ValueDecodeError::Truncated)?;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or(ValueDecodeError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, ValueDecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, ValueDecodeError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64, ValueDecodeError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn finish(self) -> Result<(), ValueDecodeError> {
        match self.bytes.len() - self.pos {
            0 => Ok(()),
            rest => Err(ValueDecodeError::TrailingBytes(rest)),
        }
    }
}

/// Decodes a string chain payload.
pub fn decode_string(bytes: &[u8]) -> Result<String, ValueDecodeError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| ValueDecodeError::InvalidUtf8)
}

/// Encodes an array value; returns `None` for scalars.
pub fn encode_array(value: &Value) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    match value {
        Value::BoolArray(items) => {
            out.push(ARRAY_BOOL);
            out.extend_from_slice(&(items.len() as u32).to_le_bytes());
            out.extend(items.iter().map(|b| *b as u8));
        }
        Value::IntArray(items) => {
            out.push(ARRAY_INT);
            out.extend_from_slice(&(items.len() as u32).to_le_bytes());
            for item in items {
                out.extend_from_slice(&item.to_le_bytes());
            }
        }
        Value::FloatArray(items) => {
            out.push(ARRAY_FLOAT);
            out.extend_from_slice(&(items.len() as u32).to_le_bytes());
            for item in items {
                out.extend_from_slice(&item.to_bits().to_le_bytes());
            }
        }
        Value::StringArray(items) => {
            out.push(ARRAY_STRING);
            out.extend_from_slice(&(items.len() as u32).to_le_bytes());
            for item in items {
                out.extend_from_slice(&(item.len() as u32).to_le_bytes());
                out.extend_from_slice(item.as_bytes());
            }
        }
        _ => return None,
    }
    Some(out)
}

/// Decodes an array chain payload.
pub fn decode_array(bytes: &[u8]) -> Result<Value, ValueDecodeError> {
    let mut cursor = Cursor::new(bytes);
    let tag = cursor.u8()?;
    let count = cursor.u32()? as usize;
    let value = match tag {
        ARRAY_BOOL => Value::BoolArray(
            cursor
                .take(count)?
                .iter()
                .map(|b| *b != 0)
                .collect(),
        ),
        ARRAY_INT => {
            let mut items = Vec::with_capacity(count.min(bytes.len() / 8));
            for _ in 0..count {
                items.push(cursor.u64()? as i64);
            }
            Value::IntArray(items)
        }
        ARRAY_FLOAT => {
            let mut items = Vec::with_capacity(count.min(bytes.len() / 8));
            for _ in 0..count {
                items.push(f64::from_bits(cursor.u64()?));
            }
            Value::FloatArray(items)
        }
        ARRAY_STRING => {
            let mut items = Vec::with_capacity(count.min(bytes.len() / 4));
            for _ in 0..count {
                let len = cursor.u32()? as usize;
                items.push(decode_string(cursor.take(len)?)?);
            }
            Value::StringArray(items)
        }
        other => return Err(ValueDecodeError::UnknownTag(other)),
    };
    cursor.finish()?;
    Ok(value)
}

/// Encodes a label overflow payload: owning node id followed by label ids.
pub fn encode_labels(owner: u64, labels: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + labels.len() * 4);
    out.extend_from_slice(&owner.to_le_bytes());
    for label in labels {
        out.extend_from_slice(&label.to_le_bytes());
    }
    out
}

/// Decodes a label overflow payload into `(owner, labels)`.
pub fn decode_labels(bytes: &[u8]) -> Result<(i64, Vec<i64>), ValueDecodeError> {
    let mut cursor = Cursor::new(bytes);
    let owner = cursor.u64()? as i64;
    let rest = bytes.len() - 8;
    if rest % 4 != 0 {
        return Err(ValueDecodeError::TrailingBytes(rest % 4));
    }
    let mut labels = Vec::with_capacity(rest / 4);
    for _ in 0..rest / 4 {
        labels.push(i64::from(cursor.u32()?));
    }
    cursor.finish()?;
    Ok((owner, labels))
}

/// Splits a payload into blocks of at most `block_size` bytes. An empty payload still
/// produces one empty block.
pub fn split_blocks(payload: &[u8], block_size: usize) -> Vec<Vec<u8>> {
    if payload.is_empty() {
        return vec![Vec::new()];
    }
    payload
        .chunks(block_size.max(1))
        .map(<[u8]>::to_vec)
        .collect()
}
