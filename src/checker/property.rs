//! Property chains read on behalf of their owners, and the property store's own linkage.

use rustc_hash::{FxHashMap, FxHashSet};

use super::dynamic::{read_chain, ChainRead};
use super::token::{TokenKind, TokenUse};
use super::{CheckerContext, IdRange};
use crate::error::Result;
use crate::report::{Inconsistency, RecordType};
use crate::store::{
    decode_array, decode_string, reference, PropertyBlock, PropertyBlockValue, RecordStore,
    Value, NULL_REFERENCE,
};

/// Decoded properties of one entity, by key.
pub(crate) type PropertyValues = FxHashMap<i32, Value>;

/// Walks a property chain without trusting it: cycles, broken links and bad blocks are
/// reported and cut the walk short instead of looping or failing.
pub(crate) struct SafePropertyChainReader {
    ctx: CheckerContext,
}

impl SafePropertyChainReader {
    /// Reader reporting through `ctx`, or silently when property checks are disabled.
    pub(crate) fn new(ctx: &CheckerContext) -> Self {
        let ctx = if ctx.flags().check_properties {
            ctx.clone()
        } else {
            ctx.without_reporting()
        };
        Self { ctx }
    }

    /// Reads the chain of owner `owner_id` starting at `first`. The returned flag is false
    /// when anything was wrong; the values are then incomplete and should be ignored.
    pub(crate) fn read(
        &self,
        owner_type: RecordType,
        owner_id: u64,
        first: i64,
    ) -> Result<(PropertyValues, bool)> {
        let reporter = self.ctx.reporter();
        let mut values = PropertyValues::default();
        let Some(mut id) = reference(first) else {
            if first != NULL_REFERENCE {
                reporter.report(
                    owner_type,
                    owner_id,
                    Inconsistency::PropertyNotInUse { property: first },
                );
                return Ok((values, false));
            }
            return Ok((values, true));
        };
        let properties = self.ctx.stores().properties.clone();
        let mut visited = FxHashSet::default();
        let mut keys = FxHashSet::default();
        let mut ok = true;
        let mut is_first = true;
        loop {
            if !visited.insert(id) {
                reporter.report(
                    owner_type,
                    owner_id,
                    Inconsistency::PropertyChainContainsCircularReference {
                        property: id as i64,
                    },
                );
                ok = false;
                break;
            }
            let record = self.ctx.lookup(properties.as_ref(), id)?;
            if !record.in_use {
                reporter.report(
                    owner_type,
                    owner_id,
                    Inconsistency::PropertyNotInUse {
                        property: id as i64,
                    },
                );
                ok = false;
                break;
            }
            if is_first && record.prev_prop != NULL_REFERENCE {
                reporter.report(
                    owner_type,
                    owner_id,
                    Inconsistency::PropertyNotFirstInChain {
                        property: id as i64,
                    },
                );
                ok = false;
            }
            for block in &record.blocks {
                if !keys.insert(block.key) {
                    reporter.report(
                        owner_type,
                        owner_id,
                        Inconsistency::PropertyKeyNotUniqueInChain { key: block.key },
                    );
                    ok = false;
                    continue;
                }
                match self.read_block(id, block)? {
                    Some(value) => {
                        values.insert(block.key, value);
                    }
                    None => ok = false,
                }
            }
            match reference(record.next_prop) {
                Some(next) => {
                    id = next;
                    is_first = false;
                }
                None => {
                    if record.next_prop != NULL_REFERENCE {
                        reporter.report(
                            owner_type,
                            owner_id,
                            Inconsistency::PropertyNotInUse {
                                property: record.next_prop,
                            },
                        );
                        ok = false;
                    }
                    break;
                }
            }
        }
        Ok((values, ok))
    }

    fn read_block(&self, property: u64, block: &PropertyBlock) -> Result<Option<Value>> {
        let reporter = self.ctx.reporter();
        if block.key < 0 {
            reporter.report(
                RecordType::Property,
                property,
                Inconsistency::InvalidPropertyKey { key: block.key },
            );
            return Ok(None);
        }
        if self
            .ctx
            .token_use(TokenKind::PropertyKey, i64::from(block.key))?
            != TokenUse::Valid
        {
            reporter.report(
                RecordType::Property,
                property,
                Inconsistency::KeyNotInUse { key: block.key },
            );
            return Ok(None);
        }
        let value = match &block.value {
            PropertyBlockValue::Bool(v) => Value::Bool(*v),
            PropertyBlockValue::Int(v) => Value::Int(*v),
            PropertyBlockValue::Float(v) => Value::Float(*v),
            PropertyBlockValue::ShortString(v) => Value::String(v.clone()),
            PropertyBlockValue::Invalid(tag) => {
                reporter.report(
                    RecordType::Property,
                    property,
                    Inconsistency::InvalidPropertyType { tag: *tag },
                );
                return Ok(None);
            }
            PropertyBlockValue::String(first) => {
                let Some(bytes) = self.read_dynamic(property, *first, false)? else {
                    return Ok(None);
                };
                match decode_string(&bytes) {
                    Ok(text) => Value::String(text),
                    Err(err) => return self.invalid_value(property, err.to_string()),
                }
            }
            PropertyBlockValue::Array(first) => {
                let Some(bytes) = self.read_dynamic(property, *first, true)? else {
                    return Ok(None);
                };
                match decode_array(&bytes) {
                    Ok(array) => array,
                    Err(err) => return self.invalid_value(property, err.to_string()),
                }
            }
        };
        Ok(Some(value))
    }

    fn invalid_value(&self, property: u64, detail: String) -> Result<Option<Value>> {
        self.ctx.reporter().report(
            RecordType::Property,
            property,
            Inconsistency::InvalidPropertyValue { detail },
        );
        Ok(None)
    }

    fn read_dynamic(&self, property: u64, first: i64, array: bool) -> Result<Option<Vec<u8>>> {
        let reporter = self.ctx.reporter();
        let (store, record_type) = if array {
            (&self.ctx.stores().arrays, RecordType::ArrayProperty)
        } else {
            (&self.ctx.stores().strings, RecordType::StringProperty)
        };
        let not_in_use = |record| {
            if array {
                Inconsistency::ArrayNotInUse { record }
            } else {
                Inconsistency::StringNotInUse { record }
            }
        };
        let Some(first_id) = reference(first) else {
            reporter.report(RecordType::Property, property, not_in_use(first));
            return Ok(None);
        };
        match read_chain(&self.ctx, store.as_ref(), record_type, first_id)? {
            ChainRead::FirstNotInUse => {
                reporter.report(RecordType::Property, property, not_in_use(first));
                Ok(None)
            }
            ChainRead::Read {
                bytes,
                first_empty,
                ok,
            } => {
                if first_empty {
                    let kind = if array {
                        Inconsistency::ArrayEmpty { record: first }
                    } else {
                        Inconsistency::StringEmpty { record: first }
                    };
                    reporter.report(RecordType::Property, property, kind);
                }
                Ok(ok.then_some(bytes))
            }
        }
    }
}

/// Checks prev/next reciprocity of every in-use property record.
pub(crate) struct PropertyStoreChecker<'a> {
    ctx: &'a CheckerContext,
}

impl<'a> PropertyStoreChecker<'a> {
    pub(crate) fn new(ctx: &'a CheckerContext) -> Self {
        Self { ctx }
    }

    pub(crate) fn check(&self) -> Result<()> {
        let store = self.ctx.stores().properties.clone();
        self.ctx.execution().run(
            "properties",
            IdRange::new(0, store.high_id()),
            |chunk| {
                for id in chunk.range.start..chunk.range.end {
                    self.check_record(id)?;
                }
                Ok(())
            },
        )
    }

    fn check_record(&self, id: u64) -> Result<()> {
        let store = self.ctx.stores().properties.as_ref();
        let reporter = self.ctx.reporter();
        let record = self.ctx.read(store, RecordType::Property, id)?;
        if !record.in_use {
            return Ok(());
        }
        if record.prev_prop != NULL_REFERENCE {
            match self.ctx.follow(store, record.prev_prop)? {
                Some(prev) if prev.in_use => {
                    if prev.next_prop != id as i64 {
                        reporter.report(
                            RecordType::Property,
                            id,
                            Inconsistency::PreviousDoesNotReferenceBack {
                                property: record.prev_prop,
                            },
                        );
                    }
                }
                _ => reporter.report(
                    RecordType::Property,
                    id,
                    Inconsistency::PrevNotInUse {
                        property: record.prev_prop,
                    },
                ),
            }
        }
        if record.next_prop != NULL_REFERENCE {
            match self.ctx.follow(store, record.next_prop)? {
                Some(next) if next.in_use => {
                    if next.prev_prop != id as i64 {
                        reporter.report(
                            RecordType::Property,
                            id,
                            Inconsistency::NextDoesNotReferenceBack {
                                property: record.next_prop,
                            },
                        );
                    }
                }
                _ => reporter.report(
                    RecordType::Property,
                    id,
                    Inconsistency::NextNotInUse {
                        property: record.next_prop,
                    },
                ),
            }
        }
        Ok(())
    }
}
