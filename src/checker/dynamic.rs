//! Walks dynamic (overflow) chains for strings, arrays, label overflow and token names.

use rustc_hash::FxHashSet;

use super::CheckerContext;
use crate::error::Result;
use crate::report::{Inconsistency, RecordType};
use crate::store::{reference, DynamicRecord, RecordStore, NULL_REFERENCE};

/// Outcome of reading one chain.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ChainRead {
    /// The first record is not in use; nothing was read.
    FirstNotInUse,
    /// The chain was walked as far as it could be.
    Read {
        /// Concatenated payload of every block visited.
        bytes: Vec<u8>,
        /// The first block carries no data.
        first_empty: bool,
        /// No structural problem was found.
        ok: bool,
    },
}

/// Reads the chain starting at `first`. Problems past the first block are reported on
/// the dynamic records themselves, as `record_type`; the caller reports on the owner.
pub(crate) fn read_chain(
    ctx: &CheckerContext,
    store: &dyn RecordStore<DynamicRecord>,
    record_type: RecordType,
    first: u64,
) -> Result<ChainRead> {
    let reporter = ctx.reporter();
    let block_size = store.record_data_size();
    let mut current = ctx.read(store, record_type, first)?;
    if !current.in_use {
        return Ok(ChainRead::FirstNotInUse);
    }
    let first_empty = current.data.is_empty();
    let mut bytes = Vec::new();
    let mut visited = FxHashSet::default();
    let mut ok = !first_empty;
    loop {
        visited.insert(current.id);
        bytes.extend_from_slice(&current.data);
        let next = match reference(current.next) {
            Some(next) => next,
            None => {
                if current.next != NULL_REFERENCE {
                    reporter.report(
                        record_type,
                        current.id,
                        Inconsistency::DynamicNextNotInUse { next: current.next },
                    );
                    ok = false;
                }
                break;
            }
        };
        if next == current.id {
            reporter.report(record_type, current.id, Inconsistency::SelfReferentialNext);
            ok = false;
            break;
        }
        if visited.contains(&next) {
            reporter.report(
                record_type,
                current.id,
                Inconsistency::DynamicRecordChainCycle { next: next as i64 },
            );
            ok = false;
            break;
        }
        if block_size > 0 && current.data.len() < block_size {
            reporter.report(
                record_type,
                current.id,
                Inconsistency::RecordNotFullReferencesNext { next: next as i64 },
            );
        }
        let record = ctx.read(store, record_type, next)?;
        if !record.in_use {
            reporter.report(
                record_type,
                current.id,
                Inconsistency::DynamicNextNotInUse { next: next as i64 },
            );
            ok = false;
            break;
        }
        if record.data.is_empty() {
            reporter.report(
                record_type,
                current.id,
                Inconsistency::EmptyNextBlock { next: next as i64 },
            );
            ok = false;
        }
        current = record;
    }
    Ok(ChainRead::Read {
        bytes,
        first_empty,
        ok,
    })
}
