//! Record reads used by the checkers.
//!
//! A scan that owns a record reads it with [`CheckerContext::read`], which reports
//! partially decodable records. Records reached through a reference are read with
//! [`CheckerContext::lookup`], which treats them as unused without reporting; their
//! owning scan reports them once.

use super::CheckerContext;
use crate::error::Result;
use crate::report::{Inconsistency, RecordType};
use crate::store::{reference, DecodeOutcome, Record, RecordLoad, RecordStore};

impl CheckerContext {
    /// Reads a record during the scan of its own store.
    pub(crate) fn read<R: Record>(
        &self,
        store: &dyn RecordStore<R>,
        record_type: RecordType,
        id: u64,
    ) -> Result<R> {
        match self.load(store, id)? {
            Ok(record) => Ok(record),
            Err(detail) => {
                self.reporter().report(
                    record_type,
                    id,
                    Inconsistency::RecordNotDecodable { detail },
                );
                Ok(R::unused(id))
            }
        }
    }

    /// Reads a referenced record; corrupt records come back unused.
    pub(crate) fn lookup<R: Record>(&self, store: &dyn RecordStore<R>, id: u64) -> Result<R> {
        Ok(self.load(store, id)?.unwrap_or_else(|_| R::unused(id)))
    }

    /// Reads the record a stored reference points at; null and illegal references come
    /// back as `None`.
    pub(crate) fn follow<R: Record>(
        &self,
        store: &dyn RecordStore<R>,
        reference_value: i64,
    ) -> Result<Option<R>> {
        match reference(reference_value) {
            Some(id) => self.lookup(store, id).map(Some),
            None => Ok(None),
        }
    }

    fn load<R: Record>(
        &self,
        store: &dyn RecordStore<R>,
        id: u64,
    ) -> Result<std::result::Result<R, String>> {
        let tracer = self.tracer();
        if let Some(tracer) = tracer {
            tracer.record_pin();
        }
        let outcome = store.get_record(id, RecordLoad::Check);
        if let Some(tracer) = tracer {
            tracer.record_unpin();
            match &outcome {
                Err(DecodeOutcome::Fatal(_)) => tracer.record_fault(),
                _ => tracer.record_hit(),
            }
        }
        match outcome {
            Ok(record) => Ok(Ok(record)),
            Err(DecodeOutcome::ReportableCorruption(detail)) => Ok(Err(detail)),
            Err(DecodeOutcome::Fatal(err)) => Err(err.into()),
        }
    }
}
