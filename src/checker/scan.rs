//! Walking a token index scan in step with the entity store.

use std::iter::Peekable;
use std::vec;

use crate::index::TokenScanEntry;

/// Cursor over the entries of one chunk's token index scan.
///
/// The scan is expected in entity order, but a damaged index may repeat an entity or
/// fall out of order; the cursor never gets stuck on either.
pub(crate) struct TokenScanCursor {
    entries: Peekable<vec::IntoIter<TokenScanEntry>>,
}

impl TokenScanCursor {
    pub(crate) fn new(entries: Vec<TokenScanEntry>) -> Self {
        Self {
            entries: entries.into_iter().peekable(),
        }
    }

    /// Tokens indexed for `entity`, merged over every entry for it, or `None` when the
    /// index has no entry. Entries for lower ids still ahead of it go to `stray`.
    pub(crate) fn take(&mut self, entity: u64, mut stray: impl FnMut(u64)) -> Option<Vec<i64>> {
        while let Some(entry) = self.entries.next_if(|e| e.entity < entity) {
            stray(entry.entity);
        }
        let mut merged: Option<Vec<i64>> = None;
        while let Some(entry) = self.entries.next_if(|e| e.entity == entity) {
            merged.get_or_insert_with(Vec::new).extend(entry.tokens);
        }
        if let Some(tokens) = &mut merged {
            tokens.sort_unstable();
            tokens.dedup();
        }
        merged
    }

    /// Hands every remaining entry to `stray`.
    pub(crate) fn finish(self, mut stray: impl FnMut(u64)) {
        for entry in self.entries {
            stray(entry.entity);
        }
    }
}
