//! Token id to name resolution.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::store::{
    decode_string, reference, DynamicRecord, RecordLoad, RecordStore, Stores, TokenRecord,
    TokenStores,
};

/// Names of the readable, public tokens of one kind.
#[derive(Clone, Debug, Default)]
pub struct TokenHolder {
    names: FxHashMap<i64, String>,
}

impl TokenHolder {
    /// Holder over explicit `(id, name)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (i64, S)>,
        S: Into<String>,
    {
        Self {
            names: pairs.into_iter().map(|(id, n)| (id, n.into())).collect(),
        }
    }

    /// Whether `id` names a readable public token.
    pub fn contains(&self, id: i64) -> bool {
        self.names.contains_key(&id)
    }

    /// Name of `id`.
    pub fn name(&self, id: i64) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    /// Number of tokens held.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the holder is empty.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn load(stores: &TokenStores) -> Self {
        let mut names = FxHashMap::default();
        for id in 0..stores.tokens.high_id() {
            let token = match stores.tokens.get_record(id, RecordLoad::Normal) {
                Ok(token) => token,
                Err(_) => {
                    debug!(id, "skipping unreadable token");
                    continue;
                }
            };
            if !token.in_use || token.internal {
                continue;
            }
            if let Some(name) = read_name(&token, stores.names.as_ref()) {
                names.insert(id as i64, name);
            }
        }
        Self { names }
    }
}

fn read_name(token: &TokenRecord, names: &dyn RecordStore<DynamicRecord>) -> Option<String> {
    let mut bytes = Vec::new();
    let mut next = token.name_id;
    let mut hops = 0u64;
    while let Some(id) = reference(next) {
        hops += 1;
        if hops > names.high_id() {
            return None;
        }
        let record = names.get_record(id, RecordLoad::Normal).ok()?;
        if !record.in_use {
            return None;
        }
        bytes.extend_from_slice(&record.data);
        next = record.next;
    }
    decode_string(&bytes).ok()
}

/// Token holders for labels, relationship types and property keys.
#[derive(Clone, Debug, Default)]
pub struct TokenHolders {
    /// Label tokens.
    pub labels: TokenHolder,
    /// Relationship type tokens.
    pub relationship_types: TokenHolder,
    /// Property key tokens.
    pub property_keys: TokenHolder,
}

impl TokenHolders {
    /// Loads every readable public token from the token stores. Tokens that fail to
    /// read are left out; the token checker reports them.
    pub fn load(stores: &Stores) -> Self {
        let holders = Self {
            labels: TokenHolder::load(&stores.labels),
            relationship_types: TokenHolder::load(&stores.relationship_types),
            property_keys: TokenHolder::load(&stores.property_keys),
        };
        debug!(
            labels = holders.labels.len(),
            relationship_types = holders.relationship_types.len(),
            property_keys = holders.property_keys.len(),
            "token holders loaded"
        );
        holders
    }
}
