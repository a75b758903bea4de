//! Range-scoped, fixed-layout slot cache shared between stages.
//!
//! Each id of the current range owns `layout.width` consecutive `AtomicU64` words. A
//! stage writes the slots of the ids in its chunk; the next stage reads any slot. The
//! only cross-chunk write is clearing a flag bit, which is an idempotent `fetch_and`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::IdRange;

/// Word layout of one cache slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotLayout {
    /// Name used in logs.
    pub name: &'static str,
    /// Words per slot.
    pub width: usize,
}

impl SlotLayout {
    /// Bytes one slot occupies.
    pub const fn bytes_per_slot(&self) -> u64 {
        (self.width * 8) as u64
    }
}

/// Node slot: next relationship (or group) and flags.
pub const NODE_LINK: SlotLayout = SlotLayout {
    name: "node_link",
    width: 2,
};
/// Relationship slot: flags, both endpoints, both cached pointers.
pub const RELATIONSHIP_LINK: SlotLayout = SlotLayout {
    name: "relationship_link",
    width: 5,
};
/// Index slot: entry count and value hash.
pub const INDEX_ENTRY: SlotLayout = SlotLayout {
    name: "index_entry",
    width: 2,
};

/// Word positions and flag bits of [`NODE_LINK`].
pub mod node_slot {
    /// Next relationship or group.
    pub const NEXT_REL: usize = 0;
    /// Flag word.
    pub const FLAGS: usize = 1;
    /// Node is in use.
    pub const IN_USE: u64 = 1;
    /// Node is dense.
    pub const DENSE: u64 = 1 << 1;
    /// `NEXT_REL` is still unconfirmed by a relationship or group.
    pub const CHECK_MARK: u64 = 1 << 2;
}

/// Word positions and flag bits of [`RELATIONSHIP_LINK`].
pub mod relationship_slot {
    /// Flag word.
    pub const FLAGS: usize = 0;
    /// Source node.
    pub const SOURCE_NODE: usize = 1;
    /// Target node.
    pub const TARGET_NODE: usize = 2;
    /// Cached source-chain pointer (prev when forward, next when backward).
    pub const SOURCE_POINTER: usize = 3;
    /// Cached target-chain pointer.
    pub const TARGET_POINTER: usize = 4;
    /// Relationship is in use.
    pub const IN_USE: u64 = 1;
    /// First in the source chain.
    pub const FIRST_IN_SOURCE: u64 = 1 << 1;
    /// First in the target chain.
    pub const FIRST_IN_TARGET: u64 = 1 << 2;
}

/// Word positions of [`INDEX_ENTRY`].
pub mod index_slot {
    /// Entries seen for the entity.
    pub const COUNT: usize = 0;
    /// Hash of the last entry's values.
    pub const HASH: usize = 1;
}

/// Which half of the relationship chain check is running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Cache prev pointers, validate next links.
    Forward,
    /// Cache next pointers, validate prev links.
    Backward,
}

/// Slots for one range under one layout.
#[derive(Debug)]
pub struct Cache {
    layout: SlotLayout,
    range: IdRange,
    words: Box<[AtomicU64]>,
}

impl Cache {
    fn new(layout: SlotLayout, range: IdRange) -> Self {
        let words = (0..range.len() as usize * layout.width)
            .map(|_| AtomicU64::new(0))
            .collect();
        Self {
            layout,
            range,
            words,
        }
    }

    /// Layout in effect.
    pub fn layout(&self) -> SlotLayout {
        self.layout
    }

    /// Range the slots cover.
    pub fn range(&self) -> IdRange {
        self.range
    }

    /// Whether `id` has a slot.
    pub fn covers(&self, id: u64) -> bool {
        self.range.contains(id)
    }

    #[inline]
    fn word(&self, id: u64, column: usize) -> &AtomicU64 {
        debug_assert!(self.covers(id), "id {id} outside {}", self.range);
        debug_assert!(column < self.layout.width);
        &self.words[(id - self.range.start) as usize * self.layout.width + column]
    }

    /// Reads a word.
    pub fn get(&self, id: u64, column: usize) -> u64 {
        self.word(id, column).load(Ordering::Relaxed)
    }

    /// Reads a word holding a stored reference.
    pub fn get_reference(&self, id: u64, column: usize) -> i64 {
        self.get(id, column) as i64
    }

    /// Writes a word.
    pub fn put(&self, id: u64, column: usize, value: u64) {
        self.word(id, column).store(value, Ordering::Relaxed);
    }

    /// Writes a stored reference.
    pub fn put_reference(&self, id: u64, column: usize, value: i64) {
        self.put(id, column, value as u64);
    }

    /// Adds to a word, returning the previous value.
    pub fn add(&self, id: u64, column: usize, delta: u64) -> u64 {
        self.word(id, column).fetch_add(delta, Ordering::Relaxed)
    }

    /// Tests flag bits.
    pub fn has_flag(&self, id: u64, column: usize, flag: u64) -> bool {
        self.get(id, column) & flag == flag
    }

    /// Clears flag bits; safe from any worker.
    pub fn clear_flag(&self, id: u64, column: usize, flag: u64) {
        self.word(id, column).fetch_and(!flag, Ordering::Relaxed);
    }
}

/// Owner of the single live cache of a run.
#[derive(Debug)]
pub struct CacheAccess {
    current: RwLock<Option<Arc<Cache>>>,
    forward: AtomicBool,
}

impl Default for CacheAccess {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheAccess {
    /// No cache prepared yet; direction starts forward.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
            forward: AtomicBool::new(true),
        }
    }

    /// Replaces the live cache with zeroed slots for `range`. The previous cache is
    /// released before the new one is allocated.
    pub fn prepare(&self, layout: SlotLayout, range: IdRange) -> Arc<Cache> {
        let mut current = self.current.write();
        *current = None;
        let cache = Arc::new(Cache::new(layout, range));
        *current = Some(cache.clone());
        cache
    }

    /// The live cache, if any.
    pub fn current(&self) -> Option<Arc<Cache>> {
        self.current.read().clone()
    }

    /// Drops the live cache.
    pub fn clear(&self) {
        *self.current.write() = None;
    }

    /// Sets the chain-check direction.
    pub fn set_direction(&self, direction: Direction) {
        self.forward
            .store(direction == Direction::Forward, Ordering::Release);
    }

    /// Current chain-check direction.
    pub fn direction(&self) -> Direction {
        if self.forward.load(Ordering::Acquire) {
            Direction::Forward
        } else {
            Direction::Backward
        }
    }
}
