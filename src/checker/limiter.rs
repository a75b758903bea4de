//! Splits an id space into windows whose cache slots fit the memory budget.

use std::fmt;

/// Half-open id interval `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IdRange {
    /// First id.
    pub start: u64,
    /// One past the last id.
    pub end: u64,
}

impl IdRange {
    /// Range `[start, end)`; an inverted pair collapses to empty.
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// Number of ids.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Whether the range holds no ids.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether `id` falls in the range.
    pub fn contains(&self, id: u64) -> bool {
        id >= self.start && id < self.end
    }

    /// Whether a stored reference falls in the range.
    pub fn contains_reference(&self, reference: i64) -> bool {
        u64::try_from(reference).map_or(false, |id| self.contains(id))
    }

    /// Same start, end pushed to the end of the id space.
    pub fn to_end_of_space(&self) -> Self {
        Self::new(self.start, u64::MAX)
    }

    /// Contiguous near-equal pieces; never more than `len` pieces, none empty unless the
    /// range itself is.
    pub fn split(&self, parts: usize) -> Vec<IdRange> {
        let len = self.len();
        if len == 0 {
            return Vec::new();
        }
        let parts = (parts.max(1) as u64).min(len);
        let base = len / parts;
        let extra = len % parts;
        let mut out = Vec::with_capacity(parts as usize);
        let mut start = self.start;
        for i in 0..parts {
            let size = base + u64::from(i < extra);
            out.push(IdRange::new(start, start + size));
            start += size;
        }
        out
    }
}

impl fmt::Display for IdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Budget-driven range producer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryLimiter {
    window: u64,
}

impl MemoryLimiter {
    /// Limiter for slots of `bytes_per_slot` under `budget_bytes`. The window is never
    /// smaller than one id.
    pub fn new(budget_bytes: u64, bytes_per_slot: u64) -> Self {
        Self {
            window: (budget_bytes / bytes_per_slot.max(1)).max(1),
        }
    }

    /// Ids per range.
    pub fn window(&self) -> u64 {
        self.window
    }

    /// Ranges covering `[0, high_id)`. Always yields at least one range, so a store with
    /// `high_id == 0` still gets one (empty) pass.
    pub fn ranges(&self, high_id: u64) -> Vec<IdRange> {
        if high_id <= self.window {
            return vec![IdRange::new(0, high_id)];
        }
        let mut ranges = Vec::with_capacity((high_id / self.window + 1) as usize);
        let mut start = 0;
        while start < high_id {
            let end = start.saturating_add(self.window).min(high_id);
            ranges.push(IdRange::new(start, end));
            start = end;
        }
        ranges
    }
}
