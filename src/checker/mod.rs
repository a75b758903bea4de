//! Parallel multi-pass consistency checker.
//!
//! A run partitions node and relationship ids into ranges sized by the memory budget and
//! checks each range in stages on a fixed worker pool. Stages communicate only through
//! the range's [`Cache`]; findings go to the run's reporter.

#![forbid(unsafe_code)]

mod cache;
mod chain;
mod compliance;
mod context;
mod dynamic;
mod execution;
mod full_check;
mod group;
mod index;
mod limiter;
mod loading;
mod node;
mod property;
mod relationship;
mod scan;
mod schema;
mod token;

#[cfg(test)]
mod testing;

/// Range-scoped slot storage.
pub use cache::{
    index_slot, node_slot, relationship_slot, Cache, CacheAccess, Direction, SlotLayout,
    INDEX_ENTRY, NODE_LINK, RELATIONSHIP_LINK,
};
/// Per-run shared state.
pub use context::{CheckerContext, StoreAccess};
/// Worker pool.
pub use execution::{Chunk, ParallelExecution};
/// Entry point and result.
pub use full_check::{ConsistencyCheckResult, FullCheck};
/// Small/large index classification.
pub use index::IndexSizes;
/// Id ranges and their partitioning.
pub use limiter::{IdRange, MemoryLimiter};
