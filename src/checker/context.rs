//! Immutable per-run state shared by every checker.

use std::sync::{Arc, OnceLock};

use super::cache::CacheAccess;
use super::execution::ParallelExecution;
use crate::config::{CheckConfig, ConsistencyFlags};
use crate::index::{IndexAccessors, IndexProvider, TokenScanStore};
use crate::report::Reporter;
use crate::store::{PageCacheTracer, RecordStore, Stores};
use crate::token::TokenHolders;

/// External collaborators a check reads from.
#[derive(Clone)]
pub struct StoreAccess {
    /// Record stores.
    pub stores: Stores,
    /// Value indexes.
    pub indexes: Arc<dyn IndexProvider>,
    /// Label index.
    pub label_index: Arc<dyn TokenScanStore>,
    /// Relationship type index.
    pub relationship_type_index: Arc<dyn TokenScanStore>,
    /// Token names; `None` loads them from the token stores.
    pub tokens: Option<TokenHolders>,
    /// Optional page cache counters.
    pub page_cache_tracer: Option<Arc<PageCacheTracer>>,
}

struct Shared {
    stores: Stores,
    indexes: Arc<dyn IndexProvider>,
    index_snapshot: OnceLock<Arc<dyn IndexAccessors>>,
    label_index: Arc<dyn TokenScanStore>,
    relationship_type_index: Arc<dyn TokenScanStore>,
    tokens: TokenHolders,
    tracer: Option<Arc<PageCacheTracer>>,
    cache: CacheAccess,
    execution: ParallelExecution,
    flags: ConsistencyFlags,
    large_index_threshold: f64,
    memory_limit_bytes: u64,
    high_node_id: u64,
    high_relationship_id: u64,
}

/// Everything a checker needs, built once per run.
///
/// Cloning is cheap. [`without_reporting`](Self::without_reporting) gives a view whose
/// findings are discarded but which shares the same cache.
#[derive(Clone)]
pub struct CheckerContext {
    shared: Arc<Shared>,
    reporter: Reporter,
}

impl CheckerContext {
    /// Builds the context. High ids are captured now and stay fixed for the run.
    pub fn new(
        access: StoreAccess,
        config: &CheckConfig,
        execution: ParallelExecution,
        reporter: Reporter,
    ) -> Self {
        let tokens = access
            .tokens
            .unwrap_or_else(|| TokenHolders::load(&access.stores));
        let high_node_id = access.stores.nodes.high_id();
        let high_relationship_id = access.stores.relationships.high_id();
        Self {
            shared: Arc::new(Shared {
                stores: access.stores,
                indexes: access.indexes,
                index_snapshot: OnceLock::new(),
                label_index: access.label_index,
                relationship_type_index: access.relationship_type_index,
                tokens,
                tracer: access.page_cache_tracer,
                cache: CacheAccess::new(),
                execution,
                flags: config.flags,
                large_index_threshold: config.large_index_threshold,
                memory_limit_bytes: config.memory_limit_bytes,
                high_node_id,
                high_relationship_id,
            }),
            reporter,
        }
    }

    /// Same context with findings discarded.
    pub fn without_reporting(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            reporter: Reporter::discarding(),
        }
    }

    /// Finding sink.
    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// Record stores.
    pub fn stores(&self) -> &Stores {
        &self.shared.stores
    }

    /// Index snapshot, taken on first call and reused for the rest of the run.
    pub fn indexes(&self) -> Arc<dyn IndexAccessors> {
        self.shared
            .index_snapshot
            .get_or_init(|| self.shared.indexes.snapshot())
            .clone()
    }

    /// Label index.
    pub fn label_index(&self) -> &dyn TokenScanStore {
        self.shared.label_index.as_ref()
    }

    /// Relationship type index.
    pub fn relationship_type_index(&self) -> &dyn TokenScanStore {
        self.shared.relationship_type_index.as_ref()
    }

    /// Token names.
    pub fn tokens(&self) -> &TokenHolders {
        &self.shared.tokens
    }

    /// Page cache counters, when tracing.
    pub fn tracer(&self) -> Option<&PageCacheTracer> {
        self.shared.tracer.as_deref()
    }

    /// The run's cache.
    pub fn cache(&self) -> &CacheAccess {
        &self.shared.cache
    }

    /// Worker pool.
    pub fn execution(&self) -> &ParallelExecution {
        &self.shared.execution
    }

    /// Enabled phases.
    pub fn flags(&self) -> ConsistencyFlags {
        self.shared.flags
    }

    /// Entry-count ratio above which an index is checked from the index side.
    pub fn large_index_threshold(&self) -> f64 {
        self.shared.large_index_threshold
    }

    /// Cache budget.
    pub fn memory_limit_bytes(&self) -> u64 {
        self.shared.memory_limit_bytes
    }

    /// Node high id at run start.
    pub fn high_node_id(&self) -> u64 {
        self.shared.high_node_id
    }

    /// Relationship high id at run start.
    pub fn high_relationship_id(&self) -> u64 {
        self.shared.high_relationship_id
    }
}
