//! Unit test helpers: a context over bare in-memory stores with a collecting reporter.

use std::sync::{Arc, Once};

use tracing_subscriber::EnvFilter;

use super::{CheckerContext, ParallelExecution, StoreAccess};
use crate::config::CheckConfig;
use crate::index::{MemoryIndexProvider, MemoryTokenScanStore, TokenScanStore};
use crate::report::{Finding, Inconsistency, InconsistencyReport, RecordType, Reporter};
use crate::store::MemoryStores;

static INIT: Once = Once::new();

pub(crate) fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("sombra_check=warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init();
    });
}

pub(crate) struct Collected(Arc<InconsistencyReport>);

impl Collected {
    pub(crate) fn findings(&self) -> Vec<Finding> {
        self.0.findings()
    }

    pub(crate) fn kinds(&self) -> Vec<(RecordType, u64, Inconsistency)> {
        self.findings()
            .into_iter()
            .map(|f| (f.record_type, f.id, f.kind))
            .collect()
    }
}

pub(crate) fn context_for(stores: &MemoryStores) -> (CheckerContext, Collected) {
    context_with(stores, &CheckConfig::default())
}

pub(crate) fn context_with(
    stores: &MemoryStores,
    config: &CheckConfig,
) -> (CheckerContext, Collected) {
    context_with_token_indexes(
        stores,
        config,
        Arc::new(MemoryTokenScanStore::new()),
        Arc::new(MemoryTokenScanStore::new()),
    )
}

/// Context reading the given label and relationship type indexes.
pub(crate) fn context_with_token_indexes(
    stores: &MemoryStores,
    config: &CheckConfig,
    label_index: Arc<dyn TokenScanStore>,
    relationship_type_index: Arc<dyn TokenScanStore>,
) -> (CheckerContext, Collected) {
    init_tracing();
    let report = Arc::new(InconsistencyReport::new(usize::MAX));
    let access = StoreAccess {
        stores: stores.stores(),
        indexes: Arc::new(MemoryIndexProvider::new()),
        label_index,
        relationship_type_index,
        tokens: None,
        page_cache_tracer: None,
    };
    let execution = ParallelExecution::new(2).expect("pool");
    let ctx = CheckerContext::new(
        access,
        config,
        execution,
        Reporter::new(report.clone()),
    );
    (ctx, Collected(report))
}
