//! Orchestration of a complete check run.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use super::cache::NODE_LINK;
use super::chain::RelationshipChainChecker;
use super::compliance::SchemaComplianceChecker;
use super::group::RelationshipGroupChecker;
use super::index::{IndexEntryChecker, IndexSizes, LargeIndexChecker};
use super::node::NodeChecker;
use super::property::PropertyStoreChecker;
use super::relationship::{RelationshipChecker, UnusedReferencesChecker};
use super::schema::SchemaChecker;
use super::token::TokenChecker;
use super::{CheckerContext, MemoryLimiter, ParallelExecution, StoreAccess};
use crate::config::CheckConfig;
use crate::error::Result;
use crate::report::{ConsistencySummaryStatistics, Finding, InconsistencyReport, Reporter};
use crate::schema::EntityType;
use crate::store::PageCacheStats;

/// Outcome of a completed check.
#[derive(Clone, Debug, Serialize)]
pub struct ConsistencyCheckResult {
    /// Error and warning counts.
    pub summary: ConsistencySummaryStatistics,
    /// Retained findings, ordered by record type then id.
    pub findings: Vec<Finding>,
    /// Page cache counters, when a tracer was supplied.
    pub page_cache: Option<PageCacheStats>,
    /// Wall time of the run.
    pub duration_ms: u64,
}

impl ConsistencyCheckResult {
    /// Whether no errors were found. Warnings do not count.
    pub fn is_consistent(&self) -> bool {
        self.summary.is_consistent()
    }

    /// Pretty-printed JSON rendering, for tools that archive check results.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// A full consistency check over one set of stores and indexes.
///
/// Runs token and schema checks, then the node-range passes, the relationship chain
/// passes, the property store pass and the index passes, in that order. Only read
/// failures abort the run; everything else becomes a finding.
#[derive(Clone, Debug, Default)]
pub struct FullCheck {
    config: CheckConfig,
}

impl FullCheck {
    /// Check with the given configuration.
    pub fn new(config: CheckConfig) -> Self {
        Self { config }
    }

    /// Configuration in use.
    pub fn config(&self) -> &CheckConfig {
        &self.config
    }

    /// Runs the check.
    ///
    /// # Arguments
    ///
    /// * `access` - Stores, indexes and token indexes to check
    ///
    /// # Returns
    ///
    /// The summary and retained findings. `Ok` means the check ran to completion; it says
    /// nothing about consistency until the summary is inspected.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid configuration, a thread pool that cannot start, a
    /// record that cannot be read even leniently, or a panicking worker.
    pub fn execute(&self, access: StoreAccess) -> Result<ConsistencyCheckResult> {
        self.config.validate()?;
        let started = Instant::now();
        let threads = self.config.effective_threads();
        let execution = ParallelExecution::new(threads)?;
        let report = Arc::new(InconsistencyReport::new(self.config.max_retained_findings));
        let ctx = CheckerContext::new(
            access,
            &self.config,
            execution,
            Reporter::new(report.clone()),
        );
        info!(
            target: "sombra_check",
            threads,
            high_node_id = ctx.high_node_id(),
            high_relationship_id = ctx.high_relationship_id(),
            memory_limit_bytes = self.config.memory_limit_bytes,
            "consistency check started"
        );

        run_passes(&ctx)?;

        let summary = report.summary();
        let page_cache = ctx.tracer().map(|tracer| {
            tracer.emit_tracing();
            tracer.snapshot()
        });
        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            target: "sombra_check",
            errors = summary.total_errors,
            warnings = summary.total_warnings,
            dropped = summary.dropped_findings,
            duration_ms,
            "consistency check finished"
        );
        Ok(ConsistencyCheckResult {
            summary,
            findings: report.findings(),
            page_cache,
            duration_ms,
        })
    }
}

fn run_passes(ctx: &CheckerContext) -> Result<()> {
    let flags = ctx.flags();
    TokenChecker::new(ctx).check()?;
    let mandatory = SchemaChecker::new(ctx).check()?;
    let sizes = IndexSizes::select(ctx);
    let compliance = SchemaComplianceChecker::new(ctx, &mandatory, &sizes);

    let limiter = MemoryLimiter::new(ctx.memory_limit_bytes(), NODE_LINK.bytes_per_slot());
    let ranges = limiter.ranges(ctx.high_node_id());
    debug!(
        target: "sombra_check",
        ranges = ranges.len(),
        window = limiter.window(),
        "node ranges planned"
    );
    let nodes = NodeChecker::new(ctx, &compliance);
    let relationships = RelationshipChecker::new(ctx, &compliance);
    for (index, range) in ranges.iter().enumerate() {
        let first = index == 0;
        let last = index + 1 == ranges.len();
        debug!(target: "sombra_check", %range, "node range");
        let cache = ctx.cache().prepare(NODE_LINK, *range);
        nodes.check(&cache, last)?;
        relationships.check(&cache, first)?;
        if flags.check_structure {
            RelationshipGroupChecker::new(ctx).check(&cache, first)?;
            UnusedReferencesChecker::new(ctx).check(&cache)?;
        }
    }
    ctx.cache().clear();

    if flags.check_structure {
        RelationshipChainChecker::new(ctx).check()?;
    }
    if flags.check_properties {
        PropertyStoreChecker::new(ctx).check()?;
    }
    if flags.check_indexes {
        let large = LargeIndexChecker::new(ctx, &sizes);
        large.check(EntityType::Node)?;
        large.check(EntityType::Relationship)?;
        IndexEntryChecker::new(ctx).check()?;
    }
    Ok(())
}
