//! Finding collection and the summary of a check.
//!
//! Checkers report through a cloneable [`Reporter`]; the run's [`InconsistencyReport`]
//! counts every finding, keeps the first few thousand for the caller and logs them as
//! they arrive.

#![forbid(unsafe_code)]

mod kind;
mod summary;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, warn};

/// Finding kinds and classification.
pub use kind::{ChainLink, Inconsistency, RecordType, Severity, RECORD_TYPE_COUNT};
/// Summary types.
pub use summary::{ConsistencySummaryStatistics, RecordTypeCounts};

/// One inconsistency reported against one record.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Finding {
    /// Type of the record the finding is about.
    pub record_type: RecordType,
    /// Id of that record.
    pub id: u64,
    /// What is wrong.
    #[serde(flatten)]
    pub kind: Inconsistency,
}

impl Finding {
    /// Severity of the finding.
    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]: {}", self.record_type, self.id, self.kind)
    }
}

/// Destination for findings; shared by every worker.
pub trait ReportSink: Send + Sync {
    /// Records one finding.
    fn report(&self, finding: Finding);
}

/// Sink that drops everything.
#[derive(Debug, Default)]
pub struct DiscardingSink;

impl ReportSink for DiscardingSink {
    fn report(&self, _finding: Finding) {}
}

/// Handle checkers report through.
#[derive(Clone)]
pub struct Reporter {
    sink: Arc<dyn ReportSink>,
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter").finish_non_exhaustive()
    }
}

impl Reporter {
    /// Reporter writing into `sink`.
    pub fn new(sink: Arc<dyn ReportSink>) -> Self {
        Self { sink }
    }

    /// Reporter whose findings vanish.
    pub fn discarding() -> Self {
        Self::new(Arc::new(DiscardingSink))
    }

    /// Reports `kind` against record `id` of `record_type`.
    pub fn report(&self, record_type: RecordType, id: u64, kind: Inconsistency) {
        self.sink.report(Finding {
            record_type,
            id,
            kind,
        });
    }
}

/// Collecting sink for one run.
pub struct InconsistencyReport {
    max_retained: usize,
    retained: Mutex<Vec<Finding>>,
    dropped: AtomicU64,
    errors: [AtomicU64; RECORD_TYPE_COUNT],
    warnings: [AtomicU64; RECORD_TYPE_COUNT],
}

impl InconsistencyReport {
    /// Empty report keeping at most `max_retained` findings.
    pub fn new(max_retained: usize) -> Self {
        Self {
            max_retained,
            retained: Mutex::new(Vec::new()),
            dropped: AtomicU64::new(0),
            errors: std::array::from_fn(|_| AtomicU64::new(0)),
            warnings: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Counts gathered so far.
    pub fn summary(&self) -> ConsistencySummaryStatistics {
        let mut summary = ConsistencySummaryStatistics {
            dropped_findings: self.dropped.load(Ordering::Relaxed),
            ..Default::default()
        };
        for record_type in RecordType::ALL {
            let counts = RecordTypeCounts {
                errors: self.errors[record_type.ordinal()].load(Ordering::Relaxed),
                warnings: self.warnings[record_type.ordinal()].load(Ordering::Relaxed),
            };
            summary.total_errors += counts.errors;
            summary.total_warnings += counts.warnings;
            if counts.errors > 0 || counts.warnings > 0 {
                summary.by_record_type.insert(record_type, counts);
            }
        }
        summary
    }

    /// Retained findings, ordered by record type then id.
    pub fn findings(&self) -> Vec<Finding> {
        let mut findings = self.retained.lock().clone();
        findings.sort_by(|a, b| {
            (a.record_type, a.id)
                .cmp(&(b.record_type, b.id))
                .then_with(|| a.kind.to_string().cmp(&b.kind.to_string()))
        });
        findings
    }
}

impl ReportSink for InconsistencyReport {
    fn report(&self, finding: Finding) {
        let slot = finding.record_type.ordinal();
        match finding.severity() {
            Severity::Error => self.errors[slot].fetch_add(1, Ordering::Relaxed),
            Severity::Warning => self.warnings[slot].fetch_add(1, Ordering::Relaxed),
        };
        let mut retained = self.retained.lock();
        if retained.len() >= self.max_retained {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        match finding.severity() {
            Severity::Error => error!(
                target: "sombra_check::report",
                record_type = finding.record_type.as_str(),
                id = finding.id,
                "{}",
                finding.kind
            ),
            Severity::Warning => warn!(
                target: "sombra_check::report",
                record_type = finding.record_type.as_str(),
                id = finding.id,
                "{}",
                finding.kind
            ),
        }
        retained.push(finding);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_past_retention_limit() {
        let report = Arc::new(InconsistencyReport::new(2));
        let reporter = Reporter::new(report.clone());
        for id in 0..5 {
            reporter.report(
                RecordType::Node,
                id,
                Inconsistency::LabelNotInUse { label: 1 },
            );
        }
        reporter.report(RecordType::LabelToken, 0, Inconsistency::EmptyName);

        let summary = report.summary();
        assert_eq!(summary.total_errors, 5);
        assert_eq!(summary.total_warnings, 1);
        assert_eq!(summary.dropped_findings, 4);
        assert_eq!(report.findings().len(), 2);
        assert!(!summary.is_consistent());
    }

    #[test]
    fn discarding_reporter_drops() {
        Reporter::discarding().report(RecordType::Node, 1, Inconsistency::EmptyBlock);
    }

    #[test]
    fn finding_serializes_flat() {
        let finding = Finding {
            record_type: RecordType::Relationship,
            id: 4,
            kind: Inconsistency::RelationshipTypeNotInUse { type_id: 2 },
        };
        let json = serde_json::to_value(&finding).expect("json");
        assert_eq!(json["record_type"], "relationship");
        assert_eq!(json["kind"], "relationship_type_not_in_use");
        assert_eq!(json["type_id"], 2);
        assert_eq!(finding.to_string(), "relationship[4]: relationship type 2 not in use");
    }
}
