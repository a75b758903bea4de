use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::RecordType;

/// Error and warning counts for one record type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RecordTypeCounts {
    /// Inconsistencies.
    pub errors: u64,
    /// Warnings.
    pub warnings: u64,
}

/// Totals of a completed check.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencySummaryStatistics {
    /// Inconsistencies across all record types.
    pub total_errors: u64,
    /// Warnings across all record types.
    pub total_warnings: u64,
    /// Non-zero counts per record type.
    pub by_record_type: BTreeMap<RecordType, RecordTypeCounts>,
    /// Findings not retained because the retention limit was reached.
    pub dropped_findings: u64,
}

impl ConsistencySummaryStatistics {
    /// True when no inconsistency was found; warnings do not count.
    pub fn is_consistent(&self) -> bool {
        self.total_errors == 0
    }

    /// Inconsistencies reported against `record_type`.
    pub fn inconsistency_count_for(&self, record_type: RecordType) -> u64 {
        self.by_record_type
            .get(&record_type)
            .map_or(0, |counts| counts.errors)
    }

    /// Warnings reported against `record_type`.
    pub fn warning_count_for(&self, record_type: RecordType) -> u64 {
        self.by_record_type
            .get(&record_type)
            .map_or(0, |counts| counts.warnings)
    }
}

impl fmt::Display for ConsistencySummaryStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "consistency check: {} errors, {} warnings",
            self.total_errors, self.total_warnings
        )?;
        for (record_type, counts) in &self.by_record_type {
            write!(
                f,
                "; {record_type}: {}e/{}w",
                counts.errors, counts.warnings
            )?;
        }
        Ok(())
    }
}
