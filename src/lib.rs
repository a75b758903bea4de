//! Parallel, multi-pass consistency checker for record-oriented graph storage.
//!
//! A check reads node, relationship, relationship group, property, dynamic, token and
//! schema stores together with the value indexes and the two token indexes, and reports
//! every structural inconsistency it finds as a [`report::Finding`]. Checking never
//! stops at the first problem; only unreadable stores abort a run.
//!
//! ```no_run
//! use sombra_check::{CheckConfig, FullCheck, GraphFixture};
//!
//! let mut graph = GraphFixture::new();
//! let person = graph.label("Person");
//! graph.create_node(&[person], &[]);
//! let result = FullCheck::new(CheckConfig::default()).execute(graph.access())?;
//! assert!(result.is_consistent());
//! # Ok::<(), sombra_check::CheckError>(())
//! ```

#![warn(missing_docs)]

/// Check engine and its passes.
pub mod checker;
/// Run configuration.
pub mod config;
/// Error types.
pub mod error;
/// Value and token index access.
pub mod index;
/// Logging setup.
pub mod logging;
/// Findings and summaries.
pub mod report;
/// Schema rules.
pub mod schema;
/// Record stores.
pub mod store;
/// Consistent graph builder for tests.
pub mod testkit;
/// Token name lookup.
pub mod token;

pub use checker::{ConsistencyCheckResult, FullCheck, StoreAccess};
pub use config::{CheckConfig, ConfigError, ConsistencyFlags};
pub use error::{CheckError, Result, StoreError};
pub use report::{
    ConsistencySummaryStatistics, Finding, Inconsistency, InconsistencyReport, RecordType,
    Severity,
};
pub use testkit::GraphFixture;
