use std::io;

use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias for consistency check operations.
pub type Result<T> = std::result::Result<T, CheckError>;

/// Failure raised by a record store that the checker cannot continue past.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error from the backing storage.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// A record could not be read even in lenient mode.
    #[error("{store} record {id} unreadable: {detail}")]
    Unreadable {
        /// Name of the store the read was issued against.
        store: &'static str,
        /// Record id.
        id: u64,
        /// Description of the failure.
        detail: String,
    },
}

impl StoreError {
    pub(crate) fn unreadable(store: &'static str, id: u64, detail: impl Into<String>) -> Self {
        StoreError::Unreadable {
            store,
            id,
            detail: detail.into(),
        }
    }
}

/// Error type for a consistency check that could not complete.
///
/// Inconsistencies are never returned through this type; they are reported as findings.
/// Any `CheckError` means the check is incomplete.
#[derive(Debug, Error)]
pub enum CheckError {
    /// Fatal store read failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A parallel stage failed; the first failure is the source, later ones are attached.
    #[error("stage `{stage}` failed: {source} ({} suppressed)", suppressed.len())]
    Stage {
        /// Name of the failed stage.
        stage: String,
        /// First failure observed.
        source: Box<CheckError>,
        /// Failures from other workers of the same stage.
        suppressed: Vec<CheckError>,
    },
    /// A worker panicked while running a stage.
    #[error("worker panicked in stage `{stage}`: {message}")]
    WorkerPanic {
        /// Name of the stage.
        stage: String,
        /// Panic payload, when it was a string.
        message: String,
    },
    /// The worker pool could not be built.
    #[error("thread pool: {0}")]
    ThreadPool(String),
}

impl CheckError {
    pub(crate) fn stage(stage: &str, mut failures: Vec<CheckError>) -> Option<Self> {
        if failures.is_empty() {
            return None;
        }
        let first = failures.remove(0);
        Some(CheckError::Stage {
            stage: stage.to_owned(),
            source: Box::new(first),
            suppressed: failures,
        })
    }

    /// Returns the errors suppressed behind the primary failure, if any.
    pub fn suppressed(&self) -> &[CheckError] {
        match self {
            CheckError::Stage { suppressed, .. } => suppressed,
            _ => &[],
        }
    }

    /// Walks through stage wrappers to the first underlying failure.
    pub fn root_cause(&self) -> &CheckError {
        match self {
            CheckError::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
