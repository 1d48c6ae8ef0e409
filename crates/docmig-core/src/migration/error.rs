//! Migration-specific error types.

use thiserror::Error;

use crate::error::{BackupError, StoreError};
use crate::validation::ValidationReport;

/// Failure raised by a step's document transformation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct StepError(pub String);

impl StepError {
    /// Create a step error from any message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Migration-specific errors.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// No step is registered for the requested version pair.
    #[error("No migration strategy found for {0}")]
    UnknownStrategy(String),

    /// A version string is not `N` or `vN`.
    #[error("invalid schema version: {0:?}")]
    InvalidVersion(String),

    /// Reading a collection failed.
    #[error("failed to read {collection}: {source}")]
    Read {
        /// Collection being read.
        collection: String,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },

    /// Committing a batch of updates failed.
    #[error("batch commit failed for {collection}: {source}")]
    BatchCommit {
        /// Collection being written.
        collection: String,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },

    /// A step could not transform a document.
    #[error("step failed on {collection}/{id}: {source}")]
    Step {
        /// Collection of the document.
        collection: String,
        /// Document id.
        id: String,
        /// Step failure.
        #[source]
        source: StepError,
    },

    /// The pre-migration backup could not be taken.
    #[error("pre-migration backup failed: {0}")]
    Backup(#[from] BackupError),

    /// Post-migration validation found errors.
    #[error("Migration validation failed: {}", .0.errors.join(", "))]
    ValidationFailed(Box<ValidationReport>),

    /// The migration failed and restoring the pre-migration backup failed too.
    #[error("rollback failed: {rollback} (after migration error: {original})")]
    RollbackFailed {
        /// Error that triggered the rollback.
        original: Box<MigrationError>,
        /// Error raised while restoring.
        rollback: BackupError,
    },

    /// Another migration is running on this orchestrator.
    #[error("migration already in progress: {0}")]
    InProgress(String),
}

impl MigrationError {
    /// The validation report, when validation caused the failure.
    pub fn validation_report(&self) -> Option<&ValidationReport> {
        match self {
            MigrationError::ValidationFailed(report) => Some(report),
            MigrationError::RollbackFailed { original, .. } => original.validation_report(),
            _ => None,
        }
    }
}
