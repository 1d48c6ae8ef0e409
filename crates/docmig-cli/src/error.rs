//! Command-line error types.

use docmig_core::validation::SUMMARY_ERROR_LIMIT;
use docmig_core::{
    BackupError, ConfigError, MigrationError, SeedError, StoreError, TransferError,
    ValidationReport,
};
use thiserror::Error;

/// Top-level error for a `docmig` invocation.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration or schema file error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Storage error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Migration error.
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// Backup error.
    #[error(transparent)]
    Backup(#[from] BackupError),

    /// Import or export error.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Seeding error.
    #[error(transparent)]
    Seed(#[from] SeedError),

    /// A standalone validation run found errors.
    #[error("Data validation failed with {} errors", .0.errors.len())]
    ValidationFailed(Box<ValidationReport>),
}

impl CliError {
    /// Extra lines printed under the error message.
    ///
    /// Validation failures list their first errors followed by a count of
    /// the rest.
    pub fn details(&self) -> Vec<String> {
        match self {
            CliError::ValidationFailed(report) => report.error_summary(SUMMARY_ERROR_LIMIT),
            CliError::Migration(e) => e
                .validation_report()
                .map(|report| report.error_summary(SUMMARY_ERROR_LIMIT))
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(errors: usize) -> ValidationReport {
        ValidationReport {
            errors: (0..errors).map(|i| format!("error {}", i)).collect(),
            ..ValidationReport::default()
        }
    }

    #[test]
    fn test_validation_details_are_truncated() {
        let err = CliError::ValidationFailed(Box::new(report(13)));
        assert_eq!(err.to_string(), "Data validation failed with 13 errors");

        let details = err.details();
        assert_eq!(details.len(), 11);
        assert_eq!(details[0], "error 0");
        assert_eq!(details[10], "... and 3 more errors");
    }

    #[test]
    fn test_migration_validation_details() {
        let err = CliError::from(MigrationError::ValidationFailed(Box::new(report(2))));
        assert_eq!(err.details(), vec!["error 0", "error 1"]);
    }

    #[test]
    fn test_plain_errors_have_no_details() {
        let err = CliError::from(SeedError::ProductionRefused);
        assert_eq!(err.to_string(), "cannot seed data in production environment");
        assert!(err.details().is_empty());
    }
}
