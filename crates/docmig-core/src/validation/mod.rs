//! Document integrity validation.
//!
//! [`IntegrityValidator`] checks every governed collection against its
//! [`Schema`](crate::schema::Schema) and then evaluates the cross-document
//! business rules. Findings are returned as data in a [`ValidationReport`]:
//! schema violations are errors, rule violations are warnings.

mod rules;
mod schema;

pub use rules::{check_overall_progress, check_quiz_percentage, RuleSet};
pub use schema::validate_document;

use serde::Serialize;

use crate::schema::SchemaSet;
use crate::store::DocumentStore;

/// Documents between progress log lines.
const PROGRESS_INTERVAL: usize = 100;

/// Errors printed in the summary before eliding the rest.
pub const SUMMARY_ERROR_LIMIT: usize = 10;

/// Warnings printed in the summary.
pub const SUMMARY_WARNING_LIMIT: usize = 5;

/// Outcome of one validation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Schema violations and process failures.
    pub errors: Vec<String>,
    /// Business rule violations.
    pub warnings: Vec<String>,
    /// Collections whose documents were checked.
    pub checked_collections: Vec<String>,
    /// Documents checked against a schema.
    pub total_documents: usize,
}

impl ValidationReport {
    /// True when no errors were found. Warnings never affect validity.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// The first `limit` errors followed by an elision line when more exist.
    pub fn error_summary(&self, limit: usize) -> Vec<String> {
        let mut lines: Vec<String> = self.errors.iter().take(limit).cloned().collect();
        if self.errors.len() > limit {
            lines.push(format!("... and {} more errors", self.errors.len() - limit));
        }
        lines
    }
}

/// Validates a store against a schema set and business rules.
#[derive(Debug, Clone)]
pub struct IntegrityValidator {
    schemas: SchemaSet,
    rules: RuleSet,
}

impl IntegrityValidator {
    /// Create a validator with the default rule collections.
    pub fn new(schemas: SchemaSet) -> Self {
        Self {
            schemas,
            rules: RuleSet::default(),
        }
    }

    /// Override the collections the business rules read.
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    /// The governed schemas.
    pub fn schemas(&self) -> &SchemaSet {
        &self.schemas
    }

    /// Validate the store.
    ///
    /// Never fails: a store read error ends the run and is recorded as an
    /// error in the report.
    pub fn validate<S: DocumentStore + ?Sized>(&self, store: &S) -> ValidationReport {
        tracing::info!(collections = self.schemas.len(), "Starting data validation");
        let mut report = ValidationReport::default();

        if let Err(e) = self.run(store, &mut report) {
            report
                .errors
                .push(format!("Validation process failed: {}", e));
        }

        log_summary(&report);
        report
    }

    fn run<S: DocumentStore + ?Sized>(
        &self,
        store: &S,
        report: &mut ValidationReport,
    ) -> Result<(), crate::error::StoreError> {
        for (name, schema) in self.schemas.iter() {
            let docs = store.list(name)?;
            tracing::info!(collection = %name, documents = docs.len(), "Validating collection");

            for (checked, doc) in docs.iter().enumerate() {
                let path = format!("{}/{}", name, doc.id);
                report
                    .errors
                    .extend(validate_document(&doc.fields, schema, &path));
                report.total_documents += 1;

                if (checked + 1) % PROGRESS_INTERVAL == 0 {
                    tracing::info!(
                        collection = %name,
                        checked = checked + 1,
                        total = docs.len(),
                        "Validation progress"
                    );
                }
            }
            report.checked_collections.push(name.to_string());
        }

        report.warnings.extend(self.rules.evaluate(store)?);
        Ok(())
    }
}

fn log_summary(report: &ValidationReport) {
    tracing::info!(
        collections = report.checked_collections.len(),
        documents = report.total_documents,
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "Validation complete"
    );

    for line in report.error_summary(SUMMARY_ERROR_LIMIT) {
        tracing::error!("{}", line);
    }
    for warning in report.warnings.iter().take(SUMMARY_WARNING_LIMIT) {
        tracing::warn!("{}", warning);
    }
}
