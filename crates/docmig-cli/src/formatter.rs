//! Output formatters for command results.

use clap::ValueEnum;
use docmig_core::validation::SUMMARY_WARNING_LIMIT;
use docmig_core::{
    BackupInfo, BackupLocation, ExportSummary, ImportSummary, MigrationResult, RestoreSummary,
    SeedSummary, ValidationReport,
};
use serde_json::json;

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines
    Text,
    /// JSON documents
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting command results.
pub trait Formatter {
    /// Format a completed migration.
    fn format_migration(&self, result: &MigrationResult) -> String;

    /// Format a seeding run.
    fn format_seed(&self, summary: &SeedSummary) -> String;

    /// Format a passing validation report.
    fn format_validation(&self, report: &ValidationReport) -> String;

    /// Format an export.
    fn format_export(&self, summary: &ExportSummary) -> String;

    /// Format an import.
    fn format_import(&self, summary: &ImportSummary) -> String;

    /// Format a new backup.
    fn format_backup(&self, location: &BackupLocation) -> String;

    /// Format a restore.
    fn format_restore(&self, id: &str, summary: &RestoreSummary) -> String;

    /// Format a backup listing.
    fn format_backups(&self, backups: &[BackupInfo]) -> String;

    /// Format a prune run.
    fn format_pruned(&self, removed: usize, retention_days: i64) -> String;

    /// Format a simple message.
    fn format_message(&self, message: &str) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Plain text formatter.
pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_migration(&self, result: &MigrationResult) -> String {
        let elapsed = result.end_time - result.start_time;
        format!(
            "Migrated v{} -> v{}: {} records in {} batches ({} skipped, {} unchanged) in {} ms",
            result.from_version,
            result.to_version,
            result.total_records,
            result.batches,
            result.skipped,
            result.unchanged,
            elapsed.num_milliseconds()
        )
    }

    fn format_seed(&self, summary: &SeedSummary) -> String {
        format!(
            "Seeded {} records into {} for {}",
            summary.total_records,
            summary.collections.join(", "),
            summary.environment
        )
    }

    fn format_validation(&self, report: &ValidationReport) -> String {
        let mut lines = vec![format!(
            "Validation passed: {} documents in {} collections",
            report.total_documents,
            report.checked_collections.len()
        )];
        if !report.warnings.is_empty() {
            lines.push(format!("{} warnings:", report.warnings.len()));
            lines.extend(
                report
                    .warnings
                    .iter()
                    .take(SUMMARY_WARNING_LIMIT)
                    .map(|w| format!("  {}", w)),
            );
        }
        lines.join("\n")
    }

    fn format_export(&self, summary: &ExportSummary) -> String {
        format!(
            "Exported {} records from {} to {}",
            summary.count,
            summary.collection,
            summary.path.display()
        )
    }

    fn format_import(&self, summary: &ImportSummary) -> String {
        format!(
            "Imported {} records into {}",
            summary.imported_count, summary.collection
        )
    }

    fn format_backup(&self, location: &BackupLocation) -> String {
        format!(
            "Backup {} ({}) created at {} ({} documents in {} collections)",
            location.id,
            location.kind,
            location.path.display(),
            location.stats.total_documents,
            location.stats.total_collections
        )
    }

    fn format_restore(&self, id: &str, summary: &RestoreSummary) -> String {
        format!(
            "Restored {} documents into {} collections from {}",
            summary.restored, summary.collections, id
        )
    }

    fn format_backups(&self, backups: &[BackupInfo]) -> String {
        if backups.is_empty() {
            return "No backups found".to_string();
        }
        backups
            .iter()
            .map(|b| {
                format!(
                    "{}  {}  {}  {} documents  {} bytes",
                    b.id,
                    b.kind,
                    b.timestamp.to_rfc3339(),
                    b.stats.total_documents,
                    b.size_bytes
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn format_pruned(&self, removed: usize, retention_days: i64) -> String {
        format!(
            "Removed {} backups older than {} days",
            removed, retention_days
        )
    }

    fn format_message(&self, message: &str) -> String {
        message.to_string()
    }
}

/// JSON formatter.
pub struct JsonFormatter;

fn pretty(value: serde_json::Value) -> String {
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
}

impl Formatter for JsonFormatter {
    fn format_migration(&self, result: &MigrationResult) -> String {
        pretty(serde_json::to_value(result).unwrap_or_default())
    }

    fn format_seed(&self, summary: &SeedSummary) -> String {
        pretty(serde_json::to_value(summary).unwrap_or_default())
    }

    fn format_validation(&self, report: &ValidationReport) -> String {
        pretty(serde_json::to_value(report).unwrap_or_default())
    }

    fn format_export(&self, summary: &ExportSummary) -> String {
        pretty(json!({
            "collection": summary.collection,
            "format": summary.format.to_string(),
            "count": summary.count,
            "path": summary.path.display().to_string(),
        }))
    }

    fn format_import(&self, summary: &ImportSummary) -> String {
        pretty(json!({
            "collection": summary.collection,
            "importedCount": summary.imported_count,
            "path": summary.path.display().to_string(),
            "inferredCollection": summary.inferred_collection,
        }))
    }

    fn format_backup(&self, location: &BackupLocation) -> String {
        pretty(json!({
            "id": location.id,
            "type": location.kind,
            "path": location.path.display().to_string(),
            "stats": location.stats,
        }))
    }

    fn format_restore(&self, id: &str, summary: &RestoreSummary) -> String {
        pretty(json!({
            "backupId": id,
            "collections": summary.collections,
            "deleted": summary.deleted,
            "restored": summary.restored,
        }))
    }

    fn format_backups(&self, backups: &[BackupInfo]) -> String {
        let rows: Vec<serde_json::Value> = backups
            .iter()
            .map(|b| {
                json!({
                    "id": b.id,
                    "type": b.kind,
                    "timestamp": b.timestamp,
                    "path": b.path.display().to_string(),
                    "sizeBytes": b.size_bytes,
                    "stats": b.stats,
                })
            })
            .collect();
        pretty(serde_json::Value::Array(rows))
    }

    fn format_pruned(&self, removed: usize, retention_days: i64) -> String {
        json!({
            "removed": removed,
            "retentionDays": retention_days
        })
        .to_string()
    }

    fn format_message(&self, message: &str) -> String {
        json!({ "message": message }).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use docmig_core::{BackupKind, BackupStats};
    use std::path::PathBuf;

    fn result() -> MigrationResult {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        MigrationResult {
            from_version: 2,
            to_version: 3,
            collections: vec!["quizSubmissions".to_string()],
            total_records: 1203,
            skipped: 4,
            unchanged: 0,
            batches: 3,
            start_time: start,
            end_time: start + chrono::Duration::milliseconds(250),
        }
    }

    #[test]
    fn test_text_migration() {
        assert_eq!(
            TextFormatter.format_migration(&result()),
            "Migrated v2 -> v3: 1203 records in 3 batches (4 skipped, 0 unchanged) in 250 ms"
        );
    }

    #[test]
    fn test_json_migration_uses_camel_case() {
        let out: serde_json::Value =
            serde_json::from_str(&JsonFormatter.format_migration(&result())).unwrap();
        assert_eq!(out["totalRecords"], 1203);
        assert_eq!(out["fromVersion"], 2);
    }

    #[test]
    fn test_text_validation_lists_first_warnings() {
        let report = ValidationReport {
            warnings: (0..7).map(|i| format!("warning {}", i)).collect(),
            checked_collections: vec!["users".to_string()],
            total_documents: 3,
            ..ValidationReport::default()
        };
        let out = TextFormatter.format_validation(&report);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Validation passed: 3 documents in 1 collections");
        assert_eq!(lines[1], "7 warnings:");
        assert_eq!(lines.len(), 2 + SUMMARY_WARNING_LIMIT);
    }

    #[test]
    fn test_backup_listing() {
        assert_eq!(TextFormatter.format_backups(&[]), "No backups found");

        let info = BackupInfo {
            id: "pre-migration-v1-to-v2-1".to_string(),
            kind: BackupKind::Full,
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            path: PathBuf::from("/tmp/b.json"),
            size_bytes: 512,
            stats: BackupStats {
                total_collections: 2,
                total_documents: 9,
            },
        };
        let out: serde_json::Value =
            serde_json::from_str(&JsonFormatter.format_backups(&[info])).unwrap();
        assert_eq!(out[0]["id"], "pre-migration-v1-to-v2-1");
        assert_eq!(out[0]["stats"]["totalDocuments"], 9);
        assert_eq!(out[0]["type"], "full");
    }
}
