//! Append-only migration audit trail.
//!
//! Each finished migration attempt, committed or rolled back, is written as
//! one document to the `migrationLogs` collection. Recording is best-effort:
//! a failed write is logged and kept for inspection, and never changes the
//! outcome of the migration it describes.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::migration::MigrationResult;
use crate::serializer::deserialize;
use crate::store::{DocumentStore, WriteOp};
use crate::value::{fields, Fields, Timestamp, Value};

/// Collection receiving audit records.
pub const AUDIT_COLLECTION: &str = "migrationLogs";

/// How a migration attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The migration was validated and kept.
    Committed(MigrationResult),
    /// The migration failed and the pre-migration backup was restored.
    RolledBack {
        /// The failure that triggered the rollback.
        error: String,
    },
}

impl MigrationOutcome {
    /// Stored status string.
    pub fn status(&self) -> &'static str {
        match self {
            MigrationOutcome::Committed(_) => "committed",
            MigrationOutcome::RolledBack { .. } => "rolled_back",
        }
    }
}

/// One audit entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    /// Migration id, also the document id.
    pub id: String,
    /// Source version.
    pub from_version: u32,
    /// Target version.
    pub to_version: u32,
    /// How it ended.
    pub outcome: MigrationOutcome,
    /// When the record was made.
    pub timestamp: Timestamp,
}

impl MigrationRecord {
    /// Document body for the record.
    pub fn to_fields(&self) -> Fields {
        let mut body = fields([
            ("migrationId", Value::from(self.id.as_str())),
            ("fromVersion", Value::from(i64::from(self.from_version))),
            ("toVersion", Value::from(i64::from(self.to_version))),
            ("status", Value::from(self.outcome.status())),
            ("timestamp", Value::from(self.timestamp)),
        ]);
        match &self.outcome {
            MigrationOutcome::Committed(result) => {
                let encoded = serde_json::to_value(result)
                    .map_err(|e| e.to_string())
                    .and_then(|json| deserialize(&json).map_err(|e| e.to_string()));
                let result = match encoded {
                    Ok(value) => value,
                    Err(e) => {
                        warn!(migration_id = %self.id, error = %e, "Failed to encode migration result");
                        Value::Null
                    }
                };
                body.insert("result".to_string(), result);
            }
            MigrationOutcome::RolledBack { error } => {
                body.insert("error".to_string(), Value::from(error.as_str()));
            }
        }
        body
    }
}

/// Writes migration records to the store.
pub struct AuditLog<S: DocumentStore> {
    store: Arc<S>,
    failures: Mutex<Vec<String>>,
}

impl<S: DocumentStore> AuditLog<S> {
    /// Create an audit log over `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            failures: Mutex::new(Vec::new()),
        }
    }

    /// Append a record. Returns whether it was written.
    pub fn record(&self, record: &MigrationRecord) -> bool {
        let op = WriteOp::set(record.id.clone(), record.to_fields());
        match self.store.commit(AUDIT_COLLECTION, vec![op]) {
            Ok(()) => true,
            Err(e) => {
                warn!(migration_id = %record.id, error = %e, "Failed to write audit record");
                self.failures
                    .lock()
                    .push(format!("{}: {}", record.id, e));
                false
            }
        }
    }

    /// Failed writes since the last call, oldest first.
    pub fn take_failures(&self) -> Vec<String> {
        std::mem::take(&mut *self.failures.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::MemoryStore;
    use crate::value::Document;
    use chrono::Utc;

    fn result() -> MigrationResult {
        MigrationResult {
            from_version: 1,
            to_version: 2,
            collections: vec!["userProgress".to_string()],
            total_records: 4,
            skipped: 0,
            unchanged: 1,
            batches: 1,
            start_time: Utc::now(),
            end_time: Utc::now(),
        }
    }

    #[test]
    fn test_committed_record() {
        let store = Arc::new(MemoryStore::new());
        let log = AuditLog::new(Arc::clone(&store));
        let record = MigrationRecord {
            id: "migration-v1-to-v2-1".to_string(),
            from_version: 1,
            to_version: 2,
            outcome: MigrationOutcome::Committed(result()),
            timestamp: Timestamp::now(),
        };
        assert!(log.record(&record));

        let doc = store.get(AUDIT_COLLECTION, "migration-v1-to-v2-1").unwrap().unwrap();
        assert_eq!(doc.get("status"), Some(&Value::from("committed")));
        let stored = doc.get("result").and_then(Value::as_object).unwrap();
        assert_eq!(stored.get("totalRecords"), Some(&Value::from(4)));
    }

    struct ReadOnly;

    impl DocumentStore for ReadOnly {
        fn list(&self, _collection: &str) -> Result<Vec<Document>, StoreError> {
            Ok(Vec::new())
        }

        fn get(&self, _collection: &str, _id: &str) -> Result<Option<Document>, StoreError> {
            Ok(None)
        }

        fn commit(&self, _collection: &str, _ops: Vec<WriteOp>) -> Result<(), StoreError> {
            Err(StoreError::Backend("read-only".to_string()))
        }
    }

    #[test]
    fn test_failures_are_kept_not_raised() {
        let log = AuditLog::new(Arc::new(ReadOnly));
        let record = MigrationRecord {
            id: "m".to_string(),
            from_version: 2,
            to_version: 3,
            outcome: MigrationOutcome::RolledBack {
                error: "boom".to_string(),
            },
            timestamp: Timestamp::now(),
        };
        assert!(!log.record(&record));
        assert_eq!(log.take_failures(), vec!["m: storage backend error: read-only"]);
        assert!(log.take_failures().is_empty());
    }
}
