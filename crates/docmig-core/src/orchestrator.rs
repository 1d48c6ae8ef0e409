//! Backup, migrate, validate, then commit or roll back.
//!
//! [`MigrationOrchestrator::migrate`] runs one version transition as a saga:
//!
//! ```text
//! Idle -> BackingUp -> Migrating -> Validating -> Committing  -> Idle
//!                          |             |
//!                          +-------------+------> RollingBack -> Idle
//! ```
//!
//! Any failure after the pre-migration backup exists restores that backup
//! before the error is returned.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{error, info, instrument, warn};

use crate::audit::{AuditLog, MigrationOutcome, MigrationRecord};
use crate::backup::BackupManager;
use crate::config::EngineConfig;
use crate::migration::{
    MigrationError, MigrationRegistry, MigrationResult, MigrationRunner, VersionPair,
};
use crate::schema::SchemaSet;
use crate::store::DocumentStore;
use crate::validation::{IntegrityValidator, RuleSet};
use crate::value::Timestamp;

/// Phase of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// No migration running.
    Idle,
    /// Taking the pre-migration backup.
    BackingUp,
    /// Applying the step.
    Migrating,
    /// Validating the migrated store.
    Validating,
    /// Recording a successful migration.
    Committing,
    /// Restoring the pre-migration backup.
    RollingBack,
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrchestratorState::Idle => "idle",
            OrchestratorState::BackingUp => "backing_up",
            OrchestratorState::Migrating => "migrating",
            OrchestratorState::Validating => "validating",
            OrchestratorState::Committing => "committing",
            OrchestratorState::RollingBack => "rolling_back",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct Progress {
    state: OrchestratorState,
    migration_id: Option<String>,
    last_started_ms: i64,
}

/// Runs migrations with backup, validation and rollback.
pub struct MigrationOrchestrator<S: DocumentStore> {
    store: Arc<S>,
    backups: BackupManager<S>,
    runner: MigrationRunner<S>,
    validator: IntegrityValidator,
    audit: AuditLog<S>,
    progress: Mutex<Progress>,
}

impl<S: DocumentStore> MigrationOrchestrator<S> {
    /// Create an orchestrator over `store`.
    pub fn new(
        store: Arc<S>,
        schemas: SchemaSet,
        registry: MigrationRegistry,
        config: EngineConfig,
    ) -> Self {
        Self {
            backups: BackupManager::new(Arc::clone(&store), schemas.clone(), config.clone()),
            runner: MigrationRunner::new(Arc::clone(&store), registry, config),
            validator: IntegrityValidator::new(schemas),
            audit: AuditLog::new(Arc::clone(&store)),
            store,
            progress: Mutex::new(Progress {
                state: OrchestratorState::Idle,
                migration_id: None,
                last_started_ms: 0,
            }),
        }
    }

    /// Override the collections the business rules read.
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.validator = self.validator.with_rules(rules);
        self
    }

    /// Current phase.
    pub fn state(&self) -> OrchestratorState {
        self.progress.lock().state
    }

    /// The backup manager used for pre-migration snapshots.
    pub fn backups(&self) -> &BackupManager<S> {
        &self.backups
    }

    /// The post-migration validator.
    pub fn validator(&self) -> &IntegrityValidator {
        &self.validator
    }

    /// The audit trail.
    pub fn audit(&self) -> &AuditLog<S> {
        &self.audit
    }

    /// Run the step registered for `pair`.
    ///
    /// Unknown pairs fail before a backup is taken. A failed backup aborts
    /// without rollback since nothing has been written yet. Once the backup
    /// exists, a failing step or a failing validation restores it and the
    /// original error is returned; if the restore fails too the result is
    /// [`MigrationError::RollbackFailed`].
    #[instrument(skip(self), fields(migration = %pair))]
    pub fn migrate(&self, pair: VersionPair) -> Result<MigrationResult, MigrationError> {
        let (_guard, migration_id) = self.begin(pair)?;
        let step = self.runner.registry().resolve(pair)?;
        info!(migration_id = %migration_id, "Starting migration");

        self.set_state(OrchestratorState::BackingUp);
        let backup_id = format!("pre-{}", migration_id);
        self.backups.create(&backup_id)?;

        self.set_state(OrchestratorState::Migrating);
        let outcome = self.runner.apply(pair, step.as_ref()).and_then(|result| {
            self.set_state(OrchestratorState::Validating);
            let report = self.validator.validate(self.store.as_ref());
            if report.is_valid() {
                Ok(result)
            } else {
                Err(MigrationError::ValidationFailed(Box::new(report)))
            }
        });

        match outcome {
            Ok(result) => {
                self.set_state(OrchestratorState::Committing);
                self.audit.record(&MigrationRecord {
                    id: migration_id.clone(),
                    from_version: pair.from,
                    to_version: pair.to,
                    outcome: MigrationOutcome::Committed(result.clone()),
                    timestamp: Timestamp::now(),
                });
                info!(
                    migration_id = %migration_id,
                    records = result.total_records,
                    collections = result.collections.len(),
                    "Migration completed"
                );
                Ok(result)
            }
            Err(original) => Err(self.roll_back(pair, &migration_id, &backup_id, original)),
        }
    }

    fn roll_back(
        &self,
        pair: VersionPair,
        migration_id: &str,
        backup_id: &str,
        original: MigrationError,
    ) -> MigrationError {
        self.set_state(OrchestratorState::RollingBack);
        error!(migration_id = %migration_id, error = %original, "Migration failed, rolling back");

        match self.backups.restore(backup_id) {
            Ok(_) => {
                self.audit.record(&MigrationRecord {
                    id: migration_id.to_string(),
                    from_version: pair.from,
                    to_version: pair.to,
                    outcome: MigrationOutcome::RolledBack {
                        error: original.to_string(),
                    },
                    timestamp: Timestamp::now(),
                });
                warn!(migration_id = %migration_id, backup_id = %backup_id, "Rollback completed");
                original
            }
            Err(rollback) => {
                error!(
                    migration_id = %migration_id,
                    backup_id = %backup_id,
                    error = %original,
                    rollback_error = %rollback,
                    "Rollback failed, store left in partially migrated state"
                );
                MigrationError::RollbackFailed {
                    original: Box::new(original),
                    rollback,
                }
            }
        }
    }

    /// Claim the orchestrator and allocate a migration id,
    /// `migration-v{from}-to-v{to}-{epoch_ms}`.
    ///
    /// The millisecond part is strictly increasing per orchestrator so that
    /// back-to-back migrations never share a backup id.
    fn begin(&self, pair: VersionPair) -> Result<(StateGuard<'_>, String), MigrationError> {
        let mut progress = self.progress.lock();
        if progress.state != OrchestratorState::Idle {
            let running = progress.migration_id.clone().unwrap_or_default();
            return Err(MigrationError::InProgress(running));
        }
        let millis = Utc::now()
            .timestamp_millis()
            .max(progress.last_started_ms + 1);
        let migration_id = format!("migration-v{}-to-v{}-{}", pair.from, pair.to, millis);

        progress.state = OrchestratorState::BackingUp;
        progress.migration_id = Some(migration_id.clone());
        progress.last_started_ms = millis;
        let guard = StateGuard {
            progress: &self.progress,
        };
        Ok((guard, migration_id))
    }

    fn set_state(&self, state: OrchestratorState) {
        self.progress.lock().state = state;
    }
}

/// Returns the orchestrator to `Idle` when a migration ends, however it ends.
struct StateGuard<'a> {
    progress: &'a Mutex<Progress>,
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        let mut progress = self.progress.lock();
        progress.state = OrchestratorState::Idle;
        progress.migration_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AUDIT_COLLECTION;
    use crate::error::StoreError;
    use crate::migration::DeriveFieldsStep;
    use crate::store::{MemoryStore, WriteOp};
    use crate::value::{fields, Document, Fields, Value};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Memory store whose commits to one collection start failing after a
    /// number of successful commits, for a limited number of failures.
    struct Flaky {
        inner: MemoryStore,
        collection: &'static str,
        ok_commits: AtomicUsize,
        failures: AtomicUsize,
    }

    impl Flaky {
        fn new(collection: &'static str, ok_commits: usize, failures: usize) -> Self {
            Self {
                inner: MemoryStore::new(),
                collection,
                ok_commits: AtomicUsize::new(ok_commits),
                failures: AtomicUsize::new(failures),
            }
        }
    }

    impl DocumentStore for Flaky {
        fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
            self.inner.list(collection)
        }

        fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
            self.inner.get(collection, id)
        }

        fn commit(&self, collection: &str, ops: Vec<WriteOp>) -> Result<(), StoreError> {
            if collection == self.collection {
                let remaining_ok = self.ok_commits.load(Ordering::SeqCst);
                if remaining_ok > 0 {
                    self.ok_commits.store(remaining_ok - 1, Ordering::SeqCst);
                } else if self.failures.load(Ordering::SeqCst) > 0 {
                    self.failures.fetch_sub(1, Ordering::SeqCst);
                    return Err(StoreError::Backend("quota exceeded".to_string()));
                }
            }
            self.inner.commit(collection, ops)
        }

        fn max_batch_size(&self) -> usize {
            self.inner.max_batch_size()
        }
    }

    fn progress(user: &str) -> Fields {
        fields([
            ("userId", Value::from(user)),
            ("modules", Value::Object(Fields::new())),
            ("updatedAt", Value::from("2025-01-01T00:00:00Z")),
        ])
    }

    fn user(name: &str) -> Fields {
        fields([
            ("email", Value::from(format!("{}@example.com", name))),
            ("name", Value::from(name)),
            ("role", Value::from("student")),
            ("createdAt", Value::from(Timestamp::parse("2025-01-01T00:00:00Z").unwrap())),
        ])
    }

    fn populate(store: &MemoryStore) {
        for i in 0..5 {
            let id = format!("u{}", i);
            store.insert("users", &id, user(&id));
            store.insert("userProgress", &id, progress(&id));
        }
    }

    type Snapshot = BTreeMap<String, BTreeMap<String, Fields>>;

    fn governed(snapshot: Snapshot) -> Snapshot {
        snapshot
            .into_iter()
            .filter(|(name, _)| name != AUDIT_COLLECTION)
            .collect()
    }

    fn orchestrator<S: DocumentStore>(
        store: &Arc<S>,
        dir: &TempDir,
        registry: MigrationRegistry,
    ) -> MigrationOrchestrator<S> {
        let config = EngineConfig::default()
            .with_backup_path(dir.path())
            .with_batch_size(2)
            .unwrap()
            .without_batch_delay();
        MigrationOrchestrator::new(Arc::clone(store), SchemaSet::educational(), registry, config)
    }

    #[test]
    fn test_successful_migration_is_audited() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        populate(&store);
        let orchestrator = orchestrator(&store, &dir, MigrationRegistry::builtin());

        let result = orchestrator.migrate(VersionPair::new(1, 2)).unwrap();
        assert_eq!(result.total_records, 5);
        assert_eq!(result.batches, 3);
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);

        let logs = store.list(AUDIT_COLLECTION).unwrap();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].id.starts_with("migration-v1-to-v2-"));
        assert_eq!(logs[0].get("status"), Some(&Value::from("committed")));

        let backups = orchestrator.backups().list().unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].id, format!("pre-{}", logs[0].id));
    }

    #[test]
    fn test_unknown_strategy_takes_no_backup() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let orchestrator = orchestrator(&store, &dir, MigrationRegistry::builtin());

        let err = orchestrator.migrate(VersionPair::new(5, 6)).unwrap_err();
        assert!(matches!(err, MigrationError::UnknownStrategy(_)));
        assert!(orchestrator.backups().list().unwrap().is_empty());
        assert!(store.is_empty(AUDIT_COLLECTION));
    }

    #[test]
    fn test_mid_migration_failure_restores_exact_state() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Flaky::new("userProgress", 1, 1));
        populate(&store.inner);
        let before = store.inner.snapshot();
        let orchestrator = orchestrator(&store, &dir, MigrationRegistry::builtin());

        let err = orchestrator.migrate(VersionPair::new(1, 2)).unwrap_err();
        assert!(matches!(err, MigrationError::BatchCommit { .. }));
        assert_eq!(governed(store.inner.snapshot()), before);
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);

        let logs = store.list(AUDIT_COLLECTION).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].get("status"), Some(&Value::from("rolled_back")));
    }

    #[test]
    fn test_validation_failure_rolls_back() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        populate(&store);
        let before = store.snapshot();
        let registry = MigrationRegistry::new().with_step(
            VersionPair::new(3, 4),
            DeriveFieldsStep::new("users", "Dropping emails", |_| {
                Ok(fields([("email", Value::Null)]))
            }),
        );
        let orchestrator = orchestrator(&store, &dir, registry);

        let err = orchestrator.migrate(VersionPair::new(3, 4)).unwrap_err();
        let report = err.validation_report().unwrap();
        assert_eq!(report.errors.len(), 5);
        assert!(report.errors[0].ends_with("Missing required field 'email'"));
        assert_eq!(governed(store.snapshot()), before);
    }

    #[test]
    fn test_failed_restore_is_a_double_fault() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Flaky::new("userProgress", 0, usize::MAX));
        populate(&store.inner);
        let orchestrator = orchestrator(&store, &dir, MigrationRegistry::builtin());

        let err = orchestrator.migrate(VersionPair::new(1, 2)).unwrap_err();
        match err {
            MigrationError::RollbackFailed { original, .. } => {
                assert!(matches!(*original, MigrationError::BatchCommit { .. }));
            }
            other => panic!("expected RollbackFailed, got {other}"),
        }
        assert!(store.inner.is_empty(AUDIT_COLLECTION));
    }

    #[test]
    fn test_concurrent_migrate_is_refused() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let orchestrator = orchestrator(&store, &dir, MigrationRegistry::builtin());

        let (guard, running) = orchestrator.begin(VersionPair::new(1, 2)).unwrap();
        let err = orchestrator.migrate(VersionPair::new(2, 3)).unwrap_err();
        assert!(matches!(err, MigrationError::InProgress(ref id) if *id == running));
        drop(guard);
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    }
}
