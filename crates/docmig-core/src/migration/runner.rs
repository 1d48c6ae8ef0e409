//! Migration runner: applies one step to the store in throttled batches.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::error::MigrationError;
use super::registry::{MigrationRegistry, VersionPair};
use super::step::MigrationStep;
use crate::config::EngineConfig;
use crate::error::StoreError;
use crate::store::{DocumentStore, WriteBatcher, WriteOp};
use crate::value::{Timestamp, Value};

/// Field recording the version a document was migrated to.
pub const MARKER_FIELD: &str = "migrationVersion";

/// Field recording when a document was migrated.
pub const MIGRATED_AT_FIELD: &str = "migratedAt";

/// Counters for one applied step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationResult {
    /// Source version.
    pub from_version: u32,
    /// Target version.
    pub to_version: u32,
    /// Collections the step processed.
    pub collections: Vec<String>,
    /// Documents updated.
    pub total_records: usize,
    /// Documents already carrying the target marker.
    pub skipped: usize,
    /// Documents the step left untouched.
    pub unchanged: usize,
    /// Batches committed.
    pub batches: usize,
    /// When the step started.
    pub start_time: DateTime<Utc>,
    /// When the step finished.
    pub end_time: DateTime<Utc>,
}

/// Applies registered migration steps.
pub struct MigrationRunner<S: DocumentStore> {
    store: Arc<S>,
    registry: MigrationRegistry,
    config: EngineConfig,
}

impl<S: DocumentStore> MigrationRunner<S> {
    /// Create a runner.
    pub fn new(store: Arc<S>, registry: MigrationRegistry, config: EngineConfig) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// The registered steps.
    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    /// Resolve and apply the step registered for `pair`.
    ///
    /// An unknown pair fails before anything is read or written.
    pub fn run(&self, pair: VersionPair) -> Result<MigrationResult, MigrationError> {
        let step = self.registry.resolve(pair)?;
        self.apply(pair, step.as_ref())
    }

    /// Apply `step` as the transition `pair`.
    ///
    /// Documents whose marker already equals `v{to}` are skipped, so running
    /// the same step twice leaves the store unchanged the second time.
    pub fn apply(
        &self,
        pair: VersionPair,
        step: &dyn MigrationStep,
    ) -> Result<MigrationResult, MigrationError> {
        let marker = pair.marker();
        let mut result = MigrationResult {
            from_version: pair.from,
            to_version: pair.to,
            collections: Vec::new(),
            total_records: 0,
            skipped: 0,
            unchanged: 0,
            batches: 0,
            start_time: Utc::now(),
            end_time: Utc::now(),
        };
        info!(migration = %pair, "{}", step.description());

        for collection in step.collections() {
            let docs = self
                .store
                .list(collection)
                .map_err(|source| MigrationError::Read {
                    collection: collection.clone(),
                    source,
                })?;
            let commit_err = |source: StoreError| MigrationError::BatchCommit {
                collection: collection.clone(),
                source,
            };

            let mut batcher = WriteBatcher::new(
                self.store.as_ref(),
                collection,
                self.config.batch_size,
                self.config.batch_delay,
            );
            for doc in &docs {
                if doc.get(MARKER_FIELD).and_then(Value::as_str) == Some(marker.as_str()) {
                    result.skipped += 1;
                    continue;
                }
                let update = step
                    .transform(collection, doc)
                    .map_err(|source| MigrationError::Step {
                        collection: collection.clone(),
                        id: doc.id.clone(),
                        source,
                    })?;
                let Some(mut update) = update else {
                    result.unchanged += 1;
                    continue;
                };
                update.insert(MARKER_FIELD.to_string(), Value::from(marker.as_str()));
                update.insert(MIGRATED_AT_FIELD.to_string(), Value::from(Timestamp::now()));
                batcher.push(WriteOp::update(doc.id.clone(), update)).map_err(commit_err)?;
            }
            let stats = batcher.finish().map_err(commit_err)?;

            info!(
                collection = %collection,
                migrated = stats.ops,
                batches = stats.batches,
                "Migrated collection"
            );
            result.total_records += stats.ops;
            result.batches += stats.batches;
            result.collections.push(collection.clone());
        }

        result.end_time = Utc::now();
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::{DeriveFieldsStep, StepError};
    use crate::store::MemoryStore;
    use crate::value::fields;
    use pretty_assertions::assert_eq;

    fn runner(store: &Arc<MemoryStore>) -> MigrationRunner<MemoryStore> {
        MigrationRunner::new(
            Arc::clone(store),
            MigrationRegistry::builtin(),
            EngineConfig::default().without_batch_delay(),
        )
    }

    #[test]
    fn test_v1_to_v2_adds_achievements() {
        let store = Arc::new(MemoryStore::new());
        store.insert("userProgress", "p1", fields([("userId", "u1")]));
        store.insert(
            "userProgress",
            "p2",
            fields([("userId", Value::from("u2")), ("achievements", Value::List(vec![]))]),
        );

        let result = runner(&store).run(VersionPair::new(1, 2)).unwrap();
        assert_eq!(result.total_records, 1);
        assert_eq!(result.unchanged, 1);
        assert_eq!(result.collections, vec!["userProgress".to_string()]);

        let p1 = store.get("userProgress", "p1").unwrap().unwrap();
        assert_eq!(p1.get("achievements"), Some(&Value::List(vec![])));
        assert_eq!(p1.get(MARKER_FIELD), Some(&Value::from("v2")));
        assert!(matches!(p1.get(MIGRATED_AT_FIELD), Some(Value::Timestamp(_))));
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..3 {
            store.insert("quizSubmissions", &format!("q{}", i), fields([("percentage", 75)]));
        }
        let runner = runner(&store);

        let first = runner.run(VersionPair::new(2, 3)).unwrap();
        assert_eq!(first.total_records, 3);
        let snapshot = store.list("quizSubmissions").unwrap();

        let second = runner.run(VersionPair::new(2, 3)).unwrap();
        assert_eq!(second.total_records, 0);
        assert_eq!(second.skipped, 3);
        assert_eq!(store.list("quizSubmissions").unwrap(), snapshot);
    }

    #[test]
    fn test_unknown_pair_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        store.insert("userProgress", "p1", fields([("userId", "u1")]));

        let err = runner(&store).run(VersionPair::new(7, 8)).unwrap_err();
        assert!(matches!(err, MigrationError::UnknownStrategy(ref key) if key == "v7_to_v8"));
        assert_eq!(store.get("userProgress", "p1").unwrap().unwrap().fields.len(), 1);
    }

    #[test]
    fn test_batches_respect_size() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..1203 {
            store.insert("userProgress", &format!("p{:04}", i), fields([("userId", "u")]));
        }
        let result = runner(&store).run(VersionPair::new(1, 2)).unwrap();
        assert_eq!(result.total_records, 1203);
        assert_eq!(result.batches, 3);
    }

    #[test]
    fn test_step_error_names_document() {
        let store = Arc::new(MemoryStore::new());
        store.insert("teams", "t1", fields([("name", "Hawks")]));
        let step = DeriveFieldsStep::new("teams", "failing", |_| Err(StepError::new("boom")));

        let err = runner(&store)
            .apply(VersionPair::new(1, 2), &step)
            .unwrap_err();
        assert_eq!(err.to_string(), "step failed on teams/t1: boom");
    }
}
