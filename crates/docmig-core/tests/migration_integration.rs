//! Integration tests for seeding, migration, rollback and transfer over a
//! sled-backed store.

use std::sync::Arc;

use docmig_core::migration::{MARKER_FIELD, MIGRATED_AT_FIELD};
use docmig_core::{
    DeriveFieldsStep, DocumentStore, EngineConfig, Environment, ExportFormat, Fields,
    ImportExportManager, IntegrityValidator, MigrationError, MigrationOrchestrator,
    MigrationRegistry, SchemaSet, Seeder, SledStore, StepError, Timestamp, Value, VersionPair,
    WriteOp, AUDIT_COLLECTION,
};
use pretty_assertions::assert_eq;

struct TestContext {
    store: Arc<SledStore>,
    config: EngineConfig,
    _dir: tempfile::TempDir,
}

impl TestContext {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::default()
            .with_data_path(dir.path().join("data"))
            .with_backup_path(dir.path().join("backups"))
            .with_export_path(dir.path().join("exports"))
            .with_batch_size(2)
            .unwrap()
            .without_batch_delay();
        let store = Arc::new(SledStore::open_configured(&config).unwrap());

        Self {
            store,
            config,
            _dir: dir,
        }
    }

    fn orchestrator(&self, registry: MigrationRegistry) -> MigrationOrchestrator<SledStore> {
        MigrationOrchestrator::new(
            Arc::clone(&self.store),
            SchemaSet::educational(),
            registry,
            self.config.clone(),
        )
    }

    fn put(&self, collection: &str, id: &str, fields: Fields) {
        self.store
            .commit(collection, vec![WriteOp::set(id, fields)])
            .unwrap();
    }

    fn snapshot(&self, collections: &[&str]) -> Vec<(String, Vec<docmig_core::Document>)> {
        collections
            .iter()
            .map(|c| (c.to_string(), self.store.list(c).unwrap()))
            .collect()
    }
}

fn quiz(score: i64, total: i64, percentage: i64) -> Fields {
    docmig_core::value::fields([
        ("userId", Value::from("u1")),
        ("moduleId", Value::from("m1")),
        ("quizType", Value::from("module")),
        ("score", Value::from(score)),
        ("totalQuestions", Value::from(total)),
        ("percentage", Value::from(percentage)),
        ("submittedAt", Value::from("2025-02-01T10:00:00Z")),
    ])
}

#[test]
fn test_seed_migrate_validate() {
    let ctx = TestContext::new();
    let summary = Seeder::new(Arc::clone(&ctx.store))
        .seed(Environment::Development)
        .unwrap();
    assert_eq!(summary.total_records, 9);

    // Seeded progress already carries achievements, so v1 -> v2 changes nothing.
    let orchestrator = ctx.orchestrator(MigrationRegistry::builtin());
    let result = orchestrator.migrate(VersionPair::new(1, 2)).unwrap();
    assert_eq!(result.total_records, 0);
    assert_eq!(result.unchanged, 2);

    let report = IntegrityValidator::new(SchemaSet::educational()).validate(ctx.store.as_ref());
    assert!(report.is_valid(), "{:?}", report.errors);
    assert_eq!(report.total_documents, 6);
}

#[test]
fn test_v2_to_v3_derives_analytics_once() {
    let ctx = TestContext::new();
    ctx.put("quizSubmissions", "q1", quiz(9, 10, 90));
    ctx.put("quizSubmissions", "q2", quiz(6, 10, 60));
    ctx.put("quizSubmissions", "q3", quiz(8, 10, 80));

    let orchestrator = ctx.orchestrator(MigrationRegistry::builtin());
    let first = orchestrator.migrate(VersionPair::new(2, 3)).unwrap();
    assert_eq!(first.total_records, 3);
    assert_eq!(first.batches, 2);

    let q1 = ctx.store.get("quizSubmissions", "q1").unwrap().unwrap();
    let analytics = q1.get("analytics").and_then(Value::as_object).unwrap();
    assert_eq!(analytics.get("difficulty"), Some(&Value::from("easy")));
    assert_eq!(analytics.get("performanceCategory"), Some(&Value::from("excellent")));
    assert_eq!(q1.get(MARKER_FIELD), Some(&Value::from("v3")));
    let stamped = q1.get(MIGRATED_AT_FIELD).cloned();

    let second = orchestrator.migrate(VersionPair::new(2, 3)).unwrap();
    assert_eq!(second.total_records, 0);
    assert_eq!(second.skipped, 3);
    let q1 = ctx.store.get("quizSubmissions", "q1").unwrap().unwrap();
    assert_eq!(q1.get(MIGRATED_AT_FIELD).cloned(), stamped);

    assert_eq!(ctx.store.list(AUDIT_COLLECTION).unwrap().len(), 2);
}

#[test]
fn test_failure_after_partial_commit_rolls_back() {
    let ctx = TestContext::new();
    let created = Timestamp::parse("2025-01-01T00:00:00.25Z").unwrap();
    for i in 0..5 {
        let id = format!("u{}", i);
        ctx.put(
            "users",
            &id,
            docmig_core::value::fields([
                ("email", Value::from(format!("{}@example.com", id))),
                ("name", Value::from(id.as_str())),
                ("role", Value::from("student")),
                ("createdAt", Value::from(created)),
            ]),
        );
    }
    let before = ctx.snapshot(&["users", "modules", "userProgress", "quizSubmissions"]);

    let registry = MigrationRegistry::new().with_step(
        VersionPair::new(4, 5),
        DeriveFieldsStep::new("users", "Normalising roles", |doc| {
            if doc.id == "u3" {
                return Err(StepError::new("unexpected role"));
            }
            Ok(docmig_core::value::fields([("role", "member")]))
        }),
    );
    let orchestrator = ctx.orchestrator(registry);

    let err = orchestrator.migrate(VersionPair::new(4, 5)).unwrap_err();
    assert!(matches!(err, MigrationError::Step { ref id, .. } if id == "u3"));
    assert_eq!(
        ctx.snapshot(&["users", "modules", "userProgress", "quizSubmissions"]),
        before
    );

    let logs = ctx.store.list(AUDIT_COLLECTION).unwrap();
    assert_eq!(logs[0].get("status"), Some(&Value::from("rolled_back")));
}

#[test]
fn test_json_export_import_round_trip() {
    let ctx = TestContext::new();
    let ts = Timestamp::parse("2025-06-30T23:59:59.999Z").unwrap();
    ctx.put(
        "users",
        "u1",
        docmig_core::value::fields([
            ("name", Value::from("Ann")),
            ("createdAt", Value::from(ts)),
            (
                "preferences",
                Value::Object(docmig_core::value::fields([("theme", "dark")])),
            ),
        ]),
    );

    let transfer = ImportExportManager::new(Arc::clone(&ctx.store), ctx.config.clone());
    let exported = transfer.export("users", ExportFormat::Json).unwrap();
    assert_eq!(exported.count, 1);

    let imported = transfer.import(&exported.path, Some("usersCopy")).unwrap();
    assert_eq!(imported.imported_count, 1);
    assert_eq!(
        ctx.store.get("usersCopy", "u1").unwrap().unwrap().fields,
        ctx.store.get("users", "u1").unwrap().unwrap().fields
    );

    // Without an explicit target the name before the first '-' is used.
    ctx.store
        .commit("users", vec![WriteOp::delete("u1")])
        .unwrap();
    let inferred = transfer.import(&exported.path, None).unwrap();
    assert_eq!(inferred.collection, "users");
    assert!(inferred.inferred_collection);
    assert_eq!(
        ctx.store.get("users", "u1").unwrap().unwrap().get("createdAt"),
        Some(&Value::Timestamp(ts))
    );
}

#[test]
fn test_seeded_modules_survive_json_round_trip() {
    let ctx = TestContext::new();
    Seeder::new(Arc::clone(&ctx.store))
        .seed(Environment::Staging)
        .unwrap();
    let before = ctx.snapshot(&["modules"]);

    let transfer = ImportExportManager::new(Arc::clone(&ctx.store), ctx.config.clone());
    let exported = transfer.export("modules", ExportFormat::Json).unwrap();
    let deletes = ctx
        .store
        .list("modules")
        .unwrap()
        .into_iter()
        .map(|doc| WriteOp::delete(doc.id))
        .collect();
    ctx.store.commit("modules", deletes).unwrap();

    let imported = transfer.import(&exported.path, None).unwrap();
    assert_eq!(imported.imported_count, 2);
    assert_eq!(ctx.snapshot(&["modules"]), before);

    let report = IntegrityValidator::new(SchemaSet::educational()).validate(ctx.store.as_ref());
    assert!(report.is_valid(), "{:?}", report.errors);
}
