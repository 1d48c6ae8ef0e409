//! docmig core - document store migration and integrity engine.
//!
//! This crate evolves a collection/document store through versioned schema
//! migrations and keeps it honest:
//!
//! - [`value`]: the closed document value model, including timestamps
//! - [`serializer`]: lossless conversion to and from portable JSON
//! - [`schema`] and [`validation`]: per-collection schemas, business rules
//!   and integrity reports
//! - [`store`]: the [`DocumentStore`] trait, in-memory and sled-backed
//!   stores, and throttled write batching
//! - [`backup`]: point-in-time backups with checksum-verified restore
//! - [`migration`]: versioned, idempotent migration steps
//! - [`orchestrator`]: backup, migrate, validate, then commit or roll back
//! - [`transfer`]: JSON and CSV import/export
//! - [`seed`]: initial data for fresh environments
//! - [`audit`]: the migration audit trail
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use docmig_core::{
//!     EngineConfig, MigrationOrchestrator, MigrationRegistry, SchemaSet, SledStore, VersionPair,
//! };
//!
//! let config = EngineConfig::from_env()?;
//! let store = Arc::new(SledStore::open_configured(&config)?);
//! let orchestrator = MigrationOrchestrator::new(
//!     store,
//!     SchemaSet::educational(),
//!     MigrationRegistry::builtin(),
//!     config,
//! );
//! let result = orchestrator.migrate(VersionPair::new(1, 2))?;
//! println!("migrated {} records", result.total_records);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod audit;
pub mod backup;
pub mod config;
pub mod error;
pub mod migration;
pub mod orchestrator;
pub mod schema;
pub mod seed;
pub mod serializer;
pub mod store;
pub mod transfer;
pub mod validation;
pub mod value;

pub use audit::{AuditLog, MigrationOutcome, MigrationRecord, AUDIT_COLLECTION};
pub use backup::{
    Backup, BackupInfo, BackupKind, BackupLocation, BackupManager, BackupStats, RestoreSummary,
};
pub use config::EngineConfig;
pub use error::{BackupError, ConfigError, SeedError, SerializeError, StoreError, TransferError};
pub use migration::{
    AddFieldStep, DeriveFieldsStep, MigrationError, MigrationRegistry, MigrationResult,
    MigrationRunner, MigrationStep, StepError, VersionPair,
};
pub use orchestrator::{MigrationOrchestrator, OrchestratorState};
pub use schema::{Schema, SchemaSet};
pub use seed::{Environment, SeedSummary, Seeder};
pub use store::{DocumentStore, MemoryStore, SledStore, WriteBatcher, WriteOp};
pub use transfer::{
    ExportFormat, ExportSummary, ImportExportManager, ImportSummary, DOCUMENT_ID_KEY,
};
pub use validation::{IntegrityValidator, RuleSet, ValidationReport};
pub use value::{Document, Fields, Timestamp, TypeTag, Value};
