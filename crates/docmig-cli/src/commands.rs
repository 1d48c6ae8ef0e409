//! Subcommand execution.

use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::ValueEnum;
use docmig_core::{
    BackupManager, EngineConfig, Environment, ExportFormat, ImportExportManager,
    IntegrityValidator, MigrationOrchestrator, MigrationRegistry, SchemaSet, Seeder, SledStore,
    VersionPair,
};
use tracing::{debug, info};

use crate::error::CliError;
use crate::formatter::{create_formatter, Formatter, OutputFormat};
use crate::Command;

/// Export file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FileFormat {
    /// Pretty-printed JSON array
    Json,
    /// Flattened CSV table
    Csv,
}

impl From<FileFormat> for ExportFormat {
    fn from(format: FileFormat) -> Self {
        match format {
            FileFormat::Json => ExportFormat::Json,
            FileFormat::Csv => ExportFormat::Csv,
        }
    }
}

/// Everything a subcommand needs: the open store, schemas and settings.
pub struct Context {
    store: Arc<SledStore>,
    schemas: SchemaSet,
    config: EngineConfig,
    formatter: Box<dyn Formatter>,
}

impl Context {
    /// Open the store described by `config`.
    ///
    /// `schemas` replaces the built-in schema set when given.
    pub fn open(
        config: EngineConfig,
        schemas: Option<&Path>,
        output: OutputFormat,
    ) -> Result<Self, CliError> {
        let schemas = match schemas {
            Some(path) => {
                debug!(path = %path.display(), "Loading schema file");
                SchemaSet::from_path(path)?
            }
            None => SchemaSet::educational(),
        };
        let store = Arc::new(SledStore::open_configured(&config)?);
        info!(path = %config.data_path.display(), "Opened document store");

        Ok(Self {
            store,
            schemas,
            config,
            formatter: create_formatter(output),
        })
    }

    /// Flush pending writes to disk.
    pub fn close(&self) -> Result<(), CliError> {
        self.store.flush()?;
        Ok(())
    }

    fn orchestrator(&self) -> MigrationOrchestrator<SledStore> {
        MigrationOrchestrator::new(
            Arc::clone(&self.store),
            self.schemas.clone(),
            MigrationRegistry::builtin(),
            self.config.clone(),
        )
    }

    fn backups(&self) -> BackupManager<SledStore> {
        BackupManager::new(
            Arc::clone(&self.store),
            self.schemas.clone(),
            self.config.clone(),
        )
    }
}

/// Run one subcommand and return its formatted output.
pub fn execute(ctx: &Context, command: Command) -> Result<String, CliError> {
    let out = &ctx.formatter;
    match command {
        Command::Migrate { from, to } => {
            let pair = VersionPair::parse(&from, &to)?;
            let result = ctx.orchestrator().migrate(pair)?;
            Ok(out.format_migration(&result))
        }

        Command::Seed { environment } => {
            let environment: Environment = environment.parse()?;
            let summary = Seeder::new(Arc::clone(&ctx.store)).seed(environment)?;
            Ok(out.format_seed(&summary))
        }

        Command::Validate => {
            let report = IntegrityValidator::new(ctx.schemas.clone()).validate(ctx.store.as_ref());
            if !report.is_valid() {
                return Err(CliError::ValidationFailed(Box::new(report)));
            }
            Ok(out.format_validation(&report))
        }

        Command::Export { collection, format } => {
            let transfer = ImportExportManager::new(Arc::clone(&ctx.store), ctx.config.clone());
            let summary = transfer.export(&collection, format.into())?;
            Ok(out.format_export(&summary))
        }

        Command::Import { file, collection } => {
            let transfer = ImportExportManager::new(Arc::clone(&ctx.store), ctx.config.clone());
            let summary = transfer.import(&file, collection.as_deref())?;
            Ok(out.format_import(&summary))
        }

        Command::Backup { id, incremental } => {
            let prefix = if incremental {
                "incremental-backup"
            } else {
                "manual-backup"
            };
            let id = id.unwrap_or_else(|| format!("{}-{}", prefix, Utc::now().timestamp_millis()));
            if !incremental {
                let location = ctx.backups().create(&id)?;
                return Ok(out.format_backup(&location));
            }
            match ctx.backups().create_incremental(&id)? {
                Some(location) => Ok(out.format_backup(&location)),
                None => Ok(out.format_message("No changes since the last backup")),
            }
        }

        Command::Restore { backup_id } => {
            let summary = ctx.backups().restore(&backup_id)?;
            Ok(out.format_restore(&backup_id, &summary))
        }

        Command::ListBackups => {
            let backups = ctx.backups().list()?;
            Ok(out.format_backups(&backups))
        }

        Command::PruneBackups { retention_days } => {
            let removed = ctx.backups().prune(Duration::days(retention_days))?;
            Ok(out.format_pruned(removed, retention_days))
        }
    }
}
