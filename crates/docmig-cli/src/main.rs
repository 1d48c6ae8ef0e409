//! docmig Command-Line Tool
//!
//! Runs migrations, seeding, validation, backups and import/export against
//! an embedded document store.

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod commands;
mod error;
mod formatter;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use docmig_core::EngineConfig;
use formatter::OutputFormat;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::error::CliError;

/// docmig Command-Line Tool
#[derive(Parser, Debug)]
#[command(name = "docmig")]
#[command(version, about = "Document store migration and integrity tool")]
pub struct Args {
    /// Directory of the embedded document store
    #[arg(long, global = true)]
    pub data_path: Option<PathBuf>,

    /// Directory holding backup files
    #[arg(long, global = true)]
    pub backup_path: Option<PathBuf>,

    /// Directory receiving export files
    #[arg(long, global = true)]
    pub export_path: Option<PathBuf>,

    /// Write operations per committed batch
    #[arg(long, global = true)]
    pub batch_size: Option<usize>,

    /// JSON schema file replacing the built-in schemas
    #[arg(long, global = true)]
    pub schemas: Option<PathBuf>,

    /// Output format for results
    #[arg(short, long, global = true, default_value = "text", value_enum)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Available actions.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Migrate data between schema versions
    Migrate {
        /// Source version (`2` or `v2`)
        #[arg(long)]
        from: String,
        /// Target version (`3` or `v3`)
        #[arg(long)]
        to: String,
    },

    /// Seed initial data
    Seed {
        /// Target environment (development or staging)
        #[arg(long, default_value = "development")]
        environment: String,
    },

    /// Validate data integrity
    Validate,

    /// Export a collection to a file
    Export {
        /// Collection to export
        #[arg(long)]
        collection: String,
        /// File format
        #[arg(long, default_value = "json", value_enum)]
        format: commands::FileFormat,
    },

    /// Import records from a JSON or CSV file
    Import {
        /// File to import
        #[arg(long)]
        file: PathBuf,
        /// Target collection, inferred from the file name when omitted
        #[arg(long)]
        collection: Option<String>,
    },

    /// Create a backup of all governed collections
    Backup {
        /// Backup id, generated when omitted
        #[arg(long)]
        id: Option<String>,
        /// Only back up documents changed since the last backup
        #[arg(long)]
        incremental: bool,
    },

    /// Restore a backup, replacing current data
    Restore {
        /// Id of the backup to restore
        #[arg(long)]
        backup_id: String,
    },

    /// List backups, newest first
    ListBackups,

    /// Delete backups older than the retention window
    PruneBackups {
        /// Days of backups to keep
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(i64).range(0..=36500))]
        retention_days: i64,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "docmig=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        for line in e.details() {
            eprintln!("  {}", line);
        }
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), CliError> {
    let config = resolve_config(&args)?;
    let context = commands::Context::open(config, args.schemas.as_deref(), args.output)?;
    let output = commands::execute(&context, args.command);
    context.close()?;
    println!("{}", output?);
    Ok(())
}

/// Environment configuration with command-line overrides applied.
fn resolve_config(args: &Args) -> Result<EngineConfig, CliError> {
    let mut config = EngineConfig::from_env()?;
    if let Some(path) = &args.data_path {
        config = config.with_data_path(path);
    }
    if let Some(path) = &args.backup_path {
        config = config.with_backup_path(path);
    }
    if let Some(path) = &args.export_path {
        config = config.with_export_path(path);
    }
    if let Some(size) = args.batch_size {
        config = config.with_batch_size(size)?;
    }
    Ok(config)
}
