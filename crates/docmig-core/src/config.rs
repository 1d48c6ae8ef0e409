//! Engine configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Default number of write operations per batch.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Default pause after each full batch, in milliseconds.
pub const DEFAULT_BATCH_DELAY_MS: u64 = 100;

/// Default maximum retries for transient failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay between retries, in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Default backup directory.
pub const DEFAULT_BACKUP_PATH: &str = "./data-backups";

/// Default export directory.
pub const DEFAULT_EXPORT_PATH: &str = "./exports";

/// Default sled data directory.
pub const DEFAULT_DATA_PATH: &str = "./docmig-data";

/// Configuration shared by the migration, backup and transfer components.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum write operations per committed batch.
    pub batch_size: usize,

    /// Pause after each full batch. Zero disables throttling.
    pub batch_delay: Duration,

    /// Maximum retries for transient failures.
    pub max_retries: u32,

    /// Delay between retries.
    pub retry_delay: Duration,

    /// Directory holding backup files.
    pub backup_path: PathBuf,

    /// Directory receiving export files.
    pub export_path: PathBuf,

    /// Directory of the embedded document store.
    pub data_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: Duration::from_millis(DEFAULT_BATCH_DELAY_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            backup_path: PathBuf::from(DEFAULT_BACKUP_PATH),
            export_path: PathBuf::from(DEFAULT_EXPORT_PATH),
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the process environment, falling back to
    /// defaults for unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(size) = parse_var::<usize, _>(&lookup, "MIGRATION_BATCH_SIZE")? {
            config = config.with_batch_size(size)?;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "MIGRATION_BATCH_DELAY")? {
            config.batch_delay = Duration::from_millis(ms);
        }
        if let Some(retries) = parse_var::<u32, _>(&lookup, "MIGRATION_MAX_RETRIES")? {
            config.max_retries = retries;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "MIGRATION_RETRY_DELAY")? {
            config.retry_delay = Duration::from_millis(ms);
        }
        if let Some(path) = lookup("BACKUP_PATH") {
            config.backup_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("EXPORT_PATH") {
            config.export_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("DOCMIG_DATA_PATH") {
            config.data_path = PathBuf::from(path);
        }

        Ok(config)
    }

    /// Set the batch size. Zero is rejected.
    pub fn with_batch_size(mut self, size: usize) -> Result<Self, ConfigError> {
        if size == 0 {
            return Err(ConfigError::Invalid("batch size must be at least 1".to_string()));
        }
        self.batch_size = size;
        Ok(self)
    }

    /// Set the pause after each full batch.
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    /// Disable the inter-batch pause.
    pub fn without_batch_delay(mut self) -> Self {
        self.batch_delay = Duration::ZERO;
        self
    }

    /// Set the backup directory.
    pub fn with_backup_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.backup_path = path.into();
        self
    }

    /// Set the export directory.
    pub fn with_export_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.export_path = path.into();
        self
    }

    /// Set the data directory.
    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = path.into();
        self
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value: raw }),
        None => Ok(None),
    }
}
