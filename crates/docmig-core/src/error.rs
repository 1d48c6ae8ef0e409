//! Core error types.

use thiserror::Error;

/// Errors raised by a [`DocumentStore`](crate::store::DocumentStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Sled(#[from] sled::Error),

    /// An update targeted a document that does not exist.
    #[error("document not found: {collection}/{id}")]
    NotFound {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
    },

    /// A batch exceeded the store's maximum batch size.
    #[error("batch of {size} operations exceeds maximum of {max}")]
    BatchTooLarge {
        /// Number of operations submitted.
        size: usize,
        /// Maximum accepted.
        max: usize,
    },

    /// Stored bytes could not be decoded.
    #[error("corrupt document {collection}/{id}: {reason}")]
    Corrupt {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
        /// Decoding failure.
        reason: String,
    },

    /// Backend-specific failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Errors converting portable values back to native values.
#[derive(Debug, Error)]
pub enum SerializeError {
    /// A tagged timestamp carried an unparseable value.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// A document body was not a JSON object.
    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),

    /// JSON text could not be parsed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration errors. These are fatal and never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held an unparseable value.
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },

    /// A configured value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// A schema file could not be read.
    #[error("cannot read schema file {path}: {source}")]
    SchemaFile {
        /// Path of the schema file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A schema file could not be parsed.
    #[error("invalid schema file {path}: {source}")]
    SchemaParse {
        /// Path of the schema file.
        path: String,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors creating, reading or restoring backups.
#[derive(Debug, Error)]
pub enum BackupError {
    /// No backup with this id exists.
    #[error("backup not found: {0}")]
    NotFound(String),

    /// A backup with this id already exists and is never overwritten.
    #[error("backup already exists: {0}")]
    Exists(String),

    /// The backup id cannot be used as a file name.
    #[error("invalid backup id: {0:?}")]
    InvalidId(String),

    /// The backup file is unreadable as a backup.
    #[error("corrupt backup {id}: {reason}")]
    Corrupt {
        /// Backup id.
        id: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Filesystem failure.
    #[error("backup I/O error at {path}: {source}")]
    Io {
        /// Path being accessed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The backup could not be encoded.
    #[error("cannot encode backup: {0}")]
    Encode(#[from] serde_json::Error),

    /// Reading or writing the store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors importing or exporting collections.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The file extension is neither `.json` nor `.csv`.
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// No collection was given and none could be inferred from the file name.
    #[error("cannot determine target collection for {0}")]
    UnknownCollection(String),

    /// A JSON import file did not hold an array of objects.
    #[error("invalid import record {index}: {reason}")]
    InvalidRecord {
        /// Zero-based record position.
        index: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// Filesystem failure.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being accessed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV encoding or decoding failed.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// A portable value could not be decoded.
    #[error(transparent)]
    Serialize(#[from] SerializeError),

    /// Reading or writing the store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors seeding initial data.
#[derive(Debug, Error)]
pub enum SeedError {
    /// Seeding production is never allowed.
    #[error("cannot seed data in production environment")]
    ProductionRefused,

    /// The environment name is not recognised.
    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),

    /// Writing the store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::NotFound {
            collection: "users".to_string(),
            id: "u1".to_string(),
        };
        assert_eq!(err.to_string(), "document not found: users/u1");

        let err = ConfigError::InvalidEnv {
            var: "MIGRATION_BATCH_SIZE",
            value: "lots".to_string(),
        };
        assert!(err.to_string().contains("MIGRATION_BATCH_SIZE"));
    }
}
