//! Point-in-time backups of the governed collections.
//!
//! A backup is a single pretty-printed JSON file `{backup_path}/{id}.json`
//! holding every document of every governed collection in portable form.
//! Files are written atomically and never overwritten. A SHA-256 checksum of
//! the collection payload is stored alongside it and verified on restore.
//!
//! Incremental backups hold only the documents whose change time (the first
//! of `updatedAt`, `createdAt`, `submittedAt`, `timestamp` the document
//! carries) is at or after the previous backup. The time of the last backup
//! is kept in `{backup_path}/.last-backup`. Restoring an incremental backup
//! merges its documents into the store instead of replacing collections.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;
use crate::error::BackupError;
use crate::schema::SchemaSet;
use crate::serializer::{deserialize_fields, serialize_fields};
use crate::store::{DocumentStore, WriteBatcher, WriteOp};
use crate::value::{Fields, Timestamp, Value};

/// File holding the time of the most recent backup.
const LAST_BACKUP_FILE: &str = ".last-backup";

/// Fields consulted, in order, for a document's change time.
pub const CHANGE_TIME_FIELDS: [&str; 4] = ["updatedAt", "createdAt", "submittedAt", "timestamp"];

/// Whether a backup holds whole collections or only recent changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    /// Every document of every governed collection.
    #[default]
    Full,
    /// Documents changed since the previous backup.
    Incremental,
}

impl std::fmt::Display for BackupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupKind::Full => write!(f, "full"),
            BackupKind::Incremental => write!(f, "incremental"),
        }
    }
}

/// One document inside a backup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupEntry {
    /// Document id.
    pub id: String,
    /// Portable document body.
    pub data: serde_json::Value,
}

/// Document and collection counts of a backup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStats {
    /// Collections captured.
    pub total_collections: usize,
    /// Documents captured.
    pub total_documents: usize,
}

/// On-disk backup file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    /// Backup id, also the file stem.
    pub id: String,
    /// Full or incremental.
    #[serde(rename = "type", default)]
    pub kind: BackupKind,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
    /// For incremental backups, the previous backup time changes are
    /// counted from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    /// Collection name to its documents.
    pub collections: BTreeMap<String, Vec<BackupEntry>>,
    /// Counts.
    #[serde(default)]
    pub stats: BackupStats,
    /// Hex SHA-256 of the compact JSON encoding of `collections`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl Backup {
    fn checksum_of(
        collections: &BTreeMap<String, Vec<BackupEntry>>,
    ) -> Result<String, serde_json::Error> {
        let canonical = serde_json::to_vec(collections)?;
        Ok(hex::encode(Sha256::digest(&canonical)))
    }
}

/// Where a new backup was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupLocation {
    /// Backup id.
    pub id: String,
    /// Full or incremental.
    pub kind: BackupKind,
    /// File path.
    pub path: PathBuf,
    /// Counts.
    pub stats: BackupStats,
}

/// Listing entry for an existing backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    /// Backup id.
    pub id: String,
    /// Full or incremental.
    pub kind: BackupKind,
    /// Snapshot time.
    pub timestamp: DateTime<Utc>,
    /// File path.
    pub path: PathBuf,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Counts.
    pub stats: BackupStats,
}

/// Outcome of a restore.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    /// Collections replaced.
    pub collections: usize,
    /// Documents removed before restoring.
    pub deleted: usize,
    /// Documents written from the backup.
    pub restored: usize,
}

/// Creates, restores, lists and prunes backups.
pub struct BackupManager<S: DocumentStore> {
    store: Arc<S>,
    schemas: SchemaSet,
    config: EngineConfig,
}

impl<S: DocumentStore> BackupManager<S> {
    /// Create a manager over the governed collections of `schemas`.
    pub fn new(store: Arc<S>, schemas: SchemaSet, config: EngineConfig) -> Self {
        Self {
            store,
            schemas,
            config,
        }
    }

    /// Directory holding backup files.
    pub fn backup_dir(&self) -> &Path {
        &self.config.backup_path
    }

    /// Snapshot every governed collection into a new backup file.
    #[instrument(skip(self))]
    pub fn create(&self, id: &str) -> Result<BackupLocation, BackupError> {
        let path = self.path_for(id)?;
        if path.exists() {
            return Err(BackupError::Exists(id.to_string()));
        }
        let started = Utc::now();
        info!(backup_id = %id, "Creating backup");

        let collections = self.capture(None)?;
        self.write_backup(path, id, BackupKind::Full, started, None, collections)
    }

    /// Back up the documents changed since the previous backup.
    ///
    /// Falls back to a full backup when no previous backup time is known.
    /// Returns `None` without writing a file when nothing changed.
    #[instrument(skip(self))]
    pub fn create_incremental(&self, id: &str) -> Result<Option<BackupLocation>, BackupError> {
        let Some(since) = self.last_backup_time()? else {
            info!(backup_id = %id, "No previous backup found, performing full backup instead");
            return self.create(id).map(Some);
        };
        let path = self.path_for(id)?;
        if path.exists() {
            return Err(BackupError::Exists(id.to_string()));
        }
        let started = Utc::now();
        info!(backup_id = %id, since = %since.to_rfc3339(), "Creating incremental backup");

        let mut collections = self.capture(Some(since))?;
        collections.retain(|_, entries| !entries.is_empty());
        if collections.is_empty() {
            info!("No changes detected, skipping backup");
            return Ok(None);
        }
        self.write_backup(path, id, BackupKind::Incremental, started, Some(since), collections)
            .map(Some)
    }

    /// Time of the most recent backup, if one was recorded.
    pub fn last_backup_time(&self) -> Result<Option<DateTime<Utc>>, BackupError> {
        let path = self.backup_dir().join(LAST_BACKUP_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path).map_err(|source| BackupError::Io {
            path: path.display().to_string(),
            source,
        })?;
        match DateTime::parse_from_rfc3339(text.trim()) {
            Ok(time) => Ok(Some(time.with_timezone(&Utc))),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable last backup time");
                Ok(None)
            }
        }
    }

    /// Documents of every governed collection, limited to those changed at
    /// or after `since` when given.
    fn capture(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<BTreeMap<String, Vec<BackupEntry>>, BackupError> {
        let mut collections = BTreeMap::new();
        for name in self.schemas.collection_names() {
            let entries: Vec<BackupEntry> = self
                .store
                .list(name)?
                .into_iter()
                .filter(|doc| since.map_or(true, |since| changed_since(&doc.fields, since)))
                .map(|doc| BackupEntry {
                    id: doc.id,
                    data: serde_json::Value::Object(serialize_fields(&doc.fields)),
                })
                .collect();
            debug!(collection = %name, documents = entries.len(), "Captured collection");
            collections.insert(name.to_string(), entries);
        }
        Ok(collections)
    }

    fn write_backup(
        &self,
        path: PathBuf,
        id: &str,
        kind: BackupKind,
        timestamp: DateTime<Utc>,
        since: Option<DateTime<Utc>>,
        collections: BTreeMap<String, Vec<BackupEntry>>,
    ) -> Result<BackupLocation, BackupError> {
        let stats = BackupStats {
            total_collections: collections.len(),
            total_documents: collections.values().map(Vec::len).sum(),
        };
        let checksum = Backup::checksum_of(&collections)?;
        let backup = Backup {
            id: id.to_string(),
            kind,
            timestamp,
            since,
            collections,
            stats,
            checksum: Some(checksum),
        };
        let body = serde_json::to_vec_pretty(&backup)?;
        write_atomically(&path, &body)?;
        write_atomically(
            &self.backup_dir().join(LAST_BACKUP_FILE),
            timestamp.to_rfc3339().as_bytes(),
        )?;

        info!(
            backup_id = %id,
            kind = %kind,
            path = %path.display(),
            collections = stats.total_collections,
            documents = stats.total_documents,
            "Backup created"
        );
        Ok(BackupLocation {
            id: id.to_string(),
            kind,
            path,
            stats,
        })
    }

    /// Load and verify a backup without touching the store.
    pub fn load(&self, id: &str) -> Result<Backup, BackupError> {
        let path = self.path_for(id)?;
        if !path.exists() {
            return Err(BackupError::NotFound(id.to_string()));
        }
        let text = std::fs::read(&path).map_err(|source| BackupError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let backup: Backup = serde_json::from_slice(&text).map_err(|e| BackupError::Corrupt {
            id: id.to_string(),
            reason: e.to_string(),
        })?;

        if let Some(expected) = &backup.checksum {
            let actual = Backup::checksum_of(&backup.collections)?;
            if &actual != expected {
                return Err(BackupError::Corrupt {
                    id: id.to_string(),
                    reason: format!("checksum mismatch (expected {}, found {})", expected, actual),
                });
            }
        }
        Ok(backup)
    }

    /// Replace the contents of every collection in the backup with the
    /// backed-up documents.
    ///
    /// An incremental backup is merged instead: its documents are written
    /// over the current ones and nothing is deleted.
    ///
    /// The whole backup is decoded before the first write, so a corrupt
    /// backup leaves the store untouched. Commit failures during the
    /// replacement propagate as they happen.
    #[instrument(skip(self))]
    pub fn restore(&self, id: &str) -> Result<RestoreSummary, BackupError> {
        let backup = self.load(id)?;
        info!(backup_id = %id, kind = %backup.kind, "Restoring from backup");

        let mut decoded: Vec<(String, Vec<(String, Fields)>)> =
            Vec::with_capacity(backup.collections.len());
        for (name, entries) in &backup.collections {
            let mut docs = Vec::with_capacity(entries.len());
            for entry in entries {
                let fields = deserialize_fields(&entry.data).map_err(|e| BackupError::Corrupt {
                    id: id.to_string(),
                    reason: format!("{}/{}: {}", name, entry.id, e),
                })?;
                docs.push((entry.id.clone(), fields));
            }
            decoded.push((name.clone(), docs));
        }

        let mut summary = RestoreSummary::default();
        for (name, docs) in decoded {
            if backup.kind == BackupKind::Full {
                let current = self.store.list(&name)?;
                let mut batcher = self.batcher(&name);
                for doc in current {
                    batcher.push(WriteOp::delete(doc.id))?;
                }
                summary.deleted += batcher.finish()?.ops;
            }

            let mut batcher = self.batcher(&name);
            for (doc_id, fields) in docs {
                batcher.push(WriteOp::set(doc_id, fields))?;
            }
            let written = batcher.finish()?.ops;
            summary.restored += written;
            summary.collections += 1;
            info!(collection = %name, documents = written, "Restored collection");
        }

        info!(
            backup_id = %id,
            collections = summary.collections,
            documents = summary.restored,
            "Restore completed"
        );
        Ok(summary)
    }

    /// Every readable backup in the backup directory, newest first.
    ///
    /// Unreadable files are skipped with a warning.
    pub fn list(&self) -> Result<Vec<BackupInfo>, BackupError> {
        let dir = self.backup_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let io_err = |source| BackupError::Io {
            path: dir.display().to_string(),
            source,
        };

        let mut infos = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.load(id) {
                Ok(backup) => {
                    let size_bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                    infos.push(BackupInfo {
                        id: backup.id,
                        kind: backup.kind,
                        timestamp: backup.timestamp,
                        path,
                        size_bytes,
                        stats: backup.stats,
                    });
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable backup"),
            }
        }

        infos.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(infos)
    }

    /// Delete backups taken more than `retention` ago. Returns the number
    /// of files removed.
    #[instrument(skip(self))]
    pub fn prune(&self, retention: chrono::Duration) -> Result<usize, BackupError> {
        let cutoff = Utc::now() - retention;
        let mut removed = 0;
        for info in self.list()? {
            if info.timestamp >= cutoff {
                continue;
            }
            std::fs::remove_file(&info.path).map_err(|source| BackupError::Io {
                path: info.path.display().to_string(),
                source,
            })?;
            info!(backup_id = %info.id, "Deleted old backup");
            removed += 1;
        }
        info!(removed, "Backup cleanup completed");
        Ok(removed)
    }

    fn batcher<'a>(&'a self, collection: &str) -> WriteBatcher<'a, S> {
        WriteBatcher::new(
            self.store.as_ref(),
            collection,
            self.config.batch_size,
            self.config.batch_delay,
        )
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, BackupError> {
        if id.is_empty() || id.starts_with('.') || id.contains(['/', '\\']) {
            return Err(BackupError::InvalidId(id.to_string()));
        }
        Ok(self.backup_dir().join(format!("{}.json", id)))
    }
}

/// Write `body` to a sibling temp file and rename it into place.
fn write_atomically(path: &Path, body: &[u8]) -> Result<(), BackupError> {
    let io_err = |source| BackupError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, body).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)
}

/// Whether the document's change time is at or after `since`.
///
/// The first change-time field holding a timestamp, or a string that parses
/// as one, decides. Documents without a change time are not included.
fn changed_since(fields: &Fields, since: DateTime<Utc>) -> bool {
    CHANGE_TIME_FIELDS
        .iter()
        .find_map(|name| match fields.get(*name) {
            Some(Value::Timestamp(ts)) => Some(*ts),
            Some(Value::String(s)) => Timestamp::parse(s),
            _ => None,
        })
        .map_or(false, |ts| *ts.as_datetime() >= since)
}
