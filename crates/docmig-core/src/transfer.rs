//! Collection import and export.
//!
//! Exports write one file per collection, either a pretty JSON array of
//! portable documents or a flattened CSV table. Imports read either format
//! back, writing every record with a full overwrite.
//!
//! CSV is lossy: nested objects become dotted columns and lists become JSON
//! text cells, and the `id` column always holds the document id. Importing a
//! CSV file does not rebuild that structure; every non-empty cell is stored
//! as a string.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::TransferError;
use crate::serializer::{deserialize_fields, flatten, serialize_fields};
use crate::store::{DocumentStore, WriteBatcher, WriteOp};
use crate::value::{generate_id, Fields, Value};

/// Key carrying the document id in JSON exports.
///
/// The id travels beside the body so that a body field named `id` survives
/// an export and re-import unchanged. JSON files without this key fall back
/// to their `id` field, which is then taken out of the body.
pub const DOCUMENT_ID_KEY: &str = "_documentId";

/// File format of an export or import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    /// Pretty-printed JSON array.
    Json,
    /// Flattened comma-separated table.
    Csv,
}

impl ExportFormat {
    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    /// Detect the format from a path's extension.
    pub fn from_path(path: &Path) -> Result<Self, TransferError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        ext.parse()
            .map_err(|_| TransferError::UnsupportedFormat(format!(".{}", ext)))
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(TransferError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Outcome of an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    /// Exported collection.
    pub collection: String,
    /// Written format.
    pub format: ExportFormat,
    /// Documents written.
    pub count: usize,
    /// Written file.
    pub path: PathBuf,
}

/// Outcome of an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    /// Target collection.
    pub collection: String,
    /// Records written.
    pub imported_count: usize,
    /// Source file.
    pub path: PathBuf,
    /// Whether the collection was inferred from the file name.
    pub inferred_collection: bool,
}

/// Moves collections between the store and JSON/CSV files.
pub struct ImportExportManager<S: DocumentStore> {
    store: Arc<S>,
    config: EngineConfig,
}

impl<S: DocumentStore> ImportExportManager<S> {
    /// Create a manager.
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Export a collection to `{export_path}/{collection}-export-{ts}.{ext}`.
    pub fn export(
        &self,
        collection: &str,
        format: ExportFormat,
    ) -> Result<ExportSummary, TransferError> {
        info!(collection = %collection, format = %format, "Exporting collection");

        let docs: Vec<(String, JsonValue)> = self
            .store
            .list(collection)?
            .into_iter()
            .map(|doc| (doc.id, JsonValue::Object(serialize_fields(&doc.fields))))
            .collect();
        let count = docs.len();

        let dir = &self.config.export_path;
        std::fs::create_dir_all(dir).map_err(|source| TransferError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        let path = dir.join(export_file_name(collection, format));

        match format {
            ExportFormat::Json => {
                let records: Vec<JsonValue> = docs
                    .into_iter()
                    .map(|(id, mut body)| {
                        if let Some(map) = body.as_object_mut() {
                            map.insert(DOCUMENT_ID_KEY.to_string(), JsonValue::String(id));
                        }
                        body
                    })
                    .collect();
                let body = serde_json::to_vec_pretty(&records)?;
                std::fs::write(&path, body).map_err(|source| TransferError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
            }
            ExportFormat::Csv => write_csv(&path, &docs)?,
        }

        info!(count, path = %path.display(), "Exported documents");
        Ok(ExportSummary {
            collection: collection.to_string(),
            format,
            count,
            path,
        })
    }

    /// Import a JSON or CSV file.
    ///
    /// Records go into `collection` when given, otherwise into the collection
    /// named by the file name up to its first `-`.
    pub fn import(
        &self,
        path: impl AsRef<Path>,
        collection: Option<&str>,
    ) -> Result<ImportSummary, TransferError> {
        let path = path.as_ref();
        let format = ExportFormat::from_path(path)?;
        let (collection, inferred) = match collection {
            Some(name) => (name.to_string(), false),
            None => {
                let name = infer_collection(path)?;
                info!(
                    collection = %name,
                    path = %path.display(),
                    "Inferred target collection from file name"
                );
                (name, true)
            }
        };

        let records = match format {
            ExportFormat::Json => read_json(path)?,
            ExportFormat::Csv => read_csv(path)?,
        };
        info!(records = records.len(), collection = %collection, "Importing records");

        let mut batcher = WriteBatcher::new(
            self.store.as_ref(),
            &collection,
            self.config.batch_size,
            self.config.batch_delay,
        );
        for (id, fields) in records {
            batcher.push(WriteOp::set(id.unwrap_or_else(generate_id), fields))?;
        }
        let stats = batcher.finish()?;

        info!(
            imported = stats.ops,
            collection = %collection,
            "Import completed"
        );
        Ok(ImportSummary {
            collection,
            imported_count: stats.ops,
            path: path.to_path_buf(),
            inferred_collection: inferred,
        })
    }
}

/// `{collection}-export-{ISO timestamp with ':' and '.' replaced by '-'}.{ext}`
fn export_file_name(collection: &str, format: ExportFormat) -> String {
    let stamp = Utc::now()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("{}-export-{}.{}", collection, stamp, format.extension())
}

fn infer_collection(path: &Path) -> Result<String, TransferError> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.split('-').next())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| TransferError::UnknownCollection(path.display().to_string()))
}

fn write_csv(path: &Path, docs: &[(String, JsonValue)]) -> Result<(), TransferError> {
    let rows: Vec<_> = docs
        .iter()
        .map(|(id, body)| {
            let mut row = flatten(body, "");
            row.insert("id".to_string(), JsonValue::String(id.clone()));
            row
        })
        .collect();

    // `id` leads, the remaining columns are the sorted union of every row's keys.
    let columns: BTreeSet<&str> = rows
        .iter()
        .flat_map(|row| row.keys().map(String::as_str))
        .filter(|key| *key != "id")
        .collect();
    let header: Vec<&str> = if rows.is_empty() {
        Vec::new()
    } else {
        std::iter::once("id").chain(columns).collect()
    };

    let mut writer = csv::Writer::from_path(path)?;
    if !header.is_empty() {
        writer.write_record(&header)?;
    }
    for row in &rows {
        writer.write_record(header.iter().map(|col| cell(row.get(*col))))?;
    }
    writer.flush().map_err(|source| TransferError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(())
}

fn cell(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

type Record = (Option<String>, Fields);

fn read_json(path: &Path) -> Result<Vec<Record>, TransferError> {
    let text = std::fs::read_to_string(path).map_err(|source| TransferError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let parsed: JsonValue = serde_json::from_str(&text)?;
    let JsonValue::Array(items) = parsed else {
        return Err(TransferError::InvalidRecord {
            index: 0,
            reason: "Import data must be an array of objects".to_string(),
        });
    };

    let mut records = Vec::with_capacity(items.len());
    for (index, mut item) in items.into_iter().enumerate() {
        let Some(map) = item.as_object_mut() else {
            return Err(TransferError::InvalidRecord {
                index,
                reason: "record is not an object".to_string(),
            });
        };
        let id = match map.remove(DOCUMENT_ID_KEY).or_else(|| map.remove("id")) {
            Some(JsonValue::String(s)) if !s.is_empty() => Some(s),
            Some(JsonValue::Number(n)) => Some(n.to_string()),
            Some(JsonValue::Null) | Some(JsonValue::String(_)) | None => None,
            Some(other) => {
                warn!(index, id = %other, "Ignoring non-scalar record id");
                None
            }
        };
        records.push((id, deserialize_fields(&item)?));
    }
    Ok(records)
}

fn read_csv(path: &Path) -> Result<Vec<Record>, TransferError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let mut id = None;
        let mut fields = Fields::new();
        for (column, raw) in headers.iter().zip(row.iter()) {
            if raw.is_empty() {
                continue;
            }
            if column == "id" {
                id = Some(raw.to_string());
            } else {
                fields.insert(column.to_string(), Value::from(raw));
            }
        }
        records.push((id, fields));
    }
    Ok(records)
}
