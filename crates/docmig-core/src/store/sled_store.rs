//! Embedded document store backed by sled.
//!
//! Each collection lives in its own tree named `collection:{name}`. Keys are
//! document ids, values are the portable JSON encoding of the document body,
//! so timestamps keep their type across restarts.

use std::path::Path;
use std::time::Duration;

use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Tree};

use super::{DocumentStore, WriteOp};
use crate::config::{EngineConfig, DEFAULT_BATCH_SIZE};
use crate::error::StoreError;
use crate::serializer::{deserialize_fields, serialize_fields};
use crate::value::{Document, Fields};

/// Prefix of collection tree names.
const COLLECTION_PREFIX: &str = "collection:";

/// sled-backed [`DocumentStore`].
pub struct SledStore {
    db: Db,
}

impl SledStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::Config::new()
            .path(path.as_ref())
            .use_compression(true)
            .open()?;
        Ok(Self { db })
    }

    /// Open the store at the configured data path, retrying while another
    /// process holds the database lock.
    pub fn open_configured(config: &EngineConfig) -> Result<Self, StoreError> {
        Self::open_with_retry(&config.data_path, config.max_retries, config.retry_delay)
    }

    /// Open a store, retrying up to `max_retries` times.
    pub fn open_with_retry(
        path: impl AsRef<Path>,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Result<Self, StoreError> {
        let mut attempt = 0;
        loop {
            match Self::open(path.as_ref()) {
                Ok(store) => return Ok(store),
                Err(e) if attempt < max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        path = %path.as_ref().display(),
                        attempt,
                        max_retries,
                        error = %e,
                        "Failed to open store, retrying"
                    );
                    std::thread::sleep(retry_delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Create a temporary store that is removed on drop.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Names of every collection opened so far, by reads or writes.
    pub fn collections(&self) -> Vec<String> {
        self.db
            .tree_names()
            .into_iter()
            .filter_map(|name| {
                std::str::from_utf8(&name)
                    .ok()
                    .and_then(|s| s.strip_prefix(COLLECTION_PREFIX))
                    .map(str::to_string)
            })
            .collect()
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    fn tree(&self, collection: &str) -> Result<Tree, StoreError> {
        Ok(self
            .db
            .open_tree(format!("{}{}", COLLECTION_PREFIX, collection))?)
    }
}

/// A write operation with its payload encoded ahead of the transaction.
enum Prepared<'a> {
    Set { id: &'a str, bytes: Vec<u8> },
    Update { id: &'a str, fields: &'a Fields },
    Delete { id: &'a str },
}

fn encode(fields: &Fields) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(&serialize_fields(fields)).map_err(|e| StoreError::Backend(e.to_string()))
}

fn decode(collection: &str, id: &str, bytes: &[u8]) -> Result<Fields, StoreError> {
    let corrupt = |reason: String| StoreError::Corrupt {
        collection: collection.to_string(),
        id: id.to_string(),
        reason,
    };
    let json: serde_json::Value = serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()))?;
    deserialize_fields(&json).map_err(|e| corrupt(e.to_string()))
}

impl DocumentStore for SledStore {
    fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let tree = self.tree(collection)?;
        let mut docs = Vec::with_capacity(tree.len());
        for entry in tree.iter() {
            let (key, value) = entry?;
            let id = String::from_utf8_lossy(&key).into_owned();
            let fields = decode(collection, &id, &value)?;
            docs.push(Document::new(id, fields));
        }
        Ok(docs)
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let tree = self.tree(collection)?;
        match tree.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(Document::new(id, decode(collection, id, &bytes)?))),
            None => Ok(None),
        }
    }

    fn commit(&self, collection: &str, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        if ops.len() > DEFAULT_BATCH_SIZE {
            return Err(StoreError::BatchTooLarge {
                size: ops.len(),
                max: DEFAULT_BATCH_SIZE,
            });
        }
        let tree = self.tree(collection)?;

        // Encode full overwrites up front; the transaction body may run more
        // than once on conflict.
        let prepared = ops
            .iter()
            .map(|op| {
                Ok(match op {
                    WriteOp::Set { id, fields } => Prepared::Set {
                        id,
                        bytes: encode(fields)?,
                    },
                    WriteOp::Update { id, fields } => Prepared::Update { id, fields },
                    WriteOp::Delete { id } => Prepared::Delete { id },
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let result: Result<(), TransactionError<StoreError>> = tree.transaction(|tx| {
            for op in &prepared {
                match op {
                    Prepared::Set { id, bytes } => {
                        tx.insert(id.as_bytes(), bytes.clone())?;
                    }
                    Prepared::Update { id, fields } => {
                        let existing = tx.get(id.as_bytes())?.ok_or_else(|| {
                            ConflictableTransactionError::Abort(StoreError::NotFound {
                                collection: collection.to_string(),
                                id: id.to_string(),
                            })
                        })?;
                        let mut merged = decode(collection, id, &existing)
                            .map_err(ConflictableTransactionError::Abort)?;
                        merged.extend((*fields).clone());
                        let bytes = encode(&merged).map_err(ConflictableTransactionError::Abort)?;
                        tx.insert(id.as_bytes(), bytes)?;
                    }
                    Prepared::Delete { id } => {
                        tx.remove(id.as_bytes())?;
                    }
                }
            }
            Ok(())
        });

        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(StoreError::Sled(e)),
        }
    }

    fn max_batch_size(&self) -> usize {
        DEFAULT_BATCH_SIZE
    }
}
