//! In-memory document store.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use super::{apply_ops, DocumentStore, WriteOp};
use crate::config::DEFAULT_BATCH_SIZE;
use crate::error::StoreError;
use crate::value::{Document, Fields};

/// Document store held entirely in memory.
///
/// Documents within a collection are listed in id order.
pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Fields>>>,
    max_batch_size: usize,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::with_max_batch_size(DEFAULT_BATCH_SIZE)
    }

    /// Create an empty store with a custom batch limit.
    pub fn with_max_batch_size(max_batch_size: usize) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            max_batch_size: max_batch_size.max(1),
        }
    }

    /// Insert a document directly, bypassing batching.
    pub fn insert(&self, collection: &str, id: impl Into<String>, fields: Fields) {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id.into(), fields);
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Check if a collection is empty.
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Copy of every non-empty collection, keyed by name.
    pub fn snapshot(&self) -> BTreeMap<String, BTreeMap<String, Fields>> {
        self.collections
            .read()
            .iter()
            .filter(|(_, docs)| !docs.is_empty())
            .map(|(name, docs)| (name.clone(), docs.clone()))
            .collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryStore {
    fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    fn commit(&self, collection: &str, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        if ops.len() > self.max_batch_size {
            return Err(StoreError::BatchTooLarge {
                size: ops.len(),
                max: self.max_batch_size,
            });
        }
        let mut collections = self.collections.write();
        let docs = collections.entry(collection.to_string()).or_default();
        apply_ops(collection, docs, ops)
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}
