//! Document store abstraction.
//!
//! The engine treats the datastore as an opaque collection/document store.
//! A [`DocumentStore`] exposes reads over whole collections or single
//! documents, and atomic batched writes.

mod batch;
mod memory;
mod sled_store;

pub use batch::{BatchStats, WriteBatcher};
pub use memory::MemoryStore;
pub use sled_store::SledStore;

use std::collections::BTreeMap;

use crate::config::DEFAULT_BATCH_SIZE;
use crate::error::StoreError;
use crate::value::{Document, Fields};

/// A single write operation inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create or fully overwrite a document.
    Set {
        /// Document id.
        id: String,
        /// New body.
        fields: Fields,
    },
    /// Merge fields into an existing document.
    Update {
        /// Document id.
        id: String,
        /// Fields to overwrite or add.
        fields: Fields,
    },
    /// Remove a document. Removing a missing document is not an error.
    Delete {
        /// Document id.
        id: String,
    },
}

impl WriteOp {
    /// Create a set operation.
    pub fn set(id: impl Into<String>, fields: Fields) -> Self {
        WriteOp::Set {
            id: id.into(),
            fields,
        }
    }

    /// Create an update operation.
    pub fn update(id: impl Into<String>, fields: Fields) -> Self {
        WriteOp::Update {
            id: id.into(),
            fields,
        }
    }

    /// Create a delete operation.
    pub fn delete(id: impl Into<String>) -> Self {
        WriteOp::Delete { id: id.into() }
    }

    /// Target document id.
    pub fn id(&self) -> &str {
        match self {
            WriteOp::Set { id, .. } | WriteOp::Update { id, .. } | WriteOp::Delete { id } => id,
        }
    }
}

/// Collection accessor consumed by every engine component.
pub trait DocumentStore: Send + Sync {
    /// All documents of a collection. Missing collections are empty.
    fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    /// A single document, if present.
    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Apply a batch of operations atomically.
    ///
    /// Either every operation is applied or none is.
    fn commit(&self, collection: &str, ops: Vec<WriteOp>) -> Result<(), StoreError>;

    /// Largest batch [`commit`](Self::commit) accepts.
    fn max_batch_size(&self) -> usize {
        DEFAULT_BATCH_SIZE
    }
}

impl<S: DocumentStore + ?Sized> DocumentStore for std::sync::Arc<S> {
    fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        (**self).list(collection)
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        (**self).get(collection, id)
    }

    fn commit(&self, collection: &str, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        (**self).commit(collection, ops)
    }

    fn max_batch_size(&self) -> usize {
        (**self).max_batch_size()
    }
}

/// Apply `ops` to a map of documents, failing without side effects if any
/// update targets a missing document.
///
/// Only the documents touched by `ops` are staged; `None` marks a deletion.
pub(crate) fn apply_ops(
    collection: &str,
    docs: &mut BTreeMap<String, Fields>,
    ops: Vec<WriteOp>,
) -> Result<(), StoreError> {
    let mut staged: BTreeMap<String, Option<Fields>> = BTreeMap::new();
    for op in ops {
        match op {
            WriteOp::Set { id, fields } => {
                staged.insert(id, Some(fields));
            }
            WriteOp::Update { id, fields } => {
                let current = match staged.remove(&id) {
                    Some(entry) => entry,
                    None => docs.get(&id).cloned(),
                };
                match current {
                    Some(mut existing) => {
                        existing.extend(fields);
                        staged.insert(id, Some(existing));
                    }
                    None => {
                        return Err(StoreError::NotFound {
                            collection: collection.to_string(),
                            id,
                        })
                    }
                }
            }
            WriteOp::Delete { id } => {
                staged.insert(id, None);
            }
        }
    }
    for (id, entry) in staged {
        match entry {
            Some(fields) => {
                docs.insert(id, fields);
            }
            None => {
                docs.remove(&id);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{fields, Value};
    use pretty_assertions::assert_eq;

    fn docs() -> BTreeMap<String, Fields> {
        let mut docs = BTreeMap::new();
        docs.insert("a".to_string(), fields([("n", 1)]));
        docs.insert("b".to_string(), fields([("n", 2)]));
        docs
    }

    #[test]
    fn test_apply_ops_stages_touched_documents() {
        let mut current = docs();
        apply_ops(
            "c",
            &mut current,
            vec![
                WriteOp::set("c", fields([("n", 3)])),
                WriteOp::update("c", fields([("m", 4)])),
                WriteOp::update("a", fields([("m", 5)])),
                WriteOp::delete("missing"),
            ],
        )
        .unwrap();

        assert_eq!(current.len(), 3);
        assert_eq!(current["a"], fields([("n", 1), ("m", 5)]));
        assert_eq!(current["b"], fields([("n", 2)]));
        assert_eq!(current["c"], fields([("n", 3), ("m", 4)]));
    }

    #[test]
    fn test_apply_ops_update_after_delete_fails_atomically() {
        let mut current = docs();
        let err = apply_ops(
            "c",
            &mut current,
            vec![
                WriteOp::set("a", fields([("n", Value::Null)])),
                WriteOp::delete("b"),
                WriteOp::update("b", fields([("n", 9)])),
            ],
        )
        .unwrap_err();

        assert!(matches!(err, StoreError::NotFound { ref id, .. } if id == "b"));
        assert_eq!(current, docs());
    }
}
