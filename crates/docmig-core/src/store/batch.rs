//! Chunked write batching with backpressure.

use std::time::Duration;

use super::{DocumentStore, WriteOp};
use crate::error::StoreError;

/// Counters reported when a batcher is finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Operations committed.
    pub ops: usize,
    /// Batches committed.
    pub batches: usize,
}

/// Accumulates write operations for one collection and commits them in
/// batches of at most `batch_size`.
///
/// After every full batch the batcher sleeps for `delay` to stay under the
/// datastore's write-throughput limits. The final partial batch is committed
/// by [`finish`](Self::finish) without a pause.
pub struct WriteBatcher<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
    collection: String,
    batch_size: usize,
    delay: Duration,
    pending: Vec<WriteOp>,
    stats: BatchStats,
}

impl<'a, S: DocumentStore + ?Sized> WriteBatcher<'a, S> {
    /// Create a batcher. The batch size is clamped to the store's maximum.
    pub fn new(store: &'a S, collection: &str, batch_size: usize, delay: Duration) -> Self {
        let batch_size = batch_size.clamp(1, store.max_batch_size().max(1));
        Self {
            store,
            collection: collection.to_string(),
            batch_size,
            delay,
            pending: Vec::with_capacity(batch_size),
            stats: BatchStats::default(),
        }
    }

    /// Queue an operation, committing if the batch is full.
    pub fn push(&mut self, op: WriteOp) -> Result<(), StoreError> {
        self.pending.push(op);
        if self.pending.len() >= self.batch_size {
            self.flush()?;
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
        }
        Ok(())
    }

    /// Commit whatever is pending and return the totals.
    pub fn finish(mut self) -> Result<BatchStats, StoreError> {
        self.flush()?;
        Ok(self.stats)
    }

    /// Effective batch size after clamping.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let ops = std::mem::replace(&mut self.pending, Vec::with_capacity(self.batch_size));
        let count = ops.len();
        self.store.commit(&self.collection, ops)?;
        self.stats.ops += count;
        self.stats.batches += 1;
        tracing::debug!(
            collection = %self.collection,
            batch = self.stats.batches,
            ops = count,
            total = self.stats.ops,
            "Committed batch"
        );
        Ok(())
    }
}
