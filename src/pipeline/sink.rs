//! Order-preserving reassembly of out-of-order batch completions.
//!
//! Concurrent workers finish batches in arbitrary order, but the output
//! corpus and the checkpoint must reflect a single monotonic consumption
//! of the source. Completions are parked by batch index and drained
//! contiguously from a `next_to_write` cursor. The structure is pure
//! data; concurrent callers wrap it in a Mutex.

use std::collections::BTreeMap;

use super::types::OutputRecord;

/// Everything the writer needs from one finished batch.
#[derive(Debug, Clone)]
pub struct BatchOutput {
    /// Accepted records, in source order within the batch.
    pub records: Vec<OutputRecord>,
    /// Highest source offset the batch consumed (kept or not) — what the
    /// checkpoint advances to once this batch is durably written.
    pub last_offset: u64,
    /// Submitted item count, for keep/total reporting.
    pub total: usize,
}

#[derive(Debug, Default)]
pub struct OrderedSink {
    pending: BTreeMap<u64, BatchOutput>,
    next_to_write: u64,
}

impl OrderedSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a completion and return every batch that is now
    /// contiguously ready, in ascending index order. Usually empty or a
    /// single element; longer runs appear when a slow early batch was
    /// holding back finished later ones.
    pub fn push(&mut self, batch_index: u64, output: BatchOutput) -> Vec<BatchOutput> {
        self.pending.insert(batch_index, output);
        let mut ready = Vec::new();
        while let Some(output) = self.pending.remove(&self.next_to_write) {
            ready.push(output);
            self.next_to_write += 1;
        }
        ready
    }

    /// Completions parked behind a missing earlier index.
    pub fn parked(&self) -> usize {
        self.pending.len()
    }

    /// Index the next drain will start at.
    pub fn next_to_write(&self) -> u64 {
        self.next_to_write
    }
}
