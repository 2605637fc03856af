//! Batch accumulation under dual limits.
//!
//! A batch seals when it holds `max_items` lines OR its cumulative
//! character count reaches `max_chars`, whichever comes first. The size
//! bound exists because the service has a fixed input-token budget;
//! oversized batches come back truncated or rejected. The final partial
//! batch ("tail batch") is flushed at end of stream.

use super::types::{Batch, BatchItem, SourceLine};

pub struct Batcher {
    max_items: usize,
    max_chars: usize,
    current: Batch,
    current_chars: usize,
}

impl Batcher {
    pub fn new(max_items: usize, max_chars: usize) -> Self {
        Self {
            max_items,
            max_chars,
            current: Batch::default(),
            current_chars: 0,
        }
    }

    /// Add one line. Returns the sealed batch once a limit is reached;
    /// the line that tripped the limit is inside it — assignments are
    /// never split across batches.
    pub fn push(&mut self, line: SourceLine) -> Option<Batch> {
        let local_id = self.current.items.len();
        self.current_chars += line.text.chars().count();
        self.current.items.push(BatchItem {
            local_id,
            text: line.text,
        });
        self.current.source_offsets.push(line.offset);

        if self.current.items.len() >= self.max_items || self.current_chars >= self.max_chars {
            Some(self.seal())
        } else {
            None
        }
    }

    /// Flush whatever has accumulated, if anything. Call at end of stream.
    pub fn take_tail(&mut self) -> Option<Batch> {
        if self.current.is_empty() {
            None
        } else {
            Some(self.seal())
        }
    }

    fn seal(&mut self) -> Batch {
        self.current_chars = 0;
        std::mem::take(&mut self.current)
    }
}
