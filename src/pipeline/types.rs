//! Shared data model for the phrase-filter pipeline.

use serde::Serialize;

/// One line read from the source corpus.
///
/// `offset` is the 0-based physical line number in the source file and is
/// unique across the whole run; it is what the checkpoint records. The text
/// is immutable once read and already truncated to the configured maximum
/// line length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub offset: u64,
    pub text: String,
}

/// One item inside a batch, addressed by its batch-local id.
///
/// `local_id` restarts at 0 for every batch — it is what the annotation
/// service sees and echoes back, NOT the source offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub local_id: usize,
    pub text: String,
}

/// A sealed group of source lines submitted together to the service.
///
/// `source_offsets` runs parallel to `items`: `source_offsets[i]` is the
/// corpus offset of `items[i]`.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub items: Vec<BatchItem>,
    pub source_offsets: Vec<u64>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Highest source offset in the batch. Offsets are pushed in ascending
    /// order, so this is the last one.
    pub fn last_offset(&self) -> Option<u64> {
        self.source_offsets.last().copied()
    }
}

/// Per-line verdict returned by the annotation service.
///
/// `clean` is only meaningful when `keep` is true. `reason` is present for
/// service variants that justify the verdict instead of cleaning the text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Decision {
    pub keep: bool,
    pub clean: String,
    pub reason: Option<String>,
}

impl Decision {
    /// The verdict used for every item the service failed to address.
    pub fn discard() -> Self {
        Self::default()
    }
}

/// An accepted phrase, ready for the output writer.
///
/// Serializes to one JSONL metadata record with the field names the
/// downstream flashcard tooling expects.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OutputRecord {
    #[serde(rename = "line_no")]
    pub source_offset: u64,
    #[serde(rename = "orig")]
    pub original_text: String,
    pub clean: String,
    #[serde(rename = "llm_reason", skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub llm_keep: bool,
}

impl OutputRecord {
    pub fn new(source_offset: u64, original_text: String, decision: Decision) -> Self {
        Self {
            source_offset,
            original_text,
            clean: decision.clean,
            reason: decision.reason,
            llm_keep: true,
        }
    }
}

/// Which output contract the annotation service was prompted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// JSON array of `{"id": N, "keep": bool, "clean": "..."}` objects.
    #[default]
    Json,
    /// One `id<TAB>clean_text` (or `id<TAB>-`) line per item.
    Plain,
}
