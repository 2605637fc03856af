//! Run configuration for the filter and split pipelines.
//!
//! Defaults mirror the tuned production values for the 3-word Spanish
//! corpus: batches sized so a full request stays inside the service's
//! fixed input-token budget, lines clamped so a single pathological
//! subtitle cannot blow up a batch.

use std::path::PathBuf;
use std::time::Duration;

use crate::pipeline::types::ResponseFormat;

/// How many source lines go into one request, at most.
pub const DEFAULT_BATCH_MAX_ITEMS: usize = 32;
/// Cumulative character budget per batch.
pub const DEFAULT_BATCH_MAX_CHARS: usize = 900;
/// Per-line clamp, applied before batching.
pub const DEFAULT_MAX_LINE_CHARS: usize = 80;

/// Configuration for the `filter` pipeline.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Source corpus: UTF-8, one phrase per line.
    pub source: PathBuf,
    /// Primary output: one accepted clean phrase per line, append-only.
    pub out_text: PathBuf,
    /// Metadata output: JSONL, one record per accepted phrase.
    pub out_meta: PathBuf,
    /// Checkpoint file, replaced atomically after each durable write.
    pub checkpoint: PathBuf,

    /// Seal a batch when it reaches this many items...
    pub batch_max_items: usize,
    /// ...or when the accumulated text reaches this many characters,
    /// whichever happens first.
    pub batch_max_chars: usize,
    /// Truncate any source line beyond this many characters.
    pub max_line_chars: usize,

    /// OpenAI-compatible service root, e.g. `http://localhost:8000/v1`.
    pub base_url: String,
    /// Bearer token. Local vLLM deployments accept a dummy value.
    pub api_key: String,
    /// Model identifier as served, e.g. `models/qwen25-15b`.
    pub model: String,

    /// Worker threads. 1 = sequential dispatch, >1 = bounded pool with
    /// order-preserving reassembly before output.
    pub workers: usize,
    /// Fixed delay between transport retries. The transport path retries
    /// forever; an external supervisor owns the kill decision.
    pub retry_delay: Duration,
    /// Per-request HTTP timeout; a timed-out request counts as a
    /// transport failure and is retried.
    pub request_timeout: Duration,
    /// After a whole-batch recovery failure, re-ask the service one item
    /// at a time before giving the items up.
    pub per_item_fallback: bool,
    /// Which output contract the service is prompted for.
    pub response_format: ResponseFormat,
}

impl FilterConfig {
    /// Config with production limits and endpoint defaults; paths are the
    /// caller's problem.
    pub fn new(source: PathBuf, out_text: PathBuf, out_meta: PathBuf, checkpoint: PathBuf) -> Self {
        Self {
            source,
            out_text,
            out_meta,
            checkpoint,
            batch_max_items: DEFAULT_BATCH_MAX_ITEMS,
            batch_max_chars: DEFAULT_BATCH_MAX_CHARS,
            max_line_chars: DEFAULT_MAX_LINE_CHARS,
            base_url: "http://localhost:8000/v1".into(),
            api_key: "dummy-key".into(),
            model: "models/qwen25-15b".into(),
            workers: 1,
            retry_delay: Duration::from_secs(5),
            request_timeout: Duration::from_secs(120),
            per_item_fallback: true,
            response_format: ResponseFormat::Json,
        }
    }
}

/// Configuration for the `split` pre-cleaning pass.
#[derive(Debug, Clone)]
pub struct SplitConfig {
    /// Raw subtitle dump, read line by line.
    pub source: PathBuf,
    /// Directory for the word-count shards.
    pub out_dir: PathBuf,
    /// Shard filename prefix, e.g. `es` -> `es.3w.soft.txt`.
    pub prefix: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_defaults_match_production_limits() {
        let cfg = FilterConfig::new(
            "in.txt".into(),
            "out.txt".into(),
            "meta.jsonl".into(),
            "ckpt.json".into(),
        );
        assert_eq!(cfg.batch_max_items, 32);
        assert_eq!(cfg.batch_max_chars, 900);
        assert_eq!(cfg.max_line_chars, 80);
        assert_eq!(cfg.workers, 1);
        assert!(cfg.per_item_fallback);
        assert_eq!(cfg.response_format, ResponseFormat::Json);
        assert_eq!(cfg.base_url, "http://localhost:8000/v1");
    }
}
