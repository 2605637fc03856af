//! Resumable LLM batch annotation for short-phrase corpora.
//!
//! A line corpus goes in; an order-preserving, crash-safe filter run
//! comes out: batches of phrases are sent to an OpenAI-compatible chat
//! endpoint, the (often malformed) responses are recovered into per-item
//! keep/clean decisions, and accepted phrases are appended to a text
//! corpus plus a JSONL metadata log. A checkpoint written only after
//! fsync makes any interrupted run resumable with no duplicates.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod preclean;

pub use config::{FilterConfig, SplitConfig};
pub use error::PipelineError;
pub use pipeline::runner::{run_filter, RunSummary};
pub use preclean::run_split;

use tracing_subscriber::EnvFilter;

/// Initialize tracing for the CLI. `RUST_LOG` wins when set.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
