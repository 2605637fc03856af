use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};

use fraseclean::pipeline::types::ResponseFormat;
use fraseclean::{run_filter, run_split, FilterConfig, SplitConfig};

#[derive(Parser)]
#[command(name = "fraseclean", version, about = "Resumable LLM filtering of short-phrase corpora")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Annotate a line corpus through an OpenAI-compatible endpoint,
    /// keeping phrases the model accepts. Resumes from the checkpoint.
    Filter {
        /// Source corpus, one phrase per line.
        #[arg(long)]
        source: PathBuf,
        /// Output: accepted clean phrases, one per line.
        #[arg(long)]
        out_text: PathBuf,
        /// Output: JSONL metadata, one record per accepted phrase.
        #[arg(long)]
        out_meta: PathBuf,
        /// Checkpoint file for crash-safe resume.
        #[arg(long)]
        checkpoint: PathBuf,
        /// OpenAI-compatible service root.
        #[arg(long, default_value = "http://localhost:8000/v1")]
        base_url: String,
        /// Bearer token; local deployments accept any value.
        #[arg(long, default_value = "dummy-key")]
        api_key: String,
        /// Model identifier as served.
        #[arg(long, default_value = "models/qwen25-15b")]
        model: String,
        /// Worker threads; above 1 batches run concurrently.
        #[arg(long, default_value_t = 1)]
        workers: usize,
        /// Max items per batch.
        #[arg(long, default_value_t = fraseclean::config::DEFAULT_BATCH_MAX_ITEMS)]
        batch_size: usize,
        /// Max cumulative characters per batch.
        #[arg(long, default_value_t = fraseclean::config::DEFAULT_BATCH_MAX_CHARS)]
        max_batch_chars: usize,
        /// Per-line character clamp.
        #[arg(long, default_value_t = fraseclean::config::DEFAULT_MAX_LINE_CHARS)]
        max_line_chars: usize,
        /// Seconds between transport retries.
        #[arg(long, default_value_t = 5)]
        retry_delay: u64,
        /// Ask for TAB-delimited responses instead of JSON.
        #[arg(long)]
        plain: bool,
        /// Discard a whole failed batch instead of re-asking per item.
        #[arg(long)]
        no_per_item_fallback: bool,
    },
    /// Soft-clean a raw subtitle dump and split it into shards by word
    /// count (1w..5w and 6plusw).
    Split {
        /// Raw subtitle dump.
        #[arg(long)]
        source: PathBuf,
        /// Directory for the shards.
        #[arg(long)]
        out_dir: PathBuf,
        /// Shard filename prefix.
        #[arg(long, default_value = "es")]
        prefix: String,
    },
}

fn main() -> ExitCode {
    fraseclean::init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Filter {
            source,
            out_text,
            out_meta,
            checkpoint,
            base_url,
            api_key,
            model,
            workers,
            batch_size,
            max_batch_chars,
            max_line_chars,
            retry_delay,
            plain,
            no_per_item_fallback,
        } => {
            let mut config = FilterConfig::new(source, out_text, out_meta, checkpoint);
            config.base_url = base_url;
            config.api_key = api_key;
            config.model = model;
            config.workers = workers.max(1);
            config.batch_max_items = batch_size.max(1);
            config.batch_max_chars = max_batch_chars.max(1);
            config.max_line_chars = max_line_chars.max(1);
            config.retry_delay = Duration::from_secs(retry_delay);
            config.per_item_fallback = !no_per_item_fallback;
            if plain {
                config.response_format = ResponseFormat::Plain;
            }
            run_filter(&config).map(|summary| {
                tracing::info!(
                    batches = summary.batches,
                    submitted = summary.submitted,
                    kept = summary.kept,
                    "done"
                );
            })
        }
        Command::Split { source, out_dir, prefix } => {
            let config = SplitConfig { source, out_dir, prefix };
            run_split(&config).map(|summary| {
                tracing::info!(total = summary.total, kept = summary.kept, "done");
            })
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            ExitCode::FAILURE
        }
    }
}
