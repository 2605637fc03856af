//! Pipeline orchestration: cursor → batcher → dispatch → sink → writer,
//! with the checkpoint advanced only after each durable write.
//!
//! Two dispatch modes share one commit path. Sequential keeps a single
//! batch in flight, so completions arrive pre-ordered and the sink drains
//! immediately. Concurrent runs a bounded pool of worker threads, each
//! owning its own HTTP transport; completions funnel through the
//! Mutex-guarded commit state, where the sink restores source order
//! before anything touches the output files.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use crate::config::FilterConfig;
use crate::error::PipelineError;

use super::batcher::Batcher;
use super::checkpoint::CheckpointManager;
use super::client::{AnnotationClient, ChatTransport, OpenAiTransport};
use super::cursor::SourceCursor;
use super::sink::{BatchOutput, OrderedSink};
use super::types::{Batch, OutputRecord};
use super::writer::OutputWriter;

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Batches committed to output.
    pub batches: u64,
    /// Lines submitted to the service.
    pub submitted: u64,
    /// Lines accepted and written.
    pub kept: u64,
}

/// Run the filter pipeline against the real annotation endpoint.
pub fn run_filter(config: &FilterConfig) -> Result<RunSummary, PipelineError> {
    run_filter_with(config, |cfg| {
        OpenAiTransport::new(&cfg.base_url, &cfg.api_key, &cfg.model, cfg.request_timeout)
    })
}

/// Run the filter pipeline with an injected transport factory. The
/// factory is invoked once per worker so each worker owns its connection.
pub fn run_filter_with<T, F>(config: &FilterConfig, make_transport: F) -> Result<RunSummary, PipelineError>
where
    T: ChatTransport,
    F: Fn(&FilterConfig) -> T + Sync,
{
    let checkpoint = CheckpointManager::new(config.checkpoint.clone());
    let resume_from = checkpoint.load();
    tracing::info!(resume_from, workers = config.workers, "starting filter run");

    let append = resume_from >= 0 && config.out_text.exists();
    let writer = OutputWriter::open(&config.out_text, &config.out_meta, append)
        .map_err(PipelineError::Output)?;
    let cursor = SourceCursor::open(&config.source, resume_from, config.max_line_chars)
        .map_err(PipelineError::Source)?;

    let state = CommitState {
        sink: OrderedSink::new(),
        writer,
        checkpoint,
        summary: RunSummary::default(),
        failed: false,
    };

    let summary = if config.workers <= 1 {
        run_sequential(config, cursor, state, &make_transport)?
    } else {
        run_concurrent(config, cursor, state, &make_transport)?
    };

    tracing::info!(
        batches = summary.batches,
        submitted = summary.submitted,
        kept = summary.kept,
        "filter run complete"
    );
    Ok(summary)
}

/// Sink + writer + checkpoint behind one lock: the only state concurrent
/// workers share.
struct CommitState {
    sink: OrderedSink,
    writer: OutputWriter,
    checkpoint: CheckpointManager,
    summary: RunSummary,
    failed: bool,
}

impl CommitState {
    /// Register one completion. Every contiguously-ready batch is written
    /// and, after a single sync, the checkpoint advances to the highest
    /// offset of the last batch written. Nothing here runs before the
    /// corresponding bytes can survive a crash.
    ///
    /// A failed write poisons the state: the sink has already drained
    /// past the lost batch, so letting any later commit write and
    /// checkpoint would advance `last_line` over offsets that never
    /// reached disk. Once poisoned, every commit fails fast and the run
    /// aborts with the checkpoint still at its last durable value.
    fn commit(&mut self, batch_index: u64, output: BatchOutput) -> Result<(), PipelineError> {
        if self.failed {
            return Err(PipelineError::Aborted);
        }
        let result = self.write_ready(batch_index, output);
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    fn write_ready(&mut self, batch_index: u64, output: BatchOutput) -> Result<(), PipelineError> {
        let ready = self.sink.push(batch_index, output);
        if ready.is_empty() {
            return Ok(());
        }

        let mut last_offset = 0;
        for output in &ready {
            self.writer
                .write_batch(&output.records)
                .map_err(PipelineError::Output)?;
            last_offset = output.last_offset;

            self.summary.batches += 1;
            self.summary.submitted += output.total as u64;
            self.summary.kept += output.records.len() as u64;
            tracing::info!(
                batch = self.summary.batches - 1,
                kept = output.records.len(),
                total = output.total,
                "batch written"
            );
        }

        self.writer.sync().map_err(PipelineError::Output)?;
        self.checkpoint
            .save(last_offset as i64)
            .map_err(PipelineError::Checkpoint)?;
        Ok(())
    }
}

/// Annotate one batch and keep what the service accepted with a
/// non-empty clean form.
fn annotate_batch<T: ChatTransport>(client: &AnnotationClient<T>, batch: &Batch) -> BatchOutput {
    let decisions = client.annotate(batch);

    let mut records = Vec::new();
    for (item, &offset) in batch.items.iter().zip(&batch.source_offsets) {
        if let Some(decision) = decisions.get(&item.local_id) {
            if decision.keep && !decision.clean.is_empty() {
                records.push(OutputRecord::new(offset, item.text.clone(), decision.clone()));
            }
        }
    }

    BatchOutput {
        records,
        // Sealed batches are never empty.
        last_offset: batch.last_offset().unwrap_or(0),
        total: batch.len(),
    }
}

fn run_sequential<T, F>(
    config: &FilterConfig,
    mut cursor: SourceCursor<std::io::BufReader<std::fs::File>>,
    mut state: CommitState,
    make_transport: &F,
) -> Result<RunSummary, PipelineError>
where
    T: ChatTransport,
    F: Fn(&FilterConfig) -> T,
{
    let client = AnnotationClient::new(
        make_transport(config),
        config.response_format,
        config.per_item_fallback,
        config.retry_delay,
    );
    let mut batcher = Batcher::new(config.batch_max_items, config.batch_max_chars);
    let mut batch_index = 0u64;

    while let Some(line) = cursor.next_line().map_err(PipelineError::Source)? {
        if let Some(sealed) = batcher.push(line) {
            state.commit(batch_index, annotate_batch(&client, &sealed))?;
            batch_index += 1;
        }
    }
    if let Some(tail) = batcher.take_tail() {
        state.commit(batch_index, annotate_batch(&client, &tail))?;
    }

    Ok(state.summary)
}

fn run_concurrent<T, F>(
    config: &FilterConfig,
    mut cursor: SourceCursor<std::io::BufReader<std::fs::File>>,
    state: CommitState,
    make_transport: &F,
) -> Result<RunSummary, PipelineError>
where
    T: ChatTransport,
    F: Fn(&FilterConfig) -> T + Sync,
{
    let state = Mutex::new(state);
    let (tx, rx) = mpsc::sync_channel::<(u64, Batch)>(config.workers * 2);
    let rx = Arc::new(Mutex::new(rx));

    let (producer_result, worker_results) = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(config.workers);
        for _ in 0..config.workers {
            let rx = Arc::clone(&rx);
            let state = &state;
            handles.push(scope.spawn(move || -> Result<(), PipelineError> {
                let client = AnnotationClient::new(
                    make_transport(config),
                    config.response_format,
                    config.per_item_fallback,
                    config.retry_delay,
                );
                loop {
                    // Holding the lock across recv is fine: only one
                    // worker can take the next batch anyway.
                    let received = rx.lock().unwrap().recv();
                    let Ok((batch_index, batch)) = received else {
                        return Ok(());
                    };
                    let output = annotate_batch(&client, &batch);
                    state.lock().unwrap().commit(batch_index, output)?;
                }
            }));
        }

        let producer_result = feed_batches(config, &mut cursor, tx);

        let worker_results: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().map_err(|_| PipelineError::WorkerPanic)?)
            .collect();
        (producer_result, worker_results)
    });

    // Workers that hit the poisoned state report `Aborted`; surface the
    // root-cause write error instead when one exists.
    let mut aborted = false;
    for result in worker_results {
        match result {
            Ok(()) => {}
            Err(PipelineError::Aborted) => aborted = true,
            Err(e) => return Err(e),
        }
    }
    if aborted {
        return Err(PipelineError::Aborted);
    }
    producer_result?;

    Ok(state.into_inner().unwrap().summary)
}

/// Read, batch, and enqueue until end of stream. A send failure means
/// every worker has already exited; the join below surfaces why.
fn feed_batches(
    config: &FilterConfig,
    cursor: &mut SourceCursor<std::io::BufReader<std::fs::File>>,
    tx: mpsc::SyncSender<(u64, Batch)>,
) -> Result<(), PipelineError> {
    let mut batcher = Batcher::new(config.batch_max_items, config.batch_max_chars);
    let mut batch_index = 0u64;

    loop {
        match cursor.next_line() {
            Ok(Some(line)) => {
                if let Some(sealed) = batcher.push(line) {
                    if tx.send((batch_index, sealed)).is_err() {
                        return Ok(());
                    }
                    batch_index += 1;
                }
            }
            Ok(None) => break,
            Err(e) => return Err(PipelineError::Source(e)),
        }
    }
    if let Some(tail) = batcher.take_tail() {
        let _ = tx.send((batch_index, tail));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use regex::Regex;
    use tempfile::{tempdir, TempDir};

    use std::path::Path;

    use crate::pipeline::client::TransportError;
    use crate::pipeline::types::{Decision, ResponseFormat};

    fn test_config(dir: &TempDir, source_body: &str) -> FilterConfig {
        let source = dir.path().join("source.txt");
        fs::write(&source, source_body).unwrap();
        let mut cfg = FilterConfig::new(
            source,
            dir.path().join("clean.txt"),
            dir.path().join("meta.jsonl"),
            dir.path().join("ckpt.json"),
        );
        cfg.retry_delay = Duration::ZERO;
        cfg
    }

    /// Transport that plays back canned bodies in request order.
    struct PlaybackTransport {
        bodies: Vec<String>,
        cursor: AtomicUsize,
    }

    impl PlaybackTransport {
        fn new(bodies: &[&str]) -> Self {
            Self {
                bodies: bodies.iter().map(|s| s.to_string()).collect(),
                cursor: AtomicUsize::new(0),
            }
        }
    }

    impl ChatTransport for PlaybackTransport {
        fn chat(&self, _system: &str, _user: &str) -> Result<String, TransportError> {
            let i = self.cursor.fetch_add(1, Ordering::SeqCst);
            Ok(self.bodies.get(i).cloned().unwrap_or_else(|| "[]".into()))
        }
    }

    /// Transport that accepts every phrase, echoing it back lowercased.
    /// Stateless, so safe to share across any number of workers.
    struct KeepAllTransport;

    impl ChatTransport for KeepAllTransport {
        fn chat(&self, _system: &str, user: &str) -> Result<String, TransportError> {
            let line_re = Regex::new(r"(?m)^(\d+): (.+)$").unwrap();
            let entries: Vec<String> = line_re
                .captures_iter(user)
                .map(|c| {
                    format!(
                        r#"{{"id":{},"keep":true,"clean":"{}"}}"#,
                        &c[1],
                        c[2].to_lowercase()
                    )
                })
                .collect();
            Ok(format!("[{}]", entries.join(",")))
        }
    }

    #[test]
    fn filter_run_end_to_end() {
        // Source: 4 lines, one empty; batch limit 2. The service keeps
        // offsets 0 and 3 and rejects offset 2.
        let dir = tempdir().unwrap();
        let mut cfg = test_config(&dir, "no pasa nada\n\nxyz123\nvamos a casa\n");
        cfg.batch_max_items = 2;

        let transport = PlaybackTransport::new(&[
            r#"[{"id":0,"keep":true,"clean":"no pasa nada"},{"id":1,"keep":false,"clean":""}]"#,
            r#"[{"id":0,"keep":true,"clean":"vamos a casa"}]"#,
        ]);

        let summary = run_filter_with(&cfg, |_| &transport).unwrap();
        assert_eq!(summary.batches, 2);
        assert_eq!(summary.submitted, 3);
        assert_eq!(summary.kept, 2);

        let text = fs::read_to_string(&cfg.out_text).unwrap();
        assert_eq!(text, "no pasa nada\nvamos a casa\n");
        assert_eq!(
            fs::read_to_string(&cfg.checkpoint).unwrap(),
            "{\"last_line\":3}"
        );

        let meta = fs::read_to_string(&cfg.out_meta).unwrap();
        let first: serde_json::Value = serde_json::from_str(meta.lines().next().unwrap()).unwrap();
        assert_eq!(first["line_no"], 0);
        assert_eq!(first["orig"], "no pasa nada");
    }

    #[test]
    fn resumes_strictly_past_the_checkpoint() {
        let dir = tempdir().unwrap();
        let cfg = test_config(&dir, "uno\ndos\ntres\ncuatro\n");
        CheckpointManager::new(cfg.checkpoint.clone()).save(1).unwrap();
        fs::write(&cfg.out_text, "salida previa\n").unwrap();

        let summary = run_filter_with(&cfg, |_| KeepAllTransport).unwrap();
        assert_eq!(summary.submitted, 2);

        // Previous output preserved, only offsets 2 and 3 appended.
        let text = fs::read_to_string(&cfg.out_text).unwrap();
        assert_eq!(text, "salida previa\ntres\ncuatro\n");
        assert_eq!(
            fs::read_to_string(&cfg.checkpoint).unwrap(),
            "{\"last_line\":3}"
        );
    }

    #[test]
    fn finished_run_resumes_to_a_no_op() {
        let dir = tempdir().unwrap();
        let cfg = test_config(&dir, "uno\ndos\n");
        let first = run_filter_with(&cfg, |_| KeepAllTransport).unwrap();
        assert_eq!(first.submitted, 2);

        let second = run_filter_with(&cfg, |_| KeepAllTransport).unwrap();
        assert_eq!(second, RunSummary::default());
        assert_eq!(fs::read_to_string(&cfg.out_text).unwrap(), "uno\ndos\n");
    }

    #[test]
    fn poisoned_batch_is_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let mut cfg = test_config(&dir, "RUIDO\nAPLAUSOS\n");
        cfg.per_item_fallback = false;

        let transport = PlaybackTransport::new(&["ninguna estructura aquí"]);
        let summary = run_filter_with(&cfg, |_| &transport).unwrap();

        assert_eq!(summary.kept, 0);
        assert_eq!(summary.submitted, 2);
        assert_eq!(fs::read_to_string(&cfg.out_text).unwrap(), "");
        // The batch was consumed: the checkpoint still advances.
        assert_eq!(
            fs::read_to_string(&cfg.checkpoint).unwrap(),
            "{\"last_line\":1}"
        );
    }

    #[test]
    fn missing_source_is_fatal() {
        let dir = tempdir().unwrap();
        let mut cfg = test_config(&dir, "");
        cfg.source = dir.path().join("no-such-file.txt");
        let err = run_filter_with(&cfg, |_| KeepAllTransport).unwrap_err();
        assert!(matches!(err, PipelineError::Source(_)));
    }

    #[test]
    fn concurrent_output_preserves_source_order() {
        let dir = tempdir().unwrap();
        let body: String = (0..40).map(|i| format!("Frase número {i}\n")).collect();
        let mut cfg = test_config(&dir, &body);
        cfg.batch_max_items = 4;
        cfg.workers = 8;

        let summary = run_filter_with(&cfg, |_| KeepAllTransport).unwrap();
        assert_eq!(summary.submitted, 40);
        assert_eq!(summary.batches, 10);

        let expected: String = (0..40).map(|i| format!("frase número {i}\n")).collect();
        assert_eq!(fs::read_to_string(&cfg.out_text).unwrap(), expected);
        assert_eq!(
            fs::read_to_string(&cfg.checkpoint).unwrap(),
            "{\"last_line\":39}"
        );
    }

    #[test]
    fn concurrent_and_sequential_runs_produce_identical_output() {
        let body: String = (0..25).map(|i| format!("Línea {i}\n")).collect();

        let seq_dir = tempdir().unwrap();
        let seq_cfg = test_config(&seq_dir, &body);
        run_filter_with(&seq_cfg, |_| KeepAllTransport).unwrap();

        let conc_dir = tempdir().unwrap();
        let mut conc_cfg = test_config(&conc_dir, &body);
        conc_cfg.workers = 5;
        conc_cfg.batch_max_items = 3;
        run_filter_with(&conc_cfg, |_| KeepAllTransport).unwrap();

        assert_eq!(
            fs::read_to_string(&seq_cfg.out_text).unwrap(),
            fs::read_to_string(&conc_cfg.out_text).unwrap()
        );
    }

    #[test]
    fn plain_format_pipeline_end_to_end() {
        let dir = tempdir().unwrap();
        let mut cfg = test_config(&dir, "No pasa nada\nAPLAUSOS\n");
        cfg.response_format = ResponseFormat::Plain;

        let transport = PlaybackTransport::new(&["0\tno pasa nada\n1\t-"]);
        let summary = run_filter_with(&cfg, |_| &transport).unwrap();
        assert_eq!(summary.kept, 1);
        assert_eq!(fs::read_to_string(&cfg.out_text).unwrap(), "no pasa nada\n");
    }

    #[test]
    fn failed_write_poisons_later_commits() {
        // Writes to /dev/full buffer fine but fail with ENOSPC on sync.
        let dir = tempdir().unwrap();
        let full = Path::new("/dev/full");
        let writer = OutputWriter::open(full, full, true).unwrap();
        let mut state = CommitState {
            sink: OrderedSink::new(),
            writer,
            checkpoint: CheckpointManager::new(dir.path().join("ckpt.json")),
            summary: RunSummary::default(),
            failed: false,
        };

        let lost = BatchOutput {
            records: vec![OutputRecord::new(
                5,
                "No pasa nada".into(),
                Decision {
                    keep: true,
                    clean: "no pasa nada".into(),
                    reason: None,
                },
            )],
            last_offset: 5,
            total: 1,
        };
        let err = state.commit(0, lost).unwrap_err();
        assert!(matches!(err, PipelineError::Output(_)));
        assert_eq!(state.checkpoint.load(), -1);

        // The sink already drained past the lost batch; a later commit
        // must fail fast instead of checkpointing over offset 5.
        let next = BatchOutput {
            records: Vec::new(),
            last_offset: 9,
            total: 1,
        };
        let err = state.commit(1, next).unwrap_err();
        assert!(matches!(err, PipelineError::Aborted));
        assert_eq!(state.checkpoint.load(), -1);
    }

    #[test]
    fn keep_with_empty_clean_is_not_written() {
        let dir = tempdir().unwrap();
        let cfg = test_config(&dir, "algo\n");
        let transport = PlaybackTransport::new(&[r#"[{"id":0,"keep":true,"clean":""}]"#]);
        let summary = run_filter_with(&cfg, |_| &transport).unwrap();
        assert_eq!(summary.kept, 0);
        assert_eq!(fs::read_to_string(&cfg.out_text).unwrap(), "");
    }
}
