//! Pipeline-level error types.
//!
//! Only a handful of conditions abort a run; everything the annotation
//! service can do wrong is absorbed inside the client and never surfaces
//! here. See `pipeline::client::TransportError` and
//! `pipeline::recover::RecoveryError` for the absorbed leaf errors.

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// The source corpus could not be opened or read. Fatal: corpus
    /// integrity is an external precondition.
    #[error("source corpus unreadable: {0}")]
    Source(io::Error),

    /// The primary or metadata output could not be written or synced.
    #[error("output write failed: {0}")]
    Output(io::Error),

    /// The checkpoint file could not be written. Load-side corruption is
    /// NOT an error (it resets to -1); only a failed save aborts, because
    /// continuing would break resume correctness.
    #[error("checkpoint write failed: {0}")]
    Checkpoint(io::Error),

    /// A worker thread disappeared without reporting a result.
    #[error("worker panicked")]
    WorkerPanic,

    /// An earlier commit failed; no further output or checkpoint writes
    /// are allowed in this run.
    #[error("run aborted after an earlier write failure")]
    Aborted,
}
