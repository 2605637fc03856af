//! Crash-safe checkpoint store.
//!
//! Persists the highest source offset whose batch has been fully written
//! to output. Saved with write-to-temp + atomic rename so a crash
//! mid-write never leaves a torn checkpoint visible. A missing or corrupt
//! file reads as -1 (start from the beginning) — never an error.
//!
//! One manager instance owns one checkpoint file; there is no locking, so
//! two pipeline processes must not share a checkpoint path.

use std::fs;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
struct CheckpointRecord {
    last_line: i64,
}

#[derive(Debug, Clone)]
pub struct CheckpointManager {
    path: PathBuf,
}

impl CheckpointManager {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Offset of the last fully-processed source line, or -1 when there is
    /// no usable checkpoint. Corruption resets to -1 rather than failing:
    /// re-running from the start is always safe, silently skipping is not.
    pub fn load(&self) -> i64 {
        let Ok(text) = fs::read_to_string(&self.path) else {
            return -1;
        };
        match serde_json::from_str::<CheckpointRecord>(&text) {
            Ok(rec) => rec.last_line,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "corrupt checkpoint, restarting from the beginning");
                -1
            }
        }
    }

    /// Atomically replace the checkpoint with `last_line`.
    ///
    /// Callers must only invoke this after the corresponding output has
    /// been flushed and fsynced; that ordering is the crash-safety
    /// invariant of the whole pipeline.
    pub fn save(&self, last_line: i64) -> io::Result<()> {
        let tmp = self.path.with_extension("tmp");
        let body = serde_json::to_string(&CheckpointRecord { last_line })?;
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
