//! Durable output: clean-phrase corpus plus JSONL metadata.
//!
//! Both files are append-only during a run. `sync` flushes and fsyncs
//! both; the runner calls it before every checkpoint save, which is what
//! makes the checkpoint value trustworthy after a crash.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use super::types::OutputRecord;

pub struct OutputWriter {
    text: BufWriter<File>,
    meta: BufWriter<File>,
}

impl OutputWriter {
    /// Open both outputs. `append` continues an interrupted run; a fresh
    /// run truncates. Parent directories are created as needed.
    pub fn open(text_path: &Path, meta_path: &Path, append: bool) -> io::Result<Self> {
        Ok(Self {
            text: BufWriter::new(open_output(text_path, append)?),
            meta: BufWriter::new(open_output(meta_path, append)?),
        })
    }

    /// Append one batch worth of accepted records: a clean phrase per
    /// line in the corpus, a JSON record per phrase in the metadata log.
    pub fn write_batch(&mut self, records: &[OutputRecord]) -> io::Result<()> {
        for record in records {
            self.text.write_all(record.clean.as_bytes())?;
            self.text.write_all(b"\n")?;

            let meta = serde_json::to_string(record)?;
            self.meta.write_all(meta.as_bytes())?;
            self.meta.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Flush and fsync both files.
    pub fn sync(&mut self) -> io::Result<()> {
        self.text.flush()?;
        self.text.get_ref().sync_all()?;
        self.meta.flush()?;
        self.meta.get_ref().sync_all()?;
        Ok(())
    }
}

fn open_output(path: &Path, append: bool) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
}
