//! Soft pre-cleaning of raw subtitle dumps, split by word count.
//!
//! "Soft" means punctuation and case survive; only markup artifacts go:
//! control characters, HTML tags, SRT timecodes, URLs. The annotation
//! stage downstream needs the original register, so nothing semantic is
//! touched here. Lines land in one of six files by word count (1..5 and
//! 6+), which lets a run target just the phrase lengths it cares about.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::SplitConfig;
use crate::error::PipelineError;

static CONTROL_CHARS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\u{0000}-\u{001F}\u{007F}\u{200B}\u{200C}\u{200D}\u{200E}\u{200F}\u{202A}-\u{202E}]")
        .unwrap()
});

// Crude on purpose: subtitle markup is never well-formed HTML.
static HTML_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

// SRT timecodes: 00:00:01,000 --> 00:00:04,000
static TIMECODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{1,2}:\d{2}:\d{2}[,\.]\d{2,3}\s*-->\s*\d{1,2}:\d{2}:\d{2}[,\.]\d{2,3}").unwrap()
});

static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+|www\.\S+").unwrap());

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

// A word is a run of Latin letters including Spanish accents.
static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-zÁÉÍÓÚÜÑáéíóúüñÇç]+").unwrap());

/// Strip markup artifacts and collapse whitespace, keeping punctuation
/// and case intact. Returns an empty string when nothing textual remains.
pub fn soft_clean_line(line: &str) -> String {
    let line = line.trim_end_matches(['\n', '\r']);
    if line.is_empty() {
        return String::new();
    }

    let line = CONTROL_CHARS_RE.replace_all(line, "");
    let line = HTML_TAG_RE.replace_all(&line, " ");
    let line = TIMECODE_RE.replace_all(&line, " ");
    let line = URL_RE.replace_all(&line, " ");
    let line = WHITESPACE_RE.replace_all(&line, " ");

    line.trim().to_string()
}

/// Count words as runs of letters. Numbers and bare symbols don't count.
pub fn count_words(line: &str) -> usize {
    WORD_RE.find_iter(line).count()
}

/// Line totals for one split run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SplitSummary {
    pub total: u64,
    pub kept: u64,
}

/// Stream the source file through the soft cleaner and route each
/// surviving line into `{prefix}.{n}w.soft.txt` (n in 1..=5) or
/// `{prefix}.6plusw.soft.txt` under the output directory.
pub fn run_split(config: &SplitConfig) -> Result<SplitSummary, PipelineError> {
    fs::create_dir_all(&config.out_dir).map_err(PipelineError::Output)?;

    let source = File::open(&config.source).map_err(PipelineError::Source)?;
    let mut reader = BufReader::new(source);

    let mut outputs: Vec<BufWriter<File>> = Vec::with_capacity(6);
    for path in output_paths(config) {
        let file = File::create(&path).map_err(PipelineError::Output)?;
        outputs.push(BufWriter::new(file));
    }

    let mut summary = SplitSummary::default();
    let mut buf = String::new();
    loop {
        buf.clear();
        // Raw dumps carry invalid UTF-8 now and then; replace and move on.
        let n = read_line_lossy(&mut reader, &mut buf).map_err(PipelineError::Source)?;
        if n == 0 {
            break;
        }
        summary.total += 1;

        let cleaned = soft_clean_line(&buf);
        if cleaned.is_empty() {
            continue;
        }
        let words = count_words(&cleaned);
        if words == 0 {
            continue;
        }
        summary.kept += 1;

        let bucket = words.min(6) - 1;
        let out = &mut outputs[bucket];
        out.write_all(cleaned.as_bytes()).map_err(PipelineError::Output)?;
        out.write_all(b"\n").map_err(PipelineError::Output)?;
    }

    for out in &mut outputs {
        out.flush().map_err(PipelineError::Output)?;
    }

    tracing::info!(total = summary.total, kept = summary.kept, "split complete");
    Ok(summary)
}

/// Output files in bucket order: 1w..5w then 6plusw.
pub fn output_paths(config: &SplitConfig) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = (1..=5)
        .map(|n| config.out_dir.join(format!("{}.{n}w.soft.txt", config.prefix)))
        .collect();
    paths.push(config.out_dir.join(format!("{}.6plusw.soft.txt", config.prefix)));
    paths
}

fn read_line_lossy<R: BufRead>(reader: &mut R, buf: &mut String) -> io::Result<usize> {
    let mut bytes = Vec::new();
    let n = reader.read_until(b'\n', &mut bytes)?;
    buf.push_str(&String::from_utf8_lossy(&bytes));
    Ok(n)
}
