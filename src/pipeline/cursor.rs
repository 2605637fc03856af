//! Streaming source cursor.
//!
//! Reads the corpus line by line without loading it into memory, skipping
//! everything the checkpoint already covers. Offsets count every physical
//! line — including the empty ones the cursor drops — so they stay stable
//! across runs and truncations.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use super::types::SourceLine;

pub struct SourceCursor<R> {
    reader: R,
    next_offset: u64,
    resume_from: i64,
    max_line_chars: usize,
}

impl SourceCursor<BufReader<File>> {
    /// Open the corpus file. Failure here is fatal to the run.
    pub fn open(path: &Path, resume_from: i64, max_line_chars: usize) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file), resume_from, max_line_chars))
    }
}

impl<R: BufRead> SourceCursor<R> {
    pub fn new(reader: R, resume_from: i64, max_line_chars: usize) -> Self {
        Self {
            reader,
            next_offset: 0,
            resume_from,
            max_line_chars,
        }
    }

    /// Read forward to the next line the pipeline should see.
    ///
    /// Returns `Ok(None)` at end of stream. Lines at or before the
    /// checkpoint and lines that are empty after stripping the terminator
    /// are consumed silently (their offsets are still spent).
    pub fn next_line(&mut self) -> io::Result<Option<SourceLine>> {
        let mut buf = String::new();
        loop {
            buf.clear();
            if self.reader.read_line(&mut buf)? == 0 {
                return Ok(None);
            }
            let offset = self.next_offset;
            self.next_offset += 1;

            if (offset as i64) <= self.resume_from {
                continue;
            }

            let phrase = buf.trim_end_matches(['\n', '\r']);
            if phrase.is_empty() {
                continue;
            }

            let text = truncate_chars(phrase, self.max_line_chars);
            return Ok(Some(SourceLine { offset, text }));
        }
    }
}

/// Clamp to at most `max` characters, never splitting a UTF-8 sequence.
fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((byte_idx, _)) => s[..byte_idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn cursor(input: &str, resume_from: i64) -> SourceCursor<Cursor<Vec<u8>>> {
        SourceCursor::new(Cursor::new(input.as_bytes().to_vec()), resume_from, 80)
    }

    fn drain(mut c: SourceCursor<Cursor<Vec<u8>>>) -> Vec<(u64, String)> {
        let mut out = Vec::new();
        while let Some(line) = c.next_line().unwrap() {
            out.push((line.offset, line.text));
        }
        out
    }

    #[test]
    fn yields_lines_with_physical_offsets() {
        let lines = drain(cursor("hola\nadiós\n", -1));
        assert_eq!(lines, vec![(0, "hola".into()), (1, "adiós".into())]);
    }

    #[test]
    fn empty_lines_consume_offsets_but_are_skipped() {
        let lines = drain(cursor("no pasa nada\n\nxyz123\nvamos a casa\n", -1));
        assert_eq!(
            lines,
            vec![
                (0, "no pasa nada".into()),
                (2, "xyz123".into()),
                (3, "vamos a casa".into()),
            ]
        );
    }

    #[test]
    fn resumes_strictly_past_the_checkpoint() {
        let lines = drain(cursor("a\nb\nc\nd\n", 1));
        assert_eq!(lines, vec![(2, "c".into()), (3, "d".into())]);
    }

    #[test]
    fn checkpoint_at_last_line_yields_nothing() {
        let lines = drain(cursor("a\nb\n", 1));
        assert!(lines.is_empty());
    }

    #[test]
    fn truncates_long_lines_by_characters() {
        let long = "á".repeat(100);
        let mut c = SourceCursor::new(
            Cursor::new(format!("{long}\n").into_bytes()),
            -1,
            80,
        );
        let line = c.next_line().unwrap().unwrap();
        assert_eq!(line.text.chars().count(), 80);
        assert!(line.text.chars().all(|ch| ch == 'á'));
    }

    #[test]
    fn handles_crlf_and_missing_trailing_newline() {
        let lines = drain(cursor("uno\r\ndos", -1));
        assert_eq!(lines, vec![(0, "uno".into()), (1, "dos".into())]);
    }

    #[test]
    fn truncate_chars_is_utf8_safe() {
        assert_eq!(truncate_chars("ñandú", 3), "ñan");
        assert_eq!(truncate_chars("corto", 80), "corto");
    }
}
