//! Multi-level recovery of decisions from a free-text service response.
//!
//! The service is asked for a JSON array with one entry per submitted
//! item, but in practice returns it wrapped in prose, truncated mid-array
//! by the token limit, or (in plain mode) as `id<TAB>text` lines. Recovery
//! runs an ordered ladder of pure strategies and stops at the first one
//! that yields entries. Items the service never addressed are simply
//! absent from the result; the client layer defaults them to discard.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use super::types::{Decision, ResponseFormat};

/// Flat JSON objects with no nested braces, for strategy 3.
static FLAT_OBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^{}]*\}").unwrap());

/// `id` then whitespace then the rest, for the plain format.
static PLAIN_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s+(.+?)\s*$").unwrap());

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("no decisions recoverable from response, first 200 chars: {0:?}")]
    Unrecoverable(String),
}

impl RecoveryError {
    fn from_response(raw: &str) -> Self {
        let head: String = raw.chars().take(200).collect();
        Self::Unrecoverable(head)
    }
}

/// One entry as the service writes it. Unknown fields are ignored;
/// `clean` and `reason` cover the two rubric variants in use.
#[derive(Deserialize)]
struct WireEntry {
    id: i64,
    #[serde(default)]
    keep: bool,
    #[serde(default)]
    clean: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// Extract per-item decisions from a raw response body.
///
/// `expected` is the submitted item count; entries with ids outside
/// `0..expected` are dropped. The result maps batch-local id to decision
/// and may be missing ids — never larger than `expected`.
pub fn recover_decisions(
    raw: &str,
    expected: usize,
    format: ResponseFormat,
) -> Result<HashMap<usize, Decision>, RecoveryError> {
    match format {
        ResponseFormat::Json => recover_json(raw, expected),
        ResponseFormat::Plain => {
            let map = parse_plain(raw, expected);
            if map.is_empty() {
                Err(RecoveryError::from_response(raw))
            } else {
                Ok(map)
            }
        }
    }
}

fn recover_json(raw: &str, expected: usize) -> Result<HashMap<usize, Decision>, RecoveryError> {
    let s = strip_leading_prose(raw.trim());

    let entries = parse_verbatim(s)
        .or_else(|| close_truncated_array(s))
        .or_else(|| collect_flat_objects(s))
        .ok_or_else(|| RecoveryError::from_response(raw))?;

    Ok(to_decisions(entries, expected))
}

/// Strategy 0: the array often opens after some prose; drop everything
/// before the first `[`. If there is no bracket at all, leave the text
/// alone and let the ladder fail on it.
fn strip_leading_prose(s: &str) -> &str {
    match s.find('[') {
        Some(i) if i > 0 => &s[i..],
        _ => s,
    }
}

/// Strategy 1: the response parses as-is.
fn parse_verbatim(s: &str) -> Option<Vec<serde_json::Value>> {
    serde_json::from_str(s).ok()
}

/// Strategy 2: the array was cut off mid-stream. Keep everything up to
/// the last complete `}`, close the array, reparse. Recovers every full
/// record and drops the partial one.
fn close_truncated_array(s: &str) -> Option<Vec<serde_json::Value>> {
    let last_brace = s.rfind('}')?;
    let mut candidate = s[..=last_brace].to_string();
    if !candidate.trim_end().ends_with(']') {
        candidate.push(']');
    }
    serde_json::from_str(&candidate).ok()
}

/// Strategy 3: no array structure survives; harvest every flat `{...}`
/// object and parse them as a synthetic array.
fn collect_flat_objects(s: &str) -> Option<Vec<serde_json::Value>> {
    let objs: Vec<&str> = FLAT_OBJECT_RE.find_iter(s).map(|m| m.as_str()).collect();
    if objs.is_empty() {
        return None;
    }
    let candidate = format!("[{}]", objs.join(","));
    serde_json::from_str(&candidate).ok()
}

/// Convert raw entries leniently: an entry that fails to deserialize or
/// carries an out-of-range id is skipped, never poisoning its neighbors.
fn to_decisions(entries: Vec<serde_json::Value>, expected: usize) -> HashMap<usize, Decision> {
    let mut out = HashMap::new();
    for value in entries {
        let Ok(entry) = serde_json::from_value::<WireEntry>(value) else {
            continue;
        };
        if entry.id < 0 || entry.id as usize >= expected {
            continue;
        }
        let clean = entry.clean.as_deref().unwrap_or("").trim().to_string();
        out.insert(
            entry.id as usize,
            Decision {
                keep: entry.keep,
                clean,
                reason: entry.reason,
            },
        );
    }
    out
}

/// Plain-format parser: one `id<TAB>clean_text` line per item, TAB or
/// runs of spaces both accepted. `-` or empty text means discard.
fn parse_plain(raw: &str, expected: usize) -> HashMap<usize, Decision> {
    let mut out = HashMap::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let Some(caps) = PLAIN_LINE_RE.captures(line) else {
            continue;
        };
        let Ok(id) = caps[1].parse::<usize>() else {
            continue;
        };
        if id >= expected {
            continue;
        }
        let text = caps[2].trim();
        let decision = if text.is_empty() || text == "-" {
            Decision::discard()
        } else {
            Decision {
                keep: true,
                clean: text.to_string(),
                reason: None,
            }
        };
        out.insert(id, decision);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recover(raw: &str, expected: usize) -> HashMap<usize, Decision> {
        recover_decisions(raw, expected, ResponseFormat::Json).unwrap()
    }

    #[test]
    fn well_formed_array_parses_verbatim() {
        let raw = r#"[
            {"id": 0, "keep": true, "clean": "no pasa nada"},
            {"id": 1, "keep": false, "clean": ""}
        ]"#;
        let map = recover(raw, 2);
        assert_eq!(map.len(), 2);
        assert!(map[&0].keep);
        assert_eq!(map[&0].clean, "no pasa nada");
        assert!(!map[&1].keep);
    }

    #[test]
    fn leading_prose_is_stripped_before_the_array() {
        let raw = "Claro, aquí está el JSON:\n[{\"id\": 0, \"keep\": true, \"clean\": \"te quiero mucho\"}]";
        let map = recover(raw, 1);
        assert_eq!(map[&0].clean, "te quiero mucho");
    }

    #[test]
    fn truncated_array_recovers_complete_records_only() {
        // Token limit hit mid-third-record: strategy 2 keeps the two
        // complete records and drops the partial one.
        let raw = r#"[
            {"id": 0, "keep": true, "clean": "vamos a casa"},
            {"id": 1, "keep": false, "clean": ""},
            {"id": 2, "keep": true, "cle"#;
        let map = recover(raw, 3);
        assert_eq!(map.len(), 2);
        assert!(map[&0].keep);
        assert!(!map.contains_key(&2));
    }

    #[test]
    fn flat_objects_in_prose_are_harvested() {
        let raw = "Primera: {\"id\": 0, \"keep\": true, \"clean\": \"hasta luego\"}\n\
                   Segunda: {\"id\": 1, \"keep\": false, \"clean\": \"\"} y nada más.";
        let map = recover(raw, 2);
        assert_eq!(map.len(), 2);
        assert_eq!(map[&0].clean, "hasta luego");
    }

    #[test]
    fn pure_prose_is_unrecoverable() {
        let err = recover_decisions("Lo siento, no puedo ayudar con eso.", 4, ResponseFormat::Json)
            .unwrap_err();
        let RecoveryError::Unrecoverable(head) = err;
        assert!(head.starts_with("Lo siento"));
    }

    #[test]
    fn malformed_entry_does_not_poison_neighbors() {
        let raw = r#"[
            {"id": 0, "keep": true, "clean": "buenos días"},
            {"keep": true, "clean": "sin id"},
            {"id": "uno", "keep": true},
            {"id": 1, "keep": false}
        ]"#;
        let map = recover(raw, 2);
        assert_eq!(map.len(), 2);
        assert!(map[&0].keep);
        assert!(!map[&1].keep);
    }

    #[test]
    fn out_of_range_ids_are_dropped() {
        let raw = r#"[{"id": 0, "keep": true, "clean": "sí"}, {"id": 7, "keep": true, "clean": "no"}]"#;
        let map = recover(raw, 2);
        assert_eq!(map.len(), 1);
        assert!(!map.contains_key(&7));
    }

    #[test]
    fn missing_keep_defaults_to_discard() {
        let raw = r#"[{"id": 0, "clean": "algo"}]"#;
        let map = recover(raw, 1);
        assert!(!map[&0].keep);
    }

    #[test]
    fn reason_field_is_carried_through() {
        let raw = r#"[{"id": 0, "keep": true, "reason": "réplica corta útil"}]"#;
        let map = recover(raw, 1);
        assert_eq!(map[&0].reason.as_deref(), Some("réplica corta útil"));
        assert_eq!(map[&0].clean, "");
    }

    #[test]
    fn clean_text_is_trimmed() {
        let raw = r#"[{"id": 0, "keep": true, "clean": "  no pasa nada  "}]"#;
        assert_eq!(recover(raw, 1)[&0].clean, "no pasa nada");
    }

    #[test]
    fn plain_format_parses_tab_and_space_separators() {
        let raw = "0\tno pasa nada\n1   -\n2\tvamos a casa\n";
        let map = recover_decisions(raw, 3, ResponseFormat::Plain).unwrap();
        assert!(map[&0].keep);
        assert_eq!(map[&0].clean, "no pasa nada");
        assert!(!map[&1].keep);
        assert!(map[&2].keep);
    }

    #[test]
    fn plain_format_ignores_garbage_lines_and_bad_ids() {
        let raw = "Frases:\n0\tte quiero mucho\n99\tfuera de rango\nx\tno id\n";
        let map = recover_decisions(raw, 2, ResponseFormat::Plain).unwrap();
        assert_eq!(map.len(), 1);
        assert!(map[&0].keep);
    }

    #[test]
    fn plain_format_with_nothing_usable_is_an_error() {
        assert!(recover_decisions("sin nada útil", 2, ResponseFormat::Plain).is_err());
    }

    #[test]
    fn verbatim_strategy_alone_handles_well_formed_input() {
        // The ladder must not alter decisions a plain parse already gets
        // right: strategy 1 output and full-ladder output are identical.
        let raw = r#"[{"id": 0, "keep": true, "clean": "qué tal"}]"#;
        let direct = parse_verbatim(raw).unwrap();
        assert_eq!(to_decisions(direct, 1), recover(raw, 1));
    }
}
