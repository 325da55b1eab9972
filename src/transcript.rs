//! Transcript scanning.
//!
//! The host appends one JSON entry per turn to a line-oriented transcript
//! file. The controller only ever needs the most recent agent-authored
//! output: scan every line, keep the last one whose `message.role` is
//! `assistant`, and join its text segments. Malformed lines are skipped —
//! the transcript is produced by an external writer and a single bad line
//! must not hide a later valid one.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{DevLoopError, Result};

/// Role tag marking agent-authored entries.
const ASSISTANT_ROLE: &str = "assistant";

/// Content segment kind that carries extractable text.
const TEXT_SEGMENT: &str = "text";

/// One transcript line. Only the nested message is of interest.
#[derive(Debug, Deserialize)]
struct TranscriptEntry {
    #[serde(default)]
    message: Option<EntryMessage>,
}

#[derive(Debug, Deserialize)]
struct EntryMessage {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Vec<ContentSegment>,
}

/// A single content segment. Kept as a plain struct rather than a tagged
/// enum so unknown segment kinds never fail the whole entry.
#[derive(Debug, Deserialize)]
struct ContentSegment {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Extracts the most recent assistant output from a JSONL transcript.
///
/// Later entries override earlier ones. Text-bearing segments of the
/// winning entry are joined with a single newline. `Ok(None)` means no
/// assistant entry was found, or the last one had no extractable text —
/// the caller treats that as a reason to stop, not to retry.
pub fn last_assistant_text(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Err(DevLoopError::transcript_unavailable(path));
    }

    let content = fs::read_to_string(path)?;

    let mut last_message: Option<EntryMessage> = None;
    let mut skipped = 0usize;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(entry) = serde_json::from_str::<TranscriptEntry>(line) else {
            skipped += 1;
            continue;
        };
        if let Some(message) = entry.message {
            if message.role.as_deref() == Some(ASSISTANT_ROLE) {
                last_message = Some(message);
            }
        }
    }
    if skipped > 0 {
        debug!("skipped {skipped} malformed transcript lines in {}", path.display());
    }

    let Some(message) = last_message else {
        return Ok(None);
    };

    let text = message
        .content
        .iter()
        .filter(|segment| segment.kind == TEXT_SEGMENT)
        .filter_map(|segment| segment.text.as_deref())
        .collect::<Vec<_>>()
        .join("\n");

    if text.is_empty() {
        return Ok(None);
    }
    Ok(Some(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_transcript(lines: &[&str]) -> (PathBuf, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("transcript.jsonl");
        fs::write(&path, lines.join("\n")).expect("write transcript");
        (path, temp_dir)
    }

    fn assistant_line(text: &str) -> String {
        format!(
            r#"{{"type":"assistant","message":{{"role":"assistant","content":[{{"type":"text","text":"{text}"}}]}}}}"#
        )
    }

    #[test]
    fn test_missing_transcript_is_an_error() {
        let err = last_assistant_text(Path::new("/nonexistent/transcript.jsonl")).unwrap_err();
        assert!(matches!(err, DevLoopError::TranscriptUnavailable { .. }));
    }

    #[test]
    fn test_last_assistant_entry_wins() {
        let first = assistant_line("first answer");
        let second = assistant_line("second answer");
        let (path, _temp_dir) = write_transcript(&[&first, &second]);

        let text = last_assistant_text(&path).expect("scan").expect("text");
        assert_eq!(text, "second answer");
    }

    #[test]
    fn test_user_entries_are_ignored() {
        let assistant = assistant_line("the reply");
        let user = r#"{"type":"user","message":{"role":"user","content":[{"type":"text","text":"the question"}]}}"#;
        let (path, _temp_dir) = write_transcript(&[&assistant, user]);

        let text = last_assistant_text(&path).expect("scan").expect("text");
        assert_eq!(text, "the reply");
    }

    #[test]
    fn test_no_assistant_entries_returns_none() {
        let user = r#"{"message":{"role":"user","content":[{"type":"text","text":"hello"}]}}"#;
        let (path, _temp_dir) = write_transcript(&[user]);

        assert!(last_assistant_text(&path).expect("scan").is_none());
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let good = assistant_line("still found");
        let (path, _temp_dir) = write_transcript(&[&good, "{not json", ""]);

        let text = last_assistant_text(&path).expect("scan").expect("text");
        assert_eq!(text, "still found");
    }

    #[test]
    fn test_text_segments_joined_with_newline() {
        let line = r#"{"message":{"role":"assistant","content":[{"type":"text","text":"part one"},{"type":"tool_use","id":"t1","name":"bash","input":{}},{"type":"text","text":"part two"}]}}"#;
        let (path, _temp_dir) = write_transcript(&[line]);

        let text = last_assistant_text(&path).expect("scan").expect("text");
        assert_eq!(text, "part one\npart two");
    }

    #[test]
    fn test_entry_without_text_segments_returns_none() {
        let line = r#"{"message":{"role":"assistant","content":[{"type":"tool_use","id":"t1","name":"bash","input":{}}]}}"#;
        let (path, _temp_dir) = write_transcript(&[line]);

        assert!(last_assistant_text(&path).expect("scan").is_none());
    }

    #[test]
    fn test_entry_without_message_is_ignored() {
        let bare = r#"{"type":"summary","summary":"compacted"}"#;
        let good = assistant_line("real output");
        let (path, _temp_dir) = write_transcript(&[bare, &good]);

        let text = last_assistant_text(&path).expect("scan").expect("text");
        assert_eq!(text, "real output");
    }
}
