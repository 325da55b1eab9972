//! Frontmatter codec for the loop state record.
//!
//! A record is plain text. When its first line is exactly `---`, a metadata
//! block of `key: value` lines follows up to the next `---` line; everything
//! after that (trimmed) is the task body. Without an opening delimiter the
//! whole text is body and the metadata is empty.
//!
//! The decoder is intentionally permissive: lines inside the block that do
//! not match the `key: value` shape are ignored, so a manually edited record
//! still decodes. Encoding is never a full re-serialization — the only write
//! path is [`bump_iteration`], a targeted substitution that leaves every
//! other byte of the record untouched.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Delimiter line opening and closing the metadata block.
const DELIMITER: &str = "---";

/// Decoded record: flat key/value metadata plus the task body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frontmatter {
    /// Metadata fields from the delimited block, quotes stripped.
    pub fields: HashMap<String, String>,
    /// Everything after the closing delimiter, trimmed.
    pub body: String,
}

fn field_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\w+):\s*(.*)$").expect("field line regex is valid"))
}

fn iteration_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^iteration:.*$").expect("iteration line regex is valid"))
}

/// Decode a record into metadata fields and body text.
pub fn parse(content: &str) -> Frontmatter {
    let lines: Vec<&str> = content.split('\n').collect();

    if lines.first().copied() != Some(DELIMITER) {
        return Frontmatter {
            fields: HashMap::new(),
            body: content.to_string(),
        };
    }

    // Index of the closing delimiter; an unterminated block means the
    // record has no metadata at all.
    let Some(end) = lines
        .iter()
        .skip(1)
        .position(|line| *line == DELIMITER)
        .map(|i| i + 1)
    else {
        return Frontmatter {
            fields: HashMap::new(),
            body: content.to_string(),
        };
    };

    let mut fields = HashMap::new();
    for line in &lines[1..end] {
        if let Some(caps) = field_line_re().captures(line) {
            let value = strip_quotes(caps[2].trim());
            fields.insert(caps[1].to_string(), value.to_string());
        }
    }

    let body = lines[end + 1..].join("\n").trim().to_string();
    Frontmatter { fields, body }
}

/// Rewrite the `iteration:` metadata line, preserving every other byte.
///
/// A record with no `iteration:` line comes back unchanged.
pub fn bump_iteration(content: &str, next: u32) -> String {
    iteration_line_re()
        .replace(content, format!("iteration: {next}"))
        .into_owned()
}

/// Strip exactly one matching pair of straight quotes (double or single).
///
/// No further escaping or unescaping is performed.
fn strip_quotes(value: &str) -> &str {
    let stripped = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')));
    stripped.unwrap_or(value)
}
