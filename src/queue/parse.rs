//! Pure parsing helpers for work item files and tracker titles

use regex::Regex;
use std::sync::LazyLock;

static FILENAME_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)-").expect("valid regex"));

static TITLE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)[-\s:]").expect("valid regex"));

static LABELS_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^#+\s*labels?\s*:?\s*$").expect("valid regex"));

/// Sequence number from a work item filename (`"005-add-ci.md"` -> 5)
///
/// Zero is not a sequence number.
pub fn sequence_from_filename(filename: &str) -> Option<u32> {
    positive(&FILENAME_PREFIX, filename)
}

/// Sequence number from a tracker issue title
///
/// Accepts `001-title`, `001 Title` and `001: Title`. A number with nothing
/// after it, or zero, is not a sequence.
pub fn extract_sequence_number(title: &str) -> Option<u32> {
    positive(&TITLE_PREFIX, title)
}

fn positive(pattern: &Regex, text: &str) -> Option<u32> {
    pattern
        .captures(text)
        .and_then(|c| c[1].parse().ok())
        .filter(|n| *n > 0)
}

/// Split file content into (title, body)
///
/// The title is the first non-empty line with any Markdown heading markers
/// removed; the body is everything after it, trimmed. Returns `None` for
/// content with no non-blank line.
pub fn split_title_body(content: &str) -> Option<(String, String)> {
    let mut lines = content.lines();
    let title_line = lines.by_ref().find(|l| !l.trim().is_empty())?;
    let title = title_line.trim().trim_start_matches('#').trim().to_string();
    let body = lines.collect::<Vec<_>>().join("\n").trim().to_string();
    Some((title, body))
}

/// Parse labels from the "Labels" section of a work item
///
/// The section starts at a heading named `Label` or `Labels` (any level,
/// any case). The first non-empty line after it is split on commas. A
/// following heading ends the section without labels.
pub fn parse_labels(content: &str) -> Vec<String> {
    let mut in_section = false;
    for line in content.lines().map(str::trim) {
        if LABELS_HEADING.is_match(line) {
            in_section = true;
            continue;
        }
        if !in_section || line.is_empty() {
            continue;
        }
        if line.starts_with('#') {
            break;
        }
        return line
            .split(',')
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(ToString::to_string)
            .collect();
    }
    Vec::new()
}
