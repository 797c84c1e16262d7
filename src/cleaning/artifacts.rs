//! Removal of subtitle-format noise: WebVTT headers, cue timing lines, cue
//! indices and HTML entities.

use regex::Regex;
use std::sync::OnceLock;

const HEADER_MARKER: &str = "WEBVTT";

fn header_regex() -> &'static Regex {
    static HEADER_REGEX: OnceLock<Regex> = OnceLock::new();
    HEADER_REGEX.get_or_init(|| Regex::new(r"(?i)^\s*WEBVTT[^\n]*\n").expect("Failed to compile header regex"))
}

/// `H:MM:SS.mmm --> H:MM:SS.mmm`
fn long_timestamp_regex() -> &'static Regex {
    static LONG_TIMESTAMP_REGEX: OnceLock<Regex> = OnceLock::new();
    LONG_TIMESTAMP_REGEX.get_or_init(|| {
        Regex::new(r"\d{1,2}:\d{2}:\d{2}[.,]\d{3}\s*-->\s*\d{1,2}:\d{2}:\d{2}[.,]\d{3}")
            .expect("Failed to compile timestamp regex")
    })
}

/// `MM:SS.mmm --> MM:SS.mmm`
fn short_timestamp_regex() -> &'static Regex {
    static SHORT_TIMESTAMP_REGEX: OnceLock<Regex> = OnceLock::new();
    SHORT_TIMESTAMP_REGEX.get_or_init(|| {
        Regex::new(r"\d{1,2}:\d{2}[.,]\d{3}\s*-->\s*\d{1,2}:\d{2}[.,]\d{3}")
            .expect("Failed to compile timestamp regex")
    })
}

fn cue_index_regex() -> &'static Regex {
    static CUE_INDEX_REGEX: OnceLock<Regex> = OnceLock::new();
    CUE_INDEX_REGEX.get_or_init(|| Regex::new(r"(?m)^[ \t\r]*\d+[ \t\r]*$").expect("Failed to compile cue index regex"))
}

fn whitespace_regex() -> &'static Regex {
    static WHITESPACE_REGEX: OnceLock<Regex> = OnceLock::new();
    WHITESPACE_REGEX.get_or_init(|| Regex::new(r"\s+").expect("Failed to compile whitespace regex"))
}

/// Collapse every whitespace run to one space and trim.
pub fn collapse_whitespace(text: &str) -> String {
    whitespace_regex().replace_all(text, " ").trim().to_string()
}

/// Line classes that never carry spoken text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactLine {
    Header,
    Timing,
    CueIndex,
}

/// Classify a single subtitle line by the same three rules [`strip`] applies,
/// so the subtitle file reader alone already yields clean input.
pub fn classify_line(line: &str) -> Option<ArtifactLine> {
    let trimmed = line.trim();
    if trimmed.to_uppercase().starts_with(HEADER_MARKER) {
        Some(ArtifactLine::Header)
    } else if trimmed.contains("-->") {
        Some(ArtifactLine::Timing)
    } else if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        Some(ArtifactLine::CueIndex)
    } else {
        None
    }
}

pub fn decode_entities(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}

fn strip_once(text: &str) -> String {
    let text = header_regex().replace(text, "");
    let text = long_timestamp_regex().replace_all(&text, " ");
    let text = short_timestamp_regex().replace_all(&text, " ");
    let text = cue_index_regex().replace_all(&text, "");
    let text = decode_entities(&text);
    collapse_whitespace(&text)
}

/// Strip subtitle artifacts and return a single whitespace-normalized line.
///
/// Passes repeat until the text stops changing, so the result is a fixed point:
/// `strip(strip(x)) == strip(x)`. Every pass that changes the text makes it shorter.
///
/// Entity decoding repeats along with everything else, so doubly escaped input is
/// fully decoded: `&amp;lt;b&amp;gt;` becomes `<b>`, not `&lt;b&gt;`.
pub fn strip(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut current = strip_once(text);
    loop {
        let next = strip_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}
