use serde::{Deserialize, Serialize};

use crate::utils::truncate_chars;

/// Cap applied when a trace is reported
pub const DEFAULT_MAX_CHARS: usize = 4000;

const SEPARATOR: &str = "; ";

/// Append-only trace of attempt notes for one video
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsTrace {
    notes: Vec<String>,
}

impl DiagnosticsTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Notes joined with `"; "`, unbounded
    pub fn joined(&self) -> String {
        self.notes.join(SEPARATOR)
    }

    /// Notes joined with `"; "` and cut to `max_chars` characters
    pub fn render(&self, max_chars: usize) -> String {
        truncate_chars(&self.joined(), max_chars)
    }
}
