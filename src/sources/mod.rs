use serde::{Deserialize, Serialize};
use std::fmt;

pub mod api;
pub mod chain;
pub mod metadata;
pub mod subtitles;

pub use api::{TrackInfo, TranscriptApi, YtDlpTranscriptApi};
pub use metadata::{MetadataSource, VideoMetadata, YoutubeDataApi};
pub use subtitles::{locate_output, SubtitleFetch, SubtitleFetcher, SubtitleKind, YtDlpSubtitleFetcher};

use crate::TranscriptError;

const WATCH_MARKER: &str = "watch?v=";

/// A video to process, derived once from an input URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoReference {
    pub source_url: String,
    pub video_id: String,
}

impl VideoReference {
    pub fn from_url(url: &str) -> Result<Self, TranscriptError> {
        Ok(Self {
            source_url: url.to_string(),
            video_id: resolve_video_id(url)?,
        })
    }
}

/// Extract the video identifier from a URL.
///
/// `...watch?v=<id>&...` yields the text between the marker and the next `&`;
/// anything else yields the last path segment. The identifier's shape is not
/// validated, only that it is non-empty.
pub fn resolve_video_id(url: &str) -> Result<String, TranscriptError> {
    let url = url.trim();
    let id = match url.split_once(WATCH_MARKER) {
        Some((_, rest)) => rest.split('&').next().unwrap_or_default(),
        None => url.trim_end_matches('/').rsplit('/').next().unwrap_or_default(),
    };

    if id.is_empty() {
        return Err(TranscriptError::IdentifierNotFound(url.to_string()));
    }
    Ok(id.to_string())
}

/// A unit of spoken text in playback order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,

    /// Start offset in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,

    /// Duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl TranscriptSegment {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            start: None,
            duration: None,
        }
    }
}

/// Anything the cleaning pipeline accepts: plain text, one segment or a nested list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TranscriptSource {
    Text(String),
    Segment(TranscriptSegment),
    List(Vec<TranscriptSource>),
}

impl TranscriptSource {
    /// Normalize to raw text.
    ///
    /// Top-level text is returned as-is so line-oriented artifact stripping still
    /// sees its line breaks; lists are space-joined through [`safe_join`].
    pub fn to_raw_text(&self) -> String {
        match self {
            TranscriptSource::Text(text) => text.clone(),
            TranscriptSource::Segment(segment) => segment.text.clone(),
            TranscriptSource::List(items) => safe_join(items),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            TranscriptSource::Text(text) => text.trim().is_empty(),
            TranscriptSource::Segment(segment) => segment.text.trim().is_empty(),
            TranscriptSource::List(items) => items.iter().all(TranscriptSource::is_empty),
        }
    }
}

impl From<Vec<TranscriptSegment>> for TranscriptSource {
    fn from(segments: Vec<TranscriptSegment>) -> Self {
        TranscriptSource::List(segments.into_iter().map(TranscriptSource::Segment).collect())
    }
}

impl From<String> for TranscriptSource {
    fn from(text: String) -> Self {
        TranscriptSource::Text(text)
    }
}

/// Join segment texts with single spaces, flattening embedded newlines and
/// skipping segments with no text. Order is preserved.
pub fn safe_join(items: &[TranscriptSource]) -> String {
    items
        .iter()
        .map(|item| item.to_raw_text())
        .map(|text| text.trim().replace('\n', " "))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Transcript acquisition strategies, in the order the chain tries them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    Api,
    AutoSubs,
    UploadedSubs,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Api => "api",
            Strategy::AutoSubs => "auto_subs",
            Strategy::UploadedSubs => "uploaded_subs",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one strategy, recorded once and never changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub strategy: Strategy,
    pub succeeded: bool,
    pub note: String,
}

/// What a single strategy produced
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success(TranscriptSource),
    Disabled,
    NotFound(String),
    ToolFailure(String),
}

impl From<TranscriptError> for AttemptOutcome {
    fn from(error: TranscriptError) -> Self {
        match error {
            TranscriptError::TranscriptsDisabled(_) => AttemptOutcome::Disabled,
            TranscriptError::ExternalToolFailure(_) | TranscriptError::ExternalToolTimeout(_) => {
                AttemptOutcome::ToolFailure(error.to_string())
            }
            other => AttemptOutcome::NotFound(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_watch_url() {
        assert_eq!(
            resolve_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42s").unwrap(),
            "dQw4w9WgXcQ"
        );
        assert_eq!(resolve_video_id("https://youtube.com/watch?v=abc").unwrap(), "abc");
    }

    #[test]
    fn test_resolve_path_url() {
        assert_eq!(resolve_video_id("https://youtu.be/xyz123/").unwrap(), "xyz123");
        assert_eq!(resolve_video_id("https://www.youtube.com/shorts/short1").unwrap(), "short1");
        // Shape is not validated
        assert_eq!(resolve_video_id("plainword").unwrap(), "plainword");
    }

    #[test]
    fn test_resolve_failures() {
        assert!(matches!(
            resolve_video_id("https://youtube.com/watch?v=&list=PL1"),
            Err(TranscriptError::IdentifierNotFound(_))
        ));
        assert!(resolve_video_id("").is_err());
        assert!(resolve_video_id("///").is_err());
    }

    #[test]
    fn test_safe_join_flattens_and_skips_empty() {
        let items = vec![
            TranscriptSource::Segment(TranscriptSegment::new("hello")),
            TranscriptSource::Segment(TranscriptSegment::new("world\n")),
        ];
        assert_eq!(safe_join(&items), "hello world");

        let items = vec![
            TranscriptSource::Text("one\ntwo".into()),
            TranscriptSource::Segment(TranscriptSegment::new("   ")),
            TranscriptSource::List(vec![TranscriptSource::Text("three".into())]),
        ];
        assert_eq!(safe_join(&items), "one two three");
    }

    #[test]
    fn test_source_deserializes_any_shape() {
        let source: TranscriptSource =
            serde_json::from_str(r#"[{"text":"hi","start":0.5},"there",[{"text":"again"}]]"#).unwrap();
        assert_eq!(source.to_raw_text(), "hi there again");

        let source: TranscriptSource = serde_json::from_str(r#""line one\nline two""#).unwrap();
        assert_eq!(source.to_raw_text(), "line one\nline two");
    }

    #[test]
    fn test_outcome_from_error() {
        assert_eq!(
            AttemptOutcome::from(TranscriptError::TranscriptsDisabled("x".into())),
            AttemptOutcome::Disabled
        );
        assert!(matches!(
            AttemptOutcome::from(TranscriptError::ExternalToolTimeout(120)),
            AttemptOutcome::ToolFailure(_)
        ));
        assert!(matches!(
            AttemptOutcome::from(TranscriptError::SourceUnavailable("gone".into())),
            AttemptOutcome::NotFound(_)
        ));
    }
}
