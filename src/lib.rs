//! Caption Cleaner - fetch spoken-word transcripts for videos and restore them into readable prose
//!
//! This library resolves a video identifier from a URL, walks an ordered chain of transcript
//! sources (transcript API, then auto-generated and uploaded subtitle files via yt-dlp) and
//! runs whatever text it finds through a cleaning pipeline that strips subtitle artifacts,
//! restores punctuation and rebuilds capitalized sentences.

pub mod cleaning;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod output;
pub mod pipeline;
pub mod sources;
pub mod utils;

pub use cleaning::{CleaningPipeline, NlpCapabilities};
pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use diagnostics::DiagnosticsTrace;
pub use pipeline::{TranscriptPipeline, VideoReport};
pub use sources::chain::{ChainOutcome, TranscriptSourceChain};
pub use sources::{resolve_video_id, TranscriptSegment, TranscriptSource, VideoReference};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Failures that can occur while acquiring a transcript for one video
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("Could not find a video identifier in: {0}")]
    IdentifierNotFound(String),

    #[error("Transcripts are disabled for video {0}")]
    TranscriptsDisabled(String),

    #[error("Transcript source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("External tool failed: {0}")]
    ExternalToolFailure(String),

    #[error("External tool timed out after {0}s")]
    ExternalToolTimeout(u64),

    #[error("Text model unavailable: {0}")]
    ModelUnavailable(String),
}
