use serde::Serialize;

use super::api::{select_track, TranscriptApi};
use super::subtitles::{SubtitleFetch, SubtitleFetcher, SubtitleKind};
use super::{AttemptOutcome, AttemptRecord, Strategy, TranscriptSource, VideoReference};
use crate::cleaning::CleaningPipeline;
use crate::diagnostics::DiagnosticsTrace;
use crate::utils::tail_chars;

/// Placeholder clean text while the transcript API reports transcripts disabled
pub const DISABLED_SENTINEL: &str = "Transcripts disabled";

/// Final clean text when no strategy produced a transcript
pub const NOT_RETRIEVED_SENTINEL: &str = "Could not retrieve transcript. See diag.";

const DISABLED_NOTE: &str = "transcripts_disabled";
const DISABLED_MARKER: &str = "disabled";
const NOTE_TAIL_CHARS: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChainState {
    TryApi,
    TryAutoSubs,
    TryUploadedSubs,
    Done,
}

/// Everything the chain learned about one video
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChainOutcome {
    /// Text as the winning source delivered it
    pub raw_transcript: String,

    /// Cleaned text, or a sentinel
    pub clean_transcript: String,

    /// One record per strategy tried, in order
    pub attempts: Vec<AttemptRecord>,

    pub diagnostics: DiagnosticsTrace,
}

impl ChainOutcome {
    pub fn succeeded(&self) -> bool {
        self.attempts.iter().any(|a| a.succeeded)
    }

    pub fn winning_strategy(&self) -> Option<Strategy> {
        self.attempts.iter().find(|a| a.succeeded).map(|a| a.strategy)
    }
}

/// Tries the transcript API, then auto-generated subtitles, then uploaded subtitles
pub struct TranscriptSourceChain {
    api: Box<dyn TranscriptApi>,
    subtitles: Box<dyn SubtitleFetcher>,
    cleaner: CleaningPipeline,
    preferred_languages: Vec<String>,
}

impl TranscriptSourceChain {
    pub fn new(
        api: Box<dyn TranscriptApi>,
        subtitles: Box<dyn SubtitleFetcher>,
        cleaner: CleaningPipeline,
        preferred_languages: Vec<String>,
    ) -> Self {
        Self {
            api,
            subtitles,
            cleaner,
            preferred_languages,
        }
    }

    fn primary_language(&self) -> &str {
        self.preferred_languages.first().map(String::as_str).unwrap_or("en")
    }

    /// Subtitle fallbacks run unless the API produced genuinely usable text.
    ///
    /// Any clean text containing "disabled" counts as unusable.
    fn needs_fallback(clean_transcript: &str) -> bool {
        clean_transcript.is_empty()
            || clean_transcript == DISABLED_SENTINEL
            || clean_transcript.contains(DISABLED_MARKER)
    }

    async fn try_api(&self, video: &VideoReference) -> AttemptOutcome {
        let tracks = match self.api.list_tracks(&video.video_id).await {
            Ok(tracks) => tracks,
            Err(e) => return e.into(),
        };

        let Some(track) = select_track(&tracks, &self.preferred_languages) else {
            return AttemptOutcome::NotFound("no transcript found".to_string());
        };
        tracing::debug!("Selected {} track for {}", track.language, video.video_id);

        match self.api.fetch_track(track).await {
            Ok(segments) => AttemptOutcome::Success(segments.into()),
            Err(e) => e.into(),
        }
    }

    async fn try_subtitles(&self, video: &VideoReference, kind: SubtitleKind) -> AttemptOutcome {
        match self
            .subtitles
            .fetch_subtitles(video, self.primary_language(), kind)
            .await
        {
            Ok(SubtitleFetch { text: Some(text), .. }) if !text.trim().is_empty() => {
                AttemptOutcome::Success(TranscriptSource::Text(text))
            }
            Ok(fetch) => AttemptOutcome::NotFound(format!(
                "no subtitle text; {}",
                tail_chars(fetch.diagnostics.trim(), NOTE_TAIL_CHARS)
            )),
            Err(e) => e.into(),
        }
    }

    /// Record one strategy's outcome. Successful text replaces whatever the outcome held.
    async fn settle(&self, strategy: Strategy, result: AttemptOutcome, outcome: &mut ChainOutcome) -> bool {
        let (succeeded, note) = match result {
            AttemptOutcome::Success(source) => {
                let clean = self.cleaner.clean(&source).await;
                if clean.is_empty() {
                    (false, "empty transcript after cleaning".to_string())
                } else {
                    outcome.raw_transcript = source.to_raw_text();
                    outcome.clean_transcript = clean;
                    (true, String::new())
                }
            }
            AttemptOutcome::Disabled => {
                if strategy == Strategy::Api {
                    outcome.clean_transcript = DISABLED_SENTINEL.to_string();
                }
                (false, DISABLED_NOTE.to_string())
            }
            AttemptOutcome::NotFound(reason) | AttemptOutcome::ToolFailure(reason) => (false, reason),
        };

        if succeeded {
            tracing::info!("{} succeeded", strategy);
            outcome.diagnostics.push(format!("{}:ok", strategy));
        } else {
            tracing::info!("{} failed: {}", strategy, note);
            outcome.diagnostics.push(format!("{}:{}", strategy, note));
        }

        outcome.attempts.push(AttemptRecord {
            strategy,
            succeeded,
            note,
        });
        succeeded
    }

    /// Walk the strategies for one video. Never fails; every error becomes a note.
    pub async fn run(&self, video: &VideoReference) -> ChainOutcome {
        let mut outcome = ChainOutcome::default();
        let mut state = ChainState::TryApi;

        while state != ChainState::Done {
            state = match state {
                ChainState::TryApi => {
                    let result = self.try_api(video).await;
                    self.settle(Strategy::Api, result, &mut outcome).await;
                    if Self::needs_fallback(&outcome.clean_transcript) {
                        ChainState::TryAutoSubs
                    } else {
                        ChainState::Done
                    }
                }
                ChainState::TryAutoSubs => {
                    let result = self.try_subtitles(video, SubtitleKind::Auto).await;
                    if self.settle(Strategy::AutoSubs, result, &mut outcome).await {
                        ChainState::Done
                    } else {
                        ChainState::TryUploadedSubs
                    }
                }
                ChainState::TryUploadedSubs => {
                    let result = self.try_subtitles(video, SubtitleKind::Uploaded).await;
                    self.settle(Strategy::UploadedSubs, result, &mut outcome).await;
                    ChainState::Done
                }
                ChainState::Done => ChainState::Done,
            };
        }

        if !outcome.succeeded() || outcome.clean_transcript.is_empty() {
            outcome.clean_transcript = NOT_RETRIEVED_SENTINEL.to_string();
        }

        outcome
    }
}
