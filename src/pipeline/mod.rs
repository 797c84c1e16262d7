use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::cleaning::{CleaningPipeline, NlpCapabilities};
use crate::config::Config;
use crate::diagnostics::DiagnosticsTrace;
use crate::sources::chain::TranscriptSourceChain;
use crate::sources::{
    AttemptRecord, MetadataSource, Strategy, VideoMetadata, VideoReference, YoutubeDataApi,
    YtDlpSubtitleFetcher, YtDlpTranscriptApi,
};
use crate::TranscriptError;

/// Everything produced for one video
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoReport {
    /// URL exactly as given
    pub source_url: String,

    pub video_id: String,

    /// Cleaned transcript, or a sentinel when nothing was retrieved
    pub clean_transcript: String,

    /// Transcript text before cleaning
    pub raw_transcript: String,

    /// Attempt notes in order
    pub diagnostics: DiagnosticsTrace,

    pub attempts: Vec<AttemptRecord>,

    pub metadata: VideoMetadata,

    /// When processing finished
    pub processed_at: chrono::DateTime<chrono::Utc>,
}

impl VideoReport {
    pub fn winning_strategy(&self) -> Option<Strategy> {
        self.attempts.iter().find(|a| a.succeeded).map(|a| a.strategy)
    }
}

/// Resolves URLs, runs the source chain, attaches metadata
pub struct TranscriptPipeline {
    config: Config,
    chain: TranscriptSourceChain,
    metadata: Option<Box<dyn MetadataSource>>,
}

impl TranscriptPipeline {
    /// Build the production pipeline. Text models are probed once here.
    pub async fn from_config(config: Config) -> Result<Self> {
        let capabilities = NlpCapabilities::detect(&config.cleaning).await;
        let cleaner = CleaningPipeline::from_config(capabilities, &config.cleaning);

        let api = YtDlpTranscriptApi::from_config(&config)?;
        let subtitles = YtDlpSubtitleFetcher::from_config(&config);
        let chain = TranscriptSourceChain::new(
            Box::new(api),
            Box::new(subtitles),
            cleaner,
            config.sources.preferred_languages.clone(),
        );

        let metadata = match YoutubeDataApi::from_config(&config)? {
            Some(api) => Some(Box::new(api) as Box<dyn MetadataSource>),
            None => {
                tracing::debug!("No metadata API key configured, metadata lookup disabled");
                None
            }
        };

        Ok(Self::new(config, chain, metadata))
    }

    pub fn new(config: Config, chain: TranscriptSourceChain, metadata: Option<Box<dyn MetadataSource>>) -> Self {
        Self { config, chain, metadata }
    }

    /// Process one URL. Only an unresolvable URL is an error.
    pub async fn process_url(&self, url: &str) -> Result<VideoReport, TranscriptError> {
        let video = VideoReference::from_url(url)?;
        Ok(self.process_video(&video).await)
    }

    pub async fn process_video(&self, video: &VideoReference) -> VideoReport {
        tracing::info!("Processing video {} from {}", video.video_id, video.source_url);

        let outcome = self.chain.run(video).await;

        let metadata = match &self.metadata {
            Some(source) => source.fetch_metadata(&video.video_id).await.unwrap_or_else(|e| {
                tracing::warn!("Metadata lookup failed for {}: {}", video.video_id, e);
                VideoMetadata::default()
            }),
            None => VideoMetadata::default(),
        };

        VideoReport {
            source_url: video.source_url.clone(),
            video_id: video.video_id.clone(),
            clean_transcript: outcome.clean_transcript,
            raw_transcript: outcome.raw_transcript,
            diagnostics: outcome.diagnostics,
            attempts: outcome.attempts,
            metadata,
            processed_at: chrono::Utc::now(),
        }
    }

    /// Process URLs in order, pausing between videos. Unresolvable URLs are skipped.
    pub async fn process_batch(&self, urls: &[String], show_progress: bool) -> Vec<VideoReport> {
        let progress = if show_progress {
            let bar = ProgressBar::new(urls.len() as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar
        } else {
            ProgressBar::hidden()
        };

        let mut reports = Vec::with_capacity(urls.len());
        for url in urls {
            progress.set_message(url.clone());

            match VideoReference::from_url(url) {
                Ok(video) => {
                    // Pause only between two processed videos
                    if !reports.is_empty() {
                        sleep(self.config.throttle()).await;
                    }
                    reports.push(self.process_video(&video).await);
                }
                Err(e) => tracing::warn!("Skipping {}: {}", url, e),
            }

            progress.inc(1);
        }

        progress.finish_with_message(format!("Processed {} of {} videos", reports.len(), urls.len()));
        reports
    }
}
