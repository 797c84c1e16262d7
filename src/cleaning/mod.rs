use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub mod artifacts;
pub mod punctuation;
pub mod sentences;

pub use punctuation::{PunctuationModel, PunctuationRestorer};
pub use sentences::{SentenceModel, SentenceSegmenter};

use crate::config::CleaningConfig;
use crate::sources::TranscriptSource;
use crate::TranscriptError;

const PROBE_TEXT: &str = "hello world this is a probe";

/// Errors reported by text models
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// The model cannot run at all
    #[error("model unavailable: {0}")]
    Unavailable(String),

    /// The model ran but failed on this input
    #[error("model inference failed: {0}")]
    Inference(String),
}

/// A text model backed by an external command.
///
/// The text is written to the command's stdin and its stdout is the result.
/// As a sentence model, each non-empty output line is one sentence.
#[derive(Debug, Clone)]
pub struct CommandModel {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandModel {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self { argv, timeout }
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    async fn run(&self, input: &str) -> Result<String, ModelError> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| ModelError::Unavailable("empty model command".to_string()))?;

        tracing::debug!("Running model command: {}", self.argv.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ModelError::Unavailable(format!("{}: {}", program, e)))?;

        // Stdin is written from its own task while stdout is drained below
        if let Some(mut stdin) = child.stdin.take() {
            let payload = input.as_bytes().to_vec();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&payload).await {
                    tracing::debug!("Failed to write model input: {}", e);
                }
            });
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ModelError::Inference(format!("{} timed out after {}s", program, self.timeout.as_secs())))?
            .map_err(|e| ModelError::Inference(e.to_string()))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(ModelError::Inference(format!("{} exited with {}: {}", program, output.status, error.trim())));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl PunctuationModel for CommandModel {
    async fn restore_punctuation(&self, text: &str) -> Result<String, ModelError> {
        self.run(text).await
    }
}

#[async_trait]
impl SentenceModel for CommandModel {
    async fn split_sentences(&self, text: &str) -> Result<Vec<String>, ModelError> {
        let output = self.run(text).await?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// Which optional text models this run can use.
///
/// Availability is settled once, when the capabilities are built, and never
/// re-checked per call.
#[derive(Clone, Default)]
pub struct NlpCapabilities {
    pub punctuation: Option<Arc<dyn PunctuationModel>>,
    pub sentences: Option<Arc<dyn SentenceModel>>,
}

impl NlpCapabilities {
    /// No models: punctuation restoration is the identity and sentences split on punctuation.
    pub fn none() -> Self {
        Self::default()
    }

    /// Probe the configured model commands once and keep the ones that answer.
    pub async fn detect(config: &CleaningConfig) -> Self {
        let timeout = Duration::from_secs(config.model_timeout_secs);
        let mut capabilities = Self::none();

        match config.punctuation_command.as_ref().filter(|argv| !argv.is_empty()) {
            Some(argv) => {
                let model = CommandModel::new(argv.clone(), timeout);
                match model.restore_punctuation(PROBE_TEXT).await {
                    Ok(_) => {
                        tracing::info!("Punctuation model loaded: {}", model.program());
                        capabilities.punctuation = Some(Arc::new(model));
                    }
                    Err(e) => {
                        let error = TranscriptError::ModelUnavailable(e.to_string());
                        tracing::warn!("{}; punctuation restoration disabled", error);
                    }
                }
            }
            None => tracing::info!("No punctuation model configured; punctuation restoration disabled"),
        }

        match config.sentence_command.as_ref().filter(|argv| !argv.is_empty()) {
            Some(argv) => {
                let model = CommandModel::new(argv.clone(), timeout);
                match model.split_sentences(PROBE_TEXT).await {
                    Ok(_) => {
                        tracing::info!("Sentence model loaded: {}", model.program());
                        capabilities.sentences = Some(Arc::new(model));
                    }
                    Err(e) => {
                        let error = TranscriptError::ModelUnavailable(e.to_string());
                        tracing::warn!("{}; splitting sentences on punctuation", error);
                    }
                }
            }
            None => tracing::info!("No sentence model configured; splitting sentences on punctuation"),
        }

        capabilities
    }

    pub fn punctuation_available(&self) -> bool {
        self.punctuation.is_some()
    }

    pub fn sentences_available(&self) -> bool {
        self.sentences.is_some()
    }
}

impl fmt::Debug for NlpCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NlpCapabilities")
            .field("punctuation", &self.punctuation_available())
            .field("sentences", &self.sentences_available())
            .finish()
    }
}

/// Strip artifacts, restore punctuation, rebuild sentences
#[derive(Clone)]
pub struct CleaningPipeline {
    restorer: PunctuationRestorer,
    segmenter: SentenceSegmenter,
}

impl CleaningPipeline {
    pub fn new(capabilities: NlpCapabilities, chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            restorer: PunctuationRestorer::new(capabilities.punctuation, chunk_size, chunk_overlap),
            segmenter: SentenceSegmenter::new(capabilities.sentences),
        }
    }

    pub fn from_config(capabilities: NlpCapabilities, config: &CleaningConfig) -> Self {
        Self::new(capabilities, config.chunk_size, config.chunk_overlap)
    }

    /// A pipeline without text models
    pub fn passthrough() -> Self {
        Self::new(
            NlpCapabilities::none(),
            punctuation::DEFAULT_CHUNK_SIZE,
            punctuation::DEFAULT_CHUNK_OVERLAP,
        )
    }

    /// Turn a transcript source into one paragraph of capitalized sentences.
    ///
    /// Never fails; empty input gives an empty string. If punctuation restoration
    /// fails outright the stripped text is used as-is.
    pub async fn clean(&self, source: &TranscriptSource) -> String {
        let stripped = artifacts::strip(&source.to_raw_text());
        if stripped.is_empty() {
            return String::new();
        }

        let restored = match self.restorer.restore(&stripped).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Punctuation restoration failed, using stripped text: {}", e);
                stripped
            }
        };

        self.segmenter.segment_and_capitalize(&restored).await
    }
}

impl fmt::Debug for CleaningPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleaningPipeline")
            .field("punctuation_model", &self.restorer.has_model())
            .field("sentence_model", &self.segmenter.has_model())
            .finish()
    }
}
