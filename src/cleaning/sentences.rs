use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use std::sync::OnceLock;

use super::artifacts::collapse_whitespace;
use super::ModelError;

/// A sentence-boundary model: text in, sentence spans out
#[async_trait]
pub trait SentenceModel: Send + Sync {
    async fn split_sentences(&self, text: &str) -> Result<Vec<String>, ModelError>;
}

fn space_before_punct_regex() -> &'static Regex {
    static SPACE_BEFORE_PUNCT_REGEX: OnceLock<Regex> = OnceLock::new();
    SPACE_BEFORE_PUNCT_REGEX
        .get_or_init(|| Regex::new(r"\s+([,.;:!?])").expect("Failed to compile punctuation spacing regex"))
}

fn missing_space_after_punct_regex() -> &'static Regex {
    static MISSING_SPACE_REGEX: OnceLock<Regex> = OnceLock::new();
    MISSING_SPACE_REGEX
        .get_or_init(|| Regex::new(r"([,.;:!?])(\S)").expect("Failed to compile punctuation spacing regex"))
}

/// Split after `.`, `!` or `?` wherever whitespace follows.
pub fn split_on_terminal_punctuation(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut previous: Option<char> = None;

    for c in text.chars() {
        if c.is_whitespace() && matches!(previous, Some('.' | '!' | '?')) {
            sentences.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
        previous = Some(c);
    }
    sentences.push(current);

    sentences
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Uppercase the first alphanumeric character and leave everything else alone.
///
/// The full uppercase mapping is used, so `ß` becomes `SS`.
pub fn capitalize_first(sentence: &str) -> String {
    let Some((index, c)) = sentence.char_indices().find(|(_, c)| c.is_alphanumeric()) else {
        return sentence.to_string();
    };

    let mut out = String::with_capacity(sentence.len() + 2);
    out.push_str(&sentence[..index]);
    out.extend(c.to_uppercase());
    out.push_str(&sentence[index + c.len_utf8()..]);
    out
}

/// No whitespace before `,.;:!?`, exactly one space after when text follows.
pub fn normalize_spacing(text: &str) -> String {
    let text = space_before_punct_regex().replace_all(text, "$1");
    let text = missing_space_after_punct_regex().replace_all(&text, "$1 $2");
    collapse_whitespace(&text)
}

/// Splits text into sentences and capitalizes each one
#[derive(Clone, Default)]
pub struct SentenceSegmenter {
    model: Option<Arc<dyn SentenceModel>>,
}

impl SentenceSegmenter {
    pub fn new(model: Option<Arc<dyn SentenceModel>>) -> Self {
        Self { model }
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    async fn sentences(&self, text: &str) -> Vec<String> {
        if let Some(model) = &self.model {
            match model.split_sentences(text).await {
                Ok(spans) => {
                    return spans
                        .into_iter()
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect();
                }
                Err(e) => tracing::debug!("Sentence model failed, splitting on punctuation: {}", e),
            }
        }
        split_on_terminal_punctuation(text)
    }

    pub async fn segment_and_capitalize(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return String::new();
        }

        let joined = self
            .sentences(text)
            .await
            .iter()
            .map(|s| capitalize_first(s))
            .collect::<Vec<_>>()
            .join(" ");

        normalize_spacing(&joined)
    }
}
