use async_trait::async_trait;
use std::ops::Range;
use std::sync::Arc;

use super::artifacts::collapse_whitespace;
use super::ModelError;

/// Default maximum window length, in characters
pub const DEFAULT_CHUNK_SIZE: usize = 2000;

/// Default context carried across window boundaries, in characters
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// A text-to-text model that restores punctuation and casing
#[async_trait]
pub trait PunctuationModel: Send + Sync {
    async fn restore_punctuation(&self, text: &str) -> Result<String, ModelError>;
}

/// Split `len` characters into model windows.
///
/// Nominal windows are `size` long. Every window except the first reaches back
/// `overlap` characters and every window except the last reaches forward
/// `overlap` characters, so the model always sees context on both sides.
pub fn chunk_windows(len: usize, size: usize, overlap: usize) -> Vec<Range<usize>> {
    let size = size.max(1);
    let mut windows = Vec::new();
    let mut start = 0;

    while start < len {
        let end = (start + size).min(len);
        let lo = start.saturating_sub(overlap);
        let hi = if end < len { (end + overlap).min(len) } else { len };
        windows.push(lo..hi);
        start = end;
    }

    windows
}

/// Runs an optional punctuation model over overlapping windows of a transcript
#[derive(Clone)]
pub struct PunctuationRestorer {
    model: Option<Arc<dyn PunctuationModel>>,
    chunk_size: usize,
    overlap: usize,
}

impl PunctuationRestorer {
    pub fn new(model: Option<Arc<dyn PunctuationModel>>, chunk_size: usize, overlap: usize) -> Self {
        Self {
            model,
            chunk_size,
            overlap,
        }
    }

    /// A restorer with no model; `restore` returns its input untouched.
    pub fn passthrough() -> Self {
        Self::new(None, DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Restore punctuation window by window.
    ///
    /// A window whose inference fails keeps its original text. Seams are joined
    /// with a space, so overlapping context may show up twice. Only
    /// [`ModelError::Unavailable`] aborts the whole document.
    pub async fn restore(&self, text: &str) -> Result<String, ModelError> {
        let Some(model) = &self.model else {
            return Ok(text.to_string());
        };
        if text.is_empty() {
            return Ok(String::new());
        }

        // Byte offset of every char boundary, so windows never split a code point
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_len = bounds.len() - 1;

        let windows = chunk_windows(char_len, self.chunk_size, self.overlap);
        tracing::debug!("Restoring punctuation over {} window(s)", windows.len());

        let mut restored = Vec::with_capacity(windows.len());
        for (index, window) in windows.into_iter().enumerate() {
            let chunk = &text[bounds[window.start]..bounds[window.end]];
            match model.restore_punctuation(chunk).await {
                Ok(output) => restored.push(output),
                Err(ModelError::Inference(reason)) => {
                    tracing::debug!("Punctuation window {} failed, keeping original text: {}", index, reason);
                    restored.push(chunk.to_string());
                }
                Err(unavailable) => return Err(unavailable),
            }
        }

        Ok(collapse_whitespace(&restored.join(" ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct UppercaseModel;

    #[async_trait]
    impl PunctuationModel for UppercaseModel {
        async fn restore_punctuation(&self, text: &str) -> Result<String, ModelError> {
            Ok(text.to_uppercase())
        }
    }

    /// Fails every second call
    struct FlakyModel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PunctuationModel for FlakyModel {
        async fn restore_punctuation(&self, text: &str) -> Result<String, ModelError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) % 2 == 1 {
                Err(ModelError::Inference("boom".to_string()))
            } else {
                Ok(format!("{}.", text.trim()))
            }
        }
    }

    struct BrokenModel;

    #[async_trait]
    impl PunctuationModel for BrokenModel {
        async fn restore_punctuation(&self, _text: &str) -> Result<String, ModelError> {
            Err(ModelError::Unavailable("process exited".to_string()))
        }
    }

    #[test]
    fn test_chunk_windows_overlap_both_ways() {
        assert_eq!(chunk_windows(4500, 2000, 50), vec![0..2050, 1950..4050, 3950..4500]);
    }

    #[test]
    fn test_chunk_windows_edges() {
        assert_eq!(chunk_windows(0, 2000, 50), Vec::<Range<usize>>::new());
        assert_eq!(chunk_windows(2000, 2000, 50), vec![0..2000]);
        assert_eq!(chunk_windows(2010, 2000, 50), vec![0..2010, 1950..2010]);
        assert_eq!(chunk_windows(3, 0, 0), vec![0..1, 1..2, 2..3]);
    }

    #[tokio::test]
    async fn test_restore_without_model_is_identity() {
        let restorer = PunctuationRestorer::passthrough();
        let long = "word ".repeat(1000);
        for text in ["", "  spaced   out\ntext ", "ünïcödé ✓", long.as_str()] {
            assert_eq!(restorer.restore(text).await.unwrap(), text);
        }
    }

    #[tokio::test]
    async fn test_restore_single_window() {
        let restorer = PunctuationRestorer::new(Some(Arc::new(UppercaseModel)), 2000, 50);
        assert_eq!(restorer.restore("hello  world").await.unwrap(), "HELLO WORLD");
    }

    #[tokio::test]
    async fn test_restore_respects_char_boundaries() {
        let restorer = PunctuationRestorer::new(Some(Arc::new(UppercaseModel)), 3, 1);
        let restored = restorer.restore("ääääää").await.unwrap();
        // Two windows: chars 0..4 and 2..6
        assert_eq!(restored, "ÄÄÄÄ ÄÄÄÄ");
    }

    #[tokio::test]
    async fn test_failed_window_keeps_original_text() {
        let model = FlakyModel {
            calls: AtomicUsize::new(0),
        };
        let restorer = PunctuationRestorer::new(Some(Arc::new(model)), 5, 0);
        let restored = restorer.restore("aaaaabbbbbccccc").await.unwrap();
        assert_eq!(restored, "aaaaa. bbbbb ccccc.");
    }

    #[tokio::test]
    async fn test_unavailable_model_aborts() {
        let restorer = PunctuationRestorer::new(Some(Arc::new(BrokenModel)), 2000, 50);
        assert!(matches!(
            restorer.restore("some text").await,
            Err(ModelError::Unavailable(_))
        ));
    }
}
