use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};
use tokio::process::Command;

use super::VideoReference;
use crate::cleaning::artifacts::{classify_line, decode_entities, ArtifactLine};
use crate::config::Config;
use crate::utils::tail_chars;
use crate::TranscriptError;

const SUBTITLE_EXTENSIONS: &[&str] = &["vtt", "webvtt", "srt", "txt"];
const CUE_EXTENSIONS: &[&str] = &["vtt", "webvtt", "srt"];
const RECENT_FILE_LIMIT: usize = 6;
const ERROR_TAIL_CHARS: usize = 500;

/// WebVTT cue tags (`<c>`, `<v Speaker>`, `</i>`) and inline timestamps (`<00:00:01.500>`)
fn inline_tag_regex() -> &'static Regex {
    static INLINE_TAG_REGEX: OnceLock<Regex> = OnceLock::new();
    INLINE_TAG_REGEX.get_or_init(|| {
        Regex::new(r"</?(?:c|v|i|b|u|lang|ruby|rt)(?:[.\s][^>]*)?>|<\d{2}:\d{2}(?::\d{2})?\.\d{3}>")
            .expect("Failed to compile inline tag regex")
    })
}

/// `Kind: captions`, `Language: en` and similar header settings
fn header_setting_regex() -> &'static Regex {
    static HEADER_SETTING_REGEX: OnceLock<Regex> = OnceLock::new();
    HEADER_SETTING_REGEX.get_or_init(|| Regex::new(r"^\w+:\s").expect("Failed to compile header setting regex"))
}

/// Which subtitles to ask yt-dlp for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleKind {
    /// Machine-generated captions
    Auto,
    /// Human-uploaded subtitles
    Uploaded,
}

impl SubtitleKind {
    fn flag(&self) -> &'static str {
        match self {
            SubtitleKind::Auto => "--write-auto-sub",
            SubtitleKind::Uploaded => "--write-sub",
        }
    }
}

/// Result of one extraction run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubtitleFetch {
    /// Subtitle text with cue artifacts removed, if a usable file was found
    pub text: Option<String>,

    /// Combined stdout and stderr of the run
    pub diagnostics: String,
}

/// Writes subtitle files for a video and reads them back
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubtitleFetcher: Send + Sync {
    async fn fetch_subtitles(
        &self,
        video: &VideoReference,
        language: &str,
        kind: SubtitleKind,
    ) -> Result<SubtitleFetch, TranscriptError>;
}

/// Finds candidate output files for a video in a directory
pub type OutputLocator = fn(&str, &Path) -> Vec<PathBuf>;

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Subtitle files in `dir` that may hold output for `video_id`.
///
/// Files named `<video_id>.*` come first, sorted by name. When there are none,
/// the most recently modified files are used instead, newest first and at
/// most six. Only subtitle-like extensions are returned.
pub fn subtitle_candidates(video_id: &str, dir: &Path) -> Vec<PathBuf> {
    let entries: Vec<(PathBuf, SystemTime)> = match fs_err::read_dir(dir) {
        Ok(read_dir) => read_dir
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| {
                let modified = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (entry.path(), modified)
            })
            .collect(),
        Err(e) => {
            tracing::debug!("Cannot list subtitle directory: {}", e);
            return Vec::new();
        }
    };

    let file_name = |path: &Path| path.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();

    let prefix = format!("{}.", video_id);
    let mut matched: Vec<PathBuf> = entries
        .iter()
        .filter(|(path, _)| !video_id.is_empty() && file_name(path).starts_with(&prefix))
        .map(|(path, _)| path.clone())
        .collect();
    matched.sort();

    let candidates = if matched.is_empty() {
        let mut recent: Vec<(PathBuf, SystemTime)> = entries
            .into_iter()
            .filter(|(path, _)| file_name(path).contains('.'))
            .collect();
        recent.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        recent.truncate(RECENT_FILE_LIMIT);
        recent.into_iter().map(|(path, _)| path).collect()
    } else {
        matched
    };

    candidates
        .into_iter()
        .filter(|path| has_extension(path, SUBTITLE_EXTENSIONS))
        .collect()
}

/// The first candidate output file for a video, if any
pub fn locate_output(video_id: &str, dir: &Path) -> Option<PathBuf> {
    subtitle_candidates(video_id, dir).into_iter().next()
}

/// Reduce WebVTT/SRT content to its spoken lines.
///
/// Drops header, timing and cue index lines by the same rules as
/// [`crate::cleaning::artifacts::strip`], plus the `Kind:`/`Language:` settings
/// that follow a `WEBVTT` line before the first cue. Inline cue tags are
/// removed and consecutive repeats of the same line collapse to one.
pub fn subtitle_text(content: &str) -> String {
    let mut kept: Vec<String> = Vec::new();
    let mut in_header = false;

    for line in content.lines() {
        let line = line.trim_start_matches('\u{FEFF}');
        match classify_line(line) {
            Some(ArtifactLine::Header) => {
                in_header = kept.is_empty();
                continue;
            }
            Some(_) => {
                in_header = false;
                continue;
            }
            None => {}
        }

        if in_header {
            if header_setting_regex().is_match(line.trim()) {
                continue;
            }
            in_header = false;
        }

        let line = inline_tag_regex().replace_all(line, "");
        let line = line.trim();
        if line.is_empty() || kept.last().map(String::as_str) == Some(line) {
            continue;
        }
        kept.push(line.to_string());
    }

    kept.join("\n")
}

/// Read a subtitle file, returning its text when it has any
pub fn read_subtitle_file(path: &Path) -> Option<String> {
    let bytes = match fs_err::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!("Skipping unreadable subtitle file: {}", e);
            return None;
        }
    };
    let content = String::from_utf8_lossy(&bytes);

    let is_cue_file = has_extension(path, CUE_EXTENSIONS)
        || content.trim_start_matches('\u{FEFF}').trim_start().to_uppercase().starts_with("WEBVTT");
    let text = if is_cue_file {
        subtitle_text(&content)
    } else {
        content.trim().to_string()
    };

    let text = decode_entities(&text);
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Subtitle extraction through a yt-dlp subprocess
pub struct YtDlpSubtitleFetcher {
    yt_dlp_path: String,
    output_dir: PathBuf,
    cookies_file: Option<PathBuf>,
    proxy: Option<String>,
    timeout: Duration,
    locator: OutputLocator,
}

impl YtDlpSubtitleFetcher {
    pub fn new(yt_dlp_path: impl Into<String>, output_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            yt_dlp_path: yt_dlp_path.into(),
            output_dir: output_dir.into(),
            cookies_file: None,
            proxy: None,
            timeout,
            locator: subtitle_candidates,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut fetcher = Self::new(
            config.sources.yt_dlp_path.clone(),
            config.sources.subtitle_dir.clone(),
            config.subprocess_timeout(),
        );
        fetcher.cookies_file = config.sources.cookies_file.clone();
        fetcher.proxy = config.sources.proxy.clone();
        fetcher
    }

    /// Replace how output files are discovered
    pub fn with_locator(mut self, locator: OutputLocator) -> Self {
        self.locator = locator;
        self
    }

    fn build_args(&self, url: &str, language: &str, kind: SubtitleKind) -> Vec<String> {
        let template = self.output_dir.join("%(id)s.%(ext)s");
        let mut args = vec![
            "--skip-download".to_string(),
            "--no-playlist".to_string(),
            "--output".to_string(),
            template.to_string_lossy().into_owned(),
            kind.flag().to_string(),
            "--sub-langs".to_string(),
            language.to_string(),
        ];
        if let Some(cookies) = &self.cookies_file {
            args.push("--cookies".to_string());
            args.push(cookies.to_string_lossy().into_owned());
        }
        if let Some(proxy) = &self.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }
        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl SubtitleFetcher for YtDlpSubtitleFetcher {
    async fn fetch_subtitles(
        &self,
        video: &VideoReference,
        language: &str,
        kind: SubtitleKind,
    ) -> Result<SubtitleFetch, TranscriptError> {
        fs_err::create_dir_all(&self.output_dir)
            .map_err(|e| TranscriptError::ExternalToolFailure(e.to_string()))?;

        let args = self.build_args(&video.source_url, language, kind);
        tracing::debug!("Running yt-dlp: {} {}", self.yt_dlp_path, args.join(" "));

        let run = Command::new(&self.yt_dlp_path)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| TranscriptError::ExternalToolTimeout(self.timeout.as_secs()))?
            .map_err(|e| TranscriptError::ExternalToolFailure(format!("yt-dlp-run-exception: {}", e)))?;

        let diagnostics = format!(
            "{}\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );

        let text = (self.locator)(&video.video_id, &self.output_dir)
            .iter()
            .find_map(|path| read_subtitle_file(path));

        if text.is_none() && !output.status.success() {
            return Err(TranscriptError::ExternalToolFailure(format!(
                "{} exited with {}: {}",
                self.yt_dlp_path,
                output.status,
                tail_chars(diagnostics.trim(), ERROR_TAIL_CHARS)
            )));
        }

        Ok(SubtitleFetch { text, diagnostics })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const VTT: &str = "WEBVTT\nKind: captions\nLanguage: en\n\n00:00:00.000 --> 00:00:02.000 align:start position:0%\nhello<00:00:00.500><c> there</c>\n\n00:00:02.000 --> 00:00:04.000\nhello there\ngeneral &amp; kenobi\n";

    fn video() -> VideoReference {
        VideoReference::from_url("https://www.youtube.com/watch?v=abc123").unwrap()
    }

    #[test]
    fn test_subtitle_text_vtt() {
        assert_eq!(subtitle_text(VTT), "hello there\ngeneral &amp; kenobi");
    }

    #[test]
    fn test_subtitle_text_header_without_blank_line() {
        let vtt = "WEBVTT\n00:00:00.000 --> 00:00:02.000\nhello there\n\n00:00:02.000 --> 00:00:04.000\ngeneral kenobi\n";
        assert_eq!(subtitle_text(vtt), "hello there\ngeneral kenobi");
        assert_eq!(
            crate::cleaning::artifacts::strip(&subtitle_text(vtt)),
            crate::cleaning::artifacts::strip(vtt)
        );

        let settings_then_cue = "WEBVTT\nKind: captions\nLanguage: en\n00:00.000 --> 00:01.000\nNote: bring snacks\n";
        assert_eq!(subtitle_text(settings_then_cue), "Note: bring snacks");
    }

    #[test]
    fn test_subtitle_text_keeps_angle_brackets_in_speech() {
        let srt = "1\n00:00:01,000 --> 00:00:02,000\nif x < 5 and y > 3 then stop\n";
        assert_eq!(subtitle_text(srt), "if x < 5 and y > 3 then stop");

        let vtt = "WEBVTT\n\n00:01.000 --> 00:02.000\n<v Host>welcome <i>back</i><00:01.500><c.color> all</c>\n";
        assert_eq!(subtitle_text(vtt), "welcome back all");
    }

    #[test]
    fn test_subtitle_text_srt() {
        let srt = "1\n00:00:01,000 --> 00:00:02,000\nfirst line\n\n2\n00:00:02,000 --> 00:00:03,000\nsecond line\n";
        assert_eq!(subtitle_text(srt), "first line\nsecond line");
    }

    #[test]
    fn test_read_subtitle_file_decodes_entities() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc123.en.vtt");
        fs::write(&path, VTT).unwrap();
        assert_eq!(read_subtitle_file(&path).unwrap(), "hello there\ngeneral & kenobi");

        let plain = dir.path().join("notes.txt");
        fs::write(&plain, "  just text  \n").unwrap();
        assert_eq!(read_subtitle_file(&plain).unwrap(), "just text");

        let empty = dir.path().join("empty.vtt");
        fs::write(&empty, "WEBVTT\n\n1\n00:00.000 --> 00:01.000\n\n").unwrap();
        assert!(read_subtitle_file(&empty).is_none());
    }

    #[test]
    fn test_locate_prefers_id_match() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("other.en.vtt"), "x").unwrap();
        fs::write(dir.path().join("abc123.en.vtt"), "x").unwrap();
        fs::write(dir.path().join("abc123.info.json"), "{}").unwrap();

        assert_eq!(locate_output("abc123", dir.path()), Some(dir.path().join("abc123.en.vtt")));
        assert_eq!(subtitle_candidates("abc123", dir.path()).len(), 1);
    }

    #[test]
    fn test_locate_falls_back_to_recent_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("old.en.srt"), "x").unwrap();
        fs::write(dir.path().join("no_extension"), "x").unwrap();
        let old = SystemTime::now() - Duration::from_secs(3600);
        fs::File::options()
            .write(true)
            .open(dir.path().join("old.en.srt"))
            .unwrap()
            .set_modified(old)
            .unwrap();
        fs::write(dir.path().join("new.en.vtt"), "x").unwrap();

        assert_eq!(
            subtitle_candidates("missing", dir.path()),
            vec![dir.path().join("new.en.vtt"), dir.path().join("old.en.srt")]
        );
    }

    #[test]
    fn test_locate_in_missing_directory() {
        assert!(locate_output("abc", Path::new("/definitely/not/here")).is_none());
    }

    #[test]
    fn test_build_args() {
        let mut fetcher = YtDlpSubtitleFetcher::new("yt-dlp", "/tmp/subs", Duration::from_secs(5));
        fetcher.cookies_file = Some(PathBuf::from("/tmp/cookies.txt"));
        let args = fetcher.build_args("https://youtu.be/abc123", "hi", SubtitleKind::Uploaded);
        assert!(args.contains(&"--write-sub".to_string()));
        assert!(!args.contains(&"--write-auto-sub".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "--sub-langs" && w[1] == "hi"));
        assert!(args.windows(2).any(|w| w[0] == "--cookies" && w[1] == "/tmp/cookies.txt"));
        assert_eq!(args.last().unwrap(), "https://youtu.be/abc123");
    }

    #[tokio::test]
    async fn test_missing_binary_is_tool_failure() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = YtDlpSubtitleFetcher::new("definitely-not-yt-dlp", dir.path(), Duration::from_secs(5));
        let result = fetcher.fetch_subtitles(&video(), "en", SubtitleKind::Auto).await;
        assert!(matches!(result, Err(TranscriptError::ExternalToolFailure(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_injected_locator_reads_file() {
        fn locator(_video_id: &str, dir: &Path) -> Vec<PathBuf> {
            vec![dir.join("renamed-output.srt")]
        }

        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("renamed-output.srt"),
            "1\n00:00:01,000 --> 00:00:02,000\nthis is a test\n",
        )
        .unwrap();

        // `true` ignores its arguments and exits 0, standing in for yt-dlp
        let fetcher = YtDlpSubtitleFetcher::new("true", dir.path(), Duration::from_secs(5)).with_locator(locator);
        let fetch = fetcher.fetch_subtitles(&video(), "en", SubtitleKind::Auto).await.unwrap();
        assert_eq!(fetch.text.as_deref(), Some("this is a test"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_run_without_output_is_tool_failure() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = YtDlpSubtitleFetcher::new("false", dir.path(), Duration::from_secs(5));
        let result = fetcher.fetch_subtitles(&video(), "en", SubtitleKind::Uploaded).await;
        assert!(matches!(result, Err(TranscriptError::ExternalToolFailure(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_run_without_output_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = YtDlpSubtitleFetcher::new("true", dir.path(), Duration::from_secs(5));
        let fetch = fetcher.fetch_subtitles(&video(), "en", SubtitleKind::Auto).await.unwrap();
        assert!(fetch.text.is_none());
    }
}
