use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use url::Url;

use super::TranscriptSegment;
use crate::config::Config;
use crate::utils::tail_chars;
use crate::TranscriptError;

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";
const TIMED_TEXT_FORMAT: &str = "json3";
const ERROR_TAIL_CHARS: usize = 500;

/// One language/version of a transcript offered for a video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    /// Language tag, e.g. `en` or `pt-BR`
    pub language: String,

    /// Human-readable track name
    pub name: Option<String>,

    /// Machine-generated (auto captions) rather than uploaded
    pub is_generated: bool,

    /// Timed-text URL
    pub url: String,
}

/// The transcript API a video's tracks are listed and fetched from
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptApi: Send + Sync {
    /// List the tracks available for a video.
    ///
    /// Fails with [`TranscriptError::TranscriptsDisabled`] when the video offers no
    /// transcripts at all, and [`TranscriptError::SourceUnavailable`] when the
    /// video or its track list cannot be retrieved.
    async fn list_tracks(&self, video_id: &str) -> Result<Vec<TrackInfo>, TranscriptError>;

    /// Fetch a track's segments in playback order
    async fn fetch_track(&self, track: &TrackInfo) -> Result<Vec<TranscriptSegment>, TranscriptError>;
}

fn language_matches(track_language: &str, wanted: &str) -> bool {
    let track_language = track_language.to_lowercase();
    let wanted = wanted.trim().to_lowercase();
    if wanted.is_empty() {
        return false;
    }
    track_language == wanted || track_language.split(['-', '_']).next() == Some(wanted.as_str())
}

/// Pick the track to fetch.
///
/// Languages are tried in preference order and, within a language, an uploaded
/// track beats a generated one. Without any match the first track is used.
pub fn select_track<'a>(tracks: &'a [TrackInfo], preferred: &[String]) -> Option<&'a TrackInfo> {
    preferred
        .iter()
        .find_map(|wanted| {
            let mut matching = tracks.iter().filter(|t| language_matches(&t.language, wanted));
            let first = matching.clone().find(|t| !t.is_generated);
            first.or_else(|| matching.next())
        })
        .or_else(|| tracks.first())
}

/// Translated auto captions carry a `tlang` parameter; they are not original tracks
fn is_translation(track_url: &str) -> bool {
    Url::parse(track_url)
        .map(|url| url.query_pairs().any(|(key, _)| key == "tlang"))
        .unwrap_or(false)
}

fn with_timed_text_format(track_url: &str) -> String {
    match Url::parse(track_url) {
        Ok(mut url) => {
            let pairs: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(key, _)| key != "fmt")
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            url.query_pairs_mut()
                .clear()
                .extend_pairs(pairs)
                .append_pair("fmt", TIMED_TEXT_FORMAT);
            url.to_string()
        }
        Err(_) => track_url.to_string(),
    }
}

/// Build the track list from yt-dlp's `--dump-json` output
pub fn tracks_from_info(video_id: &str, info: &Value) -> Result<Vec<TrackInfo>, TranscriptError> {
    let mut tracks = Vec::new();

    for (key, is_generated) in [("subtitles", false), ("automatic_captions", true)] {
        let Some(languages) = info[key].as_object() else {
            continue;
        };

        for (language, formats) in languages {
            if language == "live_chat" {
                continue;
            }
            let Some(formats) = formats.as_array() else {
                continue;
            };

            let preferred = formats
                .iter()
                .find(|f| f["ext"].as_str() == Some(TIMED_TEXT_FORMAT))
                .or_else(|| formats.first());
            let Some(format) = preferred else {
                continue;
            };
            let Some(track_url) = format["url"].as_str() else {
                continue;
            };
            if is_generated && is_translation(track_url) {
                continue;
            }

            tracks.push(TrackInfo {
                language: language.clone(),
                name: format["name"].as_str().map(|s| s.to_string()),
                is_generated,
                url: with_timed_text_format(track_url),
            });
        }
    }

    if tracks.is_empty() {
        return Err(TranscriptError::TranscriptsDisabled(video_id.to_string()));
    }
    Ok(tracks)
}

/// Parse `json3` timed text into segments
pub fn segments_from_json3(document: &Value) -> Result<Vec<TranscriptSegment>, TranscriptError> {
    let events = document["events"]
        .as_array()
        .ok_or_else(|| TranscriptError::SourceUnavailable("timed text has no events".to_string()))?;

    let segments = events
        .iter()
        .filter_map(|event| {
            let text: String = event["segs"]
                .as_array()?
                .iter()
                .filter_map(|seg| seg["utf8"].as_str())
                .collect();
            if text.trim().is_empty() {
                return None;
            }
            Some(TranscriptSegment {
                text,
                start: event["tStartMs"].as_f64().map(|ms| ms / 1000.0),
                duration: event["dDurationMs"].as_f64().map(|ms| ms / 1000.0),
            })
        })
        .collect();

    Ok(segments)
}

/// Transcript API backed by yt-dlp track listing and timed-text downloads
pub struct YtDlpTranscriptApi {
    yt_dlp_path: String,
    cookies_file: Option<PathBuf>,
    proxy: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl YtDlpTranscriptApi {
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        let timeout = config.subprocess_timeout();
        let mut builder = reqwest::Client::builder().timeout(timeout);
        if let Some(proxy) = &config.sources.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy).context("Invalid proxy URL")?);
        }

        Ok(Self {
            yt_dlp_path: config.sources.yt_dlp_path.clone(),
            cookies_file: config.sources.cookies_file.clone(),
            proxy: config.sources.proxy.clone(),
            timeout,
            client: builder.build().context("Failed to build HTTP client")?,
        })
    }

    /// Get video information using yt-dlp
    async fn get_video_info(&self, video_id: &str) -> Result<Value, TranscriptError> {
        let url = format!("{}{}", WATCH_URL, video_id);
        tracing::debug!("Listing transcript tracks for: {}", url);

        let mut command = Command::new(&self.yt_dlp_path);
        command.args(["--dump-json", "--skip-download", "--no-playlist"]);
        if let Some(cookies) = &self.cookies_file {
            command.arg("--cookies").arg(cookies);
        }
        if let Some(proxy) = &self.proxy {
            command.arg("--proxy").arg(proxy);
        }
        command
            .arg(&url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| TranscriptError::ExternalToolTimeout(self.timeout.as_secs()))?
            .map_err(|e| TranscriptError::ExternalToolFailure(format!("{}: {}", self.yt_dlp_path, e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(TranscriptError::SourceUnavailable(tail_chars(error.trim(), ERROR_TAIL_CHARS)));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| TranscriptError::SourceUnavailable(format!("unreadable video info: {}", e)))
    }
}

#[async_trait]
impl TranscriptApi for YtDlpTranscriptApi {
    async fn list_tracks(&self, video_id: &str) -> Result<Vec<TrackInfo>, TranscriptError> {
        let info = self.get_video_info(video_id).await?;
        tracks_from_info(video_id, &info)
    }

    async fn fetch_track(&self, track: &TrackInfo) -> Result<Vec<TranscriptSegment>, TranscriptError> {
        tracing::debug!("Fetching {} track ({})", track.language, if track.is_generated { "generated" } else { "uploaded" });

        let response = self
            .client
            .get(&track.url)
            .send()
            .await
            .map_err(|e| TranscriptError::SourceUnavailable(format!("could not retrieve transcript: {}", e)))?;

        if !response.status().is_success() {
            return Err(TranscriptError::SourceUnavailable(format!(
                "could not retrieve transcript: HTTP {}",
                response.status()
            )));
        }

        let document: Value = response
            .json()
            .await
            .map_err(|e| TranscriptError::SourceUnavailable(format!("unreadable transcript: {}", e)))?;

        segments_from_json3(&document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn track(language: &str, is_generated: bool) -> TrackInfo {
        TrackInfo {
            language: language.to_string(),
            name: None,
            is_generated,
            url: format!("https://example.com/{}", language),
        }
    }

    fn langs(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_select_prefers_language_order() {
        let tracks = vec![track("hi", false), track("en", true), track("fr", false)];
        assert_eq!(select_track(&tracks, &langs(&["en", "hi"])).unwrap().language, "en");
        assert_eq!(select_track(&tracks, &langs(&["ta", "hi"])).unwrap().language, "hi");
    }

    #[test]
    fn test_select_prefers_uploaded_within_language() {
        let tracks = vec![track("en", true), track("en-GB", false)];
        let selected = select_track(&tracks, &langs(&["en"])).unwrap();
        assert_eq!(selected.language, "en-GB");
        assert!(!selected.is_generated);
    }

    #[test]
    fn test_select_falls_back_to_any_track() {
        let tracks = vec![track("de", true), track("ja", false)];
        assert_eq!(select_track(&tracks, &langs(&["en"])).unwrap().language, "de");
        assert!(select_track(&[], &langs(&["en"])).is_none());
    }

    #[test]
    fn test_tracks_from_info() {
        let info = json!({
            "subtitles": {
                "en": [
                    {"ext": "vtt", "url": "https://yt.example/api/timedtext?v=abc&lang=en&fmt=vtt"},
                    {"ext": "json3", "url": "https://yt.example/api/timedtext?v=abc&lang=en&fmt=json3", "name": "English"}
                ],
                "live_chat": [{"ext": "json", "url": "https://yt.example/chat"}]
            },
            "automatic_captions": {
                "hi": [{"ext": "vtt", "url": "https://yt.example/api/timedtext?v=abc&lang=hi&fmt=vtt"}],
                "fr": [{"ext": "json3", "url": "https://yt.example/api/timedtext?v=abc&lang=hi&tlang=fr&fmt=json3"}]
            }
        });

        let tracks = tracks_from_info("abc", &info).unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].language, "en");
        assert_eq!(tracks[0].name.as_deref(), Some("English"));
        assert!(!tracks[0].is_generated);
        assert_eq!(tracks[1].language, "hi");
        assert!(tracks[1].is_generated);
        assert!(tracks[1].url.ends_with("fmt=json3"));
        assert!(!tracks[1].url.contains("fmt=vtt"));
    }

    #[test]
    fn test_no_tracks_means_disabled() {
        let info = json!({"id": "abc", "subtitles": {}, "automatic_captions": {}});
        assert_eq!(
            tracks_from_info("abc", &info),
            Err(TranscriptError::TranscriptsDisabled("abc".to_string()))
        );
    }

    #[test]
    fn test_segments_from_json3() {
        let document = json!({
            "events": [
                {"tStartMs": 0, "dDurationMs": 1500, "segs": [{"utf8": "hello"}, {"utf8": " there"}]},
                {"tStartMs": 1500, "dDurationMs": 10, "segs": [{"utf8": "\n"}]},
                {"tStartMs": 1600},
                {"tStartMs": 2000, "dDurationMs": 1000, "segs": [{"utf8": "world"}]}
            ]
        });

        let segments = segments_from_json3(&document).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "hello there");
        assert_eq!(segments[0].duration, Some(1.5));
        assert_eq!(segments[1].start, Some(2.0));

        assert!(segments_from_json3(&json!({"wireMagic": "pb3"})).is_err());
    }
}
