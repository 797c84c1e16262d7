use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

use crate::config::Config;
use crate::utils::format_hms;

const VIDEOS_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/videos";
const COMMENT_THREADS_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/commentThreads";

fn iso_duration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?$").expect("iso duration regex")
    })
}

/// Descriptive fields for a report. Unknown fields stay empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub author: String,
    /// `HH:MM:SS` when the API gives a simple ISO-8601 duration
    pub duration: String,
    pub description: String,
    pub likes: String,
    pub comment_count: String,
    pub top_comment: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch_metadata(&self, video_id: &str) -> Result<VideoMetadata>;
}

/// `PT1H2M5S` becomes `01:02:05`. Anything else comes back unchanged.
pub fn parse_iso8601_duration(iso_duration: &str) -> String {
    if iso_duration.is_empty() {
        return String::new();
    }

    let Some(caps) = iso_duration_regex().captures(iso_duration) else {
        return iso_duration.to_string();
    };

    let part = |index: usize| -> u64 {
        caps.get(index)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };

    format_hms(part(1) * 3600 + part(2) * 60 + part(3))
}

fn field(value: &Value, pointer: &str) -> String {
    match value.pointer(pointer) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Read the first item of a `videos` response, if there is one
pub fn metadata_from_response(response: &Value) -> Option<VideoMetadata> {
    let item = response.get("items")?.as_array()?.first()?;

    Some(VideoMetadata {
        author: field(item, "/snippet/channelTitle"),
        duration: parse_iso8601_duration(&field(item, "/contentDetails/duration")),
        description: field(item, "/snippet/description"),
        likes: field(item, "/statistics/likeCount"),
        comment_count: field(item, "/statistics/commentCount"),
        top_comment: String::new(),
    })
}

/// Text of the first thread in a `commentThreads` response
pub fn top_comment_from_response(response: &Value) -> Option<String> {
    let thread = response.get("items")?.as_array()?.first()?;
    let comment = thread.pointer("/snippet/topLevelComment/snippet")?;

    ["textDisplay", "textOriginal"]
        .iter()
        .map(|key| field(comment, &format!("/{}", key)))
        .find(|text| !text.is_empty())
}

/// Metadata from the YouTube Data API v3
pub struct YoutubeDataApi {
    client: reqwest::Client,
    api_key: String,
}

impl YoutubeDataApi {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
        }
    }

    /// `None` when no API key is configured
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        let Some(api_key) = config.sources.metadata_api_key.as_deref().filter(|k| !k.is_empty()) else {
            return Ok(None);
        };

        let mut builder = reqwest::Client::builder().timeout(config.subprocess_timeout());
        if let Some(proxy) = &config.sources.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy).context("Invalid proxy URL")?);
        }

        Ok(Some(Self::new(
            builder.build().context("Failed to build HTTP client")?,
            api_key,
        )))
    }

    async fn get_json(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Value> {
        let response = self
            .client
            .get(endpoint)
            .query(query)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .with_context(|| format!("Request to {} failed", endpoint))?;

        if !response.status().is_success() {
            anyhow::bail!("Metadata request failed: HTTP {}", response.status());
        }

        response.json().await.context("Unreadable metadata response")
    }
}

#[async_trait]
impl MetadataSource for YoutubeDataApi {
    async fn fetch_metadata(&self, video_id: &str) -> Result<VideoMetadata> {
        let videos = self
            .get_json(
                VIDEOS_ENDPOINT,
                &[("part", "snippet,contentDetails,statistics"), ("id", video_id)],
            )
            .await?;

        let Some(mut metadata) = metadata_from_response(&videos) else {
            tracing::debug!("No metadata items for {}", video_id);
            return Ok(VideoMetadata::default());
        };

        // Comments may be disabled; that only loses the top comment
        match self
            .get_json(
                COMMENT_THREADS_ENDPOINT,
                &[
                    ("part", "snippet"),
                    ("videoId", video_id),
                    ("order", "relevance"),
                    ("maxResults", "1"),
                    ("textFormat", "plainText"),
                ],
            )
            .await
        {
            Ok(threads) => metadata.top_comment = top_comment_from_response(&threads).unwrap_or_default(),
            Err(e) => tracing::debug!("No top comment for {}: {}", video_id, e),
        }

        Ok(metadata)
    }
}
