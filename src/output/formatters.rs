use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use crate::pipeline::VideoReport;
use crate::sources::{AttemptRecord, VideoMetadata};
use crate::utils::truncate_chars;

const CSV_HEADER: &[&str] = &[
    "source_url",
    "video_id",
    "author",
    "duration",
    "description",
    "likes",
    "comment_count",
    "top_comment",
    "strategy",
    "clean_transcript",
    "diagnostics",
    "processed_at",
];

/// Caps applied when a report is rendered; stored reports are never cut
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLimits {
    pub max_output_chars: usize,
    pub max_diagnostics_chars: usize,
}

impl OutputLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_output_chars: config.app.max_output_chars,
            max_diagnostics_chars: config.app.max_diagnostics_chars,
        }
    }
}

impl Default for OutputLimits {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Serialize)]
struct RenderedReport<'a> {
    source_url: &'a str,
    video_id: &'a str,
    strategy: Option<&'static str>,
    clean_transcript: String,
    raw_transcript: String,
    diagnostics: String,
    attempts: &'a [AttemptRecord],
    metadata: &'a VideoMetadata,
    processed_at: String,
}

impl<'a> RenderedReport<'a> {
    fn new(report: &'a VideoReport, limits: OutputLimits) -> Self {
        Self {
            source_url: &report.source_url,
            video_id: &report.video_id,
            strategy: report.winning_strategy().map(|s| s.as_str()),
            clean_transcript: truncate_chars(&report.clean_transcript, limits.max_output_chars),
            raw_transcript: truncate_chars(&report.raw_transcript, limits.max_output_chars),
            diagnostics: report.diagnostics.render(limits.max_diagnostics_chars),
            attempts: &report.attempts,
            metadata: &report.metadata,
            processed_at: report.processed_at.to_rfc3339(),
        }
    }
}

/// Human-readable reports separated by a rule
pub fn format_as_text(reports: &[VideoReport], limits: OutputLimits) -> String {
    reports
        .iter()
        .map(|report| {
            let rendered = RenderedReport::new(report, limits);
            let mut output = String::new();

            output.push_str(&format!("URL: {}\n", rendered.source_url));
            output.push_str(&format!("Video ID: {}\n", rendered.video_id));
            if !rendered.metadata.author.is_empty() {
                output.push_str(&format!("Author: {}\n", rendered.metadata.author));
            }
            if !rendered.metadata.duration.is_empty() {
                output.push_str(&format!("Duration: {}\n", rendered.metadata.duration));
            }
            output.push_str(&format!("Source: {}\n", rendered.strategy.unwrap_or("none")));
            output.push_str(&format!("Processed: {}\n\n", rendered.processed_at));
            output.push_str(&rendered.clean_transcript);
            output.push_str("\n\n");
            output.push_str(&format!("Diagnostics: {}\n", rendered.diagnostics));
            output
        })
        .collect::<Vec<_>>()
        .join("\n---\n\n")
}

/// Reports as a pretty-printed JSON array
pub fn format_as_json(reports: &[VideoReport], limits: OutputLimits) -> Result<String> {
    let rendered: Vec<_> = reports.iter().map(|r| RenderedReport::new(r, limits)).collect();
    Ok(serde_json::to_string_pretty(&rendered)?)
}

/// One header row plus one row per report
pub fn format_as_csv(reports: &[VideoReport], limits: OutputLimits) -> String {
    let mut output = CSV_HEADER.join(",");
    output.push('\n');

    for report in reports {
        let rendered = RenderedReport::new(report, limits);
        let row: [&str; 12] = [
            rendered.source_url,
            rendered.video_id,
            &rendered.metadata.author,
            &rendered.metadata.duration,
            &rendered.metadata.description,
            &rendered.metadata.likes,
            &rendered.metadata.comment_count,
            &rendered.metadata.top_comment,
            rendered.strategy.unwrap_or(""),
            &rendered.clean_transcript,
            &rendered.diagnostics,
            &rendered.processed_at,
        ];
        output.push_str(&row.iter().map(|field| escape_csv(field)).collect::<Vec<_>>().join(","));
        output.push('\n');
    }

    output
}

/// Quote a field when it holds a delimiter, quote or line break
pub fn escape_csv(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
