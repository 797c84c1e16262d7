use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::OutputFormat;
use crate::pipeline::VideoReport;

pub mod formatters;

pub use formatters::*;

/// Render reports in the requested format
pub fn render(reports: &[VideoReport], format: &OutputFormat, limits: OutputLimits) -> Result<String> {
    let content = match format {
        OutputFormat::Text => format_as_text(reports, limits),
        OutputFormat::Json => format_as_json(reports, limits)?,
        OutputFormat::Csv => format_as_csv(reports, limits),
    };
    Ok(content)
}

/// Save reports to file
pub async fn save_to_file(
    reports: &[VideoReport],
    path: &Path,
    format: &OutputFormat,
    limits: OutputLimits,
) -> Result<()> {
    let content = render(reports, format, limits)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs_err::create_dir_all(parent)?;
    }
    fs_err::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Print reports to stdout
pub fn print_to_console(reports: &[VideoReport], format: &OutputFormat, limits: OutputLimits) -> Result<()> {
    let content = render(reports, format, limits)?;
    println!("{}", content.trim_end());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticsTrace;
    use crate::sources::VideoMetadata;

    fn empty_report() -> VideoReport {
        VideoReport {
            source_url: "https://youtu.be/zzz".to_string(),
            video_id: "zzz".to_string(),
            clean_transcript: "Could not retrieve transcript. See diag.".to_string(),
            raw_transcript: String::new(),
            diagnostics: DiagnosticsTrace::new(),
            attempts: Vec::new(),
            metadata: VideoMetadata::default(),
            processed_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_save_to_file_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.csv");

        save_to_file(&[empty_report()], &path, &OutputFormat::Csv, OutputLimits::default())
            .await
            .unwrap();

        let written = fs_err::read_to_string(&path).unwrap();
        assert!(written.starts_with("source_url,video_id,"));
        assert!(written.contains("https://youtu.be/zzz,zzz,"));
    }

    #[test]
    fn test_render_json_is_array() {
        let json = render(&[empty_report()], &OutputFormat::Json, OutputLimits::default()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value.as_array().map(Vec::len), Some(1));
        assert!(value[0]["strategy"].is_null());
    }
}
