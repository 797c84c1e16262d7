use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::ConfigOverrides;

#[derive(Parser)]
#[command(
    name = "captionclean",
    about = "Caption Cleaner - fetch video transcripts and restore them into readable prose",
    version,
    long_about = "Fetches the spoken-word transcript of a video, trying the transcript API first and falling back to auto-generated and uploaded subtitles via yt-dlp. The text is stripped of subtitle artifacts, re-punctuated and split into capitalized sentences."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (defaults to ./config.yaml or the user config directory)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Comma-separated preferred caption languages, most preferred first
    #[arg(long, global = true, env = "CAPTION_LANGS", value_delimiter = ',', value_name = "LANGS")]
    pub languages: Option<Vec<String>>,

    /// Netscape cookies file passed to yt-dlp
    #[arg(long, global = true, env = "COOKIES_FILE", value_name = "FILE")]
    pub cookies: Option<PathBuf>,

    /// Proxy URL for yt-dlp and HTTP requests
    #[arg(long, global = true, env = "PROXY", value_name = "URL")]
    pub proxy: Option<String>,

    /// YouTube Data API key for video metadata
    #[arg(long, global = true, env = "YT_API_KEY", value_name = "KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Pause between videos in milliseconds
    #[arg(long, global = true, env = "SLEEP_BETWEEN_CALLS_MS", value_name = "MS")]
    pub sleep_ms: Option<u64>,

    /// Working directory for downloaded subtitle files
    #[arg(long, global = true, env = "SUBTITLE_DIR", value_name = "DIR")]
    pub subtitle_dir: Option<PathBuf>,
}

impl Cli {
    /// Collect the override flags; a missing proxy falls back to HTTPS_PROXY then HTTP_PROXY
    pub fn to_overrides(&self) -> ConfigOverrides {
        let proxy = self
            .proxy
            .clone()
            .or_else(|| std::env::var("HTTPS_PROXY").ok())
            .or_else(|| std::env::var("HTTP_PROXY").ok())
            .filter(|p| !p.trim().is_empty());

        ConfigOverrides {
            languages: self.languages.clone(),
            cookies_file: self.cookies.clone(),
            proxy,
            api_key: self.api_key.clone(),
            sleep_ms: self.sleep_ms,
            subtitle_dir: self.subtitle_dir.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch and clean the transcript of one video
    Fetch {
        /// Video URL (watch?v=..., youtu.be/..., shorts/...)
        #[arg(value_name = "URL")]
        url: String,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Fetch transcripts for every URL listed in a file
    Batch {
        /// File with one URL per line; blank lines and # comments are ignored
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "csv")]
        format: OutputFormat,
    },

    /// Clean a local transcript or subtitle file without fetching anything
    Clean {
        /// .vtt/.srt subtitles, a JSON segment list, or plain text
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Show or create the configuration file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// Check external tools and text models
    Doctor,
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain text
    Text,
    /// JSON array of reports
    Json,
    /// CSV with one row per video
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_fetch() {
        let cli = Cli::try_parse_from([
            "captionclean",
            "fetch",
            "https://youtu.be/abc",
            "--format",
            "json",
            "--languages",
            "hi,en",
            "--sleep-ms",
            "0",
        ])
        .unwrap();

        match &cli.command {
            Commands::Fetch { url, format, output } => {
                assert_eq!(url, "https://youtu.be/abc");
                assert_eq!(*format, OutputFormat::Json);
                assert!(output.is_none());
            }
            _ => panic!("expected fetch"),
        }

        let overrides = cli.to_overrides();
        assert_eq!(overrides.languages, Some(vec!["hi".to_string(), "en".to_string()]));
        assert_eq!(overrides.sleep_ms, Some(0));
    }

    #[test]
    fn test_batch_defaults_to_csv() {
        let cli = Cli::try_parse_from(["captionclean", "batch", "urls.txt"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Batch { format: OutputFormat::Csv, .. }
        ));
    }
}
