use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use caption_cleaner::cleaning::artifacts::decode_entities;
use caption_cleaner::cleaning::{CleaningPipeline, NlpCapabilities};
use caption_cleaner::cli::{Cli, Commands};
use caption_cleaner::config::Config;
use caption_cleaner::output::{self, OutputLimits};
use caption_cleaner::sources::subtitles::subtitle_text;
use caption_cleaner::utils;
use caption_cleaner::{TranscriptPipeline, TranscriptSource};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "caption_cleaner=debug" } else { "caption_cleaner=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::load(cli.config.as_deref()).await?;
    config.apply_overrides(cli.to_overrides())?;
    let limits = OutputLimits::from_config(&config);

    match cli.command {
        Commands::Fetch { url, output, format } => {
            warn_missing_dependencies(&config).await;
            let pipeline = TranscriptPipeline::from_config(config).await?;

            let report = pipeline.process_url(&url).await?;
            let reports = [report];

            match output {
                Some(path) => {
                    output::save_to_file(&reports, &path, &format, limits).await?;
                    println!("Transcript saved to: {}", path.display());
                }
                None => output::print_to_console(&reports, &format, limits)?,
            }
        }
        Commands::Batch { input, output, format } => {
            let content = fs_err::read_to_string(&input)?;
            let urls = utils::parse_url_list(&content);
            if urls.is_empty() {
                anyhow::bail!("No URLs found in {}", input.display());
            }

            warn_missing_dependencies(&config).await;
            let pipeline = TranscriptPipeline::from_config(config).await?;

            tracing::info!("Processing {} URLs from {}", urls.len(), input.display());
            let started = std::time::Instant::now();
            let reports = pipeline.process_batch(&urls, !cli.quiet).await;
            tracing::info!(
                "Finished {} videos in {}",
                reports.len(),
                utils::format_duration(started.elapsed())
            );

            match output {
                Some(path) => {
                    output::save_to_file(&reports, &path, &format, limits).await?;
                    println!("Saved {} reports to: {}", reports.len(), path.display());
                }
                None => output::print_to_console(&reports, &format, limits)?,
            }
        }
        Commands::Clean { input, output } => {
            let source = read_transcript_file(&input)?;
            let capabilities = NlpCapabilities::detect(&config.cleaning).await;
            let cleaner = CleaningPipeline::from_config(capabilities, &config.cleaning);

            let clean = cleaner.clean(&source).await;
            match output {
                Some(path) => {
                    fs_err::write(&path, &clean)?;
                    println!("Clean transcript saved to: {}", path.display());
                }
                None => println!("{}", clean),
            }
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                let path = match cli.config {
                    Some(path) => path,
                    None => Config::config_path()?,
                };
                println!("Configuration file: {}", path.display());
                println!("Edit it to set languages, model commands and limits; run with --show to inspect.");
            }
        }
        Commands::Doctor => {
            let missing = utils::check_dependencies(&config.sources.yt_dlp_path).await;
            if missing.is_empty() {
                println!("✅ {} found", config.sources.yt_dlp_path);
            } else {
                for dep in &missing {
                    println!("❌ {}", dep);
                }
            }

            let capabilities = NlpCapabilities::detect(&config.cleaning).await;
            println!(
                "{} Punctuation model",
                if capabilities.punctuation_available() { "✅" } else { "➖" }
            );
            println!(
                "{} Sentence model",
                if capabilities.sentences_available() { "✅" } else { "➖" }
            );
            println!(
                "{} Metadata lookup",
                if config.sources.metadata_api_key.is_some() { "✅" } else { "➖" }
            );
        }
    }

    Ok(())
}

/// Dependency problems are reported, not fatal; subtitle strategies just fail per video
async fn warn_missing_dependencies(config: &Config) {
    let missing = utils::check_dependencies(&config.sources.yt_dlp_path).await;
    if !missing.is_empty() {
        eprintln!("⚠️  Dependency check warnings:");
        for dep in missing {
            eprintln!("   • {}", dep);
        }
        eprintln!("   (Continuing anyway - transcript strategies will report failures)");
    }
}

/// Load a local file as a transcript source, picking the reader from the extension
fn read_transcript_file(path: &Path) -> Result<TranscriptSource> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "json" => {
            let content = fs_err::read_to_string(path)?;
            serde_json::from_str(&content)
                .with_context(|| format!("{} is not a transcript segment document", path.display()))
        }
        "vtt" | "webvtt" | "srt" => {
            let content = fs_err::read(path)?;
            let text = subtitle_text(&String::from_utf8_lossy(&content));
            Ok(TranscriptSource::Text(decode_entities(&text)))
        }
        _ => Ok(TranscriptSource::Text(fs_err::read_to_string(path)?)),
    }
}
