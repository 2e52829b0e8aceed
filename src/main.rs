use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use ytinsights::cache::Namespace;
use ytinsights::config::{load_settings, Settings};
use ytinsights::export::export_zip;
use ytinsights::models::{RequestMode, VideoReport};
use ytinsights::pipeline::{Pipeline, PipelineError};
use ytinsights::video_id::{self, VideoId};

#[derive(Parser, Debug)]
#[command(name = "yti", version, about = "Analyze YouTube transcripts and comments with an LLM")]
struct Cli {
    /// Cache directory (overrides the config file)
    #[arg(long, global = true, env = "YTI_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// YouTube Data API key
    #[arg(long, global = true, env = "YOUTUBE_API_KEY", hide_env_values = true)]
    youtube_api_key: Option<String>,

    /// OpenRouter API key
    #[arg(long, global = true, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    openrouter_api_key: Option<String>,

    /// Proxy for transcript requests
    #[arg(long, global = true, env = "YTI_PROXY_URL")]
    proxy: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch and analyze one or more videos
    Analyze {
        /// Video URLs or bare identifiers
        #[arg(required = true)]
        urls: Vec<String>,
        /// transcript, comments or both
        #[arg(short, long, default_value = "both")]
        mode: RequestMode,
        /// Model display name or id (default from config)
        #[arg(long)]
        model: Option<String>,
        /// Print reports as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// List available models
    Models,
    /// Inspect or clear the cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Write cached artifacts to a ZIP archive
    Export {
        #[arg(short, long, default_value = "ytinsights-export.zip")]
        output: PathBuf,
        /// Only export these videos
        #[arg(long = "video")]
        videos: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// List cached entries
    List,
    /// Delete every cached entry
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "ytinsights=debug"
    } else {
        "ytinsights=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut settings = load_settings().await;
    apply_cli_overrides(&cli, &mut settings);

    match cli.command {
        Command::Analyze {
            urls,
            mode,
            model,
            json,
        } => cmd_analyze(&settings, &urls, mode, model.as_deref(), json).await,
        Command::Serve { host, port } => {
            let host = host.unwrap_or_else(|| settings.host.clone());
            let port = port.unwrap_or(settings.port);
            ytinsights::server::serve(&settings, &host, port).await
        }
        Command::Models => cmd_models(&settings),
        Command::Cache { action } => match action {
            CacheAction::List => cmd_cache_list(&settings),
            CacheAction::Reset => cmd_cache_reset(&settings),
        },
        Command::Export { output, videos } => cmd_export(&settings, &output, &videos),
    }
}

fn apply_cli_overrides(cli: &Cli, settings: &mut Settings) {
    if let Some(dir) = &cli.cache_dir {
        settings.cache_dir = dir.clone();
    }
    if let Some(key) = cli.youtube_api_key.as_ref().filter(|k| !k.trim().is_empty()) {
        settings.youtube_api_key = Some(key.clone());
    }
    if let Some(key) = cli.openrouter_api_key.as_ref().filter(|k| !k.trim().is_empty()) {
        settings.llm.api_key = Some(key.clone());
    }
    if let Some(proxy) = &cli.proxy {
        settings.proxy_url = Some(proxy.clone());
    }
}

async fn cmd_analyze(
    settings: &Settings,
    urls: &[String],
    mode: RequestMode,
    model: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let model_id = settings.llm.resolve_model(model)?;
    if settings.youtube_api_key.is_none() && mode.wants_comments() {
        warn!("YOUTUBE_API_KEY is not set; comments and titles will be unavailable");
    }
    let pipeline = settings
        .build_pipeline()
        .context("failed to set up the pipeline")?;

    let mut reports = Vec::new();
    for url in urls {
        if video_id::extract(url).is_none() {
            warn!("Skipping '{}': not a YouTube video URL or id", url);
            continue;
        }
        match run_with_spinner(&pipeline, url, mode, &model_id, !json).await {
            Ok(report) => {
                if !json {
                    print_report(&report);
                }
                reports.push(report);
            }
            Err(PipelineError::InvalidInput(input)) => {
                warn!("Skipping '{}': not a YouTube video URL or id", input);
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else if reports.is_empty() {
        println!("{} No videos processed", style("!").yellow());
    }
    Ok(())
}

async fn run_with_spinner(
    pipeline: &Pipeline,
    url: &str,
    mode: RequestMode,
    model_id: &str,
    show: bool,
) -> Result<VideoReport, PipelineError> {
    let spinner = if show {
        ProgressBar::new_spinner()
    } else {
        ProgressBar::hidden()
    };
    if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(spinner_style);
    }
    spinner.set_message(format!("Analyzing {}", url));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let result = pipeline.run(url, mode, model_id).await;
    spinner.finish_and_clear();
    result
}

fn print_report(report: &VideoReport) {
    println!(
        "\n{} {} ({})",
        style("▶").cyan(),
        style(&report.title).bold(),
        report.video_id
    );
    println!("  {:<12} {}", style("Model:").dim(), report.model_id);

    match report.transcript_stats() {
        Some(stats) => println!(
            "  {:<12} {} words, ~{} pages, ~{} min read",
            style("Transcript:").dim(),
            stats.words,
            stats.pages,
            stats.read_minutes
        ),
        None if report.mode.wants_transcript() => {
            println!("  {:<12} unavailable", style("Transcript:").dim())
        }
        None => {}
    }
    if report.mode.wants_comments() {
        println!(
            "  {:<12} {}{}",
            style("Comments:").dim(),
            report.comments.len(),
            if report.comments_truncated {
                " (truncated)"
            } else {
                ""
            }
        );
    }

    for mode in report.mode.components() {
        let Some(entry) = report.analyses.get(&mode) else {
            continue;
        };
        let source = if entry.from_cache { " (cached)" } else { "" };
        println!(
            "\n{}",
            style(format!("── {} analysis{} ──", mode, source)).bold()
        );
        if entry.text.is_empty() {
            println!("{}", style("No analysis produced").yellow());
        } else {
            println!("{}", entry.text.trim());
        }
    }
}

fn cmd_models(settings: &Settings) -> anyhow::Result<()> {
    for entry in settings.llm.models.entries() {
        let marker = if entry.model_id == settings.llm.default_model {
            style("*").green().to_string()
        } else {
            " ".to_string()
        };
        println!("{} {:<16} {}", marker, entry.name, style(&entry.model_id).dim());
    }
    Ok(())
}

fn cmd_cache_list(settings: &Settings) -> anyhow::Result<()> {
    let cache = settings.open_cache()?;
    println!("{} {}", style("Cache:").bold(), cache.root().display());
    for ns in Namespace::ALL {
        let entries = cache.list(ns)?;
        println!("\n{} ({})", style(ns).cyan(), entries.len());
        for entry in entries {
            let modified = entry
                .modified
                .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            println!(
                "  {:<66} {:>9} B  {}",
                entry.file_stem, entry.size_bytes, modified
            );
        }
    }
    Ok(())
}

fn cmd_cache_reset(settings: &Settings) -> anyhow::Result<()> {
    let cache = settings.open_cache()?;
    let removed = cache.reset()?;
    println!("{} Removed {} cached entries", style("✓").green(), removed);
    Ok(())
}

fn cmd_export(settings: &Settings, output: &Path, videos: &[String]) -> anyhow::Result<()> {
    let cache = settings.open_cache()?;
    let ids: Vec<VideoId> = videos
        .iter()
        .filter_map(|v| {
            let id = video_id::extract(v);
            if id.is_none() {
                warn!("Ignoring '{}': not a YouTube video URL or id", v);
            }
            id
        })
        .collect();
    let only = (!videos.is_empty()).then_some(ids.as_slice());

    let summary = export_zip(&cache, output, only)?;
    println!(
        "{} Exported {} videos ({} transcripts, {} comment sets, {} analyses) to {}",
        style("✓").green(),
        summary.videos,
        summary.transcripts,
        summary.comment_sets,
        summary.analyses,
        summary.path.display()
    );
    Ok(())
}
