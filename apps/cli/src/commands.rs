//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use ingestkit_core::{BatchResponse, Engine, deliver};
use ingestkit_shared::{
    AppConfig, AuthorMode, BatchRequest, BatchResult, PdfAttachment, init_config, load_config,
};
use tracing::info;
use url::Url;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ingestkit: chunked, tagged, author-attributed content from the web.
#[derive(Parser)]
#[command(
    name = "ingestkit",
    version,
    about = "Ingest URLs and PDFs into chunked, tagged content records.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Shared options for every ingestion subcommand.
#[derive(clap::Args)]
pub(crate) struct BatchOpts {
    /// Team the output belongs to.
    #[arg(long, default_value = "local")]
    pub team_id: String,

    /// User recorded on every output item.
    #[arg(long, default_value = "")]
    pub user_id: String,

    /// Author detection mode: cost_saving, balanced, or accuracy.
    #[arg(long, default_value = "balanced")]
    pub author_mode: AuthorMode,

    /// Directory the result JSON is written to.
    #[arg(short, long, default_value = "output")]
    pub out: PathBuf,

    /// POST the finished envelope to this URL as well.
    #[arg(long)]
    pub webhook: Option<String>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Ingest one or more URLs.
    Url {
        /// URLs to ingest.
        #[arg(required = true)]
        urls: Vec<String>,

        #[command(flatten)]
        opts: BatchOpts,
    },

    /// Ingest one or more local PDF files.
    Pdf {
        /// PDF files to ingest.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        opts: BatchOpts,
    },

    /// Crawl a site from one root URL, depth pass by depth pass.
    Crawl {
        /// Root URL to crawl from.
        url: String,

        /// Maximum crawl depth.
        #[arg(short, long, default_value = "1")]
        depth: u32,

        /// URLs to exclude from crawling (repeatable).
        #[arg(long)]
        exclude: Vec<String>,

        #[command(flatten)]
        opts: BatchOpts,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "ingestkit=info",
        1 => "ingestkit=debug",
        _ => "ingestkit=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Url { urls, opts } => cmd_url(urls, opts).await,
        Command::Pdf { files, opts } => cmd_pdf(files, opts).await,
        Command::Crawl {
            url,
            depth,
            exclude,
            opts,
        } => cmd_crawl(url, depth, exclude, opts).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Ingestion commands
// ---------------------------------------------------------------------------

async fn cmd_url(urls: Vec<String>, opts: BatchOpts) -> Result<()> {
    for url in &urls {
        Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;
    }

    let request = BatchRequest {
        team_id: opts.team_id.clone(),
        user_id: opts.user_id.clone(),
        author_mode: opts.author_mode,
        urls,
        ..Default::default()
    };
    run_and_report(request, &opts).await
}

async fn cmd_pdf(files: Vec<PathBuf>, opts: BatchOpts) -> Result<()> {
    let mut pdfs = Vec::with_capacity(files.len());
    for file in &files {
        let bytes = std::fs::read(file)
            .map_err(|e| eyre!("cannot read '{}': {e}", file.display()))?;
        let filename = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file.display().to_string());
        pdfs.push(PdfAttachment { filename, bytes });
    }

    let request = BatchRequest {
        team_id: opts.team_id.clone(),
        user_id: opts.user_id.clone(),
        author_mode: opts.author_mode,
        pdfs,
        ..Default::default()
    };
    run_and_report(request, &opts).await
}

/// Run one batch, print a summary, write the envelope, and optionally POST
/// it to the webhook.
async fn run_and_report(request: BatchRequest, opts: &BatchOpts) -> Result<()> {
    let config = load_config()?;
    let engine = Engine::new(config)?;
    let sources = request.urls.len() + request.pdfs.len();

    info!(
        team_id = %request.team_id,
        sources,
        mode = %request.author_mode,
        "starting batch"
    );
    let spinner = progress_spinner();
    spinner.set_message(format!("Processing {sources} source(s)"));

    let result = engine.run_batch(request).await?;
    spinner.finish_and_clear();

    print_summary(&result);
    finish(result, opts).await
}

async fn cmd_crawl(url: String, depth: u32, exclude: Vec<String>, opts: BatchOpts) -> Result<()> {
    Url::parse(&url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;

    let config = load_config()?;
    let engine = Engine::new(config)?;
    let spinner = progress_spinner();

    let request = BatchRequest {
        team_id: opts.team_id.clone(),
        user_id: opts.user_id.clone(),
        author_mode: opts.author_mode,
        urls: vec![url.clone()],
        depth,
        exclude_urls: exclude,
        ..Default::default()
    };

    // Each run_batch call is one depth pass; the session stays registered on
    // the engine until the crawl finishes. The exclude list is re-applied at
    // every continuation.
    let mut merged = BatchResult {
        team_id: request.team_id.clone(),
        ..Default::default()
    };
    let mut pass = 0u32;
    loop {
        spinner.set_message(format!("Crawling depth {pass}"));
        let result = engine.run_batch(request.clone()).await?;

        for record in &result.crawl_records {
            info!(
                url = %record.original_url,
                depth = record.depth_level,
                found = record.found_urls.len(),
                "crawled"
            );
        }
        merged.items.extend(result.items);
        merged.crawl_records.extend(result.crawl_records);
        merged.raw_trace.extend(result.raw_trace);
        merged.processing_log.extend(result.processing_log);

        if engine.session_state(&url).is_none() {
            break;
        }
        pass += 1;
    }
    spinner.finish_and_clear();

    print_summary(&merged);
    finish(merged, &opts).await
}

async fn finish(result: BatchResult, opts: &BatchOpts) -> Result<()> {
    let response = BatchResponse::success(result);

    let path = write_envelope(&response, &opts.out)?;
    println!("  Output: {}", path.display());
    println!();

    if let Some(webhook) = &opts.webhook {
        let config = load_config()?;
        deliver(webhook, &response, &config.webhook).await?;
        println!("  Delivered to {webhook}");
    }
    Ok(())
}

fn print_summary(result: &BatchResult) {
    println!();
    println!("  Batch complete");
    println!("  Items:    {}", result.items.len());
    println!("  Sources:  {}", result.raw_trace.len());
    if !result.crawl_records.is_empty() {
        println!("  Crawled:  {}", result.crawl_records.len());
    }
    for line in &result.processing_log {
        println!("  Skipped:  {line}");
    }
}

/// Write the response envelope to `<out>/<uuid>.json`.
fn write_envelope(response: &BatchResponse, out: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(out)
        .map_err(|e| eyre!("cannot create '{}': {e}", out.display()))?;
    let path = out.join(format!("{}.json", Uuid::now_v7()));
    let json = serde_json::to_string_pretty(response)?;
    std::fs::write(&path, json).map_err(|e| eyre!("cannot write '{}': {e}", path.display()))?;
    Ok(path)
}

fn progress_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        spinner.set_style(
            style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
    }
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
