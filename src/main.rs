use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use castmind::pipeline::{open_score_store, Collaborators, Pipeline};
use castmind::Config;
use cast_memory::{ScoreStore, SimilarityScore};

#[derive(Parser)]
#[command(name = "castmind")]
#[command(about = "Two-tier Farcaster memory and alignment tracking")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "castmind.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch casts and likes, rebuild both tiers and record a new score
    Run {
        /// Override the configured target fid
        #[arg(long)]
        fid: Option<u64>,
    },
    /// Show the most recent alignment score
    Latest,
    /// List recorded alignment scores, oldest first
    History {
        /// Only scores computed at or after this RFC 3339 timestamp
        #[arg(long)]
        since: Option<DateTime<Utc>>,
    },
    /// Validate the configuration and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_from_file(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config))?;

    config
        .expand_paths()
        .with_context(|| "Failed to expand paths in config")?;

    init_logging(&config.logging.level)?;

    config
        .validate()
        .with_context(|| "Configuration validation failed")?;

    match cli.command.unwrap_or(Commands::Run { fid: None }) {
        Commands::Run { fid } => {
            config.neynar_api_key()?;
            run(&config, fid).await
        }
        Commands::Latest => latest(&config),
        Commands::History { since } => history(&config, since),
        Commands::Check => {
            config.neynar_api_key()?;
            println!("✓ Configuration is valid");
            println!("  Target fid:     {}", config.neynar.target_fid);
            println!("  Viewer fid:     {}", config.viewer_fid());
            println!("  Target limit:   {}", config.feed.target_limit);
            println!("  Analytics DB:   {}", config.analytics.db_path);
            println!("  Metric:         {}", config.analytics.metric);
            Ok(())
        }
    }
}

async fn run(config: &Config, fid: Option<u64>) -> Result<()> {
    tracing::info!("Starting castmind v{}", env!("CARGO_PKG_VERSION"));

    let collaborators = Collaborators::from_config(config)?;
    let pipeline = Pipeline::new(config, collaborators)?;
    let outcome = pipeline.run(fid).await?;

    report_skips("long-term", &outcome.long_term.report);
    report_skips("short-term", &outcome.short_term.report);
    print_score(&outcome.score);
    Ok(())
}

fn report_skips(label: &str, report: &cast_memory::TierReport) {
    if !report.skipped.is_empty() {
        println!(
            "{label}: {} of {} casts skipped (missing required fields)",
            report.skipped.len(),
            report.received
        );
    }
    if !report.unembeddable.is_empty() {
        println!(
            "{label}: {} casts had no embeddable text",
            report.unembeddable.len()
        );
    }
}

fn latest(config: &Config) -> Result<()> {
    let store = open_score_store(config)?;
    match store.latest()? {
        Some(score) => print_score(&score),
        None => println!("No alignment scores recorded yet."),
    }
    Ok(())
}

fn history(config: &Config, since: Option<DateTime<Utc>>) -> Result<()> {
    let store = open_score_store(config)?;
    let rows = store.history(since)?;
    if rows.is_empty() {
        println!("No alignment scores recorded.");
        return Ok(());
    }
    for score in &rows {
        print_score(score);
    }
    Ok(())
}

fn print_score(score: &SimilarityScore) {
    println!(
        "{}  {:.4}  ({} long-term / {} short-term, {})",
        score.computed_at.to_rfc3339(),
        score.value,
        score.long_term_size,
        score.short_term_size,
        score.metric
    );
}

fn init_logging(level: &str) -> Result<()> {
    let filter = match level.to_lowercase().as_str() {
        "error" => tracing::Level::ERROR,
        "warn" => tracing::Level::WARN,
        "info" => tracing::Level::INFO,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter.to_string())),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false)
                .compact(),
        )
        .init();

    Ok(())
}
