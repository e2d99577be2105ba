use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};

use chat_archive_collector::{
    analytics,
    archive::read_archive,
    collector::runner::Collector,
    config::{Config, load_config},
    source::discord::DiscordSource,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Archive a Discord server's history and report on it")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch every message of the server and rewrite the archive
    Collect,

    /// Messages per month since the first archived message
    Activity {
        #[arg(long, value_enum, default_value_t = ActivityFormat::Heatmap)]
        format: ActivityFormat,
    },

    /// Messages per hour of day
    Hours,

    /// Messages per author
    Authors,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ActivityFormat {
    Heatmap,
    Line,
}

// ------------------------------------------------------------
// Application entry point
// ------------------------------------------------------------
//
// Responsibilities:
// - Initialize logging
// - Load configuration
// - Dispatch the requested command
//
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config: Config = load_config(&cli.config)?;

    // RUST_LOG still overrides this default
    let level = if config.debug_log() { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Command::Collect => collect(&config).await,
        Command::Activity { format } => activity(&config, format),
        Command::Hours => hours(&config),
        Command::Authors => authors(&config),
    }
}

async fn collect(config: &Config) -> anyhow::Result<()> {
    config.discord.require_token()?;
    let source = DiscordSource::new(&config.discord).context("building Discord client")?;
    let collector = Collector::new(Arc::new(source), config.collector.clone());

    info!("beginning message search for server {}", config.discord.guild_id);

    let report = until_interrupted(
        collector.run(config.discord.guild_id, &config.archive.path),
        tokio::signal::ctrl_c(),
    )
    .await?;

    println!("{}", report);
    Ok(())
}

/// Drives `run` until it finishes or `interrupt` fires.
///
/// Interruption drops `run`, which aborts every fetcher. A blocking
/// archive write that already started still completes, so the
/// archive may have been replaced. An interrupted run is an error.
async fn until_interrupted<T, E, I>(
    run: impl Future<Output = Result<T, E>>,
    interrupt: impl Future<Output = I>,
) -> anyhow::Result<T>
where
    E: std::error::Error + Send + Sync + 'static,
{
    tokio::select! {
        result = run => Ok(result?),
        _ = interrupt => {
            warn!("interrupted; archive may have been replaced if the write had started");
            anyhow::bail!("interrupted");
        }
    }
}

fn activity(config: &Config, format: ActivityFormat) -> anyhow::Result<()> {
    let records = read_archive(&config.archive.path)?;
    let counts = analytics::monthly_activity(&records);

    match format {
        ActivityFormat::Heatmap => {
            println!("Activity heatmap of messages sent by month (rows = years)");
            for row in analytics::heatmap_rows(&counts) {
                let cells: Vec<String> = row.iter().map(|n| format!("{:>6}", n)).collect();
                println!("{}", cells.join(" "));
            }
        }
        ActivityFormat::Line => {
            println!("Messages per month");
            for (month, n) in counts.iter().enumerate() {
                println!("{:>4} {:>8}", month, n);
            }
        }
    }
    Ok(())
}

fn hours(config: &Config) -> anyhow::Result<()> {
    let records = read_archive(&config.archive.path)?;
    let histogram = analytics::hourly_histogram(&records);

    println!("Messages sorted by time sent");
    for (hour, n) in histogram.iter().enumerate() {
        let label = if hour == 0 { 24 } else { hour };
        println!("{:>2}:00 {:>8}", label, n);
    }
    Ok(())
}

fn authors(config: &Config) -> anyhow::Result<()> {
    let records = read_archive(&config.archive.path)?;
    for (author, n) in analytics::author_totals(&records) {
        println!("{:>8} {}", n, author);
    }
    Ok(())
}
