//! gallerycast - Republish a gallery feed to a social posting service
//!
//! Each subcommand runs one cycle and exits, so a scheduler (cron, a systemd
//! timer) drives the system by invoking them periodically.

use clap::{Parser, Subcommand};
use libgallerycast::logging::{LogFormat, LoggingConfig};
use libgallerycast::service::{GallerycastService, HaltReason, ProcessOutcome};
use libgallerycast::{Config, GallerycastError, Result};
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "gallerycast")]
#[command(version)]
#[command(about = "Republish a gallery feed to a social posting service")]
#[command(long_about = "\
gallerycast - Republish a gallery feed to a social posting service

DESCRIPTION:
    gallerycast polls an image-gallery feed, skips items it already published,
    queues the rest, and posts them with their image attached when the image is
    small enough. Posting pauses when the account's API quota runs low or after
    a failed post.

COMMANDS:
    poll            Fetch the feed and queue new items
    process         Publish one batch of queued items
    refresh-limits  Refresh the stored API quota and media reservation
    stats           Show queue depth, seen markers and quota state

USAGE EXAMPLES:
    # Crontab: poll every 10 minutes, publish every minute, refresh hourly
    */10 * * * * gallerycast poll
    * * * * *    gallerycast process
    0 * * * *    gallerycast refresh-limits

    # Inspect state as JSON
    gallerycast stats --format json

CONFIGURATION:
    Configuration file: ~/.config/gallerycast/config.toml

    Override with environment variables:
        GALLERYCAST_CONFIG      - Path to config file
        GALLERYCAST_DB_PATH     - Path to database file
        GALLERYCAST_CLIENT_ID   - Gallery API client ID
        GALLERYCAST_LOG_FORMAT  - text, json or pretty
        GALLERYCAST_LOG_LEVEL   - Log level (default: info)

EXIT CODES:
    0 - Success (including a skipped cycle: quota floor or cooldown)
    1 - Runtime error (feed unavailable, post failed, database error)
    2 - Authentication error
    3 - Invalid input or configuration
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format: text, json or pretty
    #[arg(long, global = true, env = "GALLERYCAST_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Output format: text or json
    #[arg(short, long, global = true, default_value = "text")]
    format: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch the gallery feed and queue unseen items
    Poll,

    /// Publish one batch of queued items
    Process,

    /// Refresh the stored API quota and media reservation
    RefreshLimits,

    /// Show queue depth, seen markers and quota state
    Stats,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::new(
        cli.log_format,
        libgallerycast::logging::level_from_env(),
        cli.verbose,
    )
    .init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let json = match cli.format.as_str() {
        "text" => false,
        "json" => true,
        other => {
            return Err(GallerycastError::InvalidInput(format!(
                "Invalid format '{}'. Must be 'text' or 'json'",
                other
            )))
        }
    };

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    let service = GallerycastService::from_config(config).await?;
    debug!(command = ?cli.command, db = %service.config().database.path, "running");

    let code = match cli.command {
        Commands::Poll => cmd_poll(&service, json).await?,
        Commands::Process => cmd_process(&service, json).await?,
        Commands::RefreshLimits => cmd_refresh_limits(&service, json).await?,
        Commands::Stats => cmd_stats(&service, json).await?,
    };

    service.database().close().await;
    Ok(code)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let output = serde_json::to_string_pretty(value)
        .map_err(|e| GallerycastError::InvalidInput(format!("Failed to serialize output: {}", e)))?;
    println!("{}", output);
    Ok(())
}

async fn cmd_poll(service: &GallerycastService, json: bool) -> Result<i32> {
    let report = service.poll().await?;

    if json {
        print_json(&report)?;
    } else {
        println!(
            "enqueued {}, skipped {}",
            report.enqueued(),
            report.skipped()
        );
    }
    Ok(0)
}

async fn cmd_process(service: &GallerycastService, json: bool) -> Result<i32> {
    let report = service.process().await?;

    if json {
        print_json(&report)?;
    } else {
        match report.halt {
            Some(HaltReason::QuotaFloor { remaining, floor }) => {
                println!("skipped: {} calls remaining, floor is {}", remaining, floor);
            }
            Some(HaltReason::CoolingDown { until }) => {
                println!("skipped: cooling down until {}", format_timestamp(until));
            }
            _ => {
                for item in &report.items {
                    match &item.outcome {
                        ProcessOutcome::Posted { post_id, .. } => {
                            println!("posted {} as {}", item.name, post_id);
                        }
                        ProcessOutcome::Undecodable { reason } => {
                            println!("skipped {}: {}", item.name, reason);
                        }
                        ProcessOutcome::PostFailed { reason } => {
                            println!("failed {}: {}", item.name, reason);
                        }
                    }
                }
                println!("posted {} of {} leased", report.posted(), report.leased);
            }
        }
    }

    Ok(if report.posting_failed() { 1 } else { 0 })
}

async fn cmd_refresh_limits(service: &GallerycastService, json: bool) -> Result<i32> {
    let report = service.refresh_limits().await?;

    if json {
        print_json(&report.state)?;
    } else {
        println!("remaining calls: {}", report.state.remaining_calls);
        println!(
            "chars reserved per media: {}",
            report.state.chars_reserved_per_media
        );
    }
    Ok(0)
}

async fn cmd_stats(service: &GallerycastService, json: bool) -> Result<i32> {
    let stats = service.stats().await?;

    if json {
        print_json(&stats)?;
        return Ok(0);
    }

    println!("Queue:");
    println!("  available: {}", stats.queue.available);
    println!("  leased: {}", stats.queue.leased);
    println!("Seen markers: {}", stats.seen_markers);
    println!("Quota:");
    println!("  remaining calls: {}", stats.quota.remaining_calls);
    println!(
        "  chars reserved per media: {}",
        stats.quota.chars_reserved_per_media
    );
    println!(
        "  refreshed: {}",
        stats
            .quota
            .refreshed_at
            .map(format_timestamp)
            .unwrap_or_else(|| "never".to_string())
    );
    if let Some(until) = stats.quota.cooldown_until {
        println!("  cooldown until: {}", format_timestamp(until));
    }
    Ok(0)
}

fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}
