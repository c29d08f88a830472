//! Makeup-Harvest main entry point
//!
//! This is the command-line interface for the Makeup-Harvest crawler.

use anyhow::Context;
use clap::{ArgGroup, Parser};
use makeup_harvest::config::load_config_with_env;
use makeup_harvest::crawler::{build_http_client, run_crawl, Coordinator};
use makeup_harvest::extract::{RegionExtractor, SidecarLandmarks};
use makeup_harvest::feed::HttpFeed;
use makeup_harvest::{Stage, Target};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Makeup-Harvest: crawl a feed for face images and cut them into features
///
/// Downloads images posted under the given hashtags or by the given
/// accounts, then extracts eyes, eyelids, lips and a colour palette from
/// each one. Press `e` to stop downloading and start extracting, `q` to quit.
#[derive(Parser, Debug)]
#[command(name = "makeup-harvest")]
#[command(version = "1.0.0")]
#[command(about = "Feed image crawler with a feature extraction stage", long_about = None)]
#[command(group(ArgGroup::new("targets").required(true).args(["hashtags", "users"])))]
struct Cli {
    /// Space-separated hashtags, with or without a leading '#'
    #[arg(long)]
    hashtags: Option<String>,

    /// Space-separated account names
    #[arg(long)]
    users: Option<String>,

    /// Skip downloading and extract the images already on disk
    #[arg(short, long)]
    extract: bool,

    /// Path to TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn targets(&self) -> Vec<Target> {
        match (&self.hashtags, &self.users) {
            (Some(tags), _) => Target::parse_hashtags(tags),
            (None, Some(users)) => Target::parse_users(users),
            (None, None) => Vec::new(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let targets = cli.targets();
    if targets.is_empty() {
        anyhow::bail!("No targets given");
    }

    let config = load_config_with_env(cli.config.as_deref())
        .context("Failed to load configuration")?;
    tracing::info!(
        "Targets: {}",
        targets
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    );
    tracing::debug!("Configuration: {:?}", config.crawler);

    let client = build_http_client(&config.feed).context("Failed to build HTTP client")?;
    let feed = HttpFeed::new(client, &config.feed).context("Invalid feed configuration")?;
    let extractor = RegionExtractor::new(SidecarLandmarks);

    let initial = if cli.extract {
        Stage::Extracting
    } else {
        Stage::Downloading
    };

    let coordinator = Coordinator::new(
        config,
        targets,
        Arc::new(feed),
        Arc::new(extractor),
        initial,
    )?;

    let summary = run_crawl(coordinator).await;

    for (target, error) in &summary.failed_targets {
        tracing::error!("{} failed: {}", target, error);
    }
    if summary.stage == Stage::Extracting {
        println!("Good: {}", summary.extracted);
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("makeup_harvest=info,warn"),
            1 => EnvFilter::new("makeup_harvest=debug,info"),
            2 => EnvFilter::new("makeup_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}
