//! Trawl main entry point
//!
//! This is the command-line interface for the trawl crawl engine.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use trawl::config::{load_config_with_hash, Config};
use trawl::crawler::crawl;
use trawl::output::{print_statistics, write_markdown_summary, RecordReader};
use trawl::storage::{is_sqlite_file, SqliteSink};
use tracing_subscriber::EnvFilter;

/// Trawl: a polite, concurrent crawler
///
/// Trawl crawls from a set of seed URLs while respecting robots.txt and
/// politeness delays, and writes one record per page to a durable record
/// file.
#[derive(Parser, Debug)]
#[command(name = "trawl")]
#[command(version)]
#[command(about = "A polite, concurrent crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG", required_unless_present = "dump")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with = "dump")]
    dry_run: bool,

    /// Print the records of a MessagePack or SQLite record file as JSON lines and exit
    #[arg(long, value_name = "RECORDS")]
    dump: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    if let Some(records) = &cli.dump {
        return handle_dump(records);
    }

    let config_path = cli
        .config
        .as_deref()
        .context("a configuration file is required")?;

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", config_path.display());
    let (config, config_hash) = match load_config_with_hash(config_path) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config)
    } else {
        handle_crawl(config, &config_hash).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("trawl=info,warn"),
            1 => EnvFilter::new("trawl=debug,info"),
            _ => EnvFilter::new("trawl=trace,debug"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    let crawler = &config.crawler;

    println!("=== Trawl Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", crawler.worker_count);
    println!("  Frontier bound: {}", crawler.frontier_bound);
    println!(
        "  Request delay: {}-{}ms ({:?} scope)",
        crawler.min_request_delay, crawler.max_request_delay, crawler.politeness_scope
    );
    println!("  Fetch timeout: {}ms", crawler.fetch_timeout);
    match crawler.max_depth {
        Some(depth) => println!("  Max depth: {}", depth),
        None => println!("  Max depth: unlimited"),
    }
    println!("  Concurrency model: {}", crawler.concurrency_model);

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nRobots:");
    println!("  Enabled: {}", config.robots.enabled);
    println!("  Fail open: {}", config.robots.fail_open);

    println!("\nOutput:");
    println!(
        "  Records: {} ({:?})",
        config.output.records_path, config.output.format
    );
    if let Some(summary) = &config.output.summary_path {
        println!("  Summary: {}", summary);
    }

    println!("\nSeeds ({}):", config.seeds.len());
    let mut valid = 0;
    for seed in &config.seeds {
        match trawl::NormalizedUrl::normalize(seed) {
            Ok(url) => {
                valid += 1;
                println!("  * {}", url);
            }
            Err(e) => println!("  ! {} ({})", seed, e),
        }
    }

    if valid == 0 {
        anyhow::bail!("no valid seed URL in configuration");
    }
    println!("\n✓ Configuration is valid");
    println!("✓ Would start crawling with {} seed URLs", valid);

    Ok(())
}

/// Handles the --dump mode: replays a record file as JSON lines
fn handle_dump(path: &Path) -> anyhow::Result<()> {
    if is_sqlite_file(path)? {
        let sink = SqliteSink::open(path)?;
        for item in sink.replay()? {
            println!("{}", serde_json::to_string(&item)?);
        }
    } else {
        let reader = RecordReader::open(path)?;
        for record in reader.records()? {
            let item = record.with_context(|| format!("corrupt record in {}", path.display()))?;
            println!("{}", serde_json::to_string(&item)?);
        }
    }
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: &str) -> anyhow::Result<()> {
    tracing::info!("Total seed URLs: {}", config.seeds.len());

    let summary_path = config.output.summary_path.clone();

    // Ctrl-C stops new fetches; in-flight work drains
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, finishing in-flight requests");
                cancel.cancel();
            }
        });
    }

    let stats = match crawl(config, cancel).await {
        Ok(stats) => {
            tracing::info!("Crawl completed successfully");
            stats
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            return Err(e.into());
        }
    };

    print_statistics(&stats);

    if let Some(path) = summary_path {
        write_markdown_summary(&stats, Some(config_hash), Path::new(&path))?;
        println!("\n✓ Summary written to: {}", path);
    }

    Ok(())
}
