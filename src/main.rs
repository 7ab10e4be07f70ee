//! Sumi-Helm main entry point
//!
//! This is the command-line interface for the Sumi-Helm crawl orchestrator.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use sumi_helm::config::{load_config_with_hash, Config, StoreBackend, StoreConfig};
use sumi_helm::crawler::{CrawlJob, HttpFetcher};
use sumi_helm::frontier::{load_checkpoint, StrategyKind};
use sumi_helm::governor::SystemMemoryProbe;
use sumi_helm::output::{print_report, write_markdown_report};
use sumi_helm::store::{Clock, MemoryStore, StateStore, SystemClock};
use sumi_helm::strategy::TierLadder;
use sumi_helm::{CircuitBreaker, ConcurrencyGovernor, DomainStrategyMemory, Frontier};
use tracing_subscriber::EnvFilter;

/// Sumi-Helm: crawl orchestration with per-domain failure isolation
///
/// Crawls from a seed URL in BFS, DFS or best-first order. Failing domains
/// are isolated by a circuit breaker, concurrency follows memory pressure,
/// and the cheapest fetch tier that worked for a domain is remembered.
#[derive(Parser, Debug)]
#[command(name = "sumi-helm")]
#[command(version)]
#[command(about = "Crawl orchestration core", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Continue from the checkpoint file instead of starting from the seed
    #[arg(long)]
    resume: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long)]
    dry_run: bool,

    /// Override the traversal strategy (bfs, dfs, best-first)
    #[arg(long, value_name = "S")]
    strategy: Option<String>,

    /// Override the page budget
    #[arg(long, value_name = "N")]
    max_pages: Option<u64>,

    /// Also write the crawl report as markdown to this file
    #[arg(long, value_name = "PATH")]
    summary: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Some(strategy) = &cli.strategy {
        let kind: StrategyKind = strategy.parse()?;
        config.crawl.strategy = kind.to_string();
    }
    if let Some(max_pages) = cli.max_pages {
        if max_pages == 0 {
            bail!("--max-pages must be >= 1");
        }
        config.crawl.max_pages = max_pages;
    }

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    handle_crawl(config, config_hash, cli.resume, cli.summary).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_helm=info,warn"),
            1 => EnvFilter::new("sumi_helm=debug,info"),
            2 => EnvFilter::new("sumi_helm=trace,debug"),
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

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Sumi-Helm Dry Run ===\n");

    println!("Crawl:");
    println!("  Seed: {}", config.crawl.seed);
    println!("  Strategy: {}", config.crawl.strategy);
    println!("  Max depth: {}", config.crawl.max_depth);
    println!("  Max pages: {}", config.crawl.max_pages);
    println!("  Batch size: {}", config.crawl.batch_size);
    println!("  External links: {}", config.crawl.include_external);
    if let Some(threshold) = config.crawl.score_threshold {
        println!("  Score threshold: {}", threshold);
    }

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nFilters:");
    println!("  Include patterns: {}", config.filters.patterns.len());
    println!("  Exclude patterns: {}", config.filters.exclude_patterns.len());
    println!("  Allowed domains: {}", config.filters.allowed_domains.len());
    println!("  Blocked domains: {}", config.filters.blocked_domains.len());
    println!("  Pages only: {}", config.filters.pages_only);
    println!("  Scorers: {}", config.scorers.len());

    let breaker = &config.circuit_breaker;
    println!("\nCircuit Breaker:");
    println!(
        "  Opens after {} failures in {}s, cooldown {}s, {} half-open probe(s)",
        breaker.failure_threshold, breaker.window_secs, breaker.cooldown_secs, breaker.half_open_probes
    );
    println!(
        "  Pages skipped by an open circuit are retried up to {} time(s)",
        breaker.max_deferrals
    );

    println!("\nConcurrency:");
    println!(
        "  {} initial, within [{}, {}]",
        config.crawl.concurrency,
        config.governor.min_limit,
        config.governor_max_limit()
    );

    println!("\nFetch Tiers:");
    for tier in &config.strategy_memory.tiers {
        let marker = if tier.level == config.strategy_memory.default_tier {
            " (default)"
        } else {
            ""
        };
        println!("  {}: {} [{:?}]{}", tier.level, tier.name, tier.kind, marker);
    }

    println!("\nStore: {:?} (prefix '{}')", config.store.backend, config.store.key_prefix);
    match &config.checkpoint.path {
        Some(path) => println!(
            "Checkpoint: {} every {} pages",
            path.display(),
            config.checkpoint.every_pages
        ),
        None => println!("Checkpoint: disabled"),
    }

    println!("\n✓ Configuration is valid");
}

async fn build_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn StateStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Redis => connect_redis(config).await,
    }
}

#[cfg(feature = "redis")]
async fn connect_redis(config: &StoreConfig) -> anyhow::Result<Arc<dyn StateStore>> {
    let url = config
        .redis_url
        .as_deref()
        .context("store backend 'redis' requires redis-url")?;
    let store = sumi_helm::store::RedisStore::connect(url)
        .await
        .with_context(|| format!("Failed to connect to {}", url))?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(_config: &StoreConfig) -> anyhow::Result<Arc<dyn StateStore>> {
    bail!("store backend 'redis' needs a build with the `redis` feature")
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: Config,
    config_hash: String,
    resume: bool,
    summary: Option<PathBuf>,
) -> anyhow::Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = build_store(&config.store).await?;
    let prefix = config.store.key_prefix.clone();

    let breaker = Arc::new(CircuitBreaker::new(
        store.clone(),
        clock.clone(),
        config.circuit_breaker.clone(),
        prefix.clone(),
    ));

    let ladder = TierLadder::new(config.strategy_memory.tiers.clone())?;
    let strategy = Arc::new(DomainStrategyMemory::new(
        store,
        clock,
        ladder,
        &config.strategy_memory,
        prefix,
    ));

    let governor = ConcurrencyGovernor::from_config(&config);
    let sampler = governor.spawn_sampler(
        Arc::new(SystemMemoryProbe::new()),
        config.governor.sample_interval(),
    );

    let mut frontier = Frontier::from_config(&config)?;
    let restored = match (&config.checkpoint.path, resume) {
        (Some(path), true) => match load_checkpoint(path, &config_hash)? {
            Some(checkpoint) => {
                tracing::info!(
                    "Resuming from checkpoint saved at {} ({} pages crawled)",
                    checkpoint.saved_at,
                    checkpoint.frontier.pages_crawled
                );
                frontier.restore_state(checkpoint.frontier)?;
                true
            }
            None => {
                tracing::info!("No checkpoint at {}, starting from the seed", path.display());
                false
            }
        },
        (None, true) => {
            tracing::warn!("--resume given but no checkpoint path is configured");
            false
        }
        _ => false,
    };
    if !restored {
        frontier
            .seed(&config.crawl.seed)
            .with_context(|| format!("Invalid seed URL {}", config.crawl.seed))?;
    }

    let fetcher = HttpFetcher::from_config(&config.user_agent)?;
    let mut job = CrawlJob::new(
        frontier,
        breaker,
        governor.clone(),
        strategy,
        Arc::new(fetcher),
    );
    if let Some(path) = &config.checkpoint.path {
        job = job.with_checkpoint(path, config.checkpoint.every_pages, config_hash);
    }

    let interrupt = governor.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing in-flight fetches");
            interrupt.close();
        }
    });

    let result = job.run().await;
    governor.close();
    sampler.abort();

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            return Err(e.into());
        }
    };

    print_report(&report);
    if let Some(path) = summary {
        write_markdown_report(&report, &path)
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;
        println!("\n✓ Summary written to: {}", path.display());
    }

    Ok(())
}
