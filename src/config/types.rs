use crate::scoring::PatternSyntax;
use crate::strategy::{Tier, TierKind};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Sumi-Helm
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawl: CrawlConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub scorers: Vec<ScorerConfig>,
    #[serde(rename = "circuit-breaker", default)]
    pub circuit_breaker: BreakerConfig,
    #[serde(default)]
    pub governor: GovernorConfig,
    #[serde(rename = "strategy-memory", default)]
    pub strategy_memory: StrategyMemoryConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

impl Config {
    /// Upper bound of the concurrency governor
    ///
    /// Falls back to `crawl.concurrency` when `governor.max-limit` is unset.
    pub fn governor_max_limit(&self) -> usize {
        self.governor.max_limit.unwrap_or(self.crawl.concurrency)
    }
}

/// Crawl job configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// Start URL of the crawl
    pub seed: String,

    /// Traversal strategy: `bfs`, `dfs` or `best-first`
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// Maximum link depth from the seed
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// Maximum number of pages handed out by the frontier
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u64,

    /// Initial number of concurrent fetches
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Follow links that leave the seed's domain
    #[serde(rename = "include-external", default)]
    pub include_external: bool,

    /// Entries per `get_next_urls` call for BFS and best-first
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    /// Minimum score a discovered link needs to be queued
    #[serde(rename = "score-threshold")]
    pub score_threshold: Option<f64>,

    /// Treat URLs differing only in pagination or view parameters as one page
    #[serde(rename = "strip-navigation-params", default)]
    pub strip_navigation_params: bool,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    #[serde(rename = "crawler-name", default = "default_crawler_name")]
    pub crawler_name: String,

    #[serde(rename = "crawler-version", default = "default_crawler_version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: Option<String>,
}

impl UserAgentConfig {
    /// Formats the `User-Agent` header value
    pub fn header_value(&self) -> String {
        match &self.contact_url {
            Some(url) => format!("{}/{} (+{})", self.crawler_name, self.crawler_version, url),
            None => format!("{}/{}", self.crawler_name, self.crawler_version),
        }
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: default_crawler_name(),
            crawler_version: default_crawler_version(),
            contact_url: None,
        }
    }
}

/// Discovered-link filter configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterConfig {
    /// URL patterns a link must match (any of them)
    #[serde(default)]
    pub patterns: Vec<String>,

    #[serde(rename = "pattern-syntax", default)]
    pub pattern_syntax: PatternSyntax,

    /// URL patterns that reject a link
    #[serde(rename = "exclude-patterns", default)]
    pub exclude_patterns: Vec<String>,

    /// Domain patterns (e.g. `example.com` or `*.example.com`) a link must match
    #[serde(rename = "allowed-domains", default)]
    pub allowed_domains: Vec<String>,

    #[serde(rename = "blocked-domains", default)]
    pub blocked_domains: Vec<String>,

    /// Only follow links that look like pages rather than assets
    #[serde(rename = "pages-only", default)]
    pub pages_only: bool,
}

/// One weighted URL scorer
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ScorerConfig {
    Keyword {
        keywords: Vec<String>,
        #[serde(default = "default_weight")]
        weight: f64,
    },
    PathDepth {
        #[serde(rename = "optimal-depth", default = "default_optimal_depth")]
        optimal_depth: usize,
        #[serde(default = "default_weight")]
        weight: f64,
    },
    ContentType {
        #[serde(default = "default_weight")]
        weight: f64,
    },
    Freshness {
        /// Reference year; the current UTC year when unset
        #[serde(rename = "current-year")]
        current_year: Option<i32>,
        #[serde(default = "default_weight")]
        weight: f64,
    },
}

impl ScorerConfig {
    pub fn weight(&self) -> f64 {
        match self {
            ScorerConfig::Keyword { weight, .. }
            | ScorerConfig::PathDepth { weight, .. }
            | ScorerConfig::ContentType { weight }
            | ScorerConfig::Freshness { weight, .. } => *weight,
        }
    }
}

/// Per-domain circuit breaker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BreakerConfig {
    /// Failures within the window that open the circuit
    #[serde(rename = "failure-threshold", default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(rename = "window-secs", default = "default_window_secs")]
    pub window_secs: u64,

    /// Time an open circuit rejects before allowing probes
    #[serde(rename = "cooldown-secs", default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Concurrent probes allowed while half-open
    #[serde(rename = "half-open-probes", default = "default_half_open_probes")]
    pub half_open_probes: u32,

    /// Lifetime of per-domain breaker records in the store
    #[serde(rename = "state-ttl-secs", default = "default_state_ttl_secs")]
    pub state_ttl_secs: u64,

    /// Times a page skipped by an open circuit is held back and retried
    /// after the cooldown before it is dropped
    #[serde(rename = "max-deferrals", default = "default_max_deferrals")]
    pub max_deferrals: u32,
}

impl BreakerConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.state_ttl_secs)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            window_secs: default_window_secs(),
            cooldown_secs: default_cooldown_secs(),
            half_open_probes: default_half_open_probes(),
            state_ttl_secs: default_state_ttl_secs(),
            max_deferrals: default_max_deferrals(),
        }
    }
}

/// Memory-adaptive concurrency governor configuration
///
/// Thresholds are memory utilisation percentages.
#[derive(Debug, Clone, Deserialize)]
pub struct GovernorConfig {
    #[serde(rename = "min-limit", default = "default_min_limit")]
    pub min_limit: usize,

    /// Defaults to `crawl.concurrency`
    #[serde(rename = "max-limit")]
    pub max_limit: Option<usize>,

    #[serde(rename = "sample-interval-ms", default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    #[serde(rename = "low-threshold", default = "default_low_threshold")]
    pub low_threshold: f64,

    #[serde(rename = "high-threshold", default = "default_high_threshold")]
    pub high_threshold: f64,

    #[serde(rename = "critical-threshold", default = "default_critical_threshold")]
    pub critical_threshold: f64,
}

impl GovernorConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            min_limit: default_min_limit(),
            max_limit: None,
            sample_interval_ms: default_sample_interval_ms(),
            low_threshold: default_low_threshold(),
            high_threshold: default_high_threshold(),
            critical_threshold: default_critical_threshold(),
        }
    }
}

/// Domain strategy memory configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyMemoryConfig {
    /// Lifetime of per-domain strategy records
    #[serde(rename = "ttl-secs", default = "default_strategy_ttl_secs")]
    pub ttl_secs: u64,

    /// Band failure count that must be exceeded to skip tiers
    #[serde(rename = "failure-threshold", default = "default_band_threshold")]
    pub failure_threshold: u32,

    /// Starting tier when nothing is known about a domain
    #[serde(rename = "default-tier", default = "default_tier")]
    pub default_tier: u32,

    /// Fetch tiers from cheapest to most expensive
    #[serde(default = "default_tiers")]
    pub tiers: Vec<Tier>,
}

impl StrategyMemoryConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for StrategyMemoryConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_strategy_ttl_secs(),
            failure_threshold: default_band_threshold(),
            default_tier: default_tier(),
            tiers: default_tiers(),
        }
    }
}

/// Shared state store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Connection URL, required for the `redis` backend
    #[serde(rename = "redis-url")]
    pub redis_url: Option<String>,

    /// Prefix for every key written by the breaker and strategy memory
    #[serde(rename = "key-prefix", default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: None,
            key_prefix: default_key_prefix(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

/// Frontier checkpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointConfig {
    /// Checkpoint file; checkpointing is disabled when unset
    pub path: Option<PathBuf>,

    /// Pages between periodic checkpoints
    #[serde(rename = "every-pages", default = "default_every_pages")]
    pub every_pages: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            path: None,
            every_pages: default_every_pages(),
        }
    }
}

fn default_strategy() -> String {
    "bfs".to_string()
}

fn default_max_depth() -> u32 {
    3
}

fn default_max_pages() -> u64 {
    100
}

fn default_concurrency() -> usize {
    8
}

fn default_batch_size() -> usize {
    10
}

fn default_crawler_name() -> String {
    "sumi-helm".to_string()
}

fn default_crawler_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_weight() -> f64 {
    1.0
}

fn default_optimal_depth() -> usize {
    3
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_window_secs() -> u64 {
    60
}

fn default_cooldown_secs() -> u64 {
    30
}

fn default_half_open_probes() -> u32 {
    1
}

fn default_state_ttl_secs() -> u64 {
    3600
}

fn default_max_deferrals() -> u32 {
    2
}

fn default_min_limit() -> usize {
    1
}

fn default_sample_interval_ms() -> u64 {
    1000
}

fn default_low_threshold() -> f64 {
    60.0
}

fn default_high_threshold() -> f64 {
    80.0
}

fn default_critical_threshold() -> f64 {
    90.0
}

fn default_strategy_ttl_secs() -> u64 {
    86_400
}

fn default_band_threshold() -> u32 {
    2
}

fn default_tier() -> u32 {
    1
}

fn default_tiers() -> Vec<Tier> {
    vec![
        Tier {
            level: 0,
            name: "http-light".to_string(),
            kind: TierKind::Http,
        },
        Tier {
            level: 1,
            name: "http".to_string(),
            kind: TierKind::Http,
        },
        Tier {
            level: 2,
            name: "browser".to_string(),
            kind: TierKind::Browser,
        },
        Tier {
            level: 3,
            name: "browser-stealth".to_string(),
            kind: TierKind::Browser,
        },
    ]
}

fn default_key_prefix() -> String {
    "sumi-helm".to_string()
}

fn default_every_pages() -> u64 {
    50
}
