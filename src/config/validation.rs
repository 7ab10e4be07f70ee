use crate::config::types::{
    BreakerConfig, CheckpointConfig, Config, CrawlConfig, FilterConfig, GovernorConfig,
    ScorerConfig, StoreBackend, StoreConfig, StrategyMemoryConfig, UserAgentConfig,
};
use crate::frontier::StrategyKind;
use crate::scoring::build_filter_chain;
use crate::strategy::TierLadder;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawl_config(&config.crawl)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_filters(&config.filters)?;
    validate_scorers(&config.scorers)?;
    validate_breaker_config(&config.circuit_breaker)?;
    validate_governor_config(&config.governor, config.crawl.concurrency)?;
    validate_strategy_memory(&config.strategy_memory)?;
    validate_store_config(&config.store)?;
    validate_checkpoint_config(&config.checkpoint)?;
    Ok(())
}

fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    let seed = Url::parse(&config.seed)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", config.seed, e)))?;
    if seed.scheme() != "http" && seed.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "Seed URL '{}' must use HTTP or HTTPS",
            config.seed
        )));
    }
    if seed.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "Seed URL '{}' has no host",
            config.seed
        )));
    }

    config.strategy.parse::<StrategyKind>()?;

    if config.max_pages < 1 {
        return Err(ConfigError::Validation("max-pages must be >= 1".to_string()));
    }
    if config.concurrency < 1 {
        return Err(ConfigError::Validation("concurrency must be >= 1".to_string()));
    }
    if config.batch_size < 1 {
        return Err(ConfigError::Validation("batch-size must be >= 1".to_string()));
    }
    if let Some(threshold) = config.score_threshold {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Validation(format!(
                "score-threshold must be between 0 and 1, got {}",
                threshold
            )));
        }
    }

    Ok(())
}

fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler-name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler-name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    if let Some(contact) = &config.contact_url {
        Url::parse(contact)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact-url: {}", e)))?;
    }

    Ok(())
}

fn validate_filters(config: &FilterConfig) -> Result<(), ConfigError> {
    for pattern in config.allowed_domains.iter().chain(&config.blocked_domains) {
        validate_domain_pattern(pattern)?;
    }

    // compiles every include/exclude pattern
    build_filter_chain(config)?;
    Ok(())
}

fn validate_scorers(scorers: &[ScorerConfig]) -> Result<(), ConfigError> {
    for scorer in scorers {
        let weight = scorer.weight();
        if !weight.is_finite() || weight < 0.0 {
            return Err(ConfigError::Validation(format!(
                "Scorer weight must be a non-negative number, got {}",
                weight
            )));
        }
    }
    Ok(())
}

fn validate_breaker_config(config: &BreakerConfig) -> Result<(), ConfigError> {
    let checks = [
        (config.failure_threshold == 0, "failure-threshold"),
        (config.window_secs == 0, "window-secs"),
        (config.cooldown_secs == 0, "cooldown-secs"),
        (config.half_open_probes == 0, "half-open-probes"),
        (config.state_ttl_secs == 0, "state-ttl-secs"),
    ];

    for (is_zero, name) in checks {
        if is_zero {
            return Err(ConfigError::Validation(format!(
                "circuit-breaker {} must be >= 1",
                name
            )));
        }
    }
    Ok(())
}

fn validate_governor_config(config: &GovernorConfig, concurrency: usize) -> Result<(), ConfigError> {
    if config.min_limit < 1 {
        return Err(ConfigError::Validation("governor min-limit must be >= 1".to_string()));
    }

    let max_limit = config.max_limit.unwrap_or(concurrency);
    if config.min_limit > max_limit {
        return Err(ConfigError::Validation(format!(
            "governor min-limit ({}) exceeds max-limit ({})",
            config.min_limit, max_limit
        )));
    }
    if concurrency < config.min_limit || concurrency > max_limit {
        return Err(ConfigError::Validation(format!(
            "concurrency ({}) must lie within [{}, {}]",
            concurrency, config.min_limit, max_limit
        )));
    }

    if config.sample_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "governor sample-interval-ms must be >= 1".to_string(),
        ));
    }

    let (low, high, critical) = (
        config.low_threshold,
        config.high_threshold,
        config.critical_threshold,
    );
    if !(low > 0.0 && low < high && high < critical && critical <= 100.0) {
        return Err(ConfigError::Validation(format!(
            "governor thresholds must satisfy 0 < low < high < critical <= 100, got {} / {} / {}",
            low, high, critical
        )));
    }

    Ok(())
}

fn validate_strategy_memory(config: &StrategyMemoryConfig) -> Result<(), ConfigError> {
    let ladder = TierLadder::new(config.tiers.clone())?;

    if ladder.get(config.default_tier).is_none() {
        return Err(ConfigError::Validation(format!(
            "strategy-memory default-tier {} is not on the tier ladder",
            config.default_tier
        )));
    }
    if config.ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "strategy-memory ttl-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_store_config(config: &StoreConfig) -> Result<(), ConfigError> {
    if config.key_prefix.is_empty() {
        return Err(ConfigError::Validation("store key-prefix cannot be empty".to_string()));
    }

    if config.backend == StoreBackend::Redis {
        let url = config.redis_url.as_deref().ok_or_else(|| {
            ConfigError::Validation("store backend 'redis' requires redis-url".to_string())
        })?;
        Url::parse(url).map_err(|e| ConfigError::InvalidUrl(format!("Invalid redis-url: {}", e)))?;
    }

    Ok(())
}

fn validate_checkpoint_config(config: &CheckpointConfig) -> Result<(), ConfigError> {
    if config.every_pages == 0 {
        return Err(ConfigError::Validation(
            "checkpoint every-pages must be >= 1".to_string(),
        ));
    }
    Ok(())
}

/// Validates a domain pattern (supports a leading `*.` wildcard)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    match pattern.strip_prefix("*.") {
        Some(domain) => validate_domain_string(domain),
        None => validate_domain_string(pattern),
    }
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'example.com')",
            domain
        )));
    }

    Ok(())
}
