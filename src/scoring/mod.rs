//! Link filters and scorers
//!
//! Filters decide whether a discovered link may enter the frontier at all;
//! scorers rank the survivors for best-first traversal and for the
//! `score-threshold` cut.

mod filters;
mod scorers;

pub use filters::{
    ContentTypeFilter, DomainFilter, FilterChain, FilterStats, PatternFilter, PatternSyntax,
};
pub use scorers::{
    CompositeScorer, ContentTypeScorer, FreshnessScorer, KeywordRelevanceScorer, PathDepthScorer,
};

use crate::config::{FilterConfig, ScorerConfig};
use crate::ConfigResult;
use async_trait::async_trait;
use chrono::Datelike;
use url::Url;

/// Predicate over a canonical URL
#[async_trait]
pub trait UrlFilter: Send + Sync {
    /// Short name used in filter statistics
    fn name(&self) -> &'static str;

    /// Returns true if the URL may be queued
    async fn apply(&self, url: &Url) -> bool;
}

/// Pure scoring function over a canonical URL
pub trait UrlScorer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns a score in `[0, 1]`
    fn score(&self, url: &Url) -> f64;
}

/// Lowercase extension of the last path segment, if it has one
pub(crate) fn path_extension(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Builds the filter chain described by `[filters]`
///
/// Filters run cheapest first: domains, content type, then patterns.
pub fn build_filter_chain(config: &FilterConfig) -> ConfigResult<FilterChain> {
    let mut filters: Vec<Box<dyn UrlFilter>> = Vec::new();

    if !config.allowed_domains.is_empty() || !config.blocked_domains.is_empty() {
        filters.push(Box::new(DomainFilter::new(
            config.allowed_domains.clone(),
            config.blocked_domains.clone(),
        )));
    }

    if config.pages_only {
        filters.push(Box::new(ContentTypeFilter));
    }

    if !config.patterns.is_empty() {
        filters.push(Box::new(PatternFilter::new(
            &config.patterns,
            config.pattern_syntax,
            false,
        )?));
    }

    if !config.exclude_patterns.is_empty() {
        filters.push(Box::new(PatternFilter::new(
            &config.exclude_patterns,
            config.pattern_syntax,
            true,
        )?));
    }

    Ok(FilterChain::new(filters))
}

/// Builds a weighted composite from `[[scorers]]`; `None` when none are configured
pub fn build_scorer(configs: &[ScorerConfig]) -> Option<CompositeScorer> {
    if configs.is_empty() {
        return None;
    }

    let mut composite = CompositeScorer::new();
    for config in configs {
        let weight = config.weight();
        match config {
            ScorerConfig::Keyword { keywords, .. } => {
                composite.add(KeywordRelevanceScorer::new(keywords.clone()), weight)
            }
            ScorerConfig::PathDepth { optimal_depth, .. } => {
                composite.add(PathDepthScorer::new(*optimal_depth), weight)
            }
            ScorerConfig::ContentType { .. } => composite.add(ContentTypeScorer, weight),
            ScorerConfig::Freshness { current_year, .. } => {
                let year = current_year.unwrap_or_else(|| chrono::Utc::now().year());
                composite.add(FreshnessScorer::new(year), weight)
            }
        }
    }
    Some(composite)
}
