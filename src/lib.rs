//! Sumi-Helm: crawl orchestration core
//!
//! This crate decides which URL a crawl fetches next, in what order, how
//! aggressively, and how to react when a remote host is failing. It provides
//! URL canonicalisation, composable filters and scorers, a BFS/DFS/best-first
//! frontier, a per-domain circuit breaker, a memory-aware concurrency governor
//! and a per-domain fetch-tier memory, plus a reference job runner that wires
//! them together.

pub mod breaker;
pub mod config;
pub mod crawler;
pub mod frontier;
pub mod governor;
pub mod output;
pub mod scoring;
pub mod store;
pub mod strategy;
pub mod url;

use thiserror::Error;

pub use breaker::CircuitOpenError;
pub use store::StoreError;

/// Main error type for Sumi-Helm operations
#[derive(Debug, Error)]
pub enum HelmError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    #[error("Checkpoint was taken with strategy {found}, frontier uses {expected}")]
    CheckpointMismatch { expected: String, found: String },

    #[error("Concurrency governor is closed")]
    GovernorClosed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
///
/// These are fatal at construction time and never recovered from.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Unknown traversal strategy: {0}")]
    UnknownStrategy(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Sumi-Helm operations
pub type Result<T> = std::result::Result<T, HelmError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use breaker::{BreakerState, CircuitBreaker};
pub use config::Config;
pub use frontier::{Frontier, FrontierEntry, FrontierState, StrategyKind};
pub use governor::ConcurrencyGovernor;
pub use strategy::{DomainStrategyMemory, TierPlan};
pub use url::{deduplicate, normalize_for_crawl, normalize_url};
