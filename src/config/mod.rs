//! Configuration module for Sumi-Helm
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Only `[crawl]` with a `seed` is required; every other section has defaults.
//!
//! # Example
//!
//! ```no_run
//! use sumi_helm::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("helm.toml")).unwrap();
//! println!("Crawl strategy: {}", config.crawl.strategy);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    BreakerConfig, CheckpointConfig, Config, CrawlConfig, FilterConfig, GovernorConfig,
    ScorerConfig, StoreBackend, StoreConfig, StrategyMemoryConfig, UserAgentConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
