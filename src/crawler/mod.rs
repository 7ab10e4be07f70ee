//! Reference crawl job
//!
//! This module wires the orchestration core into a working crawler:
//! - Fetching pages one tier at a time ([`PageFetcher`], [`HttpFetcher`])
//! - Extracting links from HTML
//! - Running a frontier to completion with breaker, governor and strategy
//!   memory in the loop ([`CrawlJob`])

mod fetcher;
mod parser;
mod runner;

pub use fetcher::{build_http_client, FetchError, FetchedPage, HttpFetcher, PageFetcher};
pub use parser::{parse_html, ParsedPage};
pub use runner::CrawlJob;
