//! Crawl reports
//!
//! A [`CrawlReport`] is assembled by the job runner and can be:
//! - printed to stdout
//! - written as a markdown summary

mod markdown;
mod report;
pub mod stats;

pub use markdown::{format_markdown_report, write_markdown_report};
pub use report::CrawlReport;
pub use stats::print_report;
