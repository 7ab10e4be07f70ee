//! Summary of one crawl job

use crate::frontier::StrategyKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Counters collected while a [`CrawlJob`](crate::crawler::CrawlJob) runs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlReport {
    pub strategy: StrategyKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Pages handed out by the frontier, including those of a resumed run
    pub pages_crawled: u64,
    /// Pages fetched successfully during this run
    pub pages_fetched: u64,
    /// Pages whose every attempt failed transiently
    pub pages_failed: u64,
    /// Pages the host answered for but that could not be used (404, not HTML)
    pub permanent_failures: u64,
    /// Pages dropped because their domain's circuit stayed open
    pub skipped_by_circuit: u64,
    /// Times a page was held back for an open circuit and retried later
    pub deferred: u64,
    /// Pages for which no tier could be executed
    pub unsupported: u64,
    /// Pages put back in the frontier because the job stopped early
    pub requeued: u64,

    pub links_found: u64,
    pub links_accepted: u64,
    pub pending_remaining: usize,

    /// Successful fetches per tier level
    pub tier_successes: BTreeMap<u32, u64>,
    pub tripped_domains: Vec<String>,

    pub filter_passed: u64,
    pub filter_rejected: u64,
    /// Rejections per filter name
    pub filter_rejections: BTreeMap<String, u64>,
}

impl CrawlReport {
    pub fn new(strategy: StrategyKind) -> Self {
        Self {
            strategy,
            started_at: Utc::now(),
            finished_at: None,
            pages_crawled: 0,
            pages_fetched: 0,
            pages_failed: 0,
            permanent_failures: 0,
            skipped_by_circuit: 0,
            deferred: 0,
            unsupported: 0,
            requeued: 0,
            links_found: 0,
            links_accepted: 0,
            pending_remaining: 0,
            tier_successes: BTreeMap::new(),
            tripped_domains: Vec::new(),
            filter_passed: 0,
            filter_rejected: 0,
            filter_rejections: BTreeMap::new(),
        }
    }

    pub fn record_success(&mut self, tier: u32) {
        self.pages_fetched += 1;
        *self.tier_successes.entry(tier).or_insert(0) += 1;
    }

    /// Pages this run attempted or skipped
    pub fn pages_attempted(&self) -> u64 {
        self.pages_fetched
            + self.pages_failed
            + self.permanent_failures
            + self.skipped_by_circuit
            + self.unsupported
    }

    /// Percentage of attempted pages that were fetched
    pub fn success_rate(&self) -> f64 {
        let attempted = self.pages_attempted();
        if attempted == 0 {
            return 0.0;
        }
        (self.pages_fetched as f64 / attempted as f64) * 100.0
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate() {
        let mut report = CrawlReport::new(StrategyKind::Bfs);
        assert_eq!(report.success_rate(), 0.0);

        report.record_success(0);
        report.record_success(0);
        report.record_success(1);
        report.pages_failed = 1;
        assert!((report.success_rate() - 75.0).abs() < 1e-9);
        assert_eq!(report.tier_successes.get(&0), Some(&2));
        assert_eq!(report.tier_successes.get(&1), Some(&1));
    }

    #[test]
    fn test_requeued_pages_are_not_attempted() {
        let mut report = CrawlReport::new(StrategyKind::Dfs);
        report.requeued = 3;
        report.skipped_by_circuit = 2;
        assert_eq!(report.pages_attempted(), 2);
    }
}
