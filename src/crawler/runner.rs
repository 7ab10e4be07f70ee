use crate::breaker::{Admission, BreakerState, CircuitBreaker, CircuitOpenError};
use crate::crawler::{parse_html, FetchError, PageFetcher, ParsedPage};
use crate::frontier::{save_checkpoint, Frontier, FrontierEntry};
use crate::governor::ConcurrencyGovernor;
use crate::output::CrawlReport;
use crate::strategy::DomainStrategyMemory;
use crate::url::domain_key;
use crate::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};
use url::Url;

/// What happened to one frontier entry
#[derive(Debug)]
enum PageOutcome {
    Fetched { tier: u32, page: ParsedPage },
    Failed(FetchError),
    CircuitOpen(CircuitOpenError),
    /// Every tier was refused by the fetcher
    NoTier,
    InvalidUrl,
    /// The governor was closed before a permit was granted
    Cancelled,
}

/// Longest single wait for deferred pages, so a closed governor is noticed
const DEFERRAL_POLL: Duration = Duration::from_secs(1);

/// A page skipped by an open circuit, held until the circuit may admit it
#[derive(Debug)]
struct Deferred {
    due: Instant,
    entry: FrontierEntry,
}

#[derive(Debug, Clone)]
struct CheckpointPolicy {
    path: PathBuf,
    every_pages: u64,
    config_hash: String,
}

/// Shared handles a fetch task needs
#[derive(Clone)]
struct Workers {
    breaker: Arc<CircuitBreaker>,
    governor: ConcurrencyGovernor,
    strategy: Arc<DomainStrategyMemory>,
    fetcher: Arc<dyn PageFetcher>,
}

/// Drives a frontier to completion
///
/// Each batch from the frontier is fetched concurrently, bounded by the
/// governor. Per entry: the domain's circuit is checked, a permit is taken,
/// the strategy memory picks a starting tier, and tiers are tried in
/// escalation order until one succeeds, a permanent failure ends the
/// attempt, or the ladder is exhausted. Outcomes are reported to the breaker
/// and strategy memory as they happen. Discovered links go back into the
/// frontier on this task, in batch order, so a crawl is reproducible for a
/// given set of responses.
///
/// A page skipped because its domain's circuit is open is held back until the
/// circuit's `retry_after` has passed and then queued again, up to the
/// breaker's `max-deferrals` times. Its page budget is refunded while it waits.
pub struct CrawlJob {
    frontier: Frontier,
    workers: Workers,
    checkpoint: Option<CheckpointPolicy>,
}

impl CrawlJob {
    pub fn new(
        frontier: Frontier,
        breaker: Arc<CircuitBreaker>,
        governor: ConcurrencyGovernor,
        strategy: Arc<DomainStrategyMemory>,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        Self {
            frontier,
            workers: Workers {
                breaker,
                governor,
                strategy,
                fetcher,
            },
            checkpoint: None,
        }
    }

    /// Saves the frontier to `path` every `every_pages` crawled pages and
    /// when the run ends
    pub fn with_checkpoint(
        mut self,
        path: impl Into<PathBuf>,
        every_pages: u64,
        config_hash: impl Into<String>,
    ) -> Self {
        self.checkpoint = Some(CheckpointPolicy {
            path: path.into(),
            every_pages: every_pages.max(1),
            config_hash: config_hash.into(),
        });
        self
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    pub fn into_frontier(self) -> Frontier {
        self.frontier
    }

    /// Runs until the frontier is exhausted or the governor is closed
    pub async fn run(&mut self) -> Result<CrawlReport> {
        let mut report = CrawlReport::new(self.frontier.kind());
        let mut saved_at_pages = self.frontier.pages_crawled();
        let mut logged_at_pages = saved_at_pages;
        let mut cancelled = false;
        let max_deferrals = self.workers.breaker.config().max_deferrals;
        let mut deferred: Vec<Deferred> = Vec::new();
        let mut deferrals: HashMap<String, u32> = HashMap::new();

        tracing::info!(
            "Starting {} crawl: {} pending, {} already crawled",
            self.frontier.kind(),
            self.frontier.pending_len(),
            self.frontier.pages_crawled()
        );

        while !cancelled {
            self.release_due(&mut deferred);

            let batch = self.frontier.get_next_urls();
            if batch.is_empty() {
                let Some(next_due) = deferred.iter().map(|d| d.due).min() else {
                    break;
                };
                if self.workers.governor.is_closed() {
                    break;
                }
                debug!(waiting = deferred.len(), "Waiting for open circuits to cool down");
                time::sleep_until(next_due.min(Instant::now() + DEFERRAL_POLL)).await;
                continue;
            }

            let mut tasks = JoinSet::new();
            for (index, entry) in batch.into_iter().enumerate() {
                let workers = self.workers.clone();
                tasks.spawn(async move {
                    let outcome = workers.process(&entry).await;
                    (index, entry, outcome)
                });
            }

            let mut results = Vec::with_capacity(tasks.len());
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(result) => results.push(result),
                    Err(e) => {
                        tracing::error!("Fetch task failed: {}", e);
                        report.pages_failed += 1;
                    }
                }
            }
            results.sort_by_key(|(index, _, _)| *index);

            let mut unfetched = Vec::new();
            for (_, entry, outcome) in results {
                match outcome {
                    PageOutcome::Fetched { tier, page } => {
                        report.record_success(tier);
                        report.links_found += page.links.len() as u64;
                        let accepted = self
                            .frontier
                            .add_discovered_urls(&page.links, Some(entry.url.as_str()), entry.depth + 1)
                            .await;
                        report.links_accepted += accepted as u64;
                        debug!(url = %entry.url, tier, links = page.links.len(), accepted, "Fetched page");
                    }
                    PageOutcome::Failed(e) if e.is_transient() => {
                        report.pages_failed += 1;
                        debug!(url = %entry.url, error = %e, "Fetch failed");
                    }
                    PageOutcome::Failed(e) => {
                        report.permanent_failures += 1;
                        debug!(url = %entry.url, error = %e, "Page not usable");
                    }
                    PageOutcome::CircuitOpen(open) => {
                        let count = deferrals.entry(entry.url.clone()).or_insert(0);
                        if *count < max_deferrals {
                            *count += 1;
                            report.deferred += 1;
                            debug!(url = %entry.url, retry_after = ?open.retry_after, "Circuit open, deferring");
                            deferred.push(Deferred {
                                due: Instant::now() + open.retry_after,
                                entry,
                            });
                        } else {
                            report.skipped_by_circuit += 1;
                            debug!(url = %entry.url, error = %open, "Skipped");
                        }
                    }
                    PageOutcome::NoTier => {
                        report.unsupported += 1;
                        warn!(url = %entry.url, "No tier of the ladder could be executed");
                    }
                    PageOutcome::InvalidUrl => {
                        trace!(url = %entry.url, "Dropping unparseable frontier entry");
                    }
                    PageOutcome::Cancelled => {
                        cancelled = true;
                        unfetched.push(entry);
                    }
                }
            }

            if !unfetched.is_empty() {
                report.requeued += unfetched.len() as u64;
                self.frontier.requeue(unfetched);
                tracing::info!("Governor closed, stopping crawl");
            }

            let crawled = self.frontier.pages_crawled();
            if crawled / 10 > logged_at_pages / 10 {
                tracing::info!(
                    "Progress: {} pages crawled, {} pending",
                    crawled,
                    self.frontier.pending_len()
                );
                logged_at_pages = crawled;
            }

            if let Some(policy) = &self.checkpoint {
                if crawled.saturating_sub(saved_at_pages) >= policy.every_pages {
                    self.save(policy, &deferred)?;
                    saved_at_pages = crawled;
                }
            }
        }

        if !deferred.is_empty() {
            report.requeued += deferred.len() as u64;
            self.frontier
                .requeue(deferred.drain(..).map(|d| d.entry).collect());
        }

        if let Some(policy) = &self.checkpoint {
            self.save(policy, &deferred)?;
        }

        report.finished_at = Some(Utc::now());
        report.pages_crawled = self.frontier.pages_crawled();
        report.pending_remaining = self.frontier.pending_len();
        report.tripped_domains = self.workers.breaker.tripped_domains().await;

        let filters = self.frontier.filters();
        report.filter_passed = filters.stats().passed();
        report.filter_rejected = filters.stats().rejected();
        report.filter_rejections = filters
            .rejections()
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(name, count)| (name.to_string(), count))
            .collect();

        tracing::info!(
            "Crawl finished: {} fetched, {} failed, {} skipped by open circuits",
            report.pages_fetched,
            report.pages_failed + report.permanent_failures,
            report.skipped_by_circuit
        );
        Ok(report)
    }

    /// Queues deferred pages whose circuit cooldown has passed
    fn release_due(&mut self, deferred: &mut Vec<Deferred>) {
        let now = Instant::now();
        let (due, waiting): (Vec<Deferred>, Vec<Deferred>) =
            std::mem::take(deferred).into_iter().partition(|d| d.due <= now);
        *deferred = waiting;

        if !due.is_empty() {
            debug!(count = due.len(), "Retrying pages deferred by open circuits");
            self.frontier.requeue(due.into_iter().map(|d| d.entry).collect());
        }
    }

    /// Writes the frontier with deferred pages folded back into `pending`
    fn save(&self, policy: &CheckpointPolicy, deferred: &[Deferred]) -> Result<()> {
        let mut state = self.frontier.export_state();
        for held in deferred {
            if let Ok(pos) = state.visited.binary_search(&held.entry.url) {
                state.visited.remove(pos);
                state.pages_crawled = state.pages_crawled.saturating_sub(1);
                state.pending.push(held.entry.clone());
            }
        }
        save_checkpoint(&policy.path, &policy.config_hash, state)
    }
}

impl Workers {
    async fn process(&self, entry: &FrontierEntry) -> PageOutcome {
        let Some((url, domain)) = Url::parse(&entry.url)
            .ok()
            .and_then(|url| domain_key(&url).map(|domain| (url, domain)))
        else {
            return PageOutcome::InvalidUrl;
        };

        let admission = match self.breaker.check(&domain).await {
            Ok(admission) => admission,
            Err(open) => return PageOutcome::CircuitOpen(open),
        };

        let _permit = match self.governor.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                if admission == Admission::Probe {
                    self.breaker.record_failure(&domain).await;
                }
                return PageOutcome::Cancelled;
            }
        };

        let plan = self.strategy.plan(&domain).await;

        let mut last_error = None;
        for tier in self.strategy.ladder().escalation_order(plan.start_tier) {
            let started = Instant::now();
            match self.fetcher.fetch(&url, tier).await {
                Ok(fetched) => {
                    self.breaker.record_success(&domain).await;
                    self.strategy
                        .record_success(&domain, tier.level, started.elapsed())
                        .await;
                    let page = parse_html(&fetched.body, &fetched.final_url);
                    return PageOutcome::Fetched {
                        tier: tier.level,
                        page,
                    };
                }
                Err(FetchError::UnsupportedTier { .. }) => {
                    trace!(url = %url, tier = %tier, "Tier not supported by fetcher");
                }
                Err(e) if e.is_transient() => {
                    debug!(url = %url, tier = %tier, error = %e, "Transient failure, escalating");
                    self.breaker.record_failure(&domain).await;
                    self.strategy.record_failure(&domain, tier.level).await;
                    last_error = Some(e);

                    if matches!(self.breaker.state(&domain).await, BreakerState::Open { .. }) {
                        break;
                    }
                }
                Err(e) => {
                    self.breaker.record_success(&domain).await;
                    return PageOutcome::Failed(e);
                }
            }
        }

        match last_error {
            Some(e) => PageOutcome::Failed(e),
            None => {
                // nothing reached the host, so a probe proved nothing
                if admission == Admission::Probe {
                    self.breaker.record_failure(&domain).await;
                }
                PageOutcome::NoTier
            }
        }
    }
}
