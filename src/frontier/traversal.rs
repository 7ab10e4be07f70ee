use crate::config::Config;
use crate::frontier::{FrontierEntry, FrontierState, StrategyKind};
use crate::scoring::{build_filter_chain, build_scorer, FilterChain, UrlScorer};
use crate::url::{domain_key, is_same_domain, normalize_for_crawl, normalize_url};
use crate::{ConfigResult, HelmError, UrlError};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace};
use url::Url;

/// Limits and switches of a frontier
#[derive(Debug, Clone, PartialEq)]
pub struct FrontierSettings {
    pub max_depth: u32,
    pub max_pages: u64,
    /// Entries per `get_next_urls`; DFS always uses 1
    pub batch_size: usize,
    pub include_external: bool,
    /// Applied only when a scorer is configured
    pub score_threshold: Option<f64>,
    /// Also strip pagination and view parameters when canonicalising
    pub strip_navigation_params: bool,
}

impl Default for FrontierSettings {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_pages: 100,
            batch_size: 10,
            include_external: false,
            score_threshold: None,
            strip_navigation_params: false,
        }
    }
}

/// Best-first heap entry: higher score first, then lower sequence
///
/// Discovered entries count up from zero; requeued entries count down from
/// -1 so they come back ahead of everything queued with the same score.
#[derive(Debug)]
struct Ranked {
    entry: FrontierEntry,
    seq: i64,
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.entry
            .score
            .total_cmp(&other.entry.score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

#[derive(Debug)]
enum Pending {
    Queue(VecDeque<FrontierEntry>),
    Stack(Vec<FrontierEntry>),
    Heap(BinaryHeap<Ranked>),
}

impl Pending {
    fn new(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::Bfs => Pending::Queue(VecDeque::new()),
            StrategyKind::Dfs => Pending::Stack(Vec::new()),
            StrategyKind::BestFirst => Pending::Heap(BinaryHeap::new()),
        }
    }

    fn len(&self) -> usize {
        match self {
            Pending::Queue(q) => q.len(),
            Pending::Stack(s) => s.len(),
            Pending::Heap(h) => h.len(),
        }
    }

    fn pop(&mut self) -> Option<FrontierEntry> {
        match self {
            Pending::Queue(q) => q.pop_front(),
            Pending::Stack(s) => s.pop(),
            Pending::Heap(h) => h.pop().map(|r| r.entry),
        }
    }

    /// Entries in pop order
    fn snapshot(&self) -> Vec<FrontierEntry> {
        match self {
            Pending::Queue(q) => q.iter().cloned().collect(),
            Pending::Stack(s) => s.iter().rev().cloned().collect(),
            Pending::Heap(h) => {
                let mut ranked: Vec<&Ranked> = h.iter().collect();
                ranked.sort_by(|a, b| b.cmp(a));
                ranked.into_iter().map(|r| r.entry.clone()).collect()
            }
        }
    }
}

/// Traversal state machine for one crawl job
pub struct Frontier {
    kind: StrategyKind,
    settings: FrontierSettings,
    pending: Pending,
    visited: HashSet<String>,
    queued: HashSet<String>,
    base_domain: Option<String>,
    pages_crawled: u64,
    next_seq: i64,
    requeue_seq: i64,
    filters: FilterChain,
    scorer: Option<Arc<dyn UrlScorer>>,
}

impl Frontier {
    pub fn new(kind: StrategyKind, settings: FrontierSettings) -> Self {
        Self {
            kind,
            settings,
            pending: Pending::new(kind),
            visited: HashSet::new(),
            queued: HashSet::new(),
            base_domain: None,
            pages_crawled: 0,
            next_seq: 0,
            requeue_seq: 0,
            filters: FilterChain::empty(),
            scorer: None,
        }
    }

    pub fn with_filters(mut self, filters: FilterChain) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn UrlScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// Builds an unseeded frontier from `[crawl]`, `[filters]` and `[[scorers]]`
    pub fn from_config(config: &Config) -> ConfigResult<Self> {
        let crawl = &config.crawl;
        let kind: StrategyKind = crawl.strategy.parse()?;
        let settings = FrontierSettings {
            max_depth: crawl.max_depth,
            max_pages: crawl.max_pages,
            batch_size: crawl.batch_size,
            include_external: crawl.include_external,
            score_threshold: crawl.score_threshold,
            strip_navigation_params: crawl.strip_navigation_params,
        };

        let mut frontier = Self::new(kind, settings).with_filters(build_filter_chain(&config.filters)?);
        if let Some(scorer) = build_scorer(&config.scorers) {
            frontier = frontier.with_scorer(Arc::new(scorer));
        }
        Ok(frontier)
    }

    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    pub fn settings(&self) -> &FrontierSettings {
        &self.settings
    }

    /// Domain recorded by [`seed`](Self::seed), www-stripped
    pub fn base_domain(&self) -> Option<&str> {
        self.base_domain.as_deref()
    }

    pub fn pages_crawled(&self) -> u64 {
        self.pages_crawled
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn visited_len(&self) -> usize {
        self.visited.len()
    }

    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    /// True when nothing more will be handed out
    pub fn is_exhausted(&self) -> bool {
        self.pending.len() == 0 || self.pages_crawled >= self.settings.max_pages
    }

    /// Inserts the start URL at depth 0 and records its domain
    pub fn seed(&mut self, start_url: &str) -> Result<(), UrlError> {
        let url = self.canonicalize(start_url)?;
        let domain = domain_key(&url).ok_or(UrlError::MissingDomain)?;
        let key = url.to_string();

        debug!(url = %key, domain = %domain, strategy = %self.kind, "Seeding frontier");
        self.base_domain = Some(domain);

        if self.visited.contains(&key) || self.queued.contains(&key) {
            return Ok(());
        }

        let score = self.score(&url);
        self.push_all(vec![FrontierEntry {
            url: key,
            depth: 0,
            parent_url: None,
            score,
        }]);
        Ok(())
    }

    /// Hands out the next batch and marks it visited
    ///
    /// Returns at most `batch-size` entries (one for DFS), never more than
    /// the remaining page budget, and nothing once `max-pages` is reached.
    /// Each returned entry counts as a crawled page.
    pub fn get_next_urls(&mut self) -> Vec<FrontierEntry> {
        let remaining = self.settings.max_pages.saturating_sub(self.pages_crawled);
        let batch = match self.kind {
            StrategyKind::Dfs => 1,
            _ => self.settings.batch_size.max(1),
        };
        let budget = usize::try_from(remaining).unwrap_or(usize::MAX).min(batch);

        let mut out = Vec::with_capacity(budget);
        while out.len() < budget {
            let Some(entry) = self.pending.pop() else {
                break;
            };
            self.queued.remove(&entry.url);
            if !self.visited.insert(entry.url.clone()) {
                continue;
            }
            self.pages_crawled += 1;
            out.push(entry);
        }
        out
    }

    /// Puts handed-out entries back and undoes their visit
    ///
    /// Used when a job stops before fetching part of a batch. The entries are
    /// handed out again before anything else of equal priority.
    pub fn requeue(&mut self, entries: Vec<FrontierEntry>) {
        for entry in entries.into_iter().rev() {
            if self.queued.contains(&entry.url) || !self.visited.remove(&entry.url) {
                continue;
            }
            self.pages_crawled = self.pages_crawled.saturating_sub(1);
            self.queued.insert(entry.url.clone());

            match &mut self.pending {
                Pending::Queue(q) => q.push_front(entry),
                Pending::Stack(s) => s.push(entry),
                Pending::Heap(h) => {
                    self.requeue_seq -= 1;
                    h.push(Ranked {
                        entry,
                        seq: self.requeue_seq,
                    });
                }
            }
        }
    }

    /// Canonicalises, filters, scores and queues links found on a page
    ///
    /// `depth` is the depth of the discovered links. Returns how many were
    /// queued. Unparseable, duplicate, off-domain, filtered and low-scoring
    /// links are dropped silently.
    pub async fn add_discovered_urls<I, S>(
        &mut self,
        urls: I,
        parent_url: Option<&str>,
        depth: u32,
    ) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if depth > self.settings.max_depth {
            trace!(depth, max_depth = self.settings.max_depth, "Discovered links past max depth");
            return 0;
        }

        let mut batch_seen = HashSet::new();
        let mut accepted = Vec::new();

        for raw in urls {
            let raw = raw.as_ref();
            let url = match self.canonicalize(raw) {
                Ok(url) => url,
                Err(e) => {
                    trace!(url = raw, error = %e, "Dropping link");
                    continue;
                }
            };
            let key = url.to_string();

            if self.visited.contains(&key) || self.queued.contains(&key) || !batch_seen.insert(key.clone()) {
                trace!(url = %key, "Duplicate link");
                continue;
            }

            if !self.settings.include_external && !self.is_internal(&url) {
                trace!(url = %key, "Off-domain link");
                continue;
            }

            if !self.filters.apply(&url).await {
                continue;
            }

            let score = self.score(&url);
            if let (Some(threshold), Some(_)) = (self.settings.score_threshold, &self.scorer) {
                if score < threshold {
                    trace!(url = %key, score, threshold, "Score below threshold");
                    continue;
                }
            }

            accepted.push(FrontierEntry {
                url: key,
                depth,
                parent_url: parent_url.map(str::to_string),
                score,
            });
        }

        let count = accepted.len();
        self.push_all(accepted);
        count
    }

    /// Snapshot for checkpointing
    pub fn export_state(&self) -> FrontierState {
        let mut visited: Vec<String> = self.visited.iter().cloned().collect();
        visited.sort();

        FrontierState {
            strategy_kind: self.kind,
            visited,
            pending: self.pending.snapshot(),
            pages_crawled: self.pages_crawled,
            base_domain: self.base_domain.clone(),
        }
    }

    /// Replaces this frontier's state with a snapshot
    ///
    /// Fails if the snapshot was taken with another traversal strategy.
    pub fn restore_state(&mut self, state: FrontierState) -> Result<(), HelmError> {
        if state.strategy_kind != self.kind {
            return Err(HelmError::CheckpointMismatch {
                expected: self.kind.to_string(),
                found: state.strategy_kind.to_string(),
            });
        }

        self.visited = state.visited.into_iter().collect();
        self.queued.clear();
        self.pending = Pending::new(self.kind);
        self.next_seq = 0;
        self.requeue_seq = 0;
        self.pages_crawled = state.pages_crawled;
        self.base_domain = state.base_domain;

        // Snapshots list entries in pop order; the stack wants them bottom-up
        let mut pending = state.pending;
        if self.kind == StrategyKind::Dfs {
            pending.reverse();
        }
        for entry in pending {
            self.insert(entry);
        }

        debug!(
            strategy = %self.kind,
            visited = self.visited.len(),
            pending = self.pending.len(),
            pages_crawled = self.pages_crawled,
            "Restored frontier"
        );
        Ok(())
    }

    fn canonicalize(&self, raw: &str) -> Result<Url, UrlError> {
        if self.settings.strip_navigation_params {
            normalize_for_crawl(raw)
        } else {
            normalize_url(raw)
        }
    }

    fn is_internal(&self, url: &Url) -> bool {
        match (&self.base_domain, url.host_str()) {
            (Some(base), Some(host)) => is_same_domain(host, base),
            _ => false,
        }
    }

    fn score(&self, url: &Url) -> f64 {
        self.scorer.as_ref().map(|s| s.score(url)).unwrap_or(0.0)
    }

    /// Inserts entries in discovery order
    ///
    /// The stack receives them reversed so the first discovered link is on
    /// top.
    fn push_all(&mut self, entries: Vec<FrontierEntry>) {
        if self.kind == StrategyKind::Dfs {
            for entry in entries.into_iter().rev() {
                self.insert(entry);
            }
        } else {
            for entry in entries {
                self.insert(entry);
            }
        }
    }

    fn insert(&mut self, entry: FrontierEntry) {
        if self.visited.contains(&entry.url) || !self.queued.insert(entry.url.clone()) {
            return;
        }

        match &mut self.pending {
            Pending::Queue(q) => q.push_back(entry),
            Pending::Stack(s) => s.push(entry),
            Pending::Heap(h) => {
                let seq = self.next_seq;
                self.next_seq += 1;
                h.push(Ranked { entry, seq });
            }
        }
    }
}
