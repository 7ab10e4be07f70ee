//! Integration tests for the crawl job
//!
//! These tests use wiremock to serve small sites and run the frontier,
//! circuit breaker, governor and strategy memory together end-to-end.

use std::sync::Arc;
use std::time::Duration;
use sumi_helm::config::{parse_config, Config};
use sumi_helm::crawler::{CrawlJob, HttpFetcher};
use sumi_helm::frontier::load_checkpoint;
use sumi_helm::store::{Clock, MemoryStore, StateStore, SystemClock};
use sumi_helm::strategy::TierLadder;
use sumi_helm::{BreakerState, CircuitBreaker, ConcurrencyGovernor, DomainStrategyMemory, Frontier};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    job: CrawlJob,
    breaker: Arc<CircuitBreaker>,
    strategy: Arc<DomainStrategyMemory>,
}

/// Builds a configuration seeded at the mock server's root
///
/// `crawl` is appended to the `[crawl]` table, `sections` after it.
fn config_for(server: &MockServer, crawl: &str, sections: &str) -> Config {
    parse_config(&format!(
        "[crawl]\nseed = \"{}/\"\n{}\n{}",
        server.uri(),
        crawl,
        sections
    ))
    .expect("valid test configuration")
}

fn frontier_for(config: &Config) -> Frontier {
    Frontier::from_config(config).expect("valid frontier configuration")
}

fn build(config: &Config, frontier: Frontier, store: Arc<dyn StateStore>) -> Harness {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let breaker = Arc::new(CircuitBreaker::new(
        store.clone(),
        clock.clone(),
        config.circuit_breaker.clone(),
        config.store.key_prefix.clone(),
    ));
    let ladder = TierLadder::new(config.strategy_memory.tiers.clone()).unwrap();
    let strategy = Arc::new(DomainStrategyMemory::new(
        store,
        clock,
        ladder,
        &config.strategy_memory,
        config.store.key_prefix.clone(),
    ));
    let fetcher = HttpFetcher::from_config(&config.user_agent)
        .unwrap()
        .with_base_timeout(Duration::from_secs(5));

    let job = CrawlJob::new(
        frontier,
        breaker.clone(),
        ConcurrencyGovernor::from_config(config),
        strategy.clone(),
        Arc::new(fetcher),
    );
    Harness {
        job,
        breaker,
        strategy,
    }
}

fn seeded(config: &Config) -> Frontier {
    let mut frontier = frontier_for(config);
    frontier.seed(&config.crawl.seed).unwrap();
    frontier
}

fn html_page(links: &[&str]) -> ResponseTemplate {
    let body = links
        .iter()
        .map(|l| format!(r#"<a href="{}">link</a>"#, l))
        .collect::<String>();
    ResponseTemplate::new(200).set_body_raw(
        format!("<html><head><title>Test</title></head><body>{}</body></html>", body).into_bytes(),
        "text/html",
    )
}

async fn mount_page(server: &MockServer, route: &str, links: &[&str], expected_hits: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html_page(links))
        .expect(expected_hits)
        .mount(server)
        .await;
}

fn requested_paths(requests: &[wiremock::Request]) -> Vec<String> {
    requests.iter().map(|r| r.url.path().to_string()).collect()
}

#[tokio::test]
async fn test_bfs_crawl_single_domain() {
    let server = MockServer::start().await;

    mount_page(
        &server,
        "/",
        &["/page1", "/page2", "/page1#section", "https://elsewhere.invalid/x"],
        1,
    )
    .await;
    mount_page(&server, "/page1", &["/page3", "/"], 1).await;
    mount_page(&server, "/page2", &["/page3?utm_source=feed"], 1).await;
    mount_page(&server, "/page3", &[], 1).await;

    let config = config_for(&server, "max-depth = 3", "");
    let mut h = build(&config, seeded(&config), Arc::new(MemoryStore::new()));

    let report = h.job.run().await.unwrap();

    assert_eq!(report.pages_fetched, 4);
    assert_eq!(report.pages_failed, 0);
    assert_eq!(report.permanent_failures, 0);
    assert_eq!(report.pages_crawled, 4);
    assert_eq!(report.pending_remaining, 0);
    assert!(report.tripped_domains.is_empty());

    let paths = requested_paths(&server.received_requests().await.unwrap());
    assert_eq!(paths[0], "/");
    assert_eq!(paths[3], "/page3");

    let record = h.strategy.record("127.0.0.1").await.unwrap();
    assert_eq!(record.last_success_tier, Some(config.strategy_memory.default_tier));
}

#[tokio::test]
async fn test_max_depth_and_page_budget() {
    let server = MockServer::start().await;

    mount_page(&server, "/", &["/a"], 1).await;
    mount_page(&server, "/a", &["/a/b"], 1).await;
    mount_page(&server, "/a/b", &["/a/b/c"], 0).await;

    let config = config_for(&server, "max-depth = 1", "");
    let mut h = build(&config, seeded(&config), Arc::new(MemoryStore::new()));
    let report = h.job.run().await.unwrap();
    assert_eq!(report.pages_fetched, 2);

    let server = MockServer::start().await;
    mount_page(&server, "/", &["/1", "/2", "/3"], 1).await;
    Mock::given(method("GET"))
        .respond_with(html_page(&[]))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server, "max-pages = 2", "");
    let mut h = build(&config, seeded(&config), Arc::new(MemoryStore::new()));
    let report = h.job.run().await.unwrap();
    assert_eq!(report.pages_crawled, 2);
    assert_eq!(report.pending_remaining, 2);
}

#[tokio::test]
async fn test_failing_host_trips_breaker() {
    let server = MockServer::start().await;

    mount_page(&server, "/", &["/a", "/b", "/c", "/d", "/e"], 1).await;
    // /a fails on tiers 1 and 0, /b on tier 1 opens the circuit
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let config = config_for(
        &server,
        "strategy = \"dfs\"",
        "[circuit-breaker]\nfailure-threshold = 3\ncooldown-secs = 300\nmax-deferrals = 0",
    );
    let mut h = build(&config, seeded(&config), Arc::new(MemoryStore::new()));

    let report = h.job.run().await.unwrap();

    assert_eq!(report.pages_fetched, 1);
    assert_eq!(report.pages_failed, 2);
    assert_eq!(report.skipped_by_circuit, 3);
    assert_eq!(report.tripped_domains, vec!["127.0.0.1".to_string()]);
    assert!(matches!(
        h.breaker.state("127.0.0.1").await,
        BreakerState::Open { .. }
    ));

    let record = h.strategy.record("127.0.0.1").await.unwrap();
    assert_eq!(record.fail_count_band1, 3);
}

#[tokio::test]
async fn test_not_found_is_not_a_host_failure() {
    let server = MockServer::start().await;

    mount_page(&server, "/", &["/gone1", "/gone2", "/gone3"], 1).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(3)
        .mount(&server)
        .await;

    let config = config_for(&server, "", "[circuit-breaker]\nfailure-threshold = 1");
    let mut h = build(&config, seeded(&config), Arc::new(MemoryStore::new()));

    let report = h.job.run().await.unwrap();

    assert_eq!(report.permanent_failures, 3);
    assert_eq!(report.skipped_by_circuit, 0);
    assert_eq!(h.breaker.state("127.0.0.1").await, BreakerState::Closed);
}

#[tokio::test]
async fn test_best_first_follows_scores() {
    let server = MockServer::start().await;

    mount_page(&server, "/", &["/misc", "/rust/guide", "/about", "/rust"], 1).await;
    Mock::given(method("GET"))
        .respond_with(html_page(&[]))
        .expect(4)
        .mount(&server)
        .await;

    let config = config_for(
        &server,
        "strategy = \"best-first\"\nbatch-size = 1",
        "[[scorers]]\nkind = \"keyword\"\nkeywords = [\"rust\", \"guide\"]",
    );
    let mut h = build(&config, seeded(&config), Arc::new(MemoryStore::new()));
    h.job.run().await.unwrap();

    let paths = requested_paths(&server.received_requests().await.unwrap());
    assert_eq!(paths, vec!["/", "/rust/guide", "/rust", "/misc", "/about"]);
}

#[tokio::test]
async fn test_filters_keep_links_out() {
    let server = MockServer::start().await;

    mount_page(
        &server,
        "/",
        &["/docs/intro", "/private/keys", "/logo.png", "/docs/setup"],
        1,
    )
    .await;
    mount_page(&server, "/docs/intro", &[], 1).await;
    mount_page(&server, "/docs/setup", &[], 1).await;
    mount_page(&server, "/private/keys", &[], 0).await;
    mount_page(&server, "/logo.png", &[], 0).await;

    let config = config_for(
        &server,
        "",
        "[filters]\nexclude-patterns = [\"*/private/*\"]\npages-only = true",
    );
    let mut h = build(&config, seeded(&config), Arc::new(MemoryStore::new()));

    let report = h.job.run().await.unwrap();

    assert_eq!(report.pages_fetched, 3);
    assert_eq!(report.links_accepted, 2);
    assert_eq!(report.filter_rejected, 2);
}

#[tokio::test]
async fn test_checkpoint_resume() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let checkpoint = dir.path().join("frontier.json");

    mount_page(&server, "/", &["/one", "/two", "/three"], 1).await;
    mount_page(&server, "/one", &["/four"], 1).await;
    mount_page(&server, "/two", &[], 1).await;
    mount_page(&server, "/three", &[], 1).await;
    mount_page(&server, "/four", &[], 1).await;

    let first = config_for(&server, "strategy = \"dfs\"\nmax-pages = 2", "");
    let mut h = build(&first, seeded(&first), Arc::new(MemoryStore::new()));
    h.job = h.job.with_checkpoint(&checkpoint, 1, "first");
    let report = h.job.run().await.unwrap();
    assert_eq!(report.pages_crawled, 2);

    let saved = load_checkpoint(&checkpoint, "first").unwrap().unwrap();
    assert_eq!(saved.frontier.pages_crawled, 2);
    assert_eq!(saved.frontier.pending.len(), 3);

    let second = config_for(&server, "strategy = \"dfs\"\nmax-pages = 10", "");
    let mut frontier = frontier_for(&second);
    frontier.restore_state(saved.frontier).unwrap();
    let mut h = build(&second, frontier, Arc::new(MemoryStore::new()));

    let report = h.job.run().await.unwrap();
    assert_eq!(report.pages_fetched, 3);
    assert_eq!(report.pages_crawled, 5);
    assert!(h.job.frontier().is_exhausted());
}

#[tokio::test]
async fn test_unavailable_store_fails_open() {
    let server = MockServer::start().await;

    mount_page(&server, "/", &["/a"], 1).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    store.set_available(false);

    let config = config_for(&server, "", "[circuit-breaker]\nfailure-threshold = 1");
    let mut h = build(&config, seeded(&config), store);

    let report = h.job.run().await.unwrap();

    assert_eq!(report.pages_fetched, 1);
    assert_eq!(report.pages_failed, 1);
    assert_eq!(report.skipped_by_circuit, 0);
    assert_eq!(h.breaker.state("127.0.0.1").await, BreakerState::Closed);
}
