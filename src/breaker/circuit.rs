use crate::breaker::{Admission, BreakerState, CircuitOpenError};
use crate::config::BreakerConfig;
use crate::store::{duration_millis, Clock, StateStore, StoreResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const FAILURES: &str = "failures";
const OPENED_AT: &str = "opened-at";
const PROBES: &str = "probes";

/// Per-domain circuit breaker backed by a shared state store
///
/// The state is never stored directly. It is derived on every read from the
/// `opened-at` timestamp: absent means `Closed`, younger than the cooldown
/// means `Open`, older means `HalfOpen`. There is no background timer.
pub struct CircuitBreaker {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    config: BreakerConfig,
    prefix: String,
    sequence: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        config: BreakerConfig,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            prefix: prefix.into(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current state of a domain's circuit
    ///
    /// Reads `Closed` when the store is unavailable.
    pub async fn state(&self, domain: &str) -> BreakerState {
        match self.read_state(domain).await {
            Ok(state) => state,
            Err(e) => {
                warn!(domain, error = %e, "State store unavailable, reading circuit as closed");
                BreakerState::Closed
            }
        }
    }

    /// Decides whether a fetch to `domain` may proceed
    ///
    /// In `HalfOpen` each admitted call consumes one of the `half-open-probes`
    /// slots; callers beyond that are rejected with `retry_after` set to the
    /// full cooldown. Every admitted fetch must be followed by
    /// [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure).
    pub async fn check(&self, domain: &str) -> Result<Admission, CircuitOpenError> {
        match self.try_check(domain).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(domain, error = %e, "State store unavailable, letting fetch through");
                Ok(Admission::Closed)
            }
        }
    }

    /// Records a fetch that reached the host
    ///
    /// Only a half-open probe changes anything: it resets every counter for the
    /// domain. Successes while closed leave the failure window untouched.
    pub async fn record_success(&self, domain: &str) {
        if let Err(e) = self.try_record_success(domain).await {
            warn!(domain, error = %e, "Failed to record circuit success");
        }
    }

    /// Records a transient failure against `domain`
    pub async fn record_failure(&self, domain: &str) {
        if let Err(e) = self.try_record_failure(domain).await {
            warn!(domain, error = %e, "Failed to record circuit failure");
        }
    }

    /// Domains whose circuit opened and has not closed since
    pub async fn tripped_domains(&self) -> Vec<String> {
        match self.store.smembers(&self.tripped_key()).await {
            Ok(domains) => domains,
            Err(e) => {
                warn!(error = %e, "Failed to list tripped domains");
                Vec::new()
            }
        }
    }

    fn key(&self, domain: &str, field: &str) -> String {
        format!("{}:breaker:{}:{}", self.prefix, domain, field)
    }

    fn tripped_key(&self) -> String {
        format!("{}:breaker:tripped", self.prefix)
    }

    async fn read_state(&self, domain: &str) -> StoreResult<BreakerState> {
        let Some(raw) = self.store.get(&self.key(domain, OPENED_AT)).await? else {
            return Ok(BreakerState::Closed);
        };

        let Ok(opened_at) = raw.parse::<i64>() else {
            warn!(domain, value = %raw, "Ignoring malformed circuit timestamp");
            return Ok(BreakerState::Closed);
        };

        let elapsed = self.clock.now_millis().saturating_sub(opened_at).max(0);
        let cooldown = duration_millis(self.config.cooldown());

        if elapsed < cooldown {
            let remaining = u64::try_from(cooldown - elapsed).unwrap_or(0);
            Ok(BreakerState::Open {
                retry_after: Duration::from_millis(remaining),
            })
        } else {
            Ok(BreakerState::HalfOpen)
        }
    }

    async fn try_check(&self, domain: &str) -> StoreResult<Result<Admission, CircuitOpenError>> {
        match self.read_state(domain).await? {
            BreakerState::Closed => Ok(Ok(Admission::Closed)),
            BreakerState::Open { retry_after } => Ok(Err(CircuitOpenError {
                domain: domain.to_string(),
                retry_after,
            })),
            BreakerState::HalfOpen => {
                let probes = self
                    .store
                    .incr(&self.key(domain, PROBES), self.config.state_ttl())
                    .await?;

                if probes > i64::from(self.config.half_open_probes) {
                    debug!(domain, probes, "Half-open probe slots taken, rejecting");
                    Ok(Err(CircuitOpenError {
                        domain: domain.to_string(),
                        retry_after: self.config.cooldown(),
                    }))
                } else {
                    debug!(domain, probes, "Admitting half-open probe");
                    Ok(Ok(Admission::Probe))
                }
            }
        }
    }

    async fn try_record_success(&self, domain: &str) -> StoreResult<()> {
        if self.read_state(domain).await? != BreakerState::HalfOpen {
            return Ok(());
        }

        self.store
            .delete(&[
                self.key(domain, FAILURES),
                self.key(domain, OPENED_AT),
                self.key(domain, PROBES),
            ])
            .await?;
        self.store.srem(&self.tripped_key(), domain).await?;

        info!(domain, "Probe succeeded, circuit closed");
        Ok(())
    }

    async fn try_record_failure(&self, domain: &str) -> StoreResult<()> {
        let now = self.clock.now_millis();

        match self.read_state(domain).await? {
            BreakerState::Open { .. } => Ok(()),
            BreakerState::HalfOpen => {
                self.open(domain, now).await?;
                warn!(
                    domain,
                    cooldown_secs = self.config.cooldown_secs,
                    "Probe failed, circuit reopened"
                );
                Ok(())
            }
            BreakerState::Closed => {
                let key = self.key(domain, FAILURES);
                let member = format!(
                    "{}:{}:{}",
                    now,
                    std::process::id(),
                    self.sequence.fetch_add(1, Ordering::Relaxed)
                );
                self.store
                    .zadd(&key, &member, now as f64, self.config.window())
                    .await?;

                let window_start = now.saturating_sub(duration_millis(self.config.window()));
                self.store
                    .zremrangebyscore(&key, f64::NEG_INFINITY, window_start as f64)
                    .await?;

                let failures = self.store.zcard(&key).await?;
                if failures >= u64::from(self.config.failure_threshold) {
                    self.open(domain, now).await?;
                    warn!(
                        domain,
                        failures,
                        cooldown_secs = self.config.cooldown_secs,
                        "Circuit opened"
                    );
                } else {
                    debug!(domain, failures, "Recorded failure");
                }
                Ok(())
            }
        }
    }

    async fn open(&self, domain: &str, now: i64) -> StoreResult<()> {
        let ttl = self.config.cooldown() + self.config.state_ttl();
        self.store
            .set_ex(&self.key(domain, OPENED_AT), &now.to_string(), ttl)
            .await?;
        self.store
            .delete(&[self.key(domain, FAILURES), self.key(domain, PROBES)])
            .await?;
        self.store
            .sadd(&self.tripped_key(), domain, self.config.state_ttl())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ManualClock, MemoryStore};

    fn setup() -> (CircuitBreaker, Arc<MemoryStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let breaker = CircuitBreaker::new(
            store.clone(),
            clock.clone(),
            BreakerConfig::default(),
            "test",
        );
        (breaker, store, clock)
    }

    async fn fail_times(breaker: &CircuitBreaker, domain: &str, n: usize) {
        for _ in 0..n {
            breaker.record_failure(domain).await;
        }
    }

    #[tokio::test]
    async fn test_closed_by_default() {
        let (breaker, _, _) = setup();
        assert_eq!(breaker.state("a.example").await, BreakerState::Closed);
        assert_eq!(breaker.check("a.example").await, Ok(Admission::Closed));
    }

    #[tokio::test]
    async fn test_opens_after_threshold() {
        let (breaker, _, _) = setup();

        fail_times(&breaker, "a.example", 4).await;
        assert_eq!(breaker.state("a.example").await, BreakerState::Closed);

        breaker.record_failure("a.example").await;
        let err = breaker.check("a.example").await.unwrap_err();
        assert_eq!(err.domain, "a.example");
        assert_eq!(err.retry_after, Duration::from_secs(30));

        assert_eq!(breaker.state("b.example").await, BreakerState::Closed);
        assert_eq!(breaker.tripped_domains().await, vec!["a.example"]);
    }

    #[tokio::test]
    async fn test_failures_outside_window_do_not_count() {
        let (breaker, _, clock) = setup();

        fail_times(&breaker, "a.example", 4).await;
        clock.advance(Duration::from_secs(61));
        breaker.record_failure("a.example").await;

        assert_eq!(breaker.state("a.example").await, BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_retry_after_counts_down() {
        let (breaker, _, clock) = setup();
        fail_times(&breaker, "a.example", 5).await;

        clock.advance(Duration::from_secs(10));
        assert_eq!(
            breaker.state("a.example").await,
            BreakerState::Open {
                retry_after: Duration::from_secs(20)
            }
        );
    }

    #[tokio::test]
    async fn test_half_open_admits_single_probe() {
        let (breaker, _, clock) = setup();
        fail_times(&breaker, "a.example", 5).await;
        clock.advance(Duration::from_secs(30));

        assert_eq!(breaker.state("a.example").await, BreakerState::HalfOpen);

        let (first, second) = tokio::join!(breaker.check("a.example"), breaker.check("a.example"));
        let admitted = [&first, &second].iter().filter(|r| r.is_ok()).count();
        assert_eq!(admitted, 1);

        let rejected = if first.is_err() { first } else { second };
        assert_eq!(rejected.unwrap_err().retry_after, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_probe_success_closes() {
        let (breaker, _, clock) = setup();
        fail_times(&breaker, "a.example", 5).await;
        clock.advance(Duration::from_secs(30));

        assert_eq!(breaker.check("a.example").await, Ok(Admission::Probe));
        breaker.record_success("a.example").await;

        assert_eq!(breaker.state("a.example").await, BreakerState::Closed);
        assert_eq!(breaker.check("a.example").await, Ok(Admission::Closed));
        assert!(breaker.tripped_domains().await.is_empty());

        // Counters were reset, so it takes a full threshold to trip again
        fail_times(&breaker, "a.example", 4).await;
        assert_eq!(breaker.state("a.example").await, BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_probe_failure_reopens_with_fresh_cooldown() {
        let (breaker, _, clock) = setup();
        fail_times(&breaker, "a.example", 5).await;
        clock.advance(Duration::from_secs(45));

        assert_eq!(breaker.check("a.example").await, Ok(Admission::Probe));
        breaker.record_failure("a.example").await;

        assert_eq!(
            breaker.state("a.example").await,
            BreakerState::Open {
                retry_after: Duration::from_secs(30)
            }
        );

        clock.advance(Duration::from_secs(30));
        assert_eq!(breaker.check("a.example").await, Ok(Admission::Probe));
    }

    #[tokio::test]
    async fn test_success_while_closed_keeps_window() {
        let (breaker, _, _) = setup();

        fail_times(&breaker, "a.example", 4).await;
        breaker.record_success("a.example").await;
        breaker.record_failure("a.example").await;

        assert!(breaker.check("a.example").await.is_err());
    }

    #[tokio::test]
    async fn test_store_outage_fails_open() {
        let (breaker, store, _) = setup();
        fail_times(&breaker, "a.example", 5).await;
        assert!(breaker.check("a.example").await.is_err());

        store.set_available(false);
        assert_eq!(breaker.state("a.example").await, BreakerState::Closed);
        assert_eq!(breaker.check("a.example").await, Ok(Admission::Closed));
        breaker.record_failure("a.example").await;
        assert!(breaker.tripped_domains().await.is_empty());
    }

    #[tokio::test]
    async fn test_record_expires_after_ttl() {
        let (breaker, _, clock) = setup();
        fail_times(&breaker, "a.example", 5).await;

        clock.advance(Duration::from_secs(30 + 3600));
        assert_eq!(breaker.state("a.example").await, BreakerState::Closed);
    }
}
