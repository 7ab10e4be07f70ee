use crate::config::StrategyMemoryConfig;
use crate::store::{duration_millis, Clock, StateStore, StoreResult};
use crate::strategy::{DomainStrategyRecord, TierLadder, TierPlan, TierReason};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Weight of the newest sample in the latency average
const LATENCY_EWMA_WEIGHT: f64 = 0.3;

/// Highest tier levels counted in failure bands 1 and 2
const BAND1_MAX_TIER: u32 = 1;
const BAND2_MAX_TIER: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SuccessEntry {
    strategy: String,
    tier: u32,
    avg_success_ms: f64,
    at_millis: i64,
}

/// Per-domain memory of which fetch tier works
pub struct DomainStrategyMemory {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    ladder: TierLadder,
    ttl: Duration,
    failure_threshold: u32,
    default_tier: u32,
    prefix: String,
}

impl DomainStrategyMemory {
    pub fn new(
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        ladder: TierLadder,
        config: &StrategyMemoryConfig,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            clock,
            ladder,
            ttl: config.ttl(),
            failure_threshold: config.failure_threshold,
            default_tier: config.default_tier,
            prefix: prefix.into(),
        }
    }

    pub fn ladder(&self) -> &TierLadder {
        &self.ladder
    }

    /// Chooses the starting tier for the next fetch to `domain`
    ///
    /// Policy, first match wins:
    /// 1. a recorded success starts at that tier
    /// 2. both bands over the threshold start at the most expensive tier
    /// 3. band 1 over the threshold starts at the first non-HTTP tier
    /// 4. otherwise the default tier
    ///
    /// An unavailable store yields the default plan.
    pub async fn plan(&self, domain: &str) -> TierPlan {
        let record = match self.record(domain).await {
            Ok(record) => record,
            Err(e) => {
                warn!(domain, error = %e, "State store unavailable, using default tier");
                return self.default_plan();
            }
        };

        let band1_failing = record.fail_count_band1 > self.failure_threshold;
        let band2_failing = record.fail_count_band2 > self.failure_threshold;

        let plan = if let Some(tier) = record.last_success_tier {
            TierPlan {
                start_tier: self.ladder.clamp(tier),
                reason: TierReason::CachedSuccess,
            }
        } else if band1_failing && band2_failing {
            TierPlan {
                start_tier: self.ladder.most_expensive().level,
                reason: TierReason::BothBandsFailing,
            }
        } else if band1_failing {
            TierPlan {
                start_tier: self.ladder.first_non_http().level,
                reason: TierReason::HttpBandFailing,
            }
        } else {
            self.default_plan()
        };

        debug!(domain, start_tier = plan.start_tier, reason = ?plan.reason, "Planned tier");
        plan
    }

    /// Assembles the stored record for `domain`
    ///
    /// An expired success is reported as absent.
    pub async fn record(&self, domain: &str) -> StoreResult<DomainStrategyRecord> {
        let success = self.load_success(domain).await?;
        let band1 = self.load_counter(&self.key(domain, "band1")).await?;
        let band2 = self.load_counter(&self.key(domain, "band2")).await?;

        let mut record = DomainStrategyRecord {
            fail_count_band1: band1,
            fail_count_band2: band2,
            ..DomainStrategyRecord::default()
        };

        if let Some(entry) = success {
            record.last_success_strategy = Some(entry.strategy);
            record.last_success_tier = Some(entry.tier);
            record.avg_success_ms = Some(entry.avg_success_ms);
            record.last_success_time = Utc.timestamp_millis_opt(entry.at_millis).single();
        }

        Ok(record)
    }

    /// Records a successful fetch at `tier`
    ///
    /// Resets band 1, and band 2 as well when the winning tier is above the
    /// HTTP band.
    pub async fn record_success(&self, domain: &str, tier: u32, latency: Duration) {
        if let Err(e) = self.try_record_success(domain, tier, latency).await {
            warn!(domain, tier, error = %e, "Failed to record strategy success");
        }
    }

    /// Records a failed fetch at `tier` in its failure band
    ///
    /// Tiers above band 2 have no band; their failures only reach the
    /// circuit breaker.
    pub async fn record_failure(&self, domain: &str, tier: u32) {
        let band = match tier {
            t if t <= BAND1_MAX_TIER => "band1",
            t if t <= BAND2_MAX_TIER => "band2",
            _ => {
                trace!(domain, tier, "Tier outside the failure bands, not counted");
                return;
            }
        };
        match self.store.incr(&self.key(domain, band), self.ttl).await {
            Ok(count) => debug!(domain, tier, band, count, "Recorded tier failure"),
            Err(e) => warn!(domain, tier, error = %e, "Failed to record strategy failure"),
        }
    }

    fn default_plan(&self) -> TierPlan {
        TierPlan {
            start_tier: self.ladder.clamp(self.default_tier),
            reason: TierReason::Default,
        }
    }

    fn key(&self, domain: &str, field: &str) -> String {
        format!("{}:strategy:{}:{}", self.prefix, domain, field)
    }

    async fn load_success(&self, domain: &str) -> StoreResult<Option<SuccessEntry>> {
        let Some(raw) = self.store.get(&self.key(domain, "success")).await? else {
            return Ok(None);
        };

        let entry: SuccessEntry = serde_json::from_str(&raw)?;
        let age = self.clock.now_millis().saturating_sub(entry.at_millis);
        if age >= duration_millis(self.ttl) {
            return Ok(None);
        }
        Ok(Some(entry))
    }

    async fn load_counter(&self, key: &str) -> StoreResult<u32> {
        Ok(self
            .store
            .get(key)
            .await?
            .and_then(|raw| raw.parse::<u32>().ok())
            .unwrap_or(0))
    }

    async fn try_record_success(&self, domain: &str, tier: u32, latency: Duration) -> StoreResult<()> {
        let sample = latency.as_secs_f64() * 1000.0;
        let avg_success_ms = match self.load_success(domain).await? {
            Some(prev) => LATENCY_EWMA_WEIGHT * sample + (1.0 - LATENCY_EWMA_WEIGHT) * prev.avg_success_ms,
            None => sample,
        };

        let strategy = self
            .ladder
            .get(tier)
            .map(|t| t.name.clone())
            .unwrap_or_else(|| format!("tier-{}", tier));

        let entry = SuccessEntry {
            strategy,
            tier,
            avg_success_ms,
            at_millis: self.clock.now_millis(),
        };
        let raw = serde_json::to_string(&entry)?;
        self.store
            .set_ex(&self.key(domain, "success"), &raw, self.ttl)
            .await?;

        let mut reset = vec![self.key(domain, "band1")];
        if tier > BAND1_MAX_TIER {
            reset.push(self.key(domain, "band2"));
        }
        self.store.delete(&reset).await?;

        debug!(domain, tier, avg_success_ms, "Recorded tier success");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ManualClock, MemoryStore};
    use crate::strategy::{Tier, TierKind};

    fn ladder() -> TierLadder {
        let tiers = [
            (0, "http-light", TierKind::Http),
            (1, "http", TierKind::Http),
            (2, "browser", TierKind::Browser),
            (3, "browser-stealth", TierKind::Browser),
        ]
        .into_iter()
        .map(|(level, name, kind)| Tier {
            level,
            name: name.to_string(),
            kind,
        })
        .collect();
        TierLadder::new(tiers).unwrap()
    }

    fn setup() -> (DomainStrategyMemory, Arc<MemoryStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let memory = DomainStrategyMemory::new(
            store.clone(),
            clock.clone(),
            ladder(),
            &StrategyMemoryConfig::default(),
            "test",
        );
        (memory, store, clock)
    }

    #[tokio::test]
    async fn test_unknown_domain_uses_default_tier() {
        let (memory, _, _) = setup();
        let plan = memory.plan("a.example").await;
        assert_eq!(plan.start_tier, 1);
        assert_eq!(plan.reason, TierReason::Default);
    }

    #[tokio::test]
    async fn test_cached_success_tier_zero() {
        let (memory, _, _) = setup();
        memory
            .record_success("a.example", 0, Duration::from_millis(120))
            .await;

        let plan = memory.plan("a.example").await;
        assert_eq!(plan.start_tier, 0);
        assert_eq!(plan.reason, TierReason::CachedSuccess);

        let record = memory.record("a.example").await.unwrap();
        assert_eq!(record.last_success_strategy.as_deref(), Some("http-light"));
        assert!(record.last_success_time.is_some());
    }

    #[tokio::test]
    async fn test_three_http_failures_skip_to_browser() {
        let (memory, _, _) = setup();
        for _ in 0..3 {
            memory.record_failure("a.example", 1).await;
        }

        let plan = memory.plan("a.example").await;
        assert_eq!(plan.start_tier, 2);
        assert_eq!(plan.reason, TierReason::HttpBandFailing);
    }

    #[tokio::test]
    async fn test_threshold_is_strict() {
        let (memory, _, _) = setup();
        memory.record_failure("a.example", 1).await;
        memory.record_failure("a.example", 0).await;

        assert_eq!(memory.plan("a.example").await.reason, TierReason::Default);
    }

    #[tokio::test]
    async fn test_both_bands_failing_jump_to_top() {
        let (memory, _, _) = setup();
        for _ in 0..3 {
            memory.record_failure("a.example", 1).await;
            memory.record_failure("a.example", 2).await;
        }

        let plan = memory.plan("a.example").await;
        assert_eq!(plan.start_tier, 3);
        assert_eq!(plan.reason, TierReason::BothBandsFailing);
    }

    #[tokio::test]
    async fn test_failures_above_band_two_are_not_counted() {
        let (memory, _, _) = setup();
        for _ in 0..3 {
            memory.record_failure("a.example", 1).await;
            memory.record_failure("a.example", 3).await;
        }

        let record = memory.record("a.example").await.unwrap();
        assert_eq!(record.fail_count_band1, 3);
        assert_eq!(record.fail_count_band2, 0);
        assert_eq!(
            memory.plan("a.example").await.reason,
            TierReason::HttpBandFailing
        );
    }

    #[tokio::test]
    async fn test_success_resets_bands_at_or_below_tier() {
        let (memory, _, _) = setup();
        for _ in 0..3 {
            memory.record_failure("a.example", 1).await;
            memory.record_failure("a.example", 2).await;
        }

        memory
            .record_success("a.example", 1, Duration::from_millis(50))
            .await;
        let record = memory.record("a.example").await.unwrap();
        assert_eq!(record.fail_count_band1, 0);
        assert_eq!(record.fail_count_band2, 3);

        memory
            .record_success("a.example", 2, Duration::from_millis(50))
            .await;
        let record = memory.record("a.example").await.unwrap();
        assert_eq!(record.fail_count_band2, 0);
    }

    #[tokio::test]
    async fn test_latency_average() {
        let (memory, _, _) = setup();
        memory
            .record_success("a.example", 1, Duration::from_millis(100))
            .await;
        memory
            .record_success("a.example", 1, Duration::from_millis(200))
            .await;

        let avg = memory.record("a.example").await.unwrap().avg_success_ms.unwrap();
        assert!((avg - 130.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_expired_record_falls_back_to_default() {
        let (memory, _, clock) = setup();
        memory
            .record_success("a.example", 3, Duration::from_millis(100))
            .await;
        assert_eq!(memory.plan("a.example").await.start_tier, 3);

        clock.advance(StrategyMemoryConfig::default().ttl());
        assert_eq!(memory.plan("a.example").await.reason, TierReason::Default);
    }

    #[tokio::test]
    async fn test_store_outage_degrades_to_default() {
        let (memory, store, _) = setup();
        memory
            .record_success("a.example", 3, Duration::from_millis(100))
            .await;

        store.set_available(false);
        assert!(memory.record("a.example").await.is_err());
        assert_eq!(memory.plan("a.example").await.reason, TierReason::Default);
        memory.record_failure("a.example", 1).await;
    }
}
