//! Memory-adaptive concurrency governor
//!
//! The governor bounds how many fetches are in flight. A background sampler
//! reads memory utilisation on a fixed interval and moves `current_limit` by
//! at most one step per tick, or straight to `min_limit` under critical
//! pressure.
//!
//! Resizing never revokes a permit that is already held. Shrinking first
//! retires idle permits; when none are idle it records a debt that is paid
//! off as held permits are released.

mod probe;

pub use probe::{MemoryProbe, SystemMemoryProbe};

use crate::config::Config;
use crate::HelmError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Memory utilisation thresholds, in percent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureThresholds {
    /// Below this the limit grows
    pub low: f64,
    /// Above this the limit shrinks
    pub high: f64,
    /// Above this the limit drops to the minimum
    pub critical: f64,
}

impl Default for PressureThresholds {
    fn default() -> Self {
        Self {
            low: 60.0,
            high: 80.0,
            critical: 90.0,
        }
    }
}

struct Inner {
    semaphore: Arc<Semaphore>,
    current_limit: AtomicUsize,
    active: AtomicUsize,
    debt: AtomicUsize,
    min_limit: usize,
    max_limit: usize,
    thresholds: PressureThresholds,
    resize: Mutex<()>,
}

impl Inner {
    fn take_debt(&self) -> bool {
        self.debt
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |d| d.checked_sub(1))
            .is_ok()
    }
}

/// Admission control for concurrent fetches
///
/// Cheap to clone; clones share the same permit pool.
#[derive(Clone)]
pub struct ConcurrencyGovernor {
    inner: Arc<Inner>,
}

/// A held fetch slot; released on drop
pub struct GovernorPermit {
    permit: Option<OwnedSemaphorePermit>,
    inner: Arc<Inner>,
}

impl Drop for GovernorPermit {
    fn drop(&mut self) {
        self.inner.active.fetch_sub(1, Ordering::SeqCst);
        if let Some(permit) = self.permit.take() {
            if self.inner.take_debt() {
                permit.forget();
            }
        }
    }
}

impl ConcurrencyGovernor {
    /// Creates a governor starting at `initial_limit`, clamped to `[min_limit, max_limit]`
    pub fn new(
        min_limit: usize,
        initial_limit: usize,
        max_limit: usize,
        thresholds: PressureThresholds,
    ) -> Self {
        let min_limit = min_limit.max(1);
        let max_limit = max_limit.max(min_limit);
        let initial = initial_limit.clamp(min_limit, max_limit);

        Self {
            inner: Arc::new(Inner {
                semaphore: Arc::new(Semaphore::new(initial)),
                current_limit: AtomicUsize::new(initial),
                active: AtomicUsize::new(0),
                debt: AtomicUsize::new(0),
                min_limit,
                max_limit,
                thresholds,
                resize: Mutex::new(()),
            }),
        }
    }

    /// Builds the governor from `[crawl]` concurrency and the `[governor]` section
    pub fn from_config(config: &Config) -> Self {
        let governor = &config.governor;
        Self::new(
            governor.min_limit,
            config.crawl.concurrency,
            config.governor_max_limit(),
            PressureThresholds {
                low: governor.low_threshold,
                high: governor.high_threshold,
                critical: governor.critical_threshold,
            },
        )
    }

    /// Waits for a fetch slot
    ///
    /// Fails with [`HelmError::GovernorClosed`] once [`close`](Self::close) was called.
    pub async fn acquire(&self) -> Result<GovernorPermit, HelmError> {
        let permit = self
            .inner
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| HelmError::GovernorClosed)?;

        self.inner.active.fetch_add(1, Ordering::SeqCst);
        Ok(GovernorPermit {
            permit: Some(permit),
            inner: self.inner.clone(),
        })
    }

    /// Stops handing out permits; pending and future acquires fail
    pub fn close(&self) {
        self.inner.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.semaphore.is_closed()
    }

    pub fn current_limit(&self) -> usize {
        self.inner.current_limit.load(Ordering::SeqCst)
    }

    /// Number of permits currently held
    pub fn active_count(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    pub fn min_limit(&self) -> usize {
        self.inner.min_limit
    }

    pub fn max_limit(&self) -> usize {
        self.inner.max_limit
    }

    /// Sets the limit, clamped to `[min_limit, max_limit]`
    ///
    /// Returns the limit after clamping.
    pub fn set_limit(&self, target: usize) -> usize {
        let inner = &self.inner;
        let target = target.clamp(inner.min_limit, inner.max_limit);
        let _guard = inner.resize.lock().unwrap_or_else(|e| e.into_inner());

        let mut current = inner.current_limit.load(Ordering::SeqCst);
        while current < target {
            if !inner.take_debt() {
                inner.semaphore.add_permits(1);
            }
            current += 1;
        }
        while current > target {
            match inner.semaphore.try_acquire() {
                Ok(permit) => permit.forget(),
                Err(_) => {
                    inner.debt.fetch_add(1, Ordering::SeqCst);
                }
            }
            current -= 1;
        }

        inner.current_limit.store(current, Ordering::SeqCst);
        current
    }

    /// Applies one sampler tick for the given memory utilisation (percent)
    ///
    /// Returns the new limit.
    pub fn adjust(&self, utilization: f64) -> usize {
        let thresholds = self.inner.thresholds;
        let current = self.current_limit();

        let target = if utilization > thresholds.critical {
            self.inner.min_limit
        } else if utilization > thresholds.high {
            current.saturating_sub(1)
        } else if utilization < thresholds.low {
            current + 1
        } else {
            current
        };

        let limit = self.set_limit(target);
        if limit != current {
            if utilization > thresholds.critical {
                warn!(utilization, limit, "Critical memory pressure, concurrency dropped to minimum");
            } else {
                debug!(utilization, from = current, to = limit, "Adjusted concurrency limit");
            }
        }
        limit
    }

    /// Spawns the background sampler
    ///
    /// The task stops once every governor handle is dropped or the governor
    /// is closed. Ticks where the probe cannot read memory leave the limit as is.
    pub fn spawn_sampler(&self, probe: Arc<dyn MemoryProbe>, interval: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        info!(interval_ms = interval.as_millis() as u64, "Starting memory sampler");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if inner.semaphore.is_closed() {
                    break;
                }

                if let Some(utilization) = probe.utilization() {
                    ConcurrencyGovernor { inner }.adjust(utilization);
                }
            }
            debug!("Memory sampler stopped");
        })
    }
}
