//! Shared keyed state store
//!
//! The circuit breaker and the domain strategy memory keep their per-domain
//! records in a string-keyed store that may be shared by every worker in the
//! process, or by a whole cluster when the backend is distributed.
//!
//! Every operation returns a [`StoreResult`]: `Ok(None)` means the value is
//! definitely absent, while `Err(StoreError::Unavailable)` means the store could
//! not be reached. Callers decide whether an outage degrades to a default.
//!
//! # Backends
//!
//! - [`MemoryStore`]: in-process maps with per-key expiry
//! - `RedisStore`: Redis via a multiplexed connection manager (feature `redis`)

mod memory;
#[cfg(feature = "redis")]
mod redis_store;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during state store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("State store unavailable: {0}")]
    Unavailable(String),

    #[error("Wrong value type for key {key}")]
    WrongType { key: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type for state store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// String-keyed store with expiring values, counters, sets and sorted sets
///
/// Mutations are expected to be atomic per call. No multi-key transactions are
/// required: callers tolerate approximate convergence.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Gets a string value
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Sets a string value that expires after `ttl`
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Deletes keys; missing keys are ignored
    async fn delete(&self, keys: &[String]) -> StoreResult<()>;

    /// Increments an integer counter and refreshes its expiry
    ///
    /// Returns the value after the increment. A missing key counts from zero.
    async fn incr(&self, key: &str, ttl: Duration) -> StoreResult<i64>;

    /// Adds a member to a set, refreshing the set's expiry
    ///
    /// Returns true if the member was not present before.
    async fn sadd(&self, key: &str, member: &str, ttl: Duration) -> StoreResult<bool>;

    /// Removes a member from a set
    async fn srem(&self, key: &str, member: &str) -> StoreResult<()>;

    /// Lists the members of a set
    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Adds a scored member to a sorted set, refreshing the set's expiry
    async fn zadd(&self, key: &str, member: &str, score: f64, ttl: Duration) -> StoreResult<()>;

    /// Removes sorted set members with `min <= score <= max`
    ///
    /// Returns the number of removed members.
    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> StoreResult<u64>;

    /// Counts the members of a sorted set
    async fn zcard(&self, key: &str) -> StoreResult<u64>;
}

/// Source of wall-clock time in milliseconds since the Unix epoch
///
/// Shared per-domain records hold timestamps that other processes read, so
/// they use wall-clock time rather than `Instant`.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now_millis(&self) -> i64;
}

/// Clock backed by the system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually advanced clock for deterministic tests and simulations
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(duration_millis(by), Ordering::SeqCst);
    }

    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Converts a duration to whole milliseconds, saturating at `i64::MAX`
pub(crate) fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
