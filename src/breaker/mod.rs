//! Per-domain circuit breaker
//!
//! # States
//!
//! ```text
//! Closed   -> Open:     failure-threshold failures within window-secs
//! Open     -> HalfOpen: cooldown elapsed (computed on the next read)
//! HalfOpen -> Closed:   probe succeeded, all counters reset
//! HalfOpen -> Open:     probe failed, fresh cooldown
//! ```
//!
//! Records live in the shared [`StateStore`](crate::store::StateStore) keyed by
//! bare domain, so every worker sees the same circuit. If the store cannot be
//! reached the breaker reports `Closed` and lets the fetch through.

mod circuit;

pub use circuit::CircuitBreaker;

use std::time::Duration;
use thiserror::Error;

/// Fail-fast signal for a domain whose circuit is open
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Circuit open for {domain}, retry after {retry_after:?}")]
pub struct CircuitOpenError {
    pub domain: String,
    pub retry_after: Duration,
}

/// Observed state of a domain's circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open { retry_after: Duration },
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open { .. } => "open",
            BreakerState::HalfOpen => "half-open",
        }
    }
}

/// How a fetch was let through by [`CircuitBreaker::check`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Normal traffic
    Closed,
    /// One of the limited half-open probes
    Probe,
}
