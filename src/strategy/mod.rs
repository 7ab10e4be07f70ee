//! Domain strategy memory
//!
//! Remembers, per domain, which fetch tier last worked and how often the
//! cheap tiers have been failing, and turns that into a starting tier for the
//! next fetch.
//!
//! Failures are counted in two bands rather than per tier: band 1 covers the
//! plain HTTP tiers (level 1 and below), band 2 everything above.

mod ladder;
mod memory;

pub use ladder::TierLadder;
pub use memory::DomainStrategyMemory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a tier fetches a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TierKind {
    /// Plain HTTP request
    Http,
    /// Browser-rendered fetch
    Browser,
}

/// One step on the ladder of fetch methods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub level: u32,
    pub name: String,
    pub kind: TierKind,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (tier {})", self.name, self.level)
    }
}

/// Why a plan starts where it does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierReason {
    /// A tier succeeded recently for this domain
    CachedSuccess,
    /// Both failure bands are over the threshold
    BothBandsFailing,
    /// The HTTP band is over the threshold
    HttpBandFailing,
    /// Nothing known, or the store was unavailable
    Default,
}

/// Starting tier for the next fetch to a domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPlan {
    pub start_tier: u32,
    pub reason: TierReason,
}

/// Everything the memory knows about a domain
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DomainStrategyRecord {
    pub last_success_strategy: Option<String>,
    pub last_success_tier: Option<u32>,
    pub fail_count_band1: u32,
    pub fail_count_band2: u32,
    /// Exponentially weighted latency of successful fetches
    pub avg_success_ms: Option<f64>,
    pub last_success_time: Option<DateTime<Utc>>,
}
