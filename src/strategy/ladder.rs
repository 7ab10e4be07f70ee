use crate::strategy::{Tier, TierKind};
use crate::ConfigError;

/// Ordered set of fetch tiers, cheapest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierLadder {
    tiers: Vec<Tier>,
}

impl TierLadder {
    /// Builds a ladder; levels must be non-empty and strictly increasing
    pub fn new(tiers: Vec<Tier>) -> Result<Self, ConfigError> {
        if tiers.is_empty() {
            return Err(ConfigError::Validation(
                "tier ladder must contain at least one tier".to_string(),
            ));
        }

        for pair in tiers.windows(2) {
            if pair[0].level >= pair[1].level {
                return Err(ConfigError::Validation(format!(
                    "tier levels must be strictly increasing, got {} then {}",
                    pair[0].level, pair[1].level
                )));
            }
        }

        Ok(Self { tiers })
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn get(&self, level: u32) -> Option<&Tier> {
        self.tiers.iter().find(|t| t.level == level)
    }

    pub fn most_expensive(&self) -> &Tier {
        &self.tiers[self.tiers.len() - 1]
    }

    /// First tier that is not plain HTTP, or the most expensive one
    pub fn first_non_http(&self) -> &Tier {
        self.tiers
            .iter()
            .find(|t| t.kind != TierKind::Http)
            .unwrap_or_else(|| self.most_expensive())
    }

    /// Nearest ladder level at or above `level`, or the top of the ladder
    pub fn clamp(&self, level: u32) -> u32 {
        self.tiers
            .iter()
            .find(|t| t.level >= level)
            .unwrap_or_else(|| self.most_expensive())
            .level
    }

    /// Order in which tiers are tried for a fetch starting at `start`
    ///
    /// Escalates upward from `start`; the tiers below `start` follow in
    /// descending order as a fallback for fetchers that cannot run the
    /// upper tiers.
    pub fn escalation_order(&self, start: u32) -> Vec<&Tier> {
        let mut order: Vec<&Tier> = self.tiers.iter().filter(|t| t.level >= start).collect();
        order.extend(self.tiers.iter().rev().filter(|t| t.level < start));
        order
    }
}
