//! Crawl frontier
//!
//! The frontier owns the pending and visited URLs of one crawl job and decides
//! what is explored next:
//!
//! - **BFS** pops from a FIFO queue, so every page at depth `d` is handed out
//!   before any page at depth `d + 1`
//! - **DFS** pops from a stack, one entry at a time, so a branch is finished
//!   before its siblings
//! - **Best-first** pops the highest-scoring entry; equal scores pop in
//!   discovery order
//!
//! A frontier is driven by a single task. Every operation is computation
//! only; fan-out happens in the caller after `get_next_urls`.

mod checkpoint;
mod traversal;

pub use checkpoint::{load_checkpoint, save_checkpoint, Checkpoint};
pub use traversal::{Frontier, FrontierSettings};

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Traversal order of a frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    Bfs,
    Dfs,
    BestFirst,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Bfs => "bfs",
            StrategyKind::Dfs => "dfs",
            StrategyKind::BestFirst => "best-first",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "bfs" => Ok(StrategyKind::Bfs),
            "dfs" => Ok(StrategyKind::Dfs),
            "best-first" | "bestfirst" => Ok(StrategyKind::BestFirst),
            _ => Err(ConfigError::UnknownStrategy(s.to_string())),
        }
    }
}

/// A URL waiting to be fetched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierEntry {
    /// Canonical URL
    pub url: String,
    pub depth: u32,
    pub parent_url: Option<String>,
    pub score: f64,
}

/// Serializable snapshot of a frontier
///
/// `pending` lists entries in the order they would be popped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierState {
    pub strategy_kind: StrategyKind,
    pub visited: Vec<String>,
    pub pending: Vec<FrontierEntry>,
    pub pages_crawled: u64,
    #[serde(default)]
    pub base_domain: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_kind_parsing() {
        assert_eq!("bfs".parse::<StrategyKind>().unwrap(), StrategyKind::Bfs);
        assert_eq!("DFS".parse::<StrategyKind>().unwrap(), StrategyKind::Dfs);
        assert_eq!(
            "best_first".parse::<StrategyKind>().unwrap(),
            StrategyKind::BestFirst
        );
        assert!(matches!(
            "random".parse::<StrategyKind>(),
            Err(ConfigError::UnknownStrategy(_))
        ));
    }

    #[test]
    fn test_state_json_shape() {
        let state = FrontierState {
            strategy_kind: StrategyKind::BestFirst,
            visited: vec!["https://a.example/".to_string()],
            pending: vec![FrontierEntry {
                url: "https://a.example/p1".to_string(),
                depth: 1,
                parent_url: Some("https://a.example/".to_string()),
                score: 0.5,
            }],
            pages_crawled: 1,
            base_domain: Some("a.example".to_string()),
        };

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["strategy_kind"], "best-first");
        assert_eq!(json["pending"][0]["depth"], 1);
        assert_eq!(json["pages_crawled"], 1);

        let back: FrontierState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
