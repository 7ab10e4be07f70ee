use crate::frontier::FrontierState;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Frontier snapshot as written to disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Hash of the configuration file the crawl was started with
    pub config_hash: String,
    pub saved_at: DateTime<Utc>,
    pub frontier: FrontierState,
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Writes a checkpoint atomically (temp file, then rename)
pub fn save_checkpoint(path: &Path, config_hash: &str, frontier: FrontierState) -> Result<()> {
    let checkpoint = Checkpoint {
        config_hash: config_hash.to_string(),
        saved_at: Utc::now(),
        frontier,
    };

    let tmp = temp_path(path);
    std::fs::write(&tmp, serde_json::to_vec_pretty(&checkpoint)?)?;
    std::fs::rename(&tmp, path)?;

    debug!(
        path = %path.display(),
        pages_crawled = checkpoint.frontier.pages_crawled,
        pending = checkpoint.frontier.pending.len(),
        "Saved checkpoint"
    );
    Ok(())
}

/// Reads a checkpoint, or `None` if the file does not exist
///
/// A checkpoint taken with a different configuration is still returned, with
/// a warning.
pub fn load_checkpoint(path: &Path, config_hash: &str) -> Result<Option<Checkpoint>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read(path)?;
    let checkpoint: Checkpoint = serde_json::from_slice(&content)?;

    if checkpoint.config_hash != config_hash {
        warn!(
            path = %path.display(),
            "Configuration changed since the checkpoint was saved"
        );
    }

    Ok(Some(checkpoint))
}
