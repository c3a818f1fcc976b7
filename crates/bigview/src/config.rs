//! Viewer configuration, loadable from a JSON file.
//!
//! Every field has a default, so a partial file only overrides what it names.

use std::fs;
use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::file_viewer::{LARGE_JUMP, PROGRESS_INTERVAL_MS, ScanConfig};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewerConfig {
    /// WHATWG label of the file's charset, like "UTF-8" or "windows-1252".
    pub charset: String,
    /// Lines moved by a large jump up/down.
    pub large_line_jump: u64,
    /// Columns moved by a large jump left/right.
    pub large_column_jump: u64,
    /// Minimum time between two progress events while scanning.
    pub progress_interval_ms: u64,
    pub scan: ScanConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            charset: "UTF-8".to_string(),
            large_line_jump: LARGE_JUMP,
            large_column_jump: LARGE_JUMP,
            progress_interval_ms: PROGRESS_INTERVAL_MS,
            scan: ScanConfig::default(),
        }
    }
}

/// Loads the config from a JSON file.
/// Returns defaults if the file doesn't exist or can't be parsed.
pub fn load_config(path: &Path) -> ViewerConfig {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!("Couldn't read viewer config {}, using defaults: {}", path.display(), e);
            return ViewerConfig::default();
        }
    };
    parse_config(&contents).unwrap_or_else(|e| {
        warn!("Couldn't parse viewer config {}, using defaults: {}", path.display(), e);
        ViewerConfig::default()
    })
}

fn parse_config(contents: &str) -> Result<ViewerConfig, serde_json::Error> {
    serde_json::from_str(contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_viewer::MemoryBudget;

    #[test]
    fn partial_config_keeps_defaults() {
        let config = parse_config(r#"{"charset": "windows-1252", "scan": {"previewColumns": 80}}"#).unwrap();
        assert_eq!(config.charset, "windows-1252");
        assert_eq!(config.scan.preview_columns, 80);
        assert_eq!(config.scan.lines_per_batch, ScanConfig::default().lines_per_batch);
        assert_eq!(config.large_line_jump, 500);
        assert_eq!(config.scan.memory, MemoryBudget::default());
    }

    #[test]
    fn memory_budget_fields() {
        let config =
            parse_config(r#"{"scan": {"memory": {"maxIndexBytes": 4096, "reclaimAttempts": 1}}}"#).unwrap();
        assert_eq!(config.scan.memory.max_index_bytes, Some(4096));
        assert_eq!(config.scan.memory.reclaim_attempts, 1);
        assert_eq!(config.scan.memory.reclaim_pause_ms, 50);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("nope.json"));
        assert_eq!(config, ViewerConfig::default());
    }

    #[test]
    fn broken_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("viewer.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_config(&path), ViewerConfig::default());
    }

    #[test]
    fn round_trips_through_json() {
        let config = ViewerConfig {
            large_column_jump: 42,
            ..ViewerConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"largeColumnJump\":42"));
        assert_eq!(parse_config(&json).unwrap(), config);
    }
}
