//! `rigscope.toml` configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use rigscope::instance::DEFAULT_MAX_CHILDREN;
use rigscope::{OffsetTable, TrackerConfig, load_offsets};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Settings read from the config file; CLI flags override them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Executable name of the target process
    pub process_name: String,
    /// Offset table JSON file; the built-in table when unset
    pub offsets: Option<PathBuf>,
    pub tick_interval_ms: u64,
    /// Overrides the string length bound of the offset table
    pub max_string_length: Option<i32>,
    pub max_children: usize,
    pub include_local_player: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            process_name: "RobloxPlayerBeta.exe".to_string(),
            offsets: None,
            tick_interval_ms: 100,
            max_string_length: None,
            max_children: DEFAULT_MAX_CHILDREN,
            include_local_player: true,
        }
    }
}

impl CliConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Load the config, falling back to defaults when it is missing or broken
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                warn!("{:#}, using defaults", e);
                Self::default()
            }
        }
    }

    /// The offset table to traverse with, string bound override applied
    pub fn offset_table(&self) -> Result<OffsetTable> {
        let mut table = match &self.offsets {
            Some(path) => load_offsets(path)
                .with_context(|| format!("Failed to load offsets from {}", path.display()))?,
            None => OffsetTable::default(),
        };
        if let Some(max_length) = self.max_string_length {
            table.string.max_length = max_length;
        }
        info!("Using offsets {}", table.version);
        Ok(table)
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig::builder()
            .tick_interval(Duration::from_millis(self.tick_interval_ms))
            .max_children(self.max_children)
            .include_local_player(self.include_local_player)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rigscope.toml");
        fs::write(&path, "process_name = \"Game.exe\"\ntick_interval_ms = 250\n").unwrap();

        let config = CliConfig::load(&path).unwrap();
        assert_eq!(config.process_name, "Game.exe");
        assert_eq!(config.tick_interval_ms, 250);
        assert_eq!(config.max_children, DEFAULT_MAX_CHILDREN);
        assert!(config.include_local_player);
        assert_eq!(
            config.tracker_config().tick_interval,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_missing_or_broken_file_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rigscope.toml");
        assert_eq!(CliConfig::load_or_default(&path), CliConfig::default());

        fs::write(&path, "tick_interval_ms = \"fast\"").unwrap();
        assert!(CliConfig::load(&path).is_err());
        assert_eq!(CliConfig::load_or_default(&path), CliConfig::default());
    }

    #[test]
    fn test_string_length_override() {
        let config = CliConfig {
            max_string_length: Some(1048),
            ..CliConfig::default()
        };
        let table = config.offset_table().unwrap();
        assert_eq!(table.string.max_length, 1048);
        assert_eq!(
            CliConfig::default().offset_table().unwrap().string.max_length,
            255
        );
    }

    #[test]
    fn test_offsets_file_is_loaded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("offsets.json");
        fs::write(&path, r#"{ "version": "version-local" }"#).unwrap();

        let config = CliConfig {
            offsets: Some(path),
            ..CliConfig::default()
        };
        assert_eq!(config.offset_table().unwrap().version, "version-local");

        let missing = CliConfig {
            offsets: Some(dir.path().join("nope.json")),
            ..CliConfig::default()
        };
        assert!(missing.offset_table().is_err());
    }
}
