//! Engine configuration
//!
//! One JSON document with a section per subsystem. Every field has a
//! default, so a partial file (or none at all) is fine:
//!
//! ```json
//! { "octree": { "max_depth": 6 }, "assets": { "hot_reload": true } }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::spatial::OctreeConfig;

/// Loading and saving for configuration documents.
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !is_json(path) {
            return Err(ConfigError::UnsupportedFormat(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save configuration to file
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if !is_json(path) {
            return Err(ConfigError::UnsupportedFormat(path.display().to_string()));
        }
        let contents =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub octree: OctreeConfig,
    pub assets: AssetConfig,
    pub diagnostics: DiagnosticsConfig,
}

impl Config for EngineConfig {}

/// Asset loader settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Background threads reading files
    pub worker_threads: usize,

    /// Watch loaded files and reload them when they change on disk
    pub hot_reload: bool,

    /// Directory relative asset paths are resolved against
    pub root: String,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            hot_reload: false,
            root: ".".to_string(),
        }
    }
}

/// Telemetry output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub enabled: bool,

    /// UDP address the telemetry dashboard listens on
    pub address: String,

    /// Minimum time between two snapshots
    pub interval_ms: u64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: "127.0.0.1:9100".to_string(),
            interval_ms: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("skald-config-{}-{name}", std::process::id()))
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "octree": { "max_depth": 3 }, "assets": { "hot_reload": true } }"#)
                .unwrap();
        assert_eq!(config.octree.max_depth, 3);
        assert_eq!(config.octree.max_entities_per_node, 8);
        assert!(config.assets.hot_reload);
        assert_eq!(config.assets.worker_threads, 2);
        assert_eq!(config.diagnostics, DiagnosticsConfig::default());
    }

    #[test]
    fn save_then_load_from_file() {
        let path = temp_path("engine.json");
        let mut config = EngineConfig::default();
        config.assets.root = "content".into();
        config.diagnostics.interval_ms = 250;

        config.save_to_file(&path).unwrap();
        let loaded = EngineConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
    }

    #[test]
    fn rejects_other_formats() {
        let err = EngineConfig::default().save_to_file(temp_path("engine.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
        let err = EngineConfig::load_from_file(temp_path("engine.ron")).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }

    #[test]
    fn reports_parse_and_io_errors() {
        let path = temp_path("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = EngineConfig::load_from_file(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = EngineConfig::load_from_file(temp_path("missing.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
