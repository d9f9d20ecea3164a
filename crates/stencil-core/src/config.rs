use crate::dsl::Limits;
use crate::linter::DEFAULT_LINTER_TIMEOUT_SECS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const MIN_TIMEOUT_SECS: u64 = 1;
pub const MAX_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_TIMEOUT_SECS: u64 = 90;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RendererConfig {
    /// Graphviz `dot`, as a bare name looked up on PATH or a path.
    pub dot_executable: String,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            dot_executable: "dot".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LinterConfig {
    pub enabled: bool,
    pub executable: String,
    pub timeout_secs: u64,
}

impl Default for LinterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            executable: "bandit".to_string(),
            timeout_secs: DEFAULT_LINTER_TIMEOUT_SECS,
        }
    }
}

/// Runtime settings for diagram generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Base for `generated-diagrams/` when a request names none. Defaults to
    /// the process working directory.
    pub workspace_dir: Option<PathBuf>,
    pub default_timeout_secs: u64,
    pub renderer: RendererConfig,
    pub linter: LinterConfig,
    /// Root of a local icon pack laid out as `<provider>/<service>/<class>.png`.
    pub icon_dir: Option<PathBuf>,
    pub limits: Limits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace_dir: None,
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            renderer: RendererConfig::default(),
            linter: LinterConfig::default(),
            icon_dir: None,
            limits: Limits::default(),
        }
    }
}

pub fn timeout_in_range(secs: u64) -> bool {
    (MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&secs)
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !timeout_in_range(self.default_timeout_secs) {
            return Err(ConfigError::Invalid(format!(
                "defaultTimeoutSecs must be between {MIN_TIMEOUT_SECS} and {MAX_TIMEOUT_SECS}"
            )));
        }
        if self.linter.enabled && self.linter.timeout_secs == 0 {
            return Err(ConfigError::Invalid("linter.timeoutSecs must be positive".into()));
        }
        if self.renderer.dot_executable.trim().is_empty() {
            return Err(ConfigError::Invalid("renderer.dotExecutable must not be empty".into()));
        }
        if self.limits.max_nodes == 0 || self.limits.max_edges == 0 || self.limits.max_value_size == 0 {
            return Err(ConfigError::Invalid("limits must be positive".into()));
        }
        if let Some(dir) = &self.icon_dir {
            if !dir.is_dir() {
                return Err(ConfigError::Invalid(format!("iconDir {} is not a directory", dir.display())));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.default_timeout_secs, 90);
        assert_eq!(config.renderer.dot_executable, "dot");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stencil.json");
        std::fs::write(&path, r#"{"defaultTimeoutSecs": 30, "linter": {"enabled": false}, "limits": {"maxNodes": 10}}"#)
            .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.default_timeout_secs, 30);
        assert!(!config.linter.enabled);
        assert_eq!(config.linter.executable, "bandit");
        assert_eq!(config.limits.max_nodes, 10);
        assert_eq!(config.limits.max_edges, Limits::default().max_edges);
        assert_eq!(config.limits.max_value_size, 100_000);
    }

    #[test]
    fn zero_value_size_is_rejected() {
        let mut config = Config::default();
        config.limits.max_value_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn out_of_range_timeout_is_rejected() {
        let config = Config {
            default_timeout_secs: 301,
            ..Config::default()
        };
        assert!(config.validate().is_err());
        assert!(timeout_in_range(1) && timeout_in_range(300) && !timeout_in_range(0));
    }

    #[test]
    fn load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }
}
