//! Engine configuration, loaded from YAML

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// An external program and its arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Tunables for `GraphEngine`. Every field has a default, so an empty
/// file is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub generator_timeout_secs: u64,
    pub extractor_timeout_secs: u64,
    /// Max characters of document text appended to an expand instruction
    pub context_char_limit: usize,
    /// Skip the originating listener when broadcasting a change
    pub exclude_origin: bool,
    /// Program used as the content generator by the CLI
    pub generator: Option<CommandSpec>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            generator_timeout_secs: 120,
            extractor_timeout_secs: 60,
            context_char_limit: 3000,
            exclude_origin: true,
            generator: None,
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn generator_timeout(&self) -> Duration {
        Duration::from_secs(self.generator_timeout_secs)
    }

    pub fn extractor_timeout(&self) -> Duration {
        Duration::from_secs(self.extractor_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_gives_defaults() {
        let config = EngineConfig::from_yaml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.generator_timeout(), Duration::from_secs(120));
        assert_eq!(config.context_char_limit, 3000);
        assert!(config.exclude_origin);
    }

    #[test]
    fn partial_yaml_overrides_only_given_fields() {
        let config = EngineConfig::from_yaml_str(
            "extractor_timeout_secs: 5\ngenerator:\n  program: mapgen\n  args: [--json]\n",
        )
        .unwrap();
        assert_eq!(config.extractor_timeout_secs, 5);
        assert_eq!(config.generator_timeout_secs, 120);
        let generator = config.generator.unwrap();
        assert_eq!(generator.program, "mapgen");
        assert_eq!(generator.args, vec!["--json"]);
    }

    #[test]
    fn bad_yaml_is_rejected() {
        let err = EngineConfig::from_yaml_str("context_char_limit: lots").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cogmap.yaml");
        std::fs::write(&path, "exclude_origin: false\n").unwrap();
        assert!(!EngineConfig::load(&path).unwrap().exclude_origin);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = EngineConfig::load("/nonexistent/cogmap.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
