//! Configuration management for rigging
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (RIGGING_* prefix, highest precedence)
//! 2. rigging.local.toml (gitignored, local overrides)
//! 3. rigging.toml (git-tracked, project config)
//! 4. ~/.config/rigging/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Main rigging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RiggingConfig {
    pub cluster: ClusterSettings,
    pub retry: RetrySettings,
    pub docker: DockerSettings,
}

/// How a cluster brings its nodes up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClusterSettings {
    /// Start every node concurrently instead of one after another.
    pub parallel: bool,
    /// Pause after each node when starting sequentially.
    pub settle_delay_ms: u64,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            parallel: true,
            settle_delay_ms: 2000,
        }
    }
}

impl ClusterSettings {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Default polling discipline for cluster queries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrySettings {
    pub attempts: u32,
    pub interval_ms: u64,
    pub max_interval_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 30,
            interval_ms: 1000,
            max_interval_ms: 1000,
        }
    }
}

impl RetrySettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DockerSettings {
    /// Host under which container-mapped ports are reachable from the test process.
    pub external_host: String,
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            external_host: "localhost".to_string(),
        }
    }
}

impl RiggingConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Configuration for local debugging: nodes come up one at a time.
    pub fn sequential() -> Self {
        Self {
            cluster: ClusterSettings {
                parallel: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Rejects settings that would make polling meaningless.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.retry.attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.attempts must be >= 1".to_string(),
            ));
        }
        if self.retry.max_interval_ms < self.retry.interval_ms {
            return Err(ConfigError::ValidationError(format!(
                "retry.max_interval_ms ({}) is below retry.interval_ms ({})",
                self.retry.max_interval_ms, self.retry.interval_ms
            )));
        }
        if self.docker.external_host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "docker.external_host must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Renders the configuration as TOML, e.g. to seed a `rigging.toml`.
    pub fn to_toml(&self) -> std::result::Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::MergeError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_default_config() {
        let config = RiggingConfig::default();
        assert!(config.cluster.parallel);
        assert_eq!(config.cluster.settle_delay(), Duration::from_secs(2));
        assert_eq!(config.retry.attempts, 30);
        assert_eq!(config.docker.external_host, "localhost");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sequential_config() {
        let config = RiggingConfig::sequential();
        assert!(!config.cluster.parallel);
        assert_eq!(config.cluster.settle_delay_ms, 2000);
    }

    #[test_case(0, 1000, 1000; "zero attempts")]
    #[test_case(3, 1000, 500; "max interval below interval")]
    fn test_validation_rejects(attempts: u32, interval_ms: u64, max_interval_ms: u64) {
        let config = RiggingConfig {
            retry: RetrySettings {
                attempts,
                interval_ms,
                max_interval_ms,
            },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validation_rejects_blank_external_host() {
        let config = RiggingConfig {
            docker: DockerSettings {
                external_host: "  ".to_string(),
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip_of_partial_file() {
        let parsed: RiggingConfig = toml::from_str("[cluster]\nparallel = false\n").unwrap();
        assert!(!parsed.cluster.parallel);
        assert_eq!(parsed.cluster.settle_delay_ms, 2000);

        let rendered = parsed.to_toml().unwrap();
        assert!(rendered.contains("parallel = false"));
    }
}
