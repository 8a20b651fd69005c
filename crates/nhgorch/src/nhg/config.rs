//! NhgOrch configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use super::budget::{DEFAULT_MAX_ECMP_GROUP_SIZE, DEFAULT_NUMBER_OF_ECMP_GROUPS};

/// Environment variable naming the platform, as exported by the platform
/// init scripts.
pub const PLATFORM_ENV_VAR: &str = "platform";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Configuration of the next hop group orchestrator.
///
/// Every field has a default, so an empty JSON object is a valid file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NhgOrchConfig {
    /// Platform string. Falls back to the `platform` environment variable.
    pub platform: Option<String>,
    /// Ceiling used when the switch cannot report its ECMP group count.
    pub default_max_nhg_count: u32,
    /// Group size used to convert the Mellanox ECMP count into groups.
    pub mellanox_max_ecmp_group_size: u32,
    /// Seed of the temporary member picker. Entropy when absent.
    pub temp_seed: Option<u64>,
    /// Entries taken from each table per drive.
    pub consumer_batch_size: usize,
}

impl Default for NhgOrchConfig {
    fn default() -> Self {
        Self {
            platform: None,
            default_max_nhg_count: DEFAULT_NUMBER_OF_ECMP_GROUPS,
            mellanox_max_ecmp_group_size: DEFAULT_MAX_ECMP_GROUP_SIZE,
            temp_seed: None,
            consumer_batch_size: 128,
        }
    }
}

impl NhgOrchConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.temp_seed = Some(seed);
        self
    }

    /// The configured platform, else the environment's, else empty.
    pub fn resolve_platform(&self) -> String {
        self.platform
            .clone()
            .or_else(|| std::env::var(PLATFORM_ENV_VAR).ok())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = NhgOrchConfig::default();
        assert_eq!(config.default_max_nhg_count, 128);
        assert_eq!(config.mellanox_max_ecmp_group_size, 32);
        assert_eq!(config.temp_seed, None);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: NhgOrchConfig = serde_json::from_str(r#"{"temp_seed": 7}"#).unwrap();
        assert_eq!(config.temp_seed, Some(7));
        assert_eq!(config.default_max_nhg_count, 128);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"platform": "x86_64-mlnx_msn2700-r0"}}"#).unwrap();

        let config = NhgOrchConfig::from_file(file.path()).unwrap();
        assert_eq!(config.resolve_platform(), "x86_64-mlnx_msn2700-r0");
    }

    #[test]
    fn test_from_file_errors() {
        assert!(matches!(
            NhgOrchConfig::from_file("/nonexistent/nhgorch.json"),
            Err(ConfigError::Io(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            NhgOrchConfig::from_file(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
