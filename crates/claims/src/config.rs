#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tc_core::CLAIM_WINDOW_BLOCKS;

const DEFAULT_STORAGE_DIR: &str = ".tc-claims";
const DEFAULT_CLAIM_INTERVAL_SECS: u64 = 60;
const DEFAULT_LOG_LEVEL: &str = "info";

pub const ENV_STORAGE_DIR: &str = "TC_STORAGE_DIR";
pub const ENV_CLAIM_WINDOW_BLOCKS: &str = "TC_CLAIM_WINDOW_BLOCKS";
pub const ENV_CLAIM_INTERVAL_SECS: &str = "TC_CLAIM_INTERVAL_SECS";
pub const ENV_LOG_LEVEL: &str = "TC_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "TC_LOG_FORMAT";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be an unsigned integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },
    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
    #[error("unknown log format {0:?} (expected pretty or json)")]
    UnknownLogFormat(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClaimsConfig {
    /// Directory holding the SQLite database.
    pub storage_dir: PathBuf,
    /// Blocks after job creation during which the first claim must land.
    pub claim_window_blocks: u64,
    /// Pause between scheduled claim passes.
    #[serde(with = "duration_secs")]
    pub claim_interval: Duration,
    pub logger: LoggerConfig,
}

/// Logger configuration for tracing output.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggerConfig {
    /// Filter directives such as `info` or `tc_claims=debug`; `RUST_LOG` wins
    /// when set.
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Default for ClaimsConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            claim_window_blocks: CLAIM_WINDOW_BLOCKS,
            claim_interval: Duration::from_secs(DEFAULT_CLAIM_INTERVAL_SECS),
            logger: LoggerConfig::default(),
        }
    }
}

impl ClaimsConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from `lookup`, falling back to defaults for unset or
    /// blank variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let value = |name: &str| {
            lookup(name)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };
        let mut config = Self::default();

        if let Some(dir) = value(ENV_STORAGE_DIR) {
            config.storage_dir = PathBuf::from(dir);
        }
        if let Some(raw) = value(ENV_CLAIM_WINDOW_BLOCKS) {
            config.claim_window_blocks = parse_u64(ENV_CLAIM_WINDOW_BLOCKS, &raw)?;
        }
        if let Some(raw) = value(ENV_CLAIM_INTERVAL_SECS) {
            let secs = parse_u64(ENV_CLAIM_INTERVAL_SECS, &raw)?;
            if secs == 0 {
                return Err(ConfigError::Zero {
                    name: ENV_CLAIM_INTERVAL_SECS,
                });
            }
            config.claim_interval = Duration::from_secs(secs);
        }
        if let Some(level) = value(ENV_LOG_LEVEL) {
            config.logger.level = level;
        }
        if let Some(raw) = value(ENV_LOG_FORMAT) {
            config.logger.format = parse_log_format(&raw)?;
        }
        Ok(config)
    }
}

fn parse_u64(name: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.parse::<u64>().map_err(|_| ConfigError::InvalidNumber {
        name,
        value: raw.to_string(),
    })
}

fn parse_log_format(raw: &str) -> Result<LogFormat, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "pretty" | "text" => Ok(LogFormat::Pretty),
        "json" => Ok(LogFormat::Json),
        _ => Err(ConfigError::UnknownLogFormat(raw.to_string())),
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = ClaimsConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ClaimsConfig::default());
        assert_eq!(config.claim_window_blocks, 256);
        assert_eq!(config.claim_interval, Duration::from_secs(60));
        assert_eq!(config.logger.format, LogFormat::Pretty);
    }

    #[test]
    fn variables_override_defaults() {
        let config = ClaimsConfig::from_lookup(lookup(&[
            (ENV_STORAGE_DIR, "/var/lib/tc"),
            (ENV_CLAIM_WINDOW_BLOCKS, " 32 "),
            (ENV_CLAIM_INTERVAL_SECS, "5"),
            (ENV_LOG_LEVEL, "tc_claims=debug"),
            (ENV_LOG_FORMAT, "JSON"),
        ]))
        .unwrap();
        assert_eq!(config.storage_dir, PathBuf::from("/var/lib/tc"));
        assert_eq!(config.claim_window_blocks, 32);
        assert_eq!(config.claim_interval, Duration::from_secs(5));
        assert_eq!(config.logger.level, "tc_claims=debug");
        assert_eq!(config.logger.format, LogFormat::Json);
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert_eq!(
            ClaimsConfig::from_lookup(lookup(&[(ENV_CLAIM_WINDOW_BLOCKS, "-1")])).unwrap_err(),
            ConfigError::InvalidNumber {
                name: ENV_CLAIM_WINDOW_BLOCKS,
                value: "-1".to_string()
            }
        );
        assert_eq!(
            ClaimsConfig::from_lookup(lookup(&[(ENV_CLAIM_INTERVAL_SECS, "0")])).unwrap_err(),
            ConfigError::Zero {
                name: ENV_CLAIM_INTERVAL_SECS
            }
        );
        assert!(matches!(
            ClaimsConfig::from_lookup(lookup(&[(ENV_LOG_FORMAT, "xml")])).unwrap_err(),
            ConfigError::UnknownLogFormat(_)
        ));
    }

    #[test]
    fn config_serializes_interval_as_seconds() {
        let encoded = serde_json::to_value(ClaimsConfig::default()).unwrap();
        assert_eq!(encoded["claim_interval"], 60);
        assert_eq!(encoded["logger"]["format"], "pretty");
        let decoded: ClaimsConfig = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, ClaimsConfig::default());
    }
}
