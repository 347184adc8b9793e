//! Configuration file loading and validation. See spec §6, §4.8.
//!
//! Grounded on the source's `config/unmarshal.go` (`DisallowUnknownFields`)
//! and `plugins/ssl/config.go`'s long-horizon duration grammar.

use std::path::Path;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;

/// Top-level agent configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Default periodicity for checkers that don't specify their own.
    #[serde(rename = "periodicity", deserialize_with = "deserialize_seconds_duration")]
    pub periodicity: Duration,
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default)]
    pub consumers: Vec<ConsumerConfig>,
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
}

fn default_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string())
}

impl Configuration {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(raw).map_err(|err| ConfigError::Invalid(err.to_string()))
    }
}

/// A `consumers[]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsumerConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub server: String,
    #[serde(default = "default_nsca_port")]
    pub port: u16,
    #[serde(rename = "timeout", deserialize_with = "deserialize_millis_duration")]
    pub timeout: Duration,
    #[serde(default)]
    pub encryption: i64,
    #[serde(default)]
    pub key: String,
    #[serde(default = "default_instances")]
    pub instances: u32,
}

fn default_nsca_port() -> u16 {
    5667
}

fn default_instances() -> u32 {
    1
}

/// A `plugins[]` entry: one plugin kind, its shared config, and the ordered
/// list of kind-specific check descriptors it runs.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_null")]
    pub config: serde_json::Value,
    #[serde(default)]
    pub checks: Vec<serde_json::Value>,
}

fn default_null() -> serde_json::Value {
    serde_json::Value::Null
}

fn deserialize_seconds_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = DurationInput::deserialize(deserializer)?;
    parse_duration(&raw, 1).map_err(D::Error::custom)
}

fn deserialize_millis_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match DurationInput::deserialize(deserializer)? {
        DurationInput::Integer(millis) => Ok(Duration::from_millis(millis.max(0) as u64)),
        DurationInput::Text(text) => parse_duration_str(&text).map_err(D::Error::custom),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DurationInput {
    Integer(i64),
    Text(String),
}

static BIG_DURATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)(d|mo)$").unwrap());

/// Parse a duration accepting either a bare integer (seconds *
/// `unit_seconds`) or a suffixed string (`"30s"`, `"5m"`, `"2h"`, plus the
/// long-horizon `"3d"`/`"1mo"` extensions from the source's `ssl` plugin).
fn parse_duration(input: &DurationInput, unit_seconds: u64) -> Result<Duration, String> {
    match input {
        DurationInput::Integer(seconds) => {
            Ok(Duration::from_secs((*seconds).max(0) as u64 * unit_seconds))
        }
        DurationInput::Text(text) => parse_duration_str(text),
    }
}

/// Parse a standalone duration string, used by checker-specific config
/// (e.g. the SSL checker's `warn`/`crit` fields) outside the top-level
/// `Configuration` struct.
pub fn parse_duration_str(text: &str) -> Result<Duration, String> {
    if let Some(captures) = BIG_DURATION.captures(text) {
        let value: u64 = captures[1]
            .parse()
            .map_err(|_| format!("invalid duration {text:?}"))?;
        return Ok(match &captures[2] {
            "d" => Duration::from_secs(value * 24 * 3600),
            "mo" => Duration::from_secs(value * 30 * 24 * 3600),
            _ => unreachable!(),
        });
    }
    humantime::parse_duration(text).map_err(|err| format!("invalid duration {text:?}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_top_level_fields() {
        let yaml = "periodicity: 5\nhostname: h\nbogus: 1\n";
        let err = Configuration::parse(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn parses_bare_integer_seconds() {
        let yaml = "periodicity: 5\nhostname: h\n";
        let cfg = Configuration::parse(yaml).unwrap();
        assert_eq!(cfg.periodicity, Duration::from_secs(5));
    }

    #[test]
    fn parses_suffixed_duration_strings() {
        assert_eq!(parse_duration_str("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration_str("5m").unwrap(), Duration::from_secs(300));
    }

    #[test]
    fn parses_day_and_month_suffixes() {
        assert_eq!(
            parse_duration_str("3d").unwrap(),
            Duration::from_secs(3 * 24 * 3600)
        );
        assert_eq!(
            parse_duration_str("1mo").unwrap(),
            Duration::from_secs(30 * 24 * 3600)
        );
    }

    #[test]
    fn rejects_garbage_duration_strings() {
        assert!(parse_duration_str("5x").is_err());
    }

    #[test]
    fn consumer_defaults_to_nsca_port() {
        let yaml = r#"
periodicity: 1
consumers:
  - type: NSCA
    server: monitor.example.com
    timeout: 2000
"#;
        let cfg = Configuration::parse(yaml).unwrap();
        assert_eq!(cfg.consumers[0].port, 5667);
        assert_eq!(cfg.consumers[0].instances, 1);
    }
}
