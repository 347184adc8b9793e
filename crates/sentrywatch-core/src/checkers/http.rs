//! HTTP checker: probes a URL and classifies by status code and response
//! latency thresholds. Grounded on `plugins/http/{http.go,config.go}`.

use std::sync::Arc;
use std::time::{Duration, Instant as StdInstant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::info;

use super::decode_config;
use crate::checker::{CheckResult, Checker, CheckerFactory, CheckerRef};
use crate::config::parse_duration_str;
use crate::error::CheckerConstructError;
use crate::severity::Severity;

pub const KIND: &str = "HTTP";

fn default_code() -> u16 {
    200
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfigRaw {
    pub name: String,
    pub url: String,
    pub method: String,
    #[serde(default = "default_code")]
    pub code: u16,
    #[serde(default)]
    pub timeout: Option<String>,
    #[serde(default)]
    pub warn: Option<String>,
    #[serde(default)]
    pub crit: Option<String>,
}

pub struct HttpChecker {
    name: String,
    client: reqwest::Client,
    method: reqwest::Method,
    url: String,
    expected_code: u16,
    timeout: Duration,
    warning: Duration,
    critical: Duration,
}

#[async_trait]
impl Checker for HttpChecker {
    fn kind(&self) -> &str {
        KIND
    }

    fn service_name(&self) -> &str {
        &self.name
    }

    async fn run(self: Arc<Self>, deadline: Instant) -> CheckResult {
        let request_timeout = self
            .timeout
            .min(deadline.saturating_duration_since(Instant::now()));

        let start = StdInstant::now();
        let response = self
            .client
            .request(self.method.clone(), &self.url)
            .timeout(request_timeout)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                return CheckResult {
                    severity: Severity::Critical,
                    message: format!("http: request failed: {err}"),
                    checker: self,
                }
            }
        };

        if response.status().as_u16() != self.expected_code {
            return CheckResult {
                severity: Severity::Critical,
                message: format!(
                    "invalid status code: {} instead of {}",
                    response.status().as_u16(),
                    self.expected_code
                ),
                checker: self,
            };
        }

        let elapsed = start.elapsed();
        if elapsed > self.critical {
            CheckResult {
                severity: Severity::Critical,
                message: format!("response time {elapsed:?} exceeded critical threshold {:?}", self.critical),
                checker: self,
            }
        } else if elapsed > self.warning {
            CheckResult {
                severity: Severity::Warning,
                message: format!("response time {elapsed:?} exceeded warning threshold {:?}", self.warning),
                checker: self,
            }
        } else {
            CheckResult {
                severity: Severity::Ok,
                message: format!("{} {} responded {} in {elapsed:?}", self.method, self.url, self.expected_code),
                checker: self,
            }
        }
    }
}

fn build(
    checker_cfg: &serde_json::Value,
    _plugin_cfg: &serde_json::Value,
) -> Result<CheckerRef, CheckerConstructError> {
    let raw: HttpConfigRaw = decode_config(KIND, checker_cfg)?;

    let method = raw
        .method
        .parse::<reqwest::Method>()
        .map_err(|_| CheckerConstructError::InvalidConfig {
            kind: KIND.to_string(),
            reason: format!("invalid HTTP method {:?}", raw.method),
        })?;

    let parse = |text: &Option<String>, default_secs: u64| -> Result<Duration, CheckerConstructError> {
        match text {
            Some(text) => parse_duration_str(text).map_err(|reason| CheckerConstructError::InvalidConfig {
                kind: KIND.to_string(),
                reason,
            }),
            None => Ok(Duration::from_secs(default_secs)),
        }
    };

    let timeout = parse(&raw.timeout, 5)?;
    let warning = parse(&raw.warn, 1)?;
    let critical = parse(&raw.crit, 3)?;

    info!(method = %raw.method, url = %raw.url, "http: checker activated");
    Ok(Arc::new(HttpChecker {
        name: raw.name,
        client: reqwest::Client::new(),
        method,
        url: raw.url,
        expected_code: raw.code,
        timeout,
        warning,
        critical,
    }))
}

pub fn factory() -> CheckerFactory {
    Arc::new(build)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_http_method() {
        let cfg = serde_json::json!({
            "name": "x",
            "url": "http://example.invalid",
            "method": "FROB",
        });
        let err = build(&cfg, &serde_json::Value::Null).unwrap_err();
        assert!(matches!(err, CheckerConstructError::InvalidConfig { .. }));
    }

    #[test]
    fn defaults_expected_code_to_200() {
        let cfg = serde_json::json!({
            "name": "x",
            "url": "http://example.invalid",
            "method": "GET",
        });
        let checker = build(&cfg, &serde_json::Value::Null).unwrap();
        assert_eq!(checker.kind(), KIND);
    }
}
