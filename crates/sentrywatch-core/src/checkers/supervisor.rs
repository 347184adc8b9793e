//! Supervisor checker: queries a supervisord daemon over XML-RPC and
//! classifies by process state. Grounded on
//! `plugins/supervisor/{supervisor.go,config.go}`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use dxr::{Client, ClientBuilder, TryFromValue, Url, Value};
use serde::Deserialize;
use tokio::time::Instant;
use tracing::info;

use super::decode_config;
use crate::checker::{CheckResult, Checker, CheckerFactory, CheckerRef};
use crate::error::CheckerConstructError;
use crate::severity::Severity;

pub const KIND: &str = "Supervisor";

fn default_server_url() -> String {
    "http://127.0.0.1:9001/RPC2".to_string()
}

fn default_timeout_millis() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfigRaw {
    #[serde(rename = "type")]
    pub check_type: String,
    pub name: String,
    #[serde(default)]
    pub service: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorPluginConfigRaw {
    #[serde(rename = "serverurl", default = "default_server_url")]
    pub server_url: String,
    #[serde(rename = "timeout", default = "default_timeout_millis")]
    pub timeout_millis: u64,
}

pub struct SupervisorChecker {
    name: String,
    service: Option<String>,
    server_url: Url,
    auth: Option<(String, String)>,
    timeout: Duration,
}

#[async_trait]
impl Checker for SupervisorChecker {
    fn kind(&self) -> &str {
        KIND
    }

    fn service_name(&self) -> &str {
        &self.name
    }

    async fn run(self: Arc<Self>, _deadline: Instant) -> CheckResult {
        match self.clone().query().await {
            Ok((message, matched_any)) => CheckResult {
                severity: Severity::Ok,
                message: if matched_any {
                    message
                } else {
                    "All services are RUNNING".to_string()
                },
                checker: self,
            },
            Err(reason) => CheckResult {
                severity: Severity::Critical,
                message: reason,
                checker: self,
            },
        }
    }
}

impl SupervisorChecker {
    async fn query(self: Arc<Self>) -> Result<(String, bool), String> {
        let mut builder = ClientBuilder::new(self.server_url.clone());
        if let Some((user, pass)) = &self.auth {
            let token = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
            builder = builder.header("Authorization", format!("Basic {token}"));
        }
        let client: Client = builder
            .build()
            .map_err(|err| format!("unable to build supervisor client: {err}"))?;

        let response: Vec<Value> = tokio::time::timeout(
            self.timeout,
            client.call("supervisor.getAllProcessInfo", ()),
        )
        .await
        .map_err(|_| "unable to contact supervisor daemon: timed out".to_string())?
        .map_err(|err| format!("unable to contact supervisor daemon: {err}"))?;

        for entry in response {
            let fields = match entry {
                Value::Struct(map) => map,
                _ => continue,
            };
            let Some(ProcInfo { name, state, description }) = ProcInfo::from_fields(&fields) else {
                continue;
            };
            let name = name.to_lowercase();

            if let Some(wanted) = &self.service {
                if wanted != &name {
                    continue;
                }
            }

            if state != "RUNNING" {
                return Err(format!("service {name} is currently {state}: {description}"));
            }
            if self.service.is_some() {
                return Ok((format!("service {name} is running: {description}"), true));
            }
        }

        Ok(("All services are RUNNING".to_string(), false))
    }
}

struct ProcInfo {
    name: String,
    state: String,
    description: String,
}

impl ProcInfo {
    fn from_fields(fields: &BTreeMap<String, Value>) -> Option<Self> {
        let name = match fields.get("name")? {
            Value::String(s) => s.clone(),
            _ => return None,
        };
        let state = match fields.get("statename")? {
            Value::String(s) => s.clone(),
            _ => return None,
        };
        let description = fields
            .get("description")
            .and_then(|v| String::try_from_value(v).ok())
            .unwrap_or_default();
        Some(ProcInfo { name, state, description })
    }
}

fn build(
    checker_cfg: &serde_json::Value,
    plugin_cfg: &serde_json::Value,
) -> Result<CheckerRef, CheckerConstructError> {
    let raw: SupervisorConfigRaw = decode_config(KIND, checker_cfg)?;
    if raw.check_type != "service" && raw.check_type != "services" {
        return Err(CheckerConstructError::InvalidConfig {
            kind: KIND.to_string(),
            reason: format!("invalid type {:?}: must be \"service\" or \"services\"", raw.check_type),
        });
    }
    if raw.service.is_some() && raw.check_type == "services" {
        return Err(CheckerConstructError::InvalidConfig {
            kind: KIND.to_string(),
            reason: "type \"services\" and service key are incompatible".to_string(),
        });
    }

    let plugin: SupervisorPluginConfigRaw = if plugin_cfg.is_null() {
        SupervisorPluginConfigRaw {
            server_url: default_server_url(),
            timeout_millis: default_timeout_millis(),
        }
    } else {
        decode_config(KIND, plugin_cfg)?
    };

    let server_url = Url::parse(&plugin.server_url).map_err(|err| CheckerConstructError::InvalidConfig {
        kind: KIND.to_string(),
        reason: format!("invalid serverurl: {err}"),
    })?;

    let auth = {
        let user = server_url.username();
        let pass = server_url.password();
        match (user, pass) {
            ("", _) | (_, None) => None,
            (user, Some(pass)) => Some((user.to_string(), pass.to_string())),
        }
    };

    info!(checker_type = %raw.check_type, "supervisor: checker activated");
    Ok(Arc::new(SupervisorChecker {
        name: raw.name,
        service: raw.service,
        server_url,
        auth,
        timeout: Duration::from_millis(plugin.timeout_millis),
    }))
}

pub fn factory() -> CheckerFactory {
    Arc::new(build)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_check_type() {
        let cfg = serde_json::json!({ "type": "bogus", "name": "x" });
        let err = build(&cfg, &serde_json::Value::Null).unwrap_err();
        assert!(matches!(err, CheckerConstructError::InvalidConfig { .. }));
    }

    #[test]
    fn rejects_services_type_with_named_service() {
        let cfg = serde_json::json!({ "type": "services", "name": "x", "service": "nginx" });
        let err = build(&cfg, &serde_json::Value::Null).unwrap_err();
        assert!(matches!(err, CheckerConstructError::InvalidConfig { .. }));
    }

    #[test]
    fn defaults_server_url_when_plugin_config_absent() {
        let cfg = serde_json::json!({ "type": "service", "name": "x", "service": "nginx" });
        let checker = build(&cfg, &serde_json::Value::Null).unwrap();
        assert_eq!(checker.kind(), KIND);
    }
}
