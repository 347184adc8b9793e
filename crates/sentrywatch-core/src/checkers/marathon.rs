//! Marathon checker: queries a Marathon application's task counts over its
//! REST API. Grounded on `plugins/marathon/{marathon.go,config.go}`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::decode_config;
use crate::checker::{CheckResult, Checker, CheckerFactory, CheckerRef};
use crate::error::CheckerConstructError;
use crate::severity::Severity;

pub const KIND: &str = "Marathon";

const STAGED_TASK_THRESHOLD: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Deserialize)]
pub struct MarathonConfigRaw {
    #[serde(rename = "type")]
    pub check_type: String,
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub warn: i64,
    #[serde(default)]
    pub crit: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarathonPluginConfigRaw {
    pub host: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

pub struct MarathonChecker {
    name: String,
    app_id: String,
    warning: i64,
    critical: i64,
    client: reqwest::Client,
    host: String,
    user: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct ApplicationResponse {
    app: Application,
}

#[derive(Debug, Deserialize)]
struct Application {
    id: String,
    instances: i64,
    #[serde(rename = "tasksRunning", default)]
    tasks_running: i64,
    #[serde(rename = "tasksHealthy", default)]
    tasks_healthy: i64,
    #[serde(rename = "tasksUnhealthy", default)]
    tasks_unhealthy: i64,
    #[serde(rename = "tasksStaged", default)]
    tasks_staged: i64,
    #[serde(default)]
    tasks: Vec<Task>,
}

#[derive(Debug, Deserialize)]
struct Task {
    #[serde(rename = "stagedAt", default)]
    staged_at: String,
    #[serde(rename = "startedAt", default)]
    started_at: String,
}

#[async_trait]
impl Checker for MarathonChecker {
    fn kind(&self) -> &str {
        KIND
    }

    fn service_name(&self) -> &str {
        &self.name
    }

    async fn run(self: Arc<Self>, deadline: Instant) -> CheckResult {
        let request_timeout = deadline.saturating_duration_since(Instant::now());
        let app = match self.fetch_application(request_timeout).await {
            Ok(app) => app,
            Err(reason) => {
                warn!(app = %self.app_id, "marathon/err: {reason}");
                return CheckResult {
                    severity: Severity::Critical,
                    message: reason,
                    checker: self,
                };
            }
        };

        info!(
            healthy = app.tasks_healthy,
            running = app.tasks_running,
            staged = app.tasks_staged,
            unhealthy = app.tasks_unhealthy,
            "{}",
            app.id
        );

        if app.tasks_running < self.critical {
            return CheckResult {
                severity: Severity::Critical,
                message: format!(
                    "{}/{} instances running, threshold: {}",
                    app.tasks_running, app.instances, self.critical
                ),
                checker: self,
            };
        }
        if app.tasks_running < self.warning {
            return CheckResult {
                severity: Severity::Critical,
                message: format!(
                    "{}/{} instances running, threshold: {}",
                    app.tasks_running, app.instances, self.warning
                ),
                checker: self,
            };
        }
        if app.tasks_running != 0 && app.tasks_running == app.tasks_unhealthy {
            return CheckResult {
                severity: Severity::Critical,
                message: format!(
                    "{} unhealthy; {}/{} healthy instances running",
                    app.tasks_unhealthy,
                    app.tasks_running - app.tasks_unhealthy,
                    app.instances
                ),
                checker: self,
            };
        }

        if let Some(reason) = staged_task_overdue(&app.tasks) {
            return CheckResult {
                severity: Severity::Critical,
                message: reason,
                checker: self,
            };
        }

        CheckResult {
            severity: Severity::Ok,
            message: format!(
                "OK: {} running; {} unhealthy; {} staged",
                app.tasks_running - app.tasks_unhealthy,
                app.tasks_unhealthy,
                app.tasks_staged
            ),
            checker: self,
        }
    }
}

impl MarathonChecker {
    async fn fetch_application(&self, timeout: Duration) -> Result<Application, String> {
        let url = format!("{}/v2/apps{}", self.host.trim_end_matches('/'), self.app_id);
        let mut request = self.client.get(&url).timeout(timeout);
        if !self.user.is_empty() && !self.password.is_empty() {
            request = request.basic_auth(&self.user, Some(&self.password));
        }

        let response = request
            .send()
            .await
            .map_err(|err| format!("unable to reach marathon: {err}"))?;

        if !response.status().is_success() {
            return Err(format!("marathon returned status {}", response.status()));
        }

        response
            .json::<ApplicationResponse>()
            .await
            .map(|wrapper| wrapper.app)
            .map_err(|err| format!("unable to decode marathon response: {err}"))
    }
}

fn staged_task_overdue(tasks: &[Task]) -> Option<String> {
    for task in tasks {
        let staged_at = parse_marathon_datetime(&task.staged_at)?;
        let started_at = parse_marathon_datetime(&task.started_at);
        if started_at.is_some() {
            continue;
        }

        let staged_since = Utc::now().signed_duration_since(staged_at);
        if staged_since.to_std().unwrap_or_default() > STAGED_TASK_THRESHOLD {
            return Some("task staged since 15 minutes".to_string());
        }
    }
    None
}

fn parse_marathon_datetime(value: &str) -> Option<DateTime<Utc>> {
    if value.is_empty() {
        return None;
    }
    match DateTime::parse_from_rfc3339(value) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(err) => {
            error!("marathon: unable to parse timestamp {value:?}: {err}");
            None
        }
    }
}

fn build(
    checker_cfg: &serde_json::Value,
    plugin_cfg: &serde_json::Value,
) -> Result<CheckerRef, CheckerConstructError> {
    let raw: MarathonConfigRaw = decode_config(KIND, checker_cfg)?;
    let plugin: MarathonPluginConfigRaw = decode_config(KIND, plugin_cfg)?;

    if plugin.host.is_empty() {
        return Err(CheckerConstructError::InvalidConfig {
            kind: KIND.to_string(),
            reason: "host is empty".to_string(),
        });
    }

    info!(
        app_id = %raw.id,
        warn = raw.warn,
        crit = raw.crit,
        "marathon: checker {:?} activated",
        raw.check_type
    );

    Ok(Arc::new(MarathonChecker {
        name: raw.name,
        app_id: raw.id,
        warning: raw.warn,
        critical: raw.crit,
        client: reqwest::Client::new(),
        host: plugin.host,
        user: plugin.user,
        password: plugin.password,
    }))
}

pub fn factory() -> CheckerFactory {
    Arc::new(build)
}
