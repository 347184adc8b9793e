//! Command checker: runs a subprocess and classifies it by exit status.
//! Grounded on `plugins/command/{command.go,config.go}`, whose later
//! `Run()` renders its timeout and exit-code failure messages through
//! `plugins.RenderError(c.cfg.templates.ErrTimeout/ErrExitCode, model)`.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command as TokioCommand;
use tokio::time::Instant;
use tracing::{info, warn};

use super::decode_config;
use crate::checker::{CheckResult, Checker, CheckerFactory, CheckerRef};
use crate::error::CheckerConstructError;
use crate::severity::Severity;
use crate::template::{self, TemplateSet};

pub const KIND: &str = "Command";

#[derive(Debug, Clone, Deserialize)]
pub struct CommandConfig {
    pub name: String,
    pub command: String,
    /// Optional named override templates, keyed by `"timeout"` or
    /// `"exit_code"`. Unset names fall back to the built-in message.
    #[serde(default)]
    pub templates: HashMap<String, String>,
}

pub struct CommandChecker {
    name: String,
    program: String,
    args: Vec<String>,
    templates: TemplateSet,
}

#[async_trait]
impl Checker for CommandChecker {
    fn kind(&self) -> &str {
        KIND
    }

    fn service_name(&self) -> &str {
        &self.name
    }

    async fn run(self: Arc<Self>, deadline: Instant) -> CheckResult {
        let mut child = match TokioCommand::new(&self.program)
            .args(&self.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                warn!(checker = %self.name, "command: can't start: {err}");
                return CheckResult {
                    severity: Severity::Critical,
                    message: format!("command: can't start: {err}"),
                    checker: self,
                };
            }
        };

        tokio::select! {
            output = child.wait_with_output() => {
                match output {
                    Ok(output) if output.status.success() => CheckResult {
                        severity: Severity::Ok,
                        message: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                        checker: self,
                    },
                    Ok(output) => {
                        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                        let underlying = format!("command exited with {}: {stderr}", output.status);
                        let mut model = HashMap::new();
                        model.insert("program".to_string(), self.program.clone());
                        model.insert("status".to_string(), output.status.to_string());
                        model.insert("stderr".to_string(), stderr);
                        let message = template::render(&self.templates, "exit_code", &model, &underlying);
                        CheckResult {
                            severity: Severity::Critical,
                            message,
                            checker: self,
                        }
                    }
                    Err(err) => CheckResult {
                        severity: Severity::Critical,
                        message: format!("command: wait failed: {err}"),
                        checker: self,
                    },
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                let underlying = format!("command {:?} took too long", self.program);
                let mut model = HashMap::new();
                model.insert("program".to_string(), self.program.clone());
                let message = template::render(&self.templates, "timeout", &model, &underlying);
                CheckResult {
                    severity: Severity::Critical,
                    message,
                    checker: self,
                }
            }
        }
    }
}

fn build(
    checker_cfg: &serde_json::Value,
    _plugin_cfg: &serde_json::Value,
) -> Result<CheckerRef, CheckerConstructError> {
    let cfg: CommandConfig = decode_config(KIND, checker_cfg)?;

    let parts = shell_words::split(&cfg.command).map_err(|err| CheckerConstructError::InvalidConfig {
        kind: KIND.to_string(),
        reason: format!("can't parse command line: {err}"),
    })?;
    let (program, args) = parts.split_first().ok_or_else(|| CheckerConstructError::InvalidConfig {
        kind: KIND.to_string(),
        reason: "empty command".to_string(),
    })?;

    let mut templates = TemplateSet::new();
    for (name, text) in &cfg.templates {
        templates.insert(name.clone(), text.clone());
    }

    info!(command = %cfg.command, "command: checker activated");
    Ok(Arc::new(CommandChecker {
        name: cfg.name,
        program: program.clone(),
        args: args.to_vec(),
        templates,
    }))
}

pub fn factory() -> CheckerFactory {
    Arc::new(build)
}
