//! Process checker: scans `/proc` for a running executable matching a
//! configured path and argument string. Grounded on
//! `plugins/processes/{processes.go,config.go}`. Linux-only, matching the
//! original's implicit platform scope.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info};

use super::decode_config;
use crate::checker::{CheckResult, Checker, CheckerFactory, CheckerRef};
use crate::error::CheckerConstructError;
use crate::severity::Severity;

pub const KIND: &str = "Processes";

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessConfig {
    pub name: String,
    #[serde(rename = "exec")]
    pub command: String,
    #[serde(default)]
    pub args: String,
}

pub struct ProcessChecker {
    name: String,
    command: String,
    args: String,
}

#[async_trait]
impl Checker for ProcessChecker {
    fn kind(&self) -> &str {
        KIND
    }

    fn service_name(&self) -> &str {
        &self.name
    }

    async fn run(self: Arc<Self>, _deadline: Instant) -> CheckResult {
        let command = self.command.clone();
        let args = self.args.clone();
        let matched = tokio::task::spawn_blocking(move || scan_matching_processes(&command, &args))
            .await
            .unwrap_or_else(|err| Err(format!("process scan panicked: {err}")));

        match matched {
            Ok(0) => CheckResult {
                severity: Severity::Critical,
                message: format!("process {} {} is not running", self.command, self.args),
                checker: self,
            },
            Ok(1) => CheckResult {
                severity: Severity::Ok,
                message: format!("process {} {} is running", self.command, self.args),
                checker: self,
            },
            Ok(_) => CheckResult {
                severity: Severity::Critical,
                message: format!("process {} {} has too many instances running", self.command, self.args),
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

/// Scan `/proc/<pid>/exe` and `/proc/<pid>/cmdline` for processes whose
/// resolved executable matches `want_command` and whose argv (joined with
/// spaces, excluding argv[0]) matches `want_args`. Returns the count of
/// matches found.
fn scan_matching_processes(want_command: &str, want_args: &str) -> Result<usize, String> {
    let mut matched = 0usize;

    let entries = std::fs::read_dir("/proc").map_err(|err| format!("unable to read /proc: {err}"))?;
    for entry in entries.flatten() {
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<u32>() else {
            continue;
        };

        let exe_link = PathBuf::from(format!("/proc/{pid}/exe"));
        let Ok(resolved) = std::fs::read_link(&exe_link) else {
            continue;
        };
        if resolved.to_string_lossy() != want_command {
            debug!(pid, path = %resolved.display(), "processes: doesn't match command line");
            continue;
        }

        let cmdline_path = format!("/proc/{pid}/cmdline");
        let Ok(raw) = std::fs::read(&cmdline_path) else {
            return Err(format!("can't open cmdline from pid {pid}"));
        };

        let parts: Vec<&str> = raw
            .split(|&b| b == 0)
            .filter(|s| !s.is_empty())
            .map(|s| std::str::from_utf8(s).unwrap_or(""))
            .collect();
        let args_joined = parts.iter().skip(1).cloned().collect::<Vec<_>>().join(" ");

        if args_joined != want_args {
            debug!(pid, %args_joined, "processes: doesn't match cmdargs");
            continue;
        }

        matched += 1;
    }

    Ok(matched)
}

fn build(
    checker_cfg: &serde_json::Value,
    _plugin_cfg: &serde_json::Value,
) -> Result<CheckerRef, CheckerConstructError> {
    let cfg: ProcessConfig = decode_config(KIND, checker_cfg)?;
    info!(command = %cfg.command, "processes: checker activated");
    Ok(Arc::new(ProcessChecker {
        name: cfg.name,
        command: cfg.command,
        args: cfg.args,
    }))
}

pub fn factory() -> CheckerFactory {
    Arc::new(build)
}
