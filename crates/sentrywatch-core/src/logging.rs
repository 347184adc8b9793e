//! Structured logging bootstrap. See spec §4.7.
//!
//! Initialized exactly once at process start from the CLI's `--level`
//! flag; never reconfigured at runtime.

use tracing_subscriber::EnvFilter;

/// Log levels accepted on the `--level` CLI flag (spec §6). `Fatal` and
/// `Panic` both map onto `tracing::Level::ERROR`, since `tracing` has no
/// levels above error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Panic,
}

impl LogLevel {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" => Some(Self::Warn),
            "error" => Some(Self::Error),
            "fatal" => Some(Self::Fatal),
            "panic" => Some(Self::Panic),
            _ => None,
        }
    }

    fn tracing_level(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error | LogLevel::Fatal | LogLevel::Panic => "error",
        }
    }
}

/// Install the global `tracing` subscriber. Must be called exactly once,
/// before any other module logs.
pub fn init(level: LogLevel) {
    let filter = EnvFilter::try_new(level.tracing_level()).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_cli_levels() {
        for raw in ["info", "warn", "debug", "error", "fatal", "panic"] {
            assert!(LogLevel::parse(raw).is_some(), "failed to parse {raw}");
        }
    }

    #[test]
    fn fatal_and_panic_map_to_error() {
        assert_eq!(LogLevel::Fatal.tracing_level(), "error");
        assert_eq!(LogLevel::Panic.tracing_level(), "error");
    }

    #[test]
    fn unrecognized_level_is_none() {
        assert!(LogLevel::parse("trace-ish").is_none());
    }
}
