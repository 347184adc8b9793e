//! sentrywatch CLI - host-side service-health monitoring agent
//!
//! Thin wrapper over `sentrywatch_core::lifecycle::run()`.

use std::path::PathBuf;

use clap::Parser;
use sentrywatch_core::lifecycle::{self, RunOptions};
use sentrywatch_core::logging::{self, LogLevel};

#[derive(Parser)]
#[command(name = "sentrywatch")]
#[command(about = "Host-side service-health monitoring agent", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(long = "cfg", default_value = "./sentrywatch.yml")]
    config: PathBuf,

    /// Verbosity level for application logs
    #[arg(long = "level", default_value = "info")]
    level: String,

    /// Enable the terminal status display
    #[arg(long = "display", default_value_t = false)]
    display: bool,

    /// Run exactly one check round and exit instead of running continuously
    #[arg(long = "oneShot", default_value_t = false)]
    one_shot: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = LogLevel::parse(&cli.level).unwrap_or_else(|| {
        eprintln!("unknown log level {:?}, defaulting to info", cli.level);
        LogLevel::Info
    });
    logging::init(level);

    let exit_code = lifecycle::run(RunOptions {
        config_path: cli.config,
        enable_display: cli.display,
        one_shot: cli.one_shot,
    })
    .await;

    std::process::exit(exit_code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_default_flags() {
        let cli = Cli::parse_from(["sentrywatch"]);
        assert_eq!(cli.config, PathBuf::from("./sentrywatch.yml"));
        assert_eq!(cli.level, "info");
        assert!(!cli.display);
        assert!(!cli.one_shot);
    }

    #[test]
    fn parses_custom_flags() {
        let cli = Cli::parse_from([
            "sentrywatch",
            "--cfg",
            "/etc/sentrywatch.yml",
            "--level",
            "debug",
            "--display",
            "--oneShot",
        ]);
        assert_eq!(cli.config, PathBuf::from("/etc/sentrywatch.yml"));
        assert_eq!(cli.level, "debug");
        assert!(cli.display);
        assert!(cli.one_shot);
    }
}
