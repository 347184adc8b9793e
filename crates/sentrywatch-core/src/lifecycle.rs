//! Lifecycle supervisor: constructs the world, runs it, shuts it down.
//! State machine `Loading -> Running -> Draining -> Exited`, see spec §4.6.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::checker::FactoryRegistry;
use crate::checkers::registry::register_builtin;
use crate::config::Configuration;
use crate::consumers::{display::DisplayConsumer, nsca::NscaConsumer};
use crate::dispatcher::{ConsumerSlot, Dispatcher};
use crate::error::LifecycleError;
use crate::schedule::{PeriodicDriver, ScheduleGroups};

/// Bounded wait for in-flight work during shutdown (spec §5).
pub const DRAIN_WINDOW: Duration = Duration::from_secs(2);
/// Watchdog-forced process termination after root cancellation (spec §5).
pub const HARD_EXIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Process exit codes, spec §6.
pub mod exit_code {
    pub const CLEAN: i32 = 0;
    pub const CONFIG_OR_CONSTRUCT_ERROR: i32 = 1;
    pub const HARD_TIMEOUT: i32 = 2;
}

pub struct RunOptions {
    pub config_path: std::path::PathBuf,
    pub enable_display: bool,
    pub one_shot: bool,
}

/// Run the full agent lifecycle to completion and return the process exit
/// code. This is the single entry point the CLI binary calls into.
pub async fn run(opts: RunOptions) -> i32 {
    match run_inner(opts).await {
        Ok(()) => exit_code::CLEAN,
        Err(LifecycleError::HardExitTimeout(_)) => exit_code::HARD_TIMEOUT,
        Err(err) => {
            error!(error = %err, "fatal error during startup");
            exit_code::CONFIG_OR_CONSTRUCT_ERROR
        }
    }
}

async fn run_inner(opts: RunOptions) -> Result<(), LifecycleError> {
    // --- Loading ---
    info!(path = %opts.config_path.display(), "loading configuration");
    let cfg = Configuration::load(&opts.config_path)?;

    let registry = FactoryRegistry::new();
    register_builtin(&registry);

    let mut consumer_slots = Vec::new();
    for consumer_cfg in &cfg.consumers {
        if consumer_cfg.kind != "NSCA" {
            tracing::warn!(kind = %consumer_cfg.kind, "config: found an unknown consumer type");
            continue;
        }
        let consumer = NscaConsumer::new(consumer_cfg.clone());
        consumer_slots.push(ConsumerSlot {
            consumer: Arc::new(consumer),
            submit_deadline: consumer_cfg.timeout,
        });
    }
    if opts.enable_display {
        consumer_slots.push(ConsumerSlot {
            consumer: Arc::new(DisplayConsumer::new()),
            submit_deadline: Duration::from_secs(1),
        });
    }

    let mut checkers = Vec::new();
    for plugin in &cfg.plugins {
        for check in &plugin.checks {
            match registry.create(&plugin.kind, check, &plugin.config) {
                Ok(checker) => checkers.push(checker),
                Err(crate::error::CheckerConstructError::UnknownKind(kind)) => {
                    tracing::warn!(kind = %kind, "config: unknown checker kind, skipping check");
                }
                Err(err) => return Err(LifecycleError::CheckerConstruct(err)),
            }
        }
    }

    let dispatcher = Arc::new(Dispatcher::new(cfg.hostname.clone(), consumer_slots));
    let groups = ScheduleGroups::build(checkers, cfg.periodicity);

    let root = CancellationToken::new();

    if opts.one_shot {
        run_one_shot(groups, dispatcher.clone(), root).await;
        drain_and_shutdown(dispatcher).await;
        return Ok(());
    }

    // --- Running ---
    let drivers: Vec<_> = groups
        .periods()
        .map(|period| {
            let checkers = groups.checkers_for(period).to_vec();
            PeriodicDriver::new(period, checkers, root.clone())
        })
        .collect();

    let dispatcher_for_drivers = dispatcher.clone();
    let driver_handles: Vec<_> = drivers
        .into_iter()
        .map(|driver| {
            let sink = dispatcher_for_drivers.clone();
            tokio::spawn(driver.run(sink))
        })
        .collect();

    let root_for_watchdog = root.clone();
    let hard_exit_fired = Arc::new(tokio::sync::Notify::new());
    let hard_exit_fired_for_watchdog = hard_exit_fired.clone();
    tokio::spawn(async move {
        root_for_watchdog.cancelled().await;
        tokio::time::sleep(HARD_EXIT_TIMEOUT).await;
        error!("hard-exit watchdog fired; forcing termination");
        hard_exit_fired_for_watchdog.notify_waiters();
    });

    wait_for_signal().await;
    info!("received shutdown signal; draining");
    root.cancel();

    let drain = async {
        for handle in driver_handles {
            let _ = handle.await;
        }
    };

    tokio::select! {
        _ = drain => {}
        _ = tokio::time::sleep(DRAIN_WINDOW) => {
            debug!("drain window elapsed with drivers still running");
        }
        _ = hard_exit_fired.notified() => {
            return Err(LifecycleError::HardExitTimeout(HARD_EXIT_TIMEOUT));
        }
    }

    drain_and_shutdown(dispatcher).await;
    Ok(())
}

async fn run_one_shot(groups: ScheduleGroups, dispatcher: Arc<Dispatcher>, root: CancellationToken) {
    let mut handles = Vec::new();
    for period in groups.periods() {
        let checkers = groups.checkers_for(period).to_vec();
        let driver = PeriodicDriver::new(period, checkers, root.clone());
        let sink = dispatcher.clone();
        handles.push(tokio::spawn(driver.run_once(sink)));
    }
    for handle in handles {
        let _ = handle.await;
    }
}

async fn drain_and_shutdown(dispatcher: Arc<Dispatcher>) {
    tokio::time::timeout(DRAIN_WINDOW, dispatcher.shutdown())
        .await
        .unwrap_or_else(|_| debug!("consumer shutdown exceeded drain window"));
}

/// Wait for SIGINT, SIGQUIT or SIGTERM (spec §6). On non-unix platforms,
/// fall back to Ctrl+C only.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");
        let mut sigquit = signal(SignalKind::quit()).expect("failed to register SIGQUIT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");

        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigquit.recv() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
