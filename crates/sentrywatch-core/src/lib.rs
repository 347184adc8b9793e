//! Scheduling, classification and fan-out engine for sentrywatch.
//!
//! The core owns periodic firing of heterogeneous checkers, enforces
//! per-check time budgets, and fans classified results out to consumer
//! sinks without letting a slow or failing sink stall the engine or its
//! siblings. Everything else — probe implementations, the NSCA wire
//! client, the terminal display, configuration parsing — plugs into the
//! contracts defined here.

pub mod checker;
pub mod checkers;
pub mod config;
pub mod consumer;
pub mod consumers;
pub mod dispatcher;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod schedule;
pub mod severity;
pub mod template;

pub use checker::{CheckResult, Checker, CheckerFactory, CheckerRef, FactoryRegistry};
pub use consumer::{ClassifiedResult, Consumer};
pub use error::{CheckerConstructError, ConfigError, ConsumerError, LifecycleError};
pub use lifecycle::RunOptions;
pub use severity::Severity;
