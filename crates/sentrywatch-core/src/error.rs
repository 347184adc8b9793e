//! Error taxonomy. One enum per component that produces errors the core
//! must distinguish; see spec §7 for the propagation rule of each variant.

use thiserror::Error;

/// Errors that abort startup (`Loading`) with a non-zero exit.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config: unable to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("config: invalid configuration: {0}")]
    Invalid(String),
    #[error("config: invalid duration {raw:?}: {reason}")]
    InvalidDuration { raw: String, reason: String },
}

/// Errors raised while constructing a checker from configuration.
#[derive(Debug, Error)]
pub enum CheckerConstructError {
    #[error("checker: unknown checker kind {0:?}")]
    UnknownKind(String),
    #[error("checker: invalid configuration for {kind}: {reason}")]
    InvalidConfig { kind: String, reason: String },
}

/// Errors surfaced by a consumer's runtime. These never escalate past the
/// consumer's own drain task; they are logged and otherwise swallowed.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("consumer: submit timed out after {0:?}")]
    SubmitTimeout(std::time::Duration),
    #[error("consumer: delivery failed: {0}")]
    Delivery(String),
    #[error("consumer: shutdown did not complete within {0:?}")]
    ShutdownTimeout(std::time::Duration),
}

/// Errors that can terminate the lifecycle supervisor outright.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("lifecycle: checker construction failed: {0}")]
    CheckerConstruct(#[from] CheckerConstructError),
    #[error("lifecycle: hard-exit watchdog fired {0:?} after root cancellation")]
    HardExitTimeout(std::time::Duration),
}
