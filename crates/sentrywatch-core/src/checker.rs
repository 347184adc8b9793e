//! Checker contract: an opaque probe of one service's health, invoked
//! periodically by the scheduler and producing exactly one `Result` per
//! invocation. See spec §3, §4.2.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::error::CheckerConstructError;
use crate::severity::Severity;

/// The outcome of a single checker invocation.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub severity: Severity,
    pub message: String,
    pub checker: CheckerRef,
}

/// A checker's identity plus a clone handle to the instance that produced a
/// result. Consumers may query `service_name()`/`kind()` through it but
/// must never mutate the underlying checker.
pub type CheckerRef = Arc<dyn Checker>;

/// Capability set every checker implements. Checkers are constructed once
/// at load time from configuration, live for the process lifetime, and are
/// never mutated by the core — they may hold their own interior state (e.g.
/// a sliding window of recent failures) and must tolerate re-entry if their
/// own periodicity is shorter than their own run time.
#[async_trait]
pub trait Checker: Send + Sync {
    /// Plugin kind, e.g. `"HTTP"`. Stable for the life of the process.
    fn kind(&self) -> &str;

    /// Operator-chosen label, unique within a running process.
    fn service_name(&self) -> &str;

    /// Optional override of the global periodicity. `None` means "use the
    /// scheduler's default".
    fn periodicity(&self) -> Option<std::time::Duration> {
        None
    }

    /// Run the probe. MUST return within `deadline` plus a small grace, MUST
    /// NOT block indefinitely, and MUST honor cancellation by producing a
    /// `Critical` result identifying the timeout rather than hanging.
    /// Probe-internal failures are encoded in the returned `CheckResult`,
    /// never propagated as an `Err` — the core does not special-case probe
    /// failure modes beyond the deadline itself.
    async fn run(self: Arc<Self>, deadline: Instant) -> CheckResult;
}

/// Factory signature a plugin registers under its kind string.
pub type CheckerFactory = Arc<
    dyn Fn(&serde_json::Value, &serde_json::Value) -> Result<CheckerRef, CheckerConstructError>
        + Send
        + Sync,
>;

/// Process-wide registry mapping checker kind to its factory. Populated
/// once during `Loading` (see `checkers::registry::register_builtin`) and
/// effectively read-only afterward; the core takes no lock on behalf of an
/// individual checker once constructed.
#[derive(Clone, Default)]
pub struct FactoryRegistry {
    factories: Arc<Mutex<HashMap<String, CheckerFactory>>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `kind`. A second registration of the same
    /// kind is reported at error level and ignored, matching the source's
    /// `Register` behavior — this is intentionally not a panic, since a
    /// duplicate registration must never abort process startup.
    pub fn register(&self, kind: impl Into<String>, factory: CheckerFactory) {
        let kind = kind.into();
        let mut factories = self.factories.lock().unwrap();
        if factories.contains_key(&kind) {
            error!(checker.kind = %kind, "checker factory already registered; ignoring");
            return;
        }
        debug!(checker.kind = %kind, "registered checker factory");
        factories.insert(kind, factory);
    }

    /// Construct a checker of the given `kind` from its check-specific and
    /// plugin-wide configuration blobs.
    pub fn create(
        &self,
        kind: &str,
        checker_cfg: &serde_json::Value,
        plugin_cfg: &serde_json::Value,
    ) -> Result<CheckerRef, CheckerConstructError> {
        let factories = self.factories.lock().unwrap();
        let factory = factories
            .get(kind)
            .ok_or_else(|| CheckerConstructError::UnknownKind(kind.to_string()))?;
        factory(checker_cfg, plugin_cfg)
    }

    pub fn known_kinds(&self) -> Vec<String> {
        self.factories.lock().unwrap().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct AlwaysOk {
        name: String,
    }

    #[async_trait]
    impl Checker for AlwaysOk {
        fn kind(&self) -> &str {
            "AlwaysOk"
        }

        fn service_name(&self) -> &str {
            &self.name
        }

        async fn run(self: Arc<Self>, _deadline: Instant) -> CheckResult {
            CheckResult {
                severity: Severity::Ok,
                message: "fine".to_string(),
                checker: self,
            }
        }
    }

    #[test]
    fn duplicate_registration_is_ignored_not_fatal() {
        let registry = FactoryRegistry::new();
        let factory: CheckerFactory = Arc::new(|_c, _p| {
            Ok(Arc::new(AlwaysOk {
                name: "svc".to_string(),
            }) as CheckerRef)
        });
        registry.register("AlwaysOk", factory.clone());
        registry.register("AlwaysOk", factory);
        assert_eq!(registry.known_kinds(), vec!["AlwaysOk".to_string()]);
    }

    #[test]
    fn unknown_kind_is_reported_distinctly() {
        let registry = FactoryRegistry::new();
        let err = registry
            .create("DoesNotExist", &serde_json::Value::Null, &serde_json::Value::Null)
            .unwrap_err();
        assert!(matches!(err, CheckerConstructError::UnknownKind(k) if k == "DoesNotExist"));
    }

    #[tokio::test]
    async fn checker_produces_exactly_one_result_per_invocation() {
        let checker: CheckerRef = Arc::new(AlwaysOk {
            name: "svc".to_string(),
        });
        let result = checker.run(Instant::now() + Duration::from_secs(1)).await;
        assert_eq!(result.severity, Severity::Ok);
    }
}
