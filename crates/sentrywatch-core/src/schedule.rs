//! Scheduler: groups checkers by effective periodicity and drives one
//! periodic ticker per group, spawning bounded check invocations with
//! per-tick deadlines. See spec §4.4.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::checker::{CheckResult, CheckerRef};

/// The hard-cancel grace added after a per-tick deadline (spec §5).
pub const HARD_CANCEL_GRACE: Duration = Duration::from_secs(1);

/// A mapping from effective periodicity to the checkers that share it.
/// Built once at startup from a flat checker list and never mutated
/// thereafter.
pub struct ScheduleGroups {
    groups: HashMap<Duration, Vec<CheckerRef>>,
}

impl ScheduleGroups {
    /// Build schedule groups from a flat checker list and the configured
    /// global default periodicity.
    pub fn build(checkers: Vec<CheckerRef>, global_periodicity: Duration) -> Self {
        let mut groups: HashMap<Duration, Vec<CheckerRef>> = HashMap::new();
        for checker in checkers {
            let period = checker.periodicity().unwrap_or(global_periodicity);
            groups.entry(period).or_default().push(checker);
        }
        Self { groups }
    }

    pub fn periods(&self) -> impl Iterator<Item = Duration> + '_ {
        self.groups.keys().copied()
    }

    pub fn checkers_for(&self, period: Duration) -> &[CheckerRef] {
        self.groups.get(&period).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Sink the scheduler hands completed results to. The dispatcher implements
/// this; tests can stub it.
pub trait ResultSink: Send + Sync + 'static {
    fn accept(&self, result: CheckResult);
}

impl<F: Fn(CheckResult) + Send + Sync + 'static> ResultSink for F {
    fn accept(&self, result: CheckResult) {
        self(result)
    }
}

/// Drives one schedule group: owns a ticker at interval `period`, and on
/// each tick spawns one independent check invocation per checker in the
/// group. Runs until `root` is cancelled.
pub struct PeriodicDriver {
    period: Duration,
    checkers: Vec<CheckerRef>,
    root: CancellationToken,
}

impl PeriodicDriver {
    pub fn new(period: Duration, checkers: Vec<CheckerRef>, root: CancellationToken) -> Self {
        Self {
            period,
            checkers,
            root,
        }
    }

    /// Run the ticker loop, forwarding every produced result to `sink`.
    /// Ticks never overlap for this driver's own bookkeeping, but the
    /// invocations they spawn may still be running when the next tick
    /// fires; checkers are responsible for tolerating that re-entry. Every
    /// spawned invocation is tracked in `in_flight` and, once `root` is
    /// cancelled, awaited to completion before returning — draining must
    /// not complete while a checker invocation is still running.
    pub async fn run<S: ResultSink>(self, sink: Arc<S>) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut in_flight = tokio::task::JoinSet::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.fire_tick(sink.clone(), &mut in_flight);
                }
                _ = self.root.cancelled() => {
                    debug!(period = ?self.period, "periodic driver stopping: root cancelled, draining in-flight invocations");
                    while in_flight.join_next().await.is_some() {}
                    return;
                }
            }
        }
    }

    /// Run exactly one tick's worth of invocations, then return. Used for
    /// `--oneShot` mode.
    pub async fn run_once<S: ResultSink>(self, sink: Arc<S>) {
        let mut in_flight = tokio::task::JoinSet::new();
        self.spawn_tick(sink, &mut in_flight);
        while in_flight.join_next().await.is_some() {}
    }

    fn fire_tick<S: ResultSink>(&self, sink: Arc<S>, in_flight: &mut tokio::task::JoinSet<()>) {
        info!(period = ?self.period, checkers = self.checkers.len(), "scheduler: tick");
        self.spawn_tick(sink, in_flight);
        // Bound the JoinSet's growth across ticks by reaping anything that
        // has already finished; completed entries are removed as a side
        // effect of `try_join_next`, not re-awaited.
        while in_flight.try_join_next().is_some() {}
    }

    fn spawn_tick<S: ResultSink>(&self, sink: Arc<S>, in_flight: &mut tokio::task::JoinSet<()>) {
        let deadline = Instant::now() + self.period * 2;
        let hard_cancel_at = deadline + HARD_CANCEL_GRACE;

        for checker in self.checkers.iter().cloned() {
            let root = self.root.clone();
            let sink = sink.clone();
            in_flight.spawn(async move {
                invoke(checker, deadline, hard_cancel_at, root, sink).await;
            });
        }
    }
}

/// Run one checker invocation bound to `deadline`, forwarding the result to
/// `sink` unless the root token was cancelled before the checker returned.
async fn invoke<S: ResultSink>(
    checker: CheckerRef,
    deadline: Instant,
    hard_cancel_at: Instant,
    root: CancellationToken,
    sink: Arc<S>,
) {
    let service = checker.service_name().to_string();

    let result = tokio::select! {
        result = checker.clone().run(deadline) => result,
        _ = tokio::time::sleep_until(hard_cancel_at) => {
            error!(checker = %service, "scheduler: hard-cancel grace elapsed; checker ignored its deadline");
            // The checker is still running somewhere; we stop waiting for
            // it but do not force-kill user code here. A checker that
            // ignores cancellation entirely will simply have its result
            // dropped below once it eventually returns, since we've moved
            // on.
            return;
        }
    };

    if root.is_cancelled() {
        debug!(checker = %service, "scheduler: discarding result produced after root cancellation");
        return;
    }

    if Instant::now() > deadline {
        error!(checker = %service, "scheduler: invocation exceeded its deadline");
    }

    sink.accept(result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::Checker;
    use crate::severity::Severity;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Immediate {
        name: String,
    }

    #[async_trait]
    impl Checker for Immediate {
        fn kind(&self) -> &str {
            "Immediate"
        }
        fn service_name(&self) -> &str {
            &self.name
        }
        async fn run(self: Arc<Self>, _deadline: Instant) -> CheckResult {
            CheckResult {
                severity: Severity::Ok,
                message: "ok".to_string(),
                checker: self,
            }
        }
    }

    struct Slow {
        name: String,
        sleep: Duration,
    }

    #[async_trait]
    impl Checker for Slow {
        fn kind(&self) -> &str {
            "Slow"
        }
        fn service_name(&self) -> &str {
            &self.name
        }
        async fn run(self: Arc<Self>, _deadline: Instant) -> CheckResult {
            tokio::time::sleep(self.sleep).await;
            CheckResult {
                severity: Severity::Critical,
                message: "took too long".to_string(),
                checker: self,
            }
        }
    }

    struct CollectingSink {
        results: Mutex<Vec<CheckResult>>,
    }

    impl ResultSink for CollectingSink {
        fn accept(&self, result: CheckResult) {
            self.results.lock().unwrap().push(result);
        }
    }

    #[test]
    fn checkers_with_same_effective_period_share_a_group() {
        let default_period = Duration::from_secs(1);
        let a: CheckerRef = Arc::new(Immediate {
            name: "a".to_string(),
        });
        let b: CheckerRef = Arc::new(Immediate {
            name: "b".to_string(),
        });
        let groups = ScheduleGroups::build(vec![a, b], default_period);
        assert_eq!(groups.checkers_for(default_period).len(), 2);
    }

    #[tokio::test]
    async fn one_shot_tick_produces_exactly_one_result_per_checker() {
        let checker: CheckerRef = Arc::new(Immediate {
            name: "svc".to_string(),
        });
        let sink = Arc::new(CollectingSink {
            results: Mutex::new(Vec::new()),
        });
        let driver = PeriodicDriver::new(
            Duration::from_millis(50),
            vec![checker],
            CancellationToken::new(),
        );
        driver.run_once(sink.clone()).await;
        assert_eq!(sink.results.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn root_cancellation_discards_late_results() {
        let checker: CheckerRef = Arc::new(Slow {
            name: "svc".to_string(),
            sleep: Duration::from_millis(200),
        });
        let sink = Arc::new(CollectingSink {
            results: Mutex::new(Vec::new()),
        });
        let root = CancellationToken::new();
        let deadline = Instant::now() + Duration::from_secs(10);
        let hard_cancel_at = deadline + Duration::from_secs(10);

        let root_clone = root.clone();
        let task = tokio::spawn(invoke(checker, deadline, hard_cancel_at, root_clone, sink.clone()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        root.cancel();
        task.await.unwrap();

        assert!(sink.results.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_drains_in_flight_invocations_before_returning_on_cancellation() {
        let completed = Arc::new(AtomicUsize::new(0));

        struct Tracking {
            sleep: Duration,
            completed: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl Checker for Tracking {
            fn kind(&self) -> &str {
                "Tracking"
            }
            fn service_name(&self) -> &str {
                "tracked"
            }
            async fn run(self: Arc<Self>, _deadline: Instant) -> CheckResult {
                tokio::time::sleep(self.sleep).await;
                self.completed.fetch_add(1, Ordering::SeqCst);
                CheckResult {
                    severity: Severity::Ok,
                    message: "done".to_string(),
                    checker: self,
                }
            }
        }

        let checker: CheckerRef = Arc::new(Tracking {
            sleep: Duration::from_millis(150),
            completed: completed.clone(),
        });
        let sink = Arc::new(CollectingSink {
            results: Mutex::new(Vec::new()),
        });
        let root = CancellationToken::new();
        let driver = PeriodicDriver::new(Duration::from_millis(20), vec![checker], root.clone());

        let handle = tokio::spawn(driver.run(sink.clone()));
        // Let the first tick fire and spawn its invocation, then cancel
        // while the tracked checker is still mid-sleep.
        tokio::time::sleep(Duration::from_millis(40)).await;
        root.cancel();
        handle.await.unwrap();

        assert_eq!(
            completed.load(Ordering::SeqCst),
            1,
            "run() returned before its in-flight invocation finished"
        );
    }

    #[test]
    fn missing_group_returns_empty_slice() {
        let groups = ScheduleGroups::build(vec![], Duration::from_secs(1));
        assert!(groups.checkers_for(Duration::from_secs(5)).is_empty());
        assert!(groups.is_empty());
        let _counter = AtomicUsize::new(0);
    }
}
