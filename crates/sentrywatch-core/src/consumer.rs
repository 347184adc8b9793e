//! Consumer contract and runtime: a bounded-queue, worker-pool sink that
//! accepts classified results without ever blocking the dispatcher. See
//! spec §4.3.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::warn;

use crate::checker::CheckerRef;
use crate::error::ConsumerError;
use crate::severity::Severity;

/// Recommended bound for a consumer's internal FIFO queue (spec §4.3).
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Cooperative grace period a worker gives a blocked sink write before
/// abandoning it on shutdown (spec §4.3).
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A `CheckResult` with the process-wide hostname attached, ready to hand
/// to a sink.
#[derive(Debug, Clone)]
pub struct ClassifiedResult {
    pub severity: Severity,
    pub message: String,
    pub checker: CheckerRef,
    pub hostname: String,
}

/// Capability set every consumer implements. A consumer owns its own
/// transport (network socket, terminal, file) behind this contract; the
/// core never reaches into consumer internals.
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Name used in logs to identify this consumer instance.
    fn name(&self) -> &str;

    /// Non-blocking best-effort handoff. Returns once the result has been
    /// accepted into the consumer's internal queue, or once `deadline`
    /// elapses, whichever comes first. The core never retries a dropped
    /// submission.
    async fn submit(&self, result: ClassifiedResult, deadline: Duration) -> Result<(), ConsumerError>;

    /// Drain one delivery outcome, if any are queued. `Ok(None)` means no
    /// outcome is currently available; callers poll this in a loop until
    /// shutdown.
    async fn next_error(&self) -> Option<ConsumerError>;

    /// Idempotent shutdown: signal the consumer to stop, allowing a bounded
    /// drain window for in-flight deliveries. Safe to call more than once.
    async fn shutdown(&self);
}

/// A generic bounded-queue worker pool shared by the concrete consumer
/// implementations (NSCA, display). Each consumer owns one of these; the
/// dispatcher only ever calls `submit`/`next_error`/`shutdown` on the
/// `Consumer` trait, never on this type directly.
pub struct QueueRuntime<T: Send + 'static> {
    queue_tx: mpsc::Sender<T>,
    error_rx: tokio::sync::Mutex<mpsc::Receiver<ConsumerError>>,
    shutdown: tokio_util::sync::CancellationToken,
}

impl<T: Send + 'static> QueueRuntime<T> {
    /// Spawn `instances` worker tasks, each running `worker` against items
    /// pulled from the shared queue. `worker` receives an owned item, a
    /// handle to report delivery errors, and a cancellation token it must
    /// check while blocked on its sink.
    pub fn spawn<F, Fut>(
        capacity: usize,
        instances: usize,
        worker: F,
    ) -> Self
    where
        F: Fn(T, mpsc::Sender<ConsumerError>, tokio_util::sync::CancellationToken) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (queue_tx, queue_rx) = mpsc::channel::<T>(capacity.max(1));
        let (error_tx, error_rx) = mpsc::channel::<ConsumerError>(capacity.max(1));
        let shutdown = tokio_util::sync::CancellationToken::new();
        let queue_rx = std::sync::Arc::new(tokio::sync::Mutex::new(queue_rx));
        let worker = std::sync::Arc::new(worker);

        for _ in 0..instances.max(1) {
            let queue_rx = queue_rx.clone();
            let error_tx = error_tx.clone();
            let shutdown = shutdown.clone();
            let worker = worker.clone();
            tokio::spawn(async move {
                loop {
                    let item = {
                        let mut rx = queue_rx.lock().await;
                        tokio::select! {
                            item = rx.recv() => item,
                            _ = shutdown.cancelled() => None,
                        }
                    };
                    let Some(item) = item else { break };
                    worker(item, error_tx.clone(), shutdown.clone()).await;
                }
            });
        }

        Self {
            queue_tx,
            error_rx: tokio::sync::Mutex::new(error_rx),
            shutdown,
        }
    }

    /// Enqueue `item`, giving up after `deadline` if the queue is full.
    pub async fn submit(&self, item: T, deadline: Duration) -> Result<(), ConsumerError> {
        match timeout(deadline, self.queue_tx.send(item)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ConsumerError::Delivery("queue closed".to_string())),
            Err(_) => {
                warn!("consumer: submit dropped after {:?} timeout", deadline);
                Err(ConsumerError::SubmitTimeout(deadline))
            }
        }
    }

    pub async fn next_error(&self) -> Option<ConsumerError> {
        self.error_rx.lock().await.recv().await
    }

    pub async fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn submit_and_process_one_item() {
        let processed = Arc::new(AtomicUsize::new(0));
        let processed_clone = processed.clone();

        let runtime: QueueRuntime<u32> = QueueRuntime::spawn(10, 1, move |_item, _errs, _cancel| {
            let processed = processed_clone.clone();
            async move {
                processed.fetch_add(1, Ordering::SeqCst);
            }
        });

        runtime.submit(1, Duration::from_secs(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(processed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let runtime: QueueRuntime<u32> =
            QueueRuntime::spawn(10, 1, |_item, _errs, _cancel| async {});
        runtime.shutdown().await;
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn full_queue_drops_with_timeout_error_rather_than_blocking() {
        let runtime: QueueRuntime<u32> = QueueRuntime::spawn(1, 1, |_item, _errs, _cancel| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
        });
        // First submission is picked up by the sole worker, which then
        // sleeps for a long time, holding it busy.
        runtime.submit(1, Duration::from_secs(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        // Second submission fills the one-slot queue, since the worker is
        // not coming back to drain it.
        runtime.submit(2, Duration::from_secs(1)).await.unwrap();
        // Third submission has nowhere to go: worker busy, queue full.
        let result = runtime.submit(3, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(ConsumerError::SubmitTimeout(_))));
    }
}
