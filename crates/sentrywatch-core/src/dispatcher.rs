//! Dispatcher: attaches hostname to a `CheckResult` and fans it out to every
//! registered consumer without letting a slow or broken consumer stall
//! delivery to the others. See spec §4.5.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::checker::CheckResult;
use crate::consumer::{ClassifiedResult, Consumer};
use crate::schedule::ResultSink;

/// One registered consumer plus the submit deadline the dispatcher uses for
/// it (recommended equal to the consumer's own configured send timeout).
pub struct ConsumerSlot {
    pub consumer: Arc<dyn Consumer>,
    pub submit_deadline: Duration,
}

pub struct Dispatcher {
    hostname: String,
    consumers: Vec<ConsumerSlot>,
}

impl Dispatcher {
    pub fn new(hostname: String, consumers: Vec<ConsumerSlot>) -> Arc<Self> {
        let dispatcher = Arc::new(Self { hostname, consumers });
        for slot in &dispatcher.consumers {
            spawn_error_drain(slot.consumer.clone());
        }
        dispatcher
    }

    /// Fan a single result out to every consumer, in registration order.
    /// Each submission is independent; a consumer that drops the result
    /// (queue full, sink unreachable) is logged and does not affect the
    /// others.
    pub async fn dispatch(&self, result: CheckResult) {
        fan_out(&self.hostname, &self.consumers, result).await
    }

    pub async fn shutdown(&self) {
        for slot in &self.consumers {
            slot.consumer.shutdown().await;
        }
    }
}

async fn fan_out(hostname: &str, consumers: &[ConsumerSlot], result: CheckResult) {
    let classified = ClassifiedResult {
        severity: result.severity,
        message: result.message,
        checker: result.checker,
        hostname: hostname.to_string(),
    };

    for slot in consumers {
        let classified = classified.clone();
        let outcome = tokio::time::timeout(
            slot.submit_deadline,
            slot.consumer.submit(classified, slot.submit_deadline),
        )
        .await;
        match outcome {
            Ok(Ok(())) => debug!(consumer = slot.consumer.name(), "dispatcher: submitted"),
            Ok(Err(err)) => warn!(
                consumer = slot.consumer.name(),
                error = %err,
                "dispatcher: dropped result"
            ),
            Err(_) => warn!(
                consumer = slot.consumer.name(),
                deadline = ?slot.submit_deadline,
                "dispatcher: consumer did not respect its own submit deadline; dropped result"
            ),
        }
    }
}

impl ResultSink for Dispatcher {
    fn accept(&self, result: CheckResult) {
        // `accept` must be synchronous (it's called from the scheduler's
        // spawned invocation task); hand off to the async fan-out path on
        // the current runtime rather than blocking the caller. Consumer
        // handles are cheap `Arc` clones, so this doesn't need `self` to
        // outlive the spawned task.
        let hostname = self.hostname.clone();
        let consumers: Vec<ConsumerSlot> = self
            .consumers
            .iter()
            .map(|slot| ConsumerSlot {
                consumer: slot.consumer.clone(),
                submit_deadline: slot.submit_deadline,
            })
            .collect();
        tokio::spawn(async move {
            fan_out(&hostname, &consumers, result).await;
        });
    }
}

fn spawn_error_drain(consumer: Arc<dyn Consumer>) {
    tokio::spawn(async move {
        loop {
            match consumer.next_error().await {
                Some(err) => error!(consumer = consumer.name(), error = %err, "consumer delivery error"),
                None => {
                    debug!(consumer = consumer.name(), "consumer: message sent");
                    break;
                }
            }
        }
    });
}
