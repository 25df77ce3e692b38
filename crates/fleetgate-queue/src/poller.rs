//! Response queue poller.
//!
//! Drains the response queue into the result store. A message is deleted
//! only after its result has been stored; a message that does not parse is
//! left on the queue for the transport to redeliver.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use fleetgate_core::ResponseMessage;
use fleetgate_core::config::PollerConfig;
use fleetgate_metrics::{ControllerMetrics, Counter};
use fleetgate_results::ResultStore;

use crate::error::QueueResult;
use crate::queue::{MessageQueue, ReceivedMessage};

/// What happened to one received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageOutcome {
    Stored,
    /// Stored, but the delete failed; the transport may redeliver it.
    StoredNotDeleted,
    Malformed,
}

/// Tally of one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub received: usize,
    pub stored: usize,
    pub malformed: usize,
    pub delete_failures: usize,
}

/// Long-running consumer of the response queue.
pub struct QueuePoller {
    queue: Arc<dyn MessageQueue>,
    store: ResultStore,
    metrics: Arc<ControllerMetrics>,
    batch_size: usize,
    wait: Duration,
    error_backoff: Duration,
}

impl QueuePoller {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        store: ResultStore,
        metrics: Arc<ControllerMetrics>,
        config: &PollerConfig,
    ) -> Self {
        Self {
            queue,
            store,
            metrics,
            batch_size: config.batch_size,
            wait: config.wait,
            error_backoff: config.error_backoff,
        }
    }

    /// Receive one batch and process every message in it concurrently.
    ///
    /// Only a failed receive is an error; per-message failures are counted
    /// in the report.
    pub async fn poll_once(&self) -> QueueResult<BatchReport> {
        let messages = self.queue.receive(self.batch_size, self.wait).await?;
        let mut report = BatchReport {
            received: messages.len(),
            ..Default::default()
        };
        if messages.is_empty() {
            return Ok(report);
        }

        debug!(queue = %self.queue.name(), count = messages.len(), "received response messages");

        let outcomes = join_all(messages.into_iter().map(|m| self.handle_message(m))).await;
        for outcome in outcomes {
            match outcome {
                MessageOutcome::Stored => report.stored += 1,
                MessageOutcome::StoredNotDeleted => {
                    report.stored += 1;
                    report.delete_failures += 1;
                }
                MessageOutcome::Malformed => report.malformed += 1,
            }
        }
        Ok(report)
    }

    async fn handle_message(&self, message: ReceivedMessage) -> MessageOutcome {
        let response: ResponseMessage = match serde_json::from_str(&message.body) {
            Ok(r) => r,
            Err(e) => {
                warn!(
                    message_id = %message.message_id,
                    receive_count = message.receive_count,
                    error = %e,
                    "malformed response message, leaving it for redelivery"
                );
                self.metrics.incr(Counter::MalformedMessages);
                return MessageOutcome::Malformed;
            }
        };

        self.store
            .insert(&response.file_name, &response.prediction)
            .await;
        self.metrics.incr(Counter::ResultsStored);
        debug!(identifier = %response.file_name, "result stored");

        match self.queue.delete(&message.receipt_handle).await {
            Ok(()) => MessageOutcome::Stored,
            Err(e) => {
                warn!(
                    identifier = %response.file_name,
                    message_id = %message.message_id,
                    error = %e,
                    "failed to delete response message"
                );
                self.metrics.incr(Counter::DeleteFailures);
                MessageOutcome::StoredNotDeleted
            }
        }
    }

    /// Poll until the shutdown signal fires.
    ///
    /// A failed receive is logged and retried after the fixed backoff.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            queue = %self.queue.name(),
            batch_size = self.batch_size,
            wait_ms = self.wait.as_millis() as u64,
            "queue poller started"
        );

        loop {
            let result = tokio::select! {
                result = self.poll_once() => result,
                _ = shutdown.changed() => break,
            };

            if let Err(e) = result {
                warn!(queue = %self.queue.name(), error = %e, "receive failed, retrying");
                self.metrics.incr(Counter::ReceiveFailures);
                tokio::select! {
                    _ = tokio::time::sleep(self.error_backoff) => {}
                    _ = shutdown.changed() => break,
                }
            }
        }

        info!(queue = %self.queue.name(), "queue poller shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryQueue, QueueOp};

    fn setup() -> (MemoryQueue, ResultStore, Arc<ControllerMetrics>, QueuePoller) {
        setup_with_wait(Duration::ZERO)
    }

    fn setup_with_wait(
        wait: Duration,
    ) -> (MemoryQueue, ResultStore, Arc<ControllerMetrics>, QueuePoller) {
        let queue = MemoryQueue::new("responses", Duration::from_secs(30));
        let store = ResultStore::new();
        let metrics = Arc::new(ControllerMetrics::new());
        let config = PollerConfig {
            batch_size: 10,
            wait,
            error_backoff: Duration::from_secs(2),
        };
        let poller = QueuePoller::new(
            Arc::new(queue.clone()),
            store.clone(),
            metrics.clone(),
            &config,
        );
        (queue, store, metrics, poller)
    }

    fn response(id: &str, prediction: &str) -> String {
        serde_json::json!({ "fileName": id, "prediction": prediction }).to_string()
    }

    #[tokio::test]
    async fn stores_and_deletes_responses() {
        let (queue, store, metrics, poller) = setup();
        queue.send(response("cat1", "dog")).await.unwrap();
        queue.send(response("cat2", "cat")).await.unwrap();

        let report = poller.poll_once().await.unwrap();
        assert_eq!(report.received, 2);
        assert_eq!(report.stored, 2);

        assert_eq!(store.get("cat1").await.as_deref(), Some("dog"));
        assert_eq!(store.get("cat2").await.as_deref(), Some("cat"));
        assert_eq!(queue.visible_count().await, 0);
        assert_eq!(queue.leased_count().await, 0);
        assert_eq!(metrics.counter(Counter::ResultsStored), 2);
    }

    #[tokio::test]
    async fn malformed_message_does_not_block_siblings() {
        let (queue, store, metrics, poller) = setup();
        queue.send("not json".to_string()).await.unwrap();
        queue.send(response("cat1", "dog")).await.unwrap();
        queue.send(r#"{"fileName":"cat2"}"#.to_string()).await.unwrap();

        let report = poller.poll_once().await.unwrap();
        assert_eq!(report.received, 3);
        assert_eq!(report.stored, 1);
        assert_eq!(report.malformed, 2);
        assert_eq!(store.get("cat1").await.as_deref(), Some("dog"));
        assert_eq!(metrics.counter(Counter::MalformedMessages), 2);

        // Malformed messages stay leased, awaiting redelivery.
        assert_eq!(queue.leased_count().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_message_is_redelivered() {
        let (queue, _store, _metrics, poller) = setup();
        queue.send("garbage".to_string()).await.unwrap();

        assert_eq!(poller.poll_once().await.unwrap().malformed, 1);
        assert_eq!(poller.poll_once().await.unwrap().received, 0);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(poller.poll_once().await.unwrap().malformed, 1);
    }

    #[tokio::test]
    async fn delete_failure_keeps_stored_result() {
        let (queue, store, metrics, poller) = setup();
        queue.send(response("cat1", "dog")).await.unwrap();
        queue.inject_failures(QueueOp::Delete, 1);

        let report = poller.poll_once().await.unwrap();
        assert_eq!(report.stored, 1);
        assert_eq!(report.delete_failures, 1);
        assert_eq!(store.get("cat1").await.as_deref(), Some("dog"));
        assert_eq!(metrics.counter(Counter::DeleteFailures), 1);
    }

    #[tokio::test]
    async fn redelivered_response_overwrites_with_same_value() {
        let (queue, store, _metrics, poller) = setup();
        queue.send(response("cat1", "dog")).await.unwrap();
        queue.send(response("cat1", "dog")).await.unwrap();

        let report = poller.poll_once().await.unwrap();
        assert_eq!(report.stored, 2);
        assert_eq!(store.len().await, 1);
        assert_eq!(store.take("cat1").await.as_deref(), Some("dog"));
    }

    #[tokio::test]
    async fn receive_failure_is_an_error() {
        let (queue, _store, _metrics, poller) = setup();
        queue.inject_failures(QueueOp::Receive, 1);
        assert!(poller.poll_once().await.is_err());
        assert!(poller.poll_once().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn run_survives_receive_failures_and_stops_on_shutdown() {
        let (queue, store, metrics, poller) = setup_with_wait(Duration::from_secs(5));
        queue.inject_failures(QueueOp::Receive, 3);
        queue.send(response("cat1", "dog")).await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { poller.run(shutdown_rx).await });

        // Three failures, each followed by a 2s backoff, then success.
        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(store.get("cat1").await.as_deref(), Some("dog"));
        assert_eq!(metrics.counter(Counter::ReceiveFailures), 3);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
