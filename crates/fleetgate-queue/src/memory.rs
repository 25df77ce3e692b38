//! In-process queue with at-least-once delivery.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{QueueError, QueueResult};
use crate::queue::{MessageQueue, ReceivedMessage};

/// Queue operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOp {
    Send,
    Receive,
    Delete,
    Depth,
}

impl QueueOp {
    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone)]
struct StoredMessage {
    id: String,
    body: String,
    receive_count: u32,
}

struct Leased {
    message: StoredMessage,
    visible_at: Instant,
}

#[derive(Default)]
struct QueueState {
    visible: VecDeque<StoredMessage>,
    /// receipt handle → leased message.
    leased: HashMap<String, Leased>,
}

impl QueueState {
    /// Return leases whose visibility timeout has lapsed to the queue.
    fn expire_leases(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .leased
            .iter()
            .filter(|(_, l)| l.visible_at <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();
        for receipt in expired {
            if let Some(lease) = self.leased.remove(&receipt) {
                trace!(message_id = %lease.message.id, "lease expired, message visible again");
                self.visible.push_back(lease.message);
            }
        }
    }

    fn next_lease_expiry(&self) -> Option<Instant> {
        self.leased.values().map(|l| l.visible_at).min()
    }
}

struct Inner {
    name: String,
    visibility_timeout: Duration,
    state: Mutex<QueueState>,
    arrived: Notify,
    /// Remaining injected failures per operation.
    faults: [AtomicU32; 4],
}

/// In-memory [`MessageQueue`].
///
/// Cheap to clone; clones share the same queue.
#[derive(Clone)]
pub struct MemoryQueue {
    inner: Arc<Inner>,
}

impl MemoryQueue {
    pub fn new(name: &str, visibility_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.to_string(),
                visibility_timeout,
                state: Mutex::new(QueueState::default()),
                arrived: Notify::new(),
                faults: std::array::from_fn(|_| AtomicU32::new(0)),
            }),
        }
    }

    /// Make the next `times` calls of `op` fail.
    pub fn inject_failures(&self, op: QueueOp, times: u32) {
        self.inner.faults[op.index()].store(times, Ordering::SeqCst);
    }

    /// Messages currently receivable.
    pub async fn visible_count(&self) -> usize {
        let mut state = self.inner.state.lock().await;
        state.expire_leases(Instant::now());
        state.visible.len()
    }

    /// Messages received but neither deleted nor expired.
    pub async fn leased_count(&self) -> usize {
        let mut state = self.inner.state.lock().await;
        state.expire_leases(Instant::now());
        state.leased.len()
    }

    fn take_fault(&self, op: QueueOp) -> bool {
        self.inner.faults[op.index()]
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn try_receive(&self, max_messages: usize) -> (Vec<ReceivedMessage>, Option<Instant>) {
        let now = Instant::now();
        let mut state = self.inner.state.lock().await;
        state.expire_leases(now);

        let mut out = Vec::new();
        while out.len() < max_messages {
            let Some(mut message) = state.visible.pop_front() else {
                break;
            };
            message.receive_count += 1;
            let receipt = uuid::Uuid::new_v4().to_string();
            out.push(ReceivedMessage {
                message_id: message.id.clone(),
                body: message.body.clone(),
                receipt_handle: receipt.clone(),
                receive_count: message.receive_count,
            });
            state.leased.insert(
                receipt,
                Leased {
                    message,
                    visible_at: now + self.inner.visibility_timeout,
                },
            );
        }
        (out, state.next_lease_expiry())
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn send(&self, body: String) -> QueueResult<String> {
        if self.take_fault(QueueOp::Send) {
            return Err(QueueError::Send(format!("{}: injected failure", self.inner.name)));
        }
        let id = uuid::Uuid::new_v4().to_string();
        {
            let mut state = self.inner.state.lock().await;
            state.visible.push_back(StoredMessage {
                id: id.clone(),
                body,
                receive_count: 0,
            });
        }
        self.inner.arrived.notify_waiters();
        debug!(queue = %self.inner.name, message_id = %id, "message sent");
        Ok(id)
    }

    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> QueueResult<Vec<ReceivedMessage>> {
        if self.take_fault(QueueOp::Receive) {
            return Err(QueueError::Receive(format!("{}: injected failure", self.inner.name)));
        }
        let deadline = Instant::now() + wait;

        loop {
            let arrived = self.inner.arrived.notified();
            tokio::pin!(arrived);
            arrived.as_mut().enable();

            let (messages, next_expiry) = self.try_receive(max_messages).await;
            if !messages.is_empty() {
                return Ok(messages);
            }
            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }

            // Wake on a new message, a lapsing lease, or the end of the wait.
            let wake_at = next_expiry.map_or(deadline, |t| t.min(deadline));
            tokio::select! {
                _ = &mut arrived => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn delete(&self, receipt_handle: &str) -> QueueResult<()> {
        if self.take_fault(QueueOp::Delete) {
            return Err(QueueError::Delete(format!("{}: injected failure", self.inner.name)));
        }
        let mut state = self.inner.state.lock().await;
        match state.leased.remove(receipt_handle) {
            Some(lease) => {
                trace!(queue = %self.inner.name, message_id = %lease.message.id, "message deleted");
                Ok(())
            }
            None => Err(QueueError::UnknownReceipt(receipt_handle.to_string())),
        }
    }

    async fn approximate_depth(&self) -> QueueResult<u64> {
        if self.take_fault(QueueOp::Depth) {
            return Err(QueueError::Attributes(format!("{}: injected failure", self.inner.name)));
        }
        Ok(self.visible_count().await as u64)
    }
}
