//! The shared result map.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::WaitError;

struct Inner {
    /// identifier → result.
    entries: RwLock<HashMap<String, String>>,
    /// Signalled on every insert.
    inserted: Notify,
}

/// Concurrency-safe `identifier → result` map with awaitable lookups.
///
/// Cheap to clone; all clones share the same entries.
#[derive(Clone)]
pub struct ResultStore {
    inner: Arc<Inner>,
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(HashMap::new()),
                inserted: Notify::new(),
            }),
        }
    }

    /// Store a result, replacing any previous one for the same identifier.
    ///
    /// Returns the replaced value, if any.
    pub async fn insert(&self, identifier: &str, result: &str) -> Option<String> {
        let previous = {
            let mut entries = self.inner.entries.write().await;
            entries.insert(identifier.to_string(), result.to_string())
        };
        if previous.is_some() {
            debug!(%identifier, "result overwritten");
        }
        self.inner.inserted.notify_waiters();
        previous
    }

    /// Remove and return the result for `identifier`.
    pub async fn take(&self, identifier: &str) -> Option<String> {
        self.inner.entries.write().await.remove(identifier)
    }

    pub async fn get(&self, identifier: &str) -> Option<String> {
        self.inner.entries.read().await.get(identifier).cloned()
    }

    pub async fn contains(&self, identifier: &str) -> bool {
        self.inner.entries.read().await.contains_key(identifier)
    }

    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.entries.read().await.is_empty()
    }

    /// Drop every entry. Returns how many were removed.
    pub async fn clear(&self) -> usize {
        let mut entries = self.inner.entries.write().await;
        let removed = entries.len();
        entries.clear();
        info!(removed, "result store cleared");
        removed
    }

    /// Wait until a result for `identifier` is present, then take it.
    ///
    /// With `deadline = None` the wait only ends when the result arrives or
    /// `cancel` fires.
    pub async fn wait_for(
        &self,
        identifier: &str,
        deadline: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<String, WaitError> {
        let wait = self.wait_unbounded(identifier, cancel);
        match deadline {
            None => wait.await,
            Some(limit) => tokio::time::timeout(limit, wait).await.unwrap_or_else(|_| {
                Err(WaitError::DeadlineExceeded {
                    identifier: identifier.to_string(),
                    deadline: limit,
                })
            }),
        }
    }

    async fn wait_unbounded(
        &self,
        identifier: &str,
        cancel: &CancellationToken,
    ) -> Result<String, WaitError> {
        loop {
            // Register for the next insert before checking, so an insert
            // between the check and the await is not missed.
            let notified = self.inner.inserted.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(result) = self.take(identifier).await {
                return Ok(result);
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = cancel.cancelled() => {
                    return Err(WaitError::Cancelled(identifier.to_string()));
                }
            }
        }
    }
}
