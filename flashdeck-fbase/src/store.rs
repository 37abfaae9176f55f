//! Remote document store collaborator.
//!
//! The cache does not implement the store; it only owns the lifecycle of the
//! subscriptions the store hands out. Implementations deliver change events
//! for a subscribed path into the supplied [`ListenerSink`], in order.

use crate::listener::ListenerSink;
use async_trait::async_trait;
use flashdeck_core::{StoreError, ValidKey};
use serde_json::Value;
use std::fmt;

/// A change observed on a subscribed document.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentEvent {
    /// The document was added or modified.
    Changed(Value),
    /// The document was deleted remotely.
    Removed,
    /// The subscription reported an error.
    Failed(StoreError),
}

/// Teardown handle of one remote subscription.
///
/// Cancelling runs the teardown callback exactly once, whether through
/// [`Subscription::cancel`] or by dropping the handle.
pub struct Subscription {
    teardown: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new<F>(teardown: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            teardown: Some(Box::new(teardown)),
        }
    }

    pub fn cancel(mut self) {
        self.run_teardown();
    }

    fn run_teardown(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_teardown();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("live", &self.teardown.is_some())
            .finish()
    }
}

/// One write in a transactional commit.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Replace the document.
    Set { key: ValidKey, data: Value },
    /// Delete the document.
    Delete { key: ValidKey },
}

impl WriteOp {
    pub fn key(&self) -> &ValidKey {
        match self {
            Self::Set { key, .. } | Self::Delete { key } => key,
        }
    }
}

/// The hosted document database, as seen by the cache.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Start listening to a document. Events for `key` must be delivered to
    /// `sink` in the order they occur. Dropping or cancelling the returned
    /// [`Subscription`] stops delivery.
    fn subscribe(&self, key: &ValidKey, sink: ListenerSink) -> Result<Subscription, StoreError>;

    /// One-shot read. `Ok(None)` means the document does not exist.
    async fn fetch(&self, key: &ValidKey) -> Result<Option<Value>, StoreError>;

    /// Apply all writes atomically, or none of them.
    async fn commit(&self, writes: Vec<WriteOp>) -> Result<(), StoreError>;
}
