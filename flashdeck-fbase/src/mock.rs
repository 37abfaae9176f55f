//! In-memory document store for tests and local development.
//!
//! Mirrors the hosted store's push model: subscribers receive the current
//! document right away, then every change emitted for their key. Sinks are
//! always invoked with the mock's own lock released, so a listener may
//! re-enter the store (or cancel its subscription) from inside a callback.

use crate::listener::ListenerSink;
use crate::store::{DocumentEvent, DocumentStore, Subscription, WriteOp};
use async_trait::async_trait;
use flashdeck_core::{EntityKey, HashedKey, StoreError, ValidKey};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct MockInner {
    documents: HashMap<HashedKey, Value>,
    listeners: HashMap<HashedKey, Vec<(u64, ListenerSink)>>,
    next_listener_id: u64,
    subscribe_calls: HashMap<HashedKey, usize>,
    unsubscribe_calls: HashMap<HashedKey, usize>,
    subscribe_failures: HashMap<HashedKey, StoreError>,
    fetch_calls: usize,
    commits: Vec<Vec<WriteOp>>,
    commit_failure: Option<StoreError>,
}

/// Mock document store. Clones share state.
#[derive(Clone, Default)]
pub struct MockDocumentStore {
    inner: Arc<Mutex<MockInner>>,
}

fn lock(inner: &Mutex<MockInner>) -> MutexGuard<'_, MockInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

fn hashed(key: &EntityKey) -> Option<HashedKey> {
    key.validate().map(|valid| valid.into_hash())
}

impl MockDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document without notifying listeners.
    pub fn insert_document(&self, key: &EntityKey, data: Value) {
        if let Some(hash) = hashed(key) {
            lock(&self.inner).documents.insert(hash, data);
        }
    }

    pub fn document(&self, key: &EntityKey) -> Option<Value> {
        let hash = hashed(key)?;
        lock(&self.inner).documents.get(&hash).cloned()
    }

    /// Push an event to every listener of `key`. Returns how many listeners
    /// received it.
    pub fn emit(&self, key: &EntityKey, event: DocumentEvent) -> usize {
        let Some(hash) = hashed(key) else {
            return 0;
        };
        let sinks: Vec<ListenerSink> = {
            let mut inner = lock(&self.inner);
            match &event {
                DocumentEvent::Changed(data) => {
                    inner.documents.insert(hash.clone(), data.clone());
                }
                DocumentEvent::Removed => {
                    inner.documents.remove(&hash);
                }
                DocumentEvent::Failed(_) => {}
            }
            inner
                .listeners
                .get(&hash)
                .map(|sinks| sinks.iter().map(|(_, sink)| sink.clone()).collect())
                .unwrap_or_default()
        };
        for sink in &sinks {
            sink.deliver(event.clone());
        }
        sinks.len()
    }

    pub fn emit_changed(&self, key: &EntityKey, data: Value) -> usize {
        self.emit(key, DocumentEvent::Changed(data))
    }

    pub fn emit_removed(&self, key: &EntityKey) -> usize {
        self.emit(key, DocumentEvent::Removed)
    }

    pub fn emit_error(&self, key: &EntityKey, error: StoreError) -> usize {
        self.emit(key, DocumentEvent::Failed(error))
    }

    /// Make the next subscribe call for `key` fail with `error`.
    pub fn fail_subscribe(&self, key: &EntityKey, error: StoreError) {
        if let Some(hash) = hashed(key) {
            lock(&self.inner).subscribe_failures.insert(hash, error);
        }
    }

    /// Make the next commit fail with `error`.
    pub fn fail_next_commit(&self, error: StoreError) {
        lock(&self.inner).commit_failure = Some(error);
    }

    pub fn subscribe_count(&self, key: &EntityKey) -> usize {
        hashed(key)
            .and_then(|hash| lock(&self.inner).subscribe_calls.get(&hash).copied())
            .unwrap_or(0)
    }

    pub fn total_subscribe_count(&self) -> usize {
        lock(&self.inner).subscribe_calls.values().sum()
    }

    pub fn unsubscribe_count(&self, key: &EntityKey) -> usize {
        hashed(key)
            .and_then(|hash| lock(&self.inner).unsubscribe_calls.get(&hash).copied())
            .unwrap_or(0)
    }

    /// Listeners currently attached to `key`.
    pub fn active_listeners(&self, key: &EntityKey) -> usize {
        hashed(key)
            .and_then(|hash| lock(&self.inner).listeners.get(&hash).map(Vec::len))
            .unwrap_or(0)
    }

    pub fn total_active_listeners(&self) -> usize {
        lock(&self.inner).listeners.values().map(Vec::len).sum()
    }

    pub fn fetch_count(&self) -> usize {
        lock(&self.inner).fetch_calls
    }

    /// Every successful commit, in order.
    pub fn commits(&self) -> Vec<Vec<WriteOp>> {
        lock(&self.inner).commits.clone()
    }
}

#[async_trait]
impl DocumentStore for MockDocumentStore {
    fn subscribe(
        &self,
        key: &ValidKey,
        sink: ListenerSink,
    ) -> Result<Subscription, StoreError> {
        let hash = key.hash().clone();
        let (id, initial) = {
            let mut inner = lock(&self.inner);
            *inner.subscribe_calls.entry(hash.clone()).or_default() += 1;
            if let Some(error) = inner.subscribe_failures.remove(&hash) {
                return Err(error);
            }
            inner.next_listener_id += 1;
            let id = inner.next_listener_id;
            inner
                .listeners
                .entry(hash.clone())
                .or_default()
                .push((id, sink.clone()));
            (id, inner.documents.get(&hash).cloned())
        };

        if let Some(data) = initial {
            sink.changed(data);
        }

        let shared = Arc::downgrade(&self.inner);
        Ok(Subscription::new(move || {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let mut inner = lock(&shared);
            *inner.unsubscribe_calls.entry(hash.clone()).or_default() += 1;
            if let Some(sinks) = inner.listeners.get_mut(&hash) {
                sinks.retain(|(listener, _)| *listener != id);
                if sinks.is_empty() {
                    inner.listeners.remove(&hash);
                }
            }
        }))
    }

    async fn fetch(&self, key: &ValidKey) -> Result<Option<Value>, StoreError> {
        let mut inner = lock(&self.inner);
        inner.fetch_calls += 1;
        Ok(inner.documents.get(key.hash()).cloned())
    }

    async fn commit(&self, writes: Vec<WriteOp>) -> Result<(), StoreError> {
        let deliveries: Vec<(ListenerSink, DocumentEvent)> = {
            let mut inner = lock(&self.inner);
            if let Some(error) = inner.commit_failure.take() {
                return Err(error);
            }
            let mut deliveries = Vec::new();
            for write in &writes {
                let hash = write.key().hash().clone();
                let event = match write {
                    WriteOp::Set { data, .. } => {
                        inner.documents.insert(hash.clone(), data.clone());
                        DocumentEvent::Changed(data.clone())
                    }
                    WriteOp::Delete { .. } => {
                        inner.documents.remove(&hash);
                        DocumentEvent::Removed
                    }
                };
                if let Some(sinks) = inner.listeners.get(&hash) {
                    deliveries.extend(sinks.iter().map(|(_, sink)| (sink.clone(), event.clone())));
                }
            }
            inner.commits.push(writes);
            deliveries
        };
        for (sink, event) in deliveries {
            sink.deliver(event);
        }
        Ok(())
    }
}
