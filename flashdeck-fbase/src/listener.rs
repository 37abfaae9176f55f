//! Bridge between remote document subscriptions and the cache.
//!
//! At most one remote subscription exists per hashed key. The store pushes
//! events into a [`ListenerSink`], which applies the claimant's hooks and
//! routes the result through the client's single cache-mutation path. A sink
//! belongs to one lease generation; once that lease is evicted, anything the
//! sink still receives is dropped.

use crate::cache::Entity;
use crate::client::{ClientShared, EntityClient};
use crate::lease::LeaseOptions;
use crate::store::DocumentEvent;
use flashdeck_core::{StoreError, ValidKey};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Weak};

pub type Transform = Arc<dyn Fn(Value) -> Value + Send + Sync>;
pub type RemovedHook = Arc<dyn Fn(&ValidKey) + Send + Sync>;
pub type ErrorHook = Arc<dyn Fn(&ValidKey, &StoreError) + Send + Sync>;

/// Options for watching an entity.
///
/// The hooks belong to whichever claimant starts the listener; later
/// claimants reuse that listener and its hooks.
#[derive(Clone, Default)]
pub struct WatchOptions {
    pub lease: Option<LeaseOptions>,
    pub transform: Option<Transform>,
    pub on_removed: Option<RemovedHook>,
    pub on_error: Option<ErrorHook>,
}

impl WatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lease(mut self, lease: LeaseOptions) -> Self {
        self.lease = Some(lease);
        self
    }

    /// Transform document data before it is stored.
    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn on_removed<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ValidKey) + Send + Sync + 'static,
    {
        self.on_removed = Some(Arc::new(hook));
        self
    }

    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ValidKey, &StoreError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    pub(crate) fn hooks(&self) -> ListenerHooks {
        ListenerHooks {
            transform: self.transform.clone(),
            on_removed: self.on_removed.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

impl fmt::Debug for WatchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchOptions")
            .field("lease", &self.lease)
            .field("transform", &self.transform.is_some())
            .field("on_removed", &self.on_removed.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

#[derive(Clone, Default)]
pub(crate) struct ListenerHooks {
    transform: Option<Transform>,
    on_removed: Option<RemovedHook>,
    on_error: Option<ErrorHook>,
}

impl ListenerHooks {
    pub(crate) fn report_error(&self, key: &ValidKey, error: &StoreError) {
        if let Some(on_error) = &self.on_error {
            on_error(key, error);
        }
    }
}

/// Receives events for one subscribed key on behalf of the entity client.
#[derive(Clone)]
pub struct ListenerSink {
    client: Weak<ClientShared>,
    key: ValidKey,
    generation: u64,
    hooks: ListenerHooks,
}

impl ListenerSink {
    pub(crate) fn new(
        client: Weak<ClientShared>,
        key: ValidKey,
        generation: u64,
        hooks: ListenerHooks,
    ) -> Self {
        Self {
            client,
            key,
            generation,
            hooks,
        }
    }

    pub fn key(&self) -> &ValidKey {
        &self.key
    }

    /// Apply one remote event. Events for an evicted lease, or after the
    /// client is gone, are ignored.
    pub fn deliver(&self, event: DocumentEvent) {
        let Some(client) = EntityClient::upgrade(&self.client) else {
            return;
        };
        match event {
            DocumentEvent::Changed(data) => {
                let data = match &self.hooks.transform {
                    Some(transform) => transform(data),
                    None => data,
                };
                client.apply_listener_entity(&self.key, self.generation, Entity::with_data(data));
            }
            DocumentEvent::Removed => {
                if !client.remove_from_listener(&self.key, self.generation) {
                    return;
                }
                if let Some(on_removed) = &self.hooks.on_removed {
                    on_removed(&self.key);
                }
            }
            DocumentEvent::Failed(error) => {
                tracing::warn!(key = %self.key.hash(), error = %error, "Listener reported error");
                let applied = client.apply_listener_entity(
                    &self.key,
                    self.generation,
                    Entity::with_error(error.clone()),
                );
                if applied {
                    client.record_listener_error();
                    self.hooks.report_error(&self.key, &error);
                }
            }
        }
    }

    pub fn changed(&self, data: Value) {
        self.deliver(DocumentEvent::Changed(data));
    }

    pub fn removed(&self) {
        self.deliver(DocumentEvent::Removed);
    }

    pub fn failed(&self, error: StoreError) {
        self.deliver(DocumentEvent::Failed(error));
    }
}

impl fmt::Debug for ListenerSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSink")
            .field("key", &self.key.hash())
            .field("generation", &self.generation)
            .finish()
    }
}
