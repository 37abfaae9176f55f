//! Named claimants of cached entities.
//!
//! A [`LeaseeClient`] is how a consumer (a view, a background job, the
//! session) reads and writes the cache. Watching, fetching and setting
//! register the consumer as a leasee of the key, so the entity survives
//! exactly as long as someone needs it plus the retention window.
//! [`LeaseeClient::get_entity`] is a plain point-in-time read. Keys that are
//! not ready read as idle and are never claimed.

use crate::cache::{Entity, EntityTuple};
use crate::client::EntityClient;
use crate::lease::LeaseOptions;
use crate::listener::WatchOptions;
use crate::store::WriteOp;
use flashdeck_core::{EntityKey, FbaseError, FbaseResult, StoreError};
use serde::Serialize;
use serde_json::Value;
use std::ops::Deref;
use uuid::Uuid;

/// A write queued for [`LeaseeClient::commit`].
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub key: EntityKey,
    pub op: MutationOp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationOp {
    Set(Value),
    Delete,
}

impl Mutation {
    pub fn set(key: EntityKey, data: Value) -> Self {
        Self {
            key,
            op: MutationOp::Set(data),
        }
    }

    /// Serialize a typed document into a set mutation.
    pub fn set_doc<T: Serialize>(key: EntityKey, doc: &T) -> FbaseResult<Self> {
        Ok(Self::set(key, serde_json::to_value(doc)?))
    }

    pub fn delete(key: EntityKey) -> Self {
        Self {
            key,
            op: MutationOp::Delete,
        }
    }
}

/// Cache access on behalf of one named leasee.
#[derive(Debug, Clone)]
pub struct LeaseeClient {
    name: String,
    client: EntityClient,
}

impl LeaseeClient {
    pub fn new(name: impl Into<String>, client: EntityClient) -> Self {
        Self {
            name: name.into(),
            client,
        }
    }

    /// A leasee with a unique, time-ordered name such as `deck-view-0190…`.
    pub fn anonymous(prefix: &str, client: EntityClient) -> Self {
        Self::new(format!("{prefix}-{}", Uuid::now_v7()), client)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client(&self) -> &EntityClient {
        &self.client
    }

    /// Claim `key` and keep it live-synced with the remote document.
    pub fn watch_entity(&self, key: &EntityKey, options: WatchOptions) -> EntityTuple {
        match key.validate() {
            Some(valid) => self.client.watch(&valid, &self.name, &options),
            None => EntityTuple::idle(),
        }
    }

    /// Read what is cached for `key` without claiming it or listening.
    pub fn get_entity(&self, key: &EntityKey) -> EntityTuple {
        self.client.lookup(key)
    }

    /// Store `entity` locally and claim it. Nothing is written remotely.
    pub fn set_entity(&self, key: &EntityKey, entity: Entity, options: Option<LeaseOptions>) {
        if let Some(valid) = key.validate() {
            self.client.add_entity(&valid, entity, &self.name, options);
        }
    }

    pub fn release_claim(&self, key: &EntityKey) {
        if let Some(valid) = key.validate() {
            self.client.release_lease(&valid, &self.name);
        }
    }

    /// Release every claim this leasee holds.
    pub fn release_all(&self) -> usize {
        self.client.disown_all_leases(&self.name)
    }

    /// Claim `key` and, if nothing is cached yet, read it once from the store.
    /// A missing document settles as a `NotFound` error.
    pub async fn fetch_entity(&self, key: &EntityKey, options: Option<LeaseOptions>) -> EntityTuple {
        let Some(valid) = key.validate() else {
            return EntityTuple::idle();
        };
        self.client.claim_lease(&valid, &self.name, options);
        let cached = self.client.lookup_valid(&valid);
        if !cached.is_pending() {
            return cached;
        }

        let entity = match self.client.store().fetch(&valid).await {
            Ok(Some(data)) => Entity::with_data(data),
            Ok(None) => Entity::with_error(StoreError::not_found(valid.path())),
            Err(error) => {
                tracing::debug!(key = %valid.hash(), error = %error, "Fetch failed");
                Entity::with_error(error)
            }
        };
        self.client.settle_fetched(&valid, entity)
    }

    /// Write all mutations to the store in one transaction.
    ///
    /// The cache is updated optimistically before the store call: sets are
    /// stored and claimed by this leasee, deletes drop the cached value. Once
    /// the store accepts the write, deleted keys are evicted with their leases
    /// and listeners. If it rejects the write, the previous values come back.
    /// Every key must be ready, otherwise nothing is written.
    pub async fn commit(&self, mutations: Vec<Mutation>) -> FbaseResult<()> {
        let mut writes = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            let key = mutation.key.validate().ok_or_else(|| FbaseError::KeyNotReady {
                key: mutation.key.to_string(),
            })?;
            writes.push(match mutation.op {
                MutationOp::Set(data) => WriteOp::Set { key, data },
                MutationOp::Delete => WriteOp::Delete { key },
            });
        }

        let mut undo = Vec::with_capacity(writes.len());
        let mut deleted = Vec::new();
        for write in &writes {
            let key = write.key();
            let previous = self.client.entity(key);
            match write {
                WriteOp::Set { data, .. } => {
                    let entity = Entity::with_data(data.clone());
                    self.client.add_entity(key, entity.clone(), &self.name, None);
                    undo.push((key.hash().clone(), Some(entity), previous));
                }
                WriteOp::Delete { .. } => {
                    self.client.drop_entry(key);
                    undo.push((key.hash().clone(), None, previous));
                    deleted.push(key.clone());
                }
            }
        }

        let count = writes.len();
        match self.client.store().commit(writes).await {
            Ok(()) => {
                for key in &deleted {
                    self.client.remove_entity(key);
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    leasee = %self.name,
                    writes = count,
                    error = %e,
                    "Commit failed, restoring cache"
                );
                self.client.restore_entries(undo);
                Err(FbaseError::from(e))
            }
        }
    }
}

/// A leasee that releases all of its claims when dropped.
#[derive(Debug)]
pub struct ScopedLeasee {
    inner: LeaseeClient,
}

impl ScopedLeasee {
    pub fn new(inner: LeaseeClient) -> Self {
        Self { inner }
    }
}

impl Deref for ScopedLeasee {
    type Target = LeaseeClient;

    fn deref(&self) -> &LeaseeClient {
        &self.inner
    }
}

impl Drop for ScopedLeasee {
    fn drop(&mut self) {
        self.inner.release_all();
    }
}
