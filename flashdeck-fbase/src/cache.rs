//! Immutable cache snapshots and the read-only entity tuple.
//!
//! Every mutation of the cache produces a whole new [`EntityCache`] revision.
//! Entries are `Arc`-shared between revisions, so a revision only copies the
//! map and the entries that actually changed. Readers holding an older
//! snapshot keep seeing it unchanged.

use flashdeck_core::{HashedKey, StoreError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// One cached record: remote data or an error.
///
/// Neither set means the fetch has not settled yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entity {
    pub(crate) data: Option<Arc<Value>>,
    pub(crate) error: Option<StoreError>,
}

impl Entity {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn with_data(data: Value) -> Self {
        Self {
            data: Some(Arc::new(data)),
            error: None,
        }
    }

    pub fn with_error(error: StoreError) -> Self {
        Self {
            data: None,
            error: Some(error),
        }
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.data.is_some() || self.error.is_some()
    }
}

/// Status reported by an [`EntityTuple`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityStatus {
    /// No valid key was supplied.
    Idle,
    /// A valid key was supplied but nothing has arrived yet.
    Pending,
    Success,
    Error,
}

/// Read-only view of one cache entry: status, data, error.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityTuple {
    pub status: EntityStatus,
    pub data: Option<Arc<Value>>,
    pub error: Option<StoreError>,
}

impl EntityTuple {
    pub fn idle() -> Self {
        Self {
            status: EntityStatus::Idle,
            data: None,
            error: None,
        }
    }

    pub fn pending() -> Self {
        Self {
            status: EntityStatus::Pending,
            data: None,
            error: None,
        }
    }

    pub(crate) fn from_entity(entity: &Entity) -> Self {
        let status = if entity.error.is_some() {
            EntityStatus::Error
        } else if entity.data.is_some() {
            EntityStatus::Success
        } else {
            EntityStatus::Pending
        };
        Self {
            status,
            data: entity.data.clone(),
            error: entity.error.clone(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status == EntityStatus::Idle
    }

    pub fn is_pending(&self) -> bool {
        self.status == EntityStatus::Pending
    }

    pub fn is_success(&self) -> bool {
        self.status == EntityStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == EntityStatus::Error
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_deref()
    }

    /// Deserialize the data into a typed document.
    pub fn data_as<T: DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        self.data
            .as_deref()
            .map(|value| T::deserialize(value))
    }

    pub fn into_parts(self) -> (EntityStatus, Option<Arc<Value>>, Option<StoreError>) {
        (self.status, self.data, self.error)
    }
}

/// A batch of entry changes applied as one revision.
#[derive(Debug, Default)]
pub(crate) struct CacheUpdate {
    changes: Vec<(HashedKey, Option<Entity>)>,
}

impl CacheUpdate {
    pub(crate) fn insert(&mut self, key: HashedKey, entity: Entity) {
        self.changes.push((key, Some(entity)));
    }

    pub(crate) fn remove(&mut self, key: HashedKey) {
        self.changes.push((key, None));
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// A complete snapshot of the cache at one revision.
#[derive(Debug, Clone, Default)]
pub struct EntityCache {
    revision: u64,
    entries: Arc<HashMap<HashedKey, Arc<Entity>>>,
}

impl EntityCache {
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &HashedKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &HashedKey> {
        self.entries.keys()
    }

    /// Tuple for a validated key. Absent entries read as pending.
    pub fn tuple(&self, key: &HashedKey) -> EntityTuple {
        self.entries
            .get(key)
            .map(|entity| EntityTuple::from_entity(entity))
            .unwrap_or_else(EntityTuple::pending)
    }

    pub(crate) fn entity(&self, key: &HashedKey) -> Option<&Entity> {
        self.entries.get(key).map(|entity| entity.as_ref())
    }

    /// Produce the next revision. Removing an absent key is a no-op change.
    pub(crate) fn apply(&self, update: CacheUpdate) -> EntityCache {
        let mut entries: HashMap<HashedKey, Arc<Entity>> = (*self.entries).clone();
        for (key, change) in update.changes {
            match change {
                Some(entity) => {
                    entries.insert(key, Arc::new(entity));
                }
                None => {
                    entries.remove(&key);
                }
            }
        }
        EntityCache {
            revision: self.revision + 1,
            entries: Arc::new(entries),
        }
    }
}
