//! Session-scoped holder of the entity client.
//!
//! The application creates one `FbaseSession` at startup and hands it (or
//! the client it holds) to whatever needs the cache. The client is set once;
//! using the session before that is a programming error reported as
//! [`FbaseError::NotInitialized`].

use crate::cache::EntityTuple;
use crate::client::EntityClient;
use crate::lease::LeaseOptions;
use crate::leasee::LeaseeClient;
use crate::listener::WatchOptions;
use flashdeck_core::constants::SESSION_LEASEE;
use flashdeck_core::{paths, FbaseError, FbaseResult};
use once_cell::sync::OnceCell;

#[derive(Debug, Default)]
pub struct FbaseSession {
    client: OnceCell<EntityClient>,
}

impl FbaseSession {
    pub const fn new() -> Self {
        Self {
            client: OnceCell::new(),
        }
    }

    pub fn init(&self, client: EntityClient) -> FbaseResult<()> {
        self.client
            .set(client)
            .map_err(|_| FbaseError::AlreadyInitialized)?;
        tracing::info!("Entity client session initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.client.get().is_some()
    }

    pub fn client(&self) -> FbaseResult<&EntityClient> {
        self.client.get().ok_or(FbaseError::NotInitialized)
    }

    pub fn leasee(&self, name: impl Into<String>) -> FbaseResult<LeaseeClient> {
        Ok(LeaseeClient::new(name, self.client()?.clone()))
    }

    /// Watch the signed-in user's profile. The claim is held by the session
    /// and never expires; [`FbaseSession::sign_out`] drops it.
    pub fn watch_current_user(&self, uid: &str) -> FbaseResult<EntityTuple> {
        let leasee = self.leasee(SESSION_LEASEE)?;
        Ok(leasee.watch_entity(
            &paths::user(Some(uid)),
            WatchOptions::new().with_lease(LeaseOptions::forever()),
        ))
    }

    /// Drop every cached entity and listener. Returns how many were evicted.
    pub fn sign_out(&self) -> FbaseResult<usize> {
        Ok(self.client()?.clear())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDocumentStore;
    use flashdeck_core::ClientConfig;
    use std::sync::Arc;

    fn client() -> EntityClient {
        EntityClient::new(Arc::new(MockDocumentStore::new()), ClientConfig::default()).unwrap()
    }

    #[test]
    fn test_uninitialized_session_errors() {
        let session = FbaseSession::new();
        assert_eq!(session.client().unwrap_err(), FbaseError::NotInitialized);
        assert_eq!(session.watch_current_user("u1").unwrap_err(), FbaseError::NotInitialized);
        assert_eq!(session.sign_out().unwrap_err(), FbaseError::NotInitialized);
    }

    #[test]
    fn test_init_only_once() {
        let session = FbaseSession::new();
        session.init(client()).unwrap();
        assert_eq!(session.init(client()).unwrap_err(), FbaseError::AlreadyInitialized);
        assert!(session.is_initialized());
    }

    #[test]
    fn test_current_user_lease_is_forever() {
        let session = FbaseSession::new();
        session.init(client()).unwrap();
        session.watch_current_user("u1").unwrap();

        let key = paths::user(Some("u1")).validate().unwrap();
        let lease = session.client().unwrap().lease_snapshot(&key).unwrap();
        assert_eq!(lease.options, LeaseOptions::forever());
        assert!(lease.leasees.contains(SESSION_LEASEE));

        assert_eq!(session.sign_out().unwrap(), 1);
        assert!(session.client().unwrap().lease_snapshot(&key).is_none());
    }
}
