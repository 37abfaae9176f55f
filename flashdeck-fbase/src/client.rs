//! The entity client: cache owner, lease table, and eviction.
//!
//! One client exists per application session. It owns
//!
//! - the current [`EntityCache`] snapshot,
//! - the lease table (hashed key → [`Lease`]),
//! - the abandoned set (leases with no leasees, enumerated by the sweep),
//! - the leasee index (leasee → hashed keys it claims).
//!
//! All of it sits behind one mutex. Every public mutation is one critical
//! section and produces at most one new cache revision, which is published on
//! a `watch` channel. Store calls and user hooks always run with the lock
//! released.
//!
//! Per key the lifecycle is `absent → pending → success | error → absent`.
//! An entity leaves the cache only through [`EntityClient::remove_entity`]
//! (directly, from a remote removal, or from the sweep), which is also the
//! only place its remote listener is torn down.

use crate::cache::{CacheUpdate, Entity, EntityCache, EntityTuple};
use crate::lease::{Lease, LeaseOptions, LeaseSnapshot, ListenerSlot};
use crate::listener::{ListenerSink, WatchOptions};
use crate::metrics::{FbaseMetrics, FbaseMetricsSnapshot};
use crate::store::{DocumentStore, Subscription};
use flashdeck_core::{
    ClientConfig, Clock, EntityKey, FbaseResult, HashedKey, SystemClock, Timestamp, ValidKey,
};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Abandoned leases whose retention elapsed; evicted.
    pub evicted: usize,
    /// Abandoned leases still inside their retention window.
    pub retained: usize,
    /// Leases found in the abandoned set that have a leasee again.
    pub reclaimed: usize,
}

#[derive(Default)]
struct ClientState {
    cache: EntityCache,
    leases: HashMap<HashedKey, Lease>,
    abandoned: HashSet<HashedKey>,
    leasee_index: HashMap<String, HashSet<HashedKey>>,
    next_generation: u64,
}

impl ClientState {
    fn claim(&mut self, key: &HashedKey, leasee: &str, options: Option<LeaseOptions>) -> &mut Lease {
        let next_generation = &mut self.next_generation;
        let lease = self.leases.entry(key.clone()).or_insert_with(|| {
            *next_generation += 1;
            Lease::new(key.clone(), *next_generation)
        });
        lease.add_leasee(leasee);
        if let Some(options) = options {
            lease.set_options(options);
        }
        self.abandoned.remove(key);
        self.leasee_index
            .entry(leasee.to_string())
            .or_default()
            .insert(key.clone());
        lease
    }

    fn release(&mut self, key: &HashedKey, leasee: &str, now: Timestamp) {
        if let Some(lease) = self.leases.get_mut(key) {
            if lease.remove_leasee(leasee, now) {
                self.abandoned.insert(key.clone());
            }
        }
        self.unindex(leasee, key);
    }

    fn disown_all(&mut self, leasee: &str, now: Timestamp) -> usize {
        let Some(held) = self.leasee_index.remove(leasee) else {
            return 0;
        };
        let released = held.len();
        for key in held {
            if let Some(lease) = self.leases.get_mut(&key) {
                if lease.remove_leasee(leasee, now) {
                    self.abandoned.insert(key);
                }
            }
        }
        released
    }

    /// Drop the lease for `key` and every index entry pointing at it.
    /// Returns the live subscription, if any, for the caller to cancel.
    fn evict(&mut self, key: &HashedKey) -> Option<Subscription> {
        self.abandoned.remove(key);
        let mut lease = self.leases.remove(key)?;
        tracing::trace!(key = %lease.key(), generation = lease.generation(), "Evicting lease");
        let leasees: Vec<String> = lease.leasees().cloned().collect();
        for leasee in &leasees {
            self.unindex(leasee, key);
        }
        lease.listener.take()
    }

    fn unindex(&mut self, leasee: &str, key: &HashedKey) {
        if let Some(held) = self.leasee_index.get_mut(leasee) {
            held.remove(key);
            if held.is_empty() {
                self.leasee_index.remove(leasee);
            }
        }
    }

    fn is_current_listener(&self, key: &HashedKey, generation: u64) -> bool {
        self.leases
            .get(key)
            .is_some_and(|lease| lease.generation() == generation && !lease.listener.is_idle())
    }
}

pub(crate) struct ClientShared {
    state: Mutex<ClientState>,
    revisions: watch::Sender<EntityCache>,
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    config: ClientConfig,
    metrics: FbaseMetrics,
}

/// Session-scoped owner of the entity cache. Cheap to clone.
#[derive(Clone)]
pub struct EntityClient {
    shared: Arc<ClientShared>,
}

impl EntityClient {
    pub fn new(store: Arc<dyn DocumentStore>, config: ClientConfig) -> FbaseResult<Self> {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Fails with a config error if `config` does not validate.
    pub fn with_clock(
        store: Arc<dyn DocumentStore>,
        config: ClientConfig,
        clock: Arc<dyn Clock>,
    ) -> FbaseResult<Self> {
        config.validate()?;
        let (revisions, _) = watch::channel(EntityCache::default());
        Ok(Self {
            shared: Arc::new(ClientShared {
                state: Mutex::new(ClientState::default()),
                revisions,
                store,
                clock,
                config,
                metrics: FbaseMetrics::new(),
            }),
        })
    }

    pub(crate) fn upgrade(shared: &Weak<ClientShared>) -> Option<Self> {
        shared.upgrade().map(|shared| Self { shared })
    }

    pub(crate) fn downgrade(&self) -> Weak<ClientShared> {
        Arc::downgrade(&self.shared)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.shared.store
    }

    pub fn metrics(&self) -> FbaseMetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    pub(crate) fn record_listener_error(&self) {
        FbaseMetrics::incr(&self.shared.metrics.listener_errors, 1);
    }

    fn state(&self) -> MutexGuard<'_, ClientState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> Timestamp {
        self.shared.clock.now()
    }

    /// Install the next cache revision. Must be called with the state locked.
    fn publish(&self, state: &mut ClientState, update: CacheUpdate) {
        if update.is_empty() {
            return;
        }
        state.cache = state.cache.apply(update);
        self.shared.revisions.send_replace(state.cache.clone());
    }

    fn cancel_all(&self, subscriptions: Vec<Subscription>) {
        if subscriptions.is_empty() {
            return;
        }
        FbaseMetrics::incr(
            &self.shared.metrics.subscriptions_cancelled,
            subscriptions.len() as u64,
        );
        for subscription in subscriptions {
            subscription.cancel();
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Pure read. Keys that are not ready read as idle.
    pub fn lookup(&self, key: &EntityKey) -> EntityTuple {
        match key.validate() {
            Some(valid) => self.lookup_valid(&valid),
            None => EntityTuple::idle(),
        }
    }

    pub fn lookup_valid(&self, key: &ValidKey) -> EntityTuple {
        self.state().cache.tuple(key.hash())
    }

    /// The current cache revision.
    pub fn snapshot(&self) -> EntityCache {
        self.state().cache.clone()
    }

    /// Observe cache revisions. The receiver always holds the latest one.
    pub fn subscribe(&self) -> watch::Receiver<EntityCache> {
        self.shared.revisions.subscribe()
    }

    pub fn lease_snapshot(&self, key: &ValidKey) -> Option<LeaseSnapshot> {
        let state = self.state();
        let abandoned = state.abandoned.contains(key.hash());
        state
            .leases
            .get(key.hash())
            .map(|lease| lease.snapshot(abandoned))
    }

    /// Number of keys `leasee` currently claims.
    pub fn leases_held_by(&self, leasee: &str) -> usize {
        self.state()
            .leasee_index
            .get(leasee)
            .map_or(0, HashSet::len)
    }

    pub fn lease_count(&self) -> usize {
        self.state().leases.len()
    }

    pub fn abandoned_count(&self) -> usize {
        self.state().abandoned.len()
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Create the lease if needed and register `leasee` on it. Supplied
    /// options replace the lease's current options.
    pub fn claim_lease(&self, key: &ValidKey, leasee: &str, options: Option<LeaseOptions>) {
        let mut state = self.state();
        state.claim(key.hash(), leasee, options);
    }

    /// Insert or replace the cache entry and claim its lease, as one revision.
    pub fn add_entity(
        &self,
        key: &ValidKey,
        entity: Entity,
        leasee: &str,
        options: Option<LeaseOptions>,
    ) {
        let mut state = self.state();
        state.claim(key.hash(), leasee, options);
        let mut update = CacheUpdate::default();
        update.insert(key.hash().clone(), entity);
        self.publish(&mut state, update);
    }

    /// Remove the entry, its lease and its index entries, and tear down its
    /// remote listener. Safe to call on a key that is already gone.
    pub fn remove_entity(&self, key: &ValidKey) -> bool {
        self.remove_hashed(key.hash())
    }

    fn remove_hashed(&self, key: &HashedKey) -> bool {
        self.remove_if_generation(key, None)
    }

    /// Evict `key`, but only if its lease still has `generation` and a
    /// listener, when one is given. Check and eviction share one critical
    /// section.
    fn remove_if_generation(&self, key: &HashedKey, generation: Option<u64>) -> bool {
        let (removed, subscription) = {
            let mut state = self.state();
            if let Some(generation) = generation {
                if !state.is_current_listener(key, generation) {
                    return false;
                }
            }
            let had_lease = state.leases.contains_key(key);
            let subscription = state.evict(key);
            let mut update = CacheUpdate::default();
            let had_entry = state.cache.contains(key);
            if had_entry {
                update.remove(key.clone());
            }
            self.publish(&mut state, update);
            (had_lease || had_entry, subscription)
        };
        if let Some(subscription) = subscription {
            tracing::debug!(key = %key, "Tearing down remote listener");
            self.cancel_all(vec![subscription]);
        }
        removed
    }

    /// Drop one leasee's claim on one key. Never evicts; the sweep does that.
    pub fn release_lease(&self, key: &ValidKey, leasee: &str) {
        let now = self.now();
        self.state().release(key.hash(), leasee, now);
    }

    /// Drop every claim `leasee` holds. Returns how many claims were released.
    pub fn disown_all_leases(&self, leasee: &str) -> usize {
        let now = self.now();
        let released = self.state().disown_all(leasee, now);
        if released > 0 {
            tracing::trace!(leasee, released, "Disowned leases");
        }
        released
    }

    /// Evict everything and tear down every listener in one revision.
    pub fn clear(&self) -> usize {
        let (evicted, subscriptions) = {
            let mut state = self.state();
            let mut keys: HashSet<HashedKey> = state.leases.keys().cloned().collect();
            keys.extend(state.cache.keys().cloned());

            let mut update = CacheUpdate::default();
            let mut subscriptions = Vec::new();
            for key in &keys {
                subscriptions.extend(state.evict(key));
                if state.cache.contains(key) {
                    update.remove(key.clone());
                }
            }
            state.leasee_index.clear();
            self.publish(&mut state, update);
            (keys.len(), subscriptions)
        };
        self.cancel_all(subscriptions);
        tracing::info!(evicted, "Entity cache cleared");
        evicted
    }

    /// One sweep pass over the abandoned set.
    ///
    /// Every lease is re-checked for leasees at sweep time; one that was
    /// reclaimed is dropped from the abandoned set, never evicted. All
    /// evictions of a pass land in a single cache revision.
    pub fn sweep(&self) -> SweepReport {
        let now = self.now();
        let default = self.shared.config.default_retention();

        let (report, subscriptions) = {
            let mut guard = self.state();
            let state = &mut *guard;
            let mut report = SweepReport::default();
            let mut update = CacheUpdate::default();
            let mut subscriptions = Vec::new();

            let candidates: Vec<HashedKey> = state.abandoned.iter().cloned().collect();
            for key in candidates {
                let (unclaimed, expired) = match state.leases.get(&key) {
                    Some(lease) => (lease.is_unclaimed(), lease.is_expired(now, default)),
                    None => {
                        state.abandoned.remove(&key);
                        continue;
                    }
                };
                if !unclaimed {
                    state.abandoned.remove(&key);
                    report.reclaimed += 1;
                    continue;
                }
                if !expired {
                    report.retained += 1;
                    continue;
                }
                subscriptions.extend(state.evict(&key));
                if state.cache.contains(&key) {
                    update.remove(key);
                }
                report.evicted += 1;
            }
            self.publish(state, update);
            (report, subscriptions)
        };

        FbaseMetrics::incr(&self.shared.metrics.sweep_cycles, 1);
        FbaseMetrics::incr(&self.shared.metrics.evictions, report.evicted as u64);
        self.cancel_all(subscriptions);

        if report.evicted > 0 {
            tracing::info!(
                evicted = report.evicted,
                retained = report.retained,
                reclaimed = report.reclaimed,
                "Entity cache sweep completed"
            );
        } else {
            tracing::trace!(retained = report.retained, "Entity cache sweep evicted nothing");
        }
        report
    }

    // ------------------------------------------------------------------------
    // Listener bridge
    // ------------------------------------------------------------------------

    /// Claim `key` for `leasee` and make sure one remote listener exists.
    ///
    /// The claim and the decision to start a listener happen in one critical
    /// section, so concurrent claimants of the same key start exactly one.
    pub(crate) fn watch(&self, key: &ValidKey, leasee: &str, options: &WatchOptions) -> EntityTuple {
        let start = {
            let mut state = self.state();
            let lease = state.claim(key.hash(), leasee, options.lease);
            if lease.listener.is_idle() {
                lease.listener = ListenerSlot::Starting;
                Some(lease.generation())
            } else {
                None
            }
        };
        if let Some(generation) = start {
            self.start_listener(key, generation, options);
        }
        self.lookup_valid(key)
    }

    fn start_listener(&self, key: &ValidKey, generation: u64, options: &WatchOptions) {
        let hooks = options.hooks();
        let sink = ListenerSink::new(self.downgrade(), key.clone(), generation, hooks.clone());
        FbaseMetrics::incr(&self.shared.metrics.subscriptions_started, 1);
        tracing::debug!(key = %key.hash(), generation, "Starting remote listener");

        match self.shared.store.subscribe(key, sink) {
            Ok(subscription) => {
                let stale = {
                    let mut state = self.state();
                    match state.leases.get_mut(key.hash()) {
                        Some(lease)
                            if lease.generation() == generation
                                && matches!(lease.listener, ListenerSlot::Starting) =>
                        {
                            lease.listener = ListenerSlot::Active(subscription);
                            None
                        }
                        _ => Some(subscription),
                    }
                };
                if let Some(subscription) = stale {
                    tracing::debug!(
                        key = %key.hash(),
                        generation,
                        "Lease evicted while subscribing, cancelling listener"
                    );
                    self.cancel_all(vec![subscription]);
                }
            }
            Err(error) => {
                tracing::warn!(key = %key.hash(), error = %error, "Failed to start remote listener");
                let applied = {
                    let mut state = self.state();
                    let current = match state.leases.get_mut(key.hash()) {
                        Some(lease) if lease.generation() == generation => {
                            lease.listener = ListenerSlot::Idle;
                            true
                        }
                        _ => false,
                    };
                    if current {
                        let mut update = CacheUpdate::default();
                        update.insert(key.hash().clone(), Entity::with_error(error.clone()));
                        self.publish(&mut state, update);
                    }
                    current
                };
                if applied {
                    self.record_listener_error();
                    hooks.report_error(key, &error);
                }
            }
        }
    }

    /// Store an entity delivered by the listener of `generation`. Returns
    /// false if that listener is stale.
    pub(crate) fn apply_listener_entity(&self, key: &ValidKey, generation: u64, entity: Entity) -> bool {
        let mut state = self.state();
        if !state.is_current_listener(key.hash(), generation) {
            tracing::trace!(key = %key.hash(), generation, "Dropping event from stale listener");
            return false;
        }
        let mut update = CacheUpdate::default();
        update.insert(key.hash().clone(), entity);
        self.publish(&mut state, update);
        FbaseMetrics::incr(&self.shared.metrics.listener_events, 1);
        true
    }

    /// Evict on a remote removal. Returns false, and changes nothing, when the
    /// listener of `generation` is stale.
    pub(crate) fn remove_from_listener(&self, key: &ValidKey, generation: u64) -> bool {
        let removed = self.remove_if_generation(key.hash(), Some(generation));
        if removed {
            FbaseMetrics::incr(&self.shared.metrics.listener_events, 1);
        } else {
            tracing::trace!(key = %key.hash(), generation, "Dropping removal from stale listener");
        }
        removed
    }

    /// Current entity for `key`, if cached.
    pub(crate) fn entity(&self, key: &ValidKey) -> Option<Entity> {
        self.state().cache.entity(key.hash()).cloned()
    }

    /// Drop the cache entry for `key` while keeping its lease and listener.
    pub(crate) fn drop_entry(&self, key: &ValidKey) {
        let mut state = self.state();
        if state.cache.contains(key.hash()) {
            let mut update = CacheUpdate::default();
            update.remove(key.hash().clone());
            self.publish(&mut state, update);
        }
    }

    /// Undo optimistic writes, newest first, as one revision. Each item is
    /// `(key, what was written, what was there before)`; an entry that no
    /// longer holds what was written has moved on and is left alone.
    pub(crate) fn restore_entries(&self, undo: Vec<(HashedKey, Option<Entity>, Option<Entity>)>) {
        let mut state = self.state();
        let mut staged: HashMap<HashedKey, Option<Entity>> = HashMap::new();
        let mut update = CacheUpdate::default();
        for (key, written, previous) in undo.into_iter().rev() {
            let current = match staged.get(&key) {
                Some(staged) => staged.clone(),
                None => state.cache.entity(&key).cloned(),
            };
            if current != written {
                continue;
            }
            match &previous {
                Some(entity) => update.insert(key.clone(), entity.clone()),
                None => update.remove(key.clone()),
            }
            staged.insert(key, previous);
        }
        self.publish(&mut state, update);
    }

    /// Fill a still-unsettled entry with a one-shot fetch result. A value
    /// that arrived meanwhile, or an eviction, wins over the fetch.
    pub(crate) fn settle_fetched(&self, key: &ValidKey, entity: Entity) -> EntityTuple {
        let mut state = self.state();
        let unsettled = state
            .cache
            .entity(key.hash())
            .map_or(true, |existing| !existing.is_settled());
        if unsettled && state.leases.contains_key(key.hash()) {
            let mut update = CacheUpdate::default();
            update.insert(key.hash().clone(), entity);
            self.publish(&mut state, update);
        }
        state.cache.tuple(key.hash())
    }
}

impl fmt::Debug for EntityClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityClient")
            .field("config", &self.shared.config)
            .field("clock", &self.shared.clock)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDocumentStore;
    use flashdeck_core::{FbaseError, ManualClock, StoreError};
    use serde_json::json;
    use std::time::Duration;

    fn client() -> (EntityClient, MockDocumentStore, Arc<ManualClock>) {
        let store = MockDocumentStore::new();
        let clock = Arc::new(ManualClock::starting_now());
        let config = ClientConfig::new().with_cache_time(Duration::from_secs(300));
        let client =
            EntityClient::with_clock(Arc::new(store.clone()), config, clock.clone()).unwrap();
        (client, store, clock)
    }

    fn key(path: &[&str]) -> ValidKey {
        EntityKey::from_segments(path.iter().map(|s| (*s).into()).collect())
            .validate()
            .unwrap()
    }

    #[test]
    fn test_lookup_idle_for_unready_key() {
        let (client, _, _) = client();
        let unready = EntityKey::from(["decks"]).with(None::<String>);
        assert!(client.lookup(&unready).is_idle());
        assert!(client.lookup(&EntityKey::from(["decks", "d1"])).is_pending());
    }

    #[test]
    fn test_constructor_rejects_invalid_config() {
        let store: Arc<dyn DocumentStore> = Arc::new(MockDocumentStore::new());
        let zero = ClientConfig::new().with_cache_time(Duration::ZERO);
        assert!(matches!(
            EntityClient::new(store.clone(), zero),
            Err(FbaseError::Config(_))
        ));
        let zero_sweep = ClientConfig::new().with_sweep_interval(Duration::ZERO);
        assert!(EntityClient::new(store.clone(), zero_sweep).is_err());
        let huge = ClientConfig::new().with_cache_time(Duration::MAX);
        assert!(EntityClient::new(store, huge).is_err());
    }

    #[test]
    fn test_stale_listener_removal_leaves_new_lease() {
        let (client, store, _) = client();
        let key = key(&["decks", "d1"]);
        client.watch(&key, "a", &WatchOptions::new());
        client.remove_entity(&key);
        client.watch(&key, "b", &WatchOptions::new());
        store.emit_changed(key.key(), json!({"name": "Foo"}));

        // The first listener's generation is gone.
        assert!(!client.remove_from_listener(&key, 1));
        assert!(client.lookup_valid(&key).is_success());
        assert_eq!(client.leases_held_by("b"), 1);
        assert_eq!(store.active_listeners(key.key()), 1);

        assert!(client.remove_from_listener(&key, 2));
        assert!(client.lease_snapshot(&key).is_none());
        assert_eq!(store.active_listeners(key.key()), 0);
    }

    #[test]
    fn test_claim_is_idempotent() {
        let (client, _, _) = client();
        let k = key(&["decks", "d1"]);
        for _ in 0..5 {
            client.claim_lease(&k, "a", None);
        }
        let lease = client.lease_snapshot(&k).unwrap();
        assert_eq!(lease.leasees.len(), 1);
        assert_eq!(client.leases_held_by("a"), 1);
    }

    #[test]
    fn test_claim_options_last_writer_wins() {
        let (client, _, _) = client();
        let k = key(&["users", "u1"]);
        client.claim_lease(&k, "a", Some(LeaseOptions::forever()));
        client.claim_lease(&k, "b", None);
        assert_eq!(client.lease_snapshot(&k).unwrap().options, LeaseOptions::forever());
        client.claim_lease(&k, "b", Some(LeaseOptions::cache_time(Duration::from_secs(1))));
        assert_eq!(
            client.lease_snapshot(&k).unwrap().options,
            LeaseOptions::cache_time(Duration::from_secs(1))
        );
    }

    #[test]
    fn test_add_entity_is_one_revision() {
        let (client, _, _) = client();
        let k = key(&["decks", "d1"]);
        let before = client.snapshot().revision();
        client.add_entity(&k, Entity::with_data(json!({"name": "Bar"})), "a", None);
        assert_eq!(client.snapshot().revision(), before + 1);
        assert!(client.lookup_valid(&k).is_success());
        assert_eq!(client.leases_held_by("a"), 1);
    }

    #[test]
    fn test_remove_entity_is_idempotent() {
        let (client, _, _) = client();
        let k = key(&["decks", "d1"]);
        client.add_entity(&k, Entity::with_data(json!(1)), "a", None);
        assert!(client.remove_entity(&k));
        let revision = client.snapshot().revision();
        assert!(!client.remove_entity(&k));
        assert_eq!(client.snapshot().revision(), revision);
        assert!(client.lookup_valid(&k).is_pending());
        assert_eq!(client.leases_held_by("a"), 0);
        assert!(client.lease_snapshot(&k).is_none());
    }

    #[test]
    fn test_release_marks_abandoned_without_evicting() {
        let (client, _, _) = client();
        let k = key(&["decks", "d1"]);
        client.add_entity(&k, Entity::with_data(json!(1)), "a", None);
        client.release_lease(&k, "a");
        let lease = client.lease_snapshot(&k).unwrap();
        assert!(lease.abandoned);
        assert!(lease.leasees.is_empty());
        assert!(client.lookup_valid(&k).is_success());
        assert_eq!(client.leases_held_by("a"), 0);
    }

    #[test]
    fn test_release_unknown_is_noop() {
        let (client, _, _) = client();
        let k = key(&["decks", "d1"]);
        client.release_lease(&k, "nobody");
        client.claim_lease(&k, "a", None);
        client.release_lease(&k, "nobody");
        assert!(!client.lease_snapshot(&k).unwrap().abandoned);
        assert_eq!(client.disown_all_leases("nobody"), 0);
    }

    #[test]
    fn test_sweep_reclaimed_lease_is_skipped() {
        let (client, _, clock) = client();
        let k = key(&["decks", "d1"]);
        client.add_entity(&k, Entity::with_data(json!(1)), "a", None);
        client.release_lease(&k, "a");
        client.claim_lease(&k, "b", None);
        clock.advance(Duration::from_secs(3600));

        let report = client.sweep();
        assert_eq!(report.evicted, 0);
        assert!(client.lookup_valid(&k).is_success());
        assert_eq!(client.abandoned_count(), 0);
    }

    #[test]
    fn test_sweep_batches_evictions_into_one_revision() {
        let (client, _, clock) = client();
        for id in ["a", "b", "c"] {
            let k = key(&["decks", id]);
            client.add_entity(&k, Entity::with_data(json!(id)), "x", None);
        }
        client.disown_all_leases("x");
        clock.advance(Duration::from_secs(301));

        let before = client.snapshot().revision();
        let report = client.sweep();
        assert_eq!(report.evicted, 3);
        assert_eq!(client.snapshot().revision(), before + 1);
        assert!(client.snapshot().is_empty());
        assert_eq!(client.metrics().evictions, 3);
    }

    #[test]
    fn test_forever_lease_survives_sweep() {
        let (client, _, clock) = client();
        let k = key(&["users", "u1"]);
        client.add_entity(&k, Entity::with_data(json!({})), "session", Some(LeaseOptions::forever()));
        client.disown_all_leases("session");
        clock.advance(Duration::from_secs(86_400 * 30));
        assert_eq!(client.sweep().evicted, 0);
        assert!(client.lookup_valid(&k).is_success());
    }

    #[test]
    fn test_subscribe_failure_becomes_error_tuple() {
        let (client, store, _) = client();
        let k = key(&["decks", "secret"]);
        store.fail_subscribe(k.key(), StoreError::permission_denied("no access"));

        let tuple = client.watch(&k, "a", &WatchOptions::new());
        assert!(tuple.is_error());
        assert!(tuple.error.unwrap().is_retryable());
        assert!(!client.lease_snapshot(&k).unwrap().listening);

        // A later claimant retries the subscription.
        client.watch(&k, "b", &WatchOptions::new());
        assert_eq!(store.subscribe_count(k.key()), 2);
        assert!(client.lease_snapshot(&k).unwrap().listening);
    }

    #[test]
    fn test_revisions_are_published() {
        let (client, _, _) = client();
        let rx = client.subscribe();
        let k = key(&["decks", "d1"]);
        client.add_entity(&k, Entity::with_data(json!(1)), "a", None);
        let latest = rx.borrow().clone();
        assert_eq!(latest.revision(), 1);
        assert!(latest.contains(k.hash()));
    }

    #[test]
    fn test_clear_tears_down_listeners() {
        let (client, store, _) = client();
        let a = key(&["decks", "a"]);
        let b = key(&["decks", "b"]);
        client.watch(&a, "x", &WatchOptions::new());
        client.watch(&b, "y", &WatchOptions::new());
        store.emit_changed(a.key(), json!(1));

        assert_eq!(client.clear(), 2);
        assert!(client.snapshot().is_empty());
        assert_eq!(client.lease_count(), 0);
        assert_eq!(store.unsubscribe_count(a.key()), 1);
        assert_eq!(store.unsubscribe_count(b.key()), 1);
        assert_eq!(client.leases_held_by("x"), 0);
    }
}
