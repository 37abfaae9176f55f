//! Flashdeck Test Utilities
//!
//! Shared test infrastructure for the flashdeck workspace:
//! - Proptest generators for keys, leasee names, and documents
//! - Fixtures wiring an entity client to the mock store and a manual clock
//! - Custom assertions on entity tuples

// Re-export the mock store from its source crate
pub use flashdeck_fbase::MockDocumentStore;

// Re-export core types for convenience
pub use flashdeck_core::{
    paths, Card, ClientConfig, Deck, DeckRole, EntityKey, FbaseError, FbaseResult, KeySegment,
    ManualClock, Retention, StoreError, StoreErrorKind, UserProfile, ValidKey,
};
pub use flashdeck_fbase::{
    Entity, EntityClient, EntityStatus, EntityTuple, LeaseOptions, LeaseeClient, WatchOptions,
};

use std::sync::Arc;
use std::time::Duration;

/// Install a test-writer tracing subscriber, filtered by `RUST_LOG`.
/// Safe to call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for cache keys and leasees.

    use super::*;
    use proptest::prelude::*;
    use serde_json::{Map, Value};

    /// A document id segment.
    pub fn arb_doc_id() -> impl Strategy<Value = String> {
        "[a-z0-9]{1,8}"
    }

    pub fn arb_leasee() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["deck-view", "card-list", "editor", "search", "session"])
            .prop_map(str::to_string)
    }

    /// A small set of distinct leasee names.
    pub fn arb_leasees(max: usize) -> impl Strategy<Value = Vec<String>> {
        prop::collection::btree_set("[a-z]{1,6}", 1..=max)
            .prop_map(|names| names.into_iter().collect())
    }

    /// A ready key `collection/id`.
    pub fn arb_ready_key() -> impl Strategy<Value = EntityKey> {
        (prop::sample::select(vec!["decks", "users", "cards"]), arb_doc_id())
            .prop_map(|(collection, id)| EntityKey::from([collection]).with(id))
    }

    /// Filter object entries with distinct property names.
    pub fn arb_filter_entries() -> impl Strategy<Value = Vec<(String, Value)>> {
        prop::collection::btree_map(
            "[a-z]{1,6}",
            prop_oneof![
                any::<bool>().prop_map(Value::from),
                any::<i32>().prop_map(Value::from),
                "[a-z ]{0,8}".prop_map(Value::from),
            ],
            0..6,
        )
        .prop_map(|entries| entries.into_iter().collect())
    }

    /// Build a filter object inserting `entries` in the given order.
    pub fn filter_from(entries: &[(String, Value)]) -> Value {
        let mut map = Map::new();
        for (name, value) in entries {
            map.insert(name.clone(), value.clone());
        }
        Value::Object(map)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-wired clients and sample documents.

    use super::*;
    use serde_json::{json, Value};

    /// Default cache time used by fixtures (one minute).
    pub const TEST_CACHE_TIME: Duration = Duration::from_secs(60);

    pub fn test_config() -> ClientConfig {
        ClientConfig::new().with_cache_time(TEST_CACHE_TIME)
    }

    /// An entity client on the mock store and a manual clock.
    pub fn client_with_mock() -> (EntityClient, MockDocumentStore, Arc<ManualClock>) {
        client_with_config(test_config())
    }

    pub fn client_with_config(
        config: ClientConfig,
    ) -> (EntityClient, MockDocumentStore, Arc<ManualClock>) {
        let store = MockDocumentStore::new();
        let clock = Arc::new(ManualClock::starting_now());
        let client = match EntityClient::with_clock(Arc::new(store.clone()), config, clock.clone())
        {
            Ok(client) => client,
            Err(e) => panic!("fixture config must validate: {e}"),
        };
        (client, store, clock)
    }

    pub fn valid(key: &EntityKey) -> ValidKey {
        match key.validate() {
            Some(valid) => valid,
            None => panic!("fixture key is not ready: {key}"),
        }
    }

    pub fn sample_deck() -> Deck {
        let mut deck = Deck::new("Spanish verbs", "alice");
        deck.description = Some("Irregular preterite forms".to_string());
        deck.share("bob", DeckRole::Viewer);
        deck
    }

    pub fn sample_deck_doc() -> Value {
        match serde_json::to_value(sample_deck()) {
            Ok(doc) => doc,
            Err(e) => panic!("sample deck must serialize: {e}"),
        }
    }

    pub fn sample_user_doc(name: &str) -> Value {
        json!({ "displayName": name })
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on entity tuples.

    use super::*;

    #[track_caller]
    pub fn assert_status(tuple: &EntityTuple, expected: EntityStatus) {
        assert_eq!(tuple.status, expected, "unexpected tuple: {:?}", tuple);
    }

    /// Assert the tuple carries exactly `expected` as data.
    #[track_caller]
    pub fn assert_data(tuple: &EntityTuple, expected: &serde_json::Value) {
        assert_status(tuple, EntityStatus::Success);
        assert_eq!(tuple.data(), Some(expected));
    }

    #[track_caller]
    pub fn assert_error_kind(tuple: &EntityTuple, kind: StoreErrorKind) {
        assert_status(tuple, EntityStatus::Error);
        match &tuple.error {
            Some(error) => assert_eq!(error.kind, kind, "unexpected error: {error}"),
            None => panic!("error tuple without error: {:?}", tuple),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sample_deck_roundtrips() {
        let doc = fixtures::sample_deck_doc();
        let deck: Deck = serde_json::from_value(doc).unwrap();
        assert_eq!(deck.role_of("bob"), Some(DeckRole::Viewer));
    }

    #[test]
    fn test_client_fixture_shares_store() {
        let (client, store, _) = fixtures::client_with_mock();
        let key = paths::deck(Some("d1"));
        store.insert_document(&key, fixtures::sample_deck_doc());

        let leasee = LeaseeClient::new("view", client);
        let tuple = leasee.watch_entity(&key, WatchOptions::new());
        assertions::assert_data(&tuple, &fixtures::sample_deck_doc());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_ready_keys_validate(key in generators::arb_ready_key()) {
            prop_assert!(key.validate().is_some());
        }
    }
}
