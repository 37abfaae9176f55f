//! Property-Based Tests for Lease Bookkeeping
//!
//! **Property 1: Canonical filter keys.** Filter objects with the same entries
//! in any insertion order address one cache entry, one lease and one listener.
//!
//! **Property 2: Idempotent claims.** Claiming the same (key, leasee) pair
//! any number of times leaves exactly one entry for that leasee.
//!
//! **Property 3: No premature eviction.** A lease with at least one leasee
//! survives every sweep, however much time has passed.
//!
//! **Property 4: Eventual eviction.** An unclaimed entity is evicted once it
//! has been abandoned for strictly longer than its retention, and not before.
//!
//! **Property 7: Disown-all.** After a leasee disowns everything, it appears
//! in no lease, and every lease it left empty sits in the abandoned set.

use flashdeck_core::paths;
use flashdeck_fbase::{Entity, LeaseOptions, LeaseeClient, WatchOptions};
use flashdeck_test_utils::fixtures::{client_with_mock, valid, TEST_CACHE_TIME};
use flashdeck_test_utils::generators::{
    arb_filter_entries, arb_leasee, arb_leasees, arb_ready_key, filter_from,
};
use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeSet;
use std::time::Duration;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_filter_order_shares_one_entry(entries in arb_filter_entries()) {
        let (client, store, _) = client_with_mock();
        let reversed: Vec<_> = entries.iter().rev().cloned().collect();
        let first = paths::deck_search(filter_from(&entries));
        let second = paths::deck_search(filter_from(&reversed));
        let (first_valid, second_valid) = (valid(&first), valid(&second));
        prop_assert_eq!(first_valid.hash(), second_valid.hash());

        LeaseeClient::new("search-a", client.clone()).watch_entity(&first, WatchOptions::new());
        LeaseeClient::new("search-b", client.clone()).watch_entity(&second, WatchOptions::new());

        prop_assert_eq!(store.total_subscribe_count(), 1);
        prop_assert_eq!(client.lease_count(), 1);
        prop_assert_eq!(client.lease_snapshot(&valid(&first)).unwrap().leasees.len(), 2);
    }

    #[test]
    fn prop_claim_is_idempotent(
        key in arb_ready_key(),
        leasee in arb_leasee(),
        repeats in 1usize..20,
    ) {
        let (client, _, _) = client_with_mock();
        let key = valid(&key);
        for _ in 0..repeats {
            client.claim_lease(&key, &leasee, None);
        }
        let lease = client.lease_snapshot(&key).unwrap();
        prop_assert_eq!(lease.leasees.len(), 1);
        prop_assert!(lease.leasees.contains(&leasee));
        prop_assert_eq!(client.leases_held_by(&leasee), 1);
        prop_assert!(!lease.abandoned);
    }

    #[test]
    fn prop_claimed_entity_is_never_swept(
        key in arb_ready_key(),
        leasees in arb_leasees(4),
        released in 0usize..4,
        elapsed_secs in 0u64..(86_400 * 365),
    ) {
        let (client, _, clock) = client_with_mock();
        let key = valid(&key);
        for leasee in &leasees {
            client.add_entity(&key, Entity::with_data(json!({"v": 1})), leasee, None);
        }
        // Release all but at least one leasee.
        let released = released.min(leasees.len() - 1);
        for leasee in &leasees[..released] {
            client.release_lease(&key, leasee);
        }

        clock.advance(Duration::from_secs(elapsed_secs));
        let report = client.sweep();

        prop_assert_eq!(report.evicted, 0);
        prop_assert!(client.lookup_valid(&key).is_success());
    }

    #[test]
    fn prop_unclaimed_entity_evicted_strictly_after_retention(
        key in arb_ready_key(),
        elapsed_ms in 0u64..120_000,
    ) {
        let (client, _, clock) = client_with_mock();
        let key = valid(&key);
        client.add_entity(&key, Entity::with_data(json!(1)), "view", None);
        client.release_lease(&key, "view");

        clock.advance(Duration::from_millis(elapsed_ms));
        let report = client.sweep();

        let expired = Duration::from_millis(elapsed_ms) > TEST_CACHE_TIME;
        prop_assert_eq!(report.evicted, usize::from(expired));
        prop_assert_eq!(client.lookup_valid(&key).is_pending(), expired);
        prop_assert_eq!(client.lease_snapshot(&key).is_none(), expired);
    }

    #[test]
    fn prop_lease_override_controls_retention(
        key in arb_ready_key(),
        override_secs in 1u64..600,
        elapsed_secs in 0u64..1200,
    ) {
        let (client, _, clock) = client_with_mock();
        let key = valid(&key);
        let options = LeaseOptions::cache_time(Duration::from_secs(override_secs));
        client.add_entity(&key, Entity::with_data(json!(1)), "view", Some(options));
        client.release_lease(&key, "view");

        clock.advance(Duration::from_secs(elapsed_secs));
        let report = client.sweep();
        prop_assert_eq!(report.evicted == 1, elapsed_secs > override_secs);
    }

    #[test]
    fn prop_disown_all_leaves_no_trace(
        leasees in arb_leasees(4),
        claims in prop::collection::vec((0usize..4, 0usize..6), 1..24),
    ) {
        let (client, _, _) = client_with_mock();
        let keys: Vec<_> = (0..6)
            .map(|i| valid(&paths::deck(Some(format!("d{i}")))))
            .collect();
        for (who, which) in &claims {
            let leasee = &leasees[who % leasees.len()];
            client.claim_lease(&keys[*which], leasee, None);
        }

        let target = &leasees[0];
        client.disown_all_leases(target);

        prop_assert_eq!(client.leases_held_by(target), 0);
        let mut touched = BTreeSet::new();
        for key in &keys {
            if let Some(lease) = client.lease_snapshot(key) {
                touched.insert(key.hash().clone());
                prop_assert!(!lease.leasees.contains(target));
                prop_assert_eq!(lease.leasees.is_empty(), lease.abandoned);
            }
        }
        prop_assert_eq!(client.lease_count(), touched.len());
    }
}
