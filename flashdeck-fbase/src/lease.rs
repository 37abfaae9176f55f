//! Lease bookkeeping for one cached key.
//!
//! A lease records which leasees currently claim an entity and when the last
//! one let go. A lease with at least one leasee is never eligible for
//! eviction; an empty one becomes eligible once its retention has elapsed.
//! Leases are only mutated through the entity client.

use crate::store::Subscription;
use flashdeck_core::{HashedKey, Retention, Timestamp};
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

/// Per-lease override of cache retention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeaseOptions {
    pub cache_time: Option<Retention>,
}

impl LeaseOptions {
    /// Keep the entity until it is explicitly removed.
    pub fn forever() -> Self {
        Self {
            cache_time: Some(Retention::Forever),
        }
    }

    pub fn cache_time(cache_time: Duration) -> Self {
        Self {
            cache_time: Some(Retention::After(cache_time)),
        }
    }
}

/// State of the single remote listener attached to a lease.
#[derive(Debug, Default)]
pub(crate) enum ListenerSlot {
    #[default]
    Idle,
    /// A subscribe call is in flight.
    Starting,
    Active(Subscription),
}

impl ListenerSlot {
    pub(crate) fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub(crate) fn take(&mut self) -> Option<Subscription> {
        match std::mem::take(self) {
            Self::Active(subscription) => Some(subscription),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Lease {
    key: HashedKey,
    /// Distinguishes this lease from an earlier one for the same key.
    generation: u64,
    leasees: HashSet<String>,
    abandon_time: Option<Timestamp>,
    options: LeaseOptions,
    pub(crate) listener: ListenerSlot,
}

impl Lease {
    pub(crate) fn new(key: HashedKey, generation: u64) -> Self {
        Self {
            key,
            generation,
            leasees: HashSet::new(),
            abandon_time: None,
            options: LeaseOptions::default(),
            listener: ListenerSlot::Idle,
        }
    }

    pub(crate) fn key(&self) -> &HashedKey {
        &self.key
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn leasees(&self) -> impl Iterator<Item = &String> {
        self.leasees.iter()
    }

    pub(crate) fn is_unclaimed(&self) -> bool {
        self.leasees.is_empty()
    }

    /// Idempotent. Returns whether the leasee was newly added.
    pub(crate) fn add_leasee(&mut self, name: &str) -> bool {
        self.abandon_time = None;
        self.leasees.insert(name.to_string())
    }

    /// Idempotent. Returns true only when this call removed the last leasee,
    /// in which case the abandonment time is recorded.
    pub(crate) fn remove_leasee(&mut self, name: &str, now: Timestamp) -> bool {
        if !self.leasees.remove(name) {
            return false;
        }
        if self.leasees.is_empty() {
            self.abandon_time = Some(now);
            return true;
        }
        false
    }

    /// Last writer wins; options are replaced, not merged.
    pub(crate) fn set_options(&mut self, options: LeaseOptions) {
        self.options = options;
    }

    pub(crate) fn effective_retention(&self, default: Retention) -> Retention {
        self.options.cache_time.unwrap_or(default)
    }

    /// Unclaimed, abandoned, and strictly past its retention window.
    pub(crate) fn is_expired(&self, now: Timestamp, default: Retention) -> bool {
        if !self.is_unclaimed() {
            return false;
        }
        let Some(abandoned_at) = self.abandon_time else {
            return false;
        };
        match self.effective_retention(default) {
            Retention::Forever => false,
            Retention::After(cache_time) => chrono::Duration::from_std(cache_time)
                .ok()
                .and_then(|window| abandoned_at.checked_add_signed(window))
                .is_some_and(|deadline| now > deadline),
        }
    }

    pub(crate) fn snapshot(&self, abandoned: bool) -> LeaseSnapshot {
        LeaseSnapshot {
            leasees: self.leasees.iter().cloned().collect(),
            abandon_time: self.abandon_time,
            options: self.options,
            abandoned,
            listening: !self.listener.is_idle(),
        }
    }
}

/// Read-only view of a lease for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseSnapshot {
    pub leasees: BTreeSet<String>,
    pub abandon_time: Option<Timestamp>,
    pub options: LeaseOptions,
    /// Whether the lease sits in the client's abandoned set.
    pub abandoned: bool,
    /// Whether a remote listener is starting or live.
    pub listening: bool,
}
