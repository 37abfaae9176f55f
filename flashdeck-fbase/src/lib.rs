//! Flashdeck Fbase - Lease-Based Entity Cache
//!
//! Client-side cache for documents of the hosted document store. Consumers
//! claim entities through a [`LeaseeClient`]; the first claim on a key starts
//! a single remote listener, later claims share it. Entities whose last
//! leasee let go are kept for a retention window and then evicted by the
//! periodic sweep, which also tears the listener down.
//!
//! The remote store is a collaborator behind [`DocumentStore`];
//! [`MockDocumentStore`] is an in-memory implementation for tests.

pub mod cache;
pub mod client;
pub mod lease;
pub mod leasee;
pub mod listener;
pub mod metrics;
pub mod mock;
pub mod session;
pub mod store;
pub mod sweep;

pub use cache::{Entity, EntityCache, EntityStatus, EntityTuple};
pub use client::{EntityClient, SweepReport};
pub use lease::{LeaseOptions, LeaseSnapshot};
pub use leasee::{LeaseeClient, Mutation, MutationOp, ScopedLeasee};
pub use listener::{ErrorHook, ListenerSink, RemovedHook, Transform, WatchOptions};
pub use metrics::{FbaseMetrics, FbaseMetricsSnapshot};
pub use mock::MockDocumentStore;
pub use session::FbaseSession;
pub use store::{DocumentEvent, DocumentStore, Subscription, WriteOp};
pub use sweep::{sweeper_task, SweeperHandle};
