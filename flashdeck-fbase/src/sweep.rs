//! Periodic eviction of abandoned entities.
//!
//! The sweeper is a background task that calls [`EntityClient::sweep`] on a
//! fixed interval (the configured sweep interval, which defaults to the cache
//! time). Missed ticks are skipped rather than replayed: a sweep is
//! idempotent, so catching up would only repeat work.
//!
//! ```ignore
//! let client = EntityClient::new(store, ClientConfig::from_env()?)?;
//! let sweeper = client.spawn_sweeper();
//! // ...
//! sweeper.stop().await;
//! ```

use crate::client::EntityClient;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Handle to a running sweeper. Dropping it also stops the task.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal shutdown without waiting for the task to exit.
    pub fn cancel(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Signal shutdown and wait for the task to exit.
    pub async fn stop(self) {
        self.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Entity cache sweeper did not exit cleanly");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl EntityClient {
    /// Start the periodic sweep on the current tokio runtime.
    pub fn spawn_sweeper(&self) -> SweeperHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(sweeper_task(self.clone(), shutdown_rx));
        SweeperHandle { shutdown, task }
    }
}

/// Sweep `client` until `shutdown_rx` flips to true or its sender is dropped.
pub async fn sweeper_task(client: EntityClient, mut shutdown_rx: watch::Receiver<bool>) {
    let period = client.config().effective_sweep_interval();
    let Some(start) = Instant::now().checked_add(period).filter(|_| !period.is_zero()) else {
        tracing::warn!(
            interval_ms = period.as_millis() as u64,
            "Entity cache sweeper not started, sweep interval out of range"
        );
        return;
    };
    let mut ticker = interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_ms = period.as_millis() as u64,
        cache_time_ms = client.config().cache_time.as_millis() as u64,
        "Entity cache sweeper started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Entity cache sweeper shutting down");
                    break;
                }
            }
            _ = ticker.tick() => {
                client.sweep();
            }
        }
    }

    let snapshot = client.metrics();
    tracing::info!(
        sweep_cycles = snapshot.sweep_cycles,
        evictions = snapshot.evictions,
        "Entity cache sweeper completed"
    );
}
