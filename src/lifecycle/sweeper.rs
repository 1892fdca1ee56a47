//! Periodic purge of expired store records.
//!
//! # Responsibilities
//! - Call `ExpiringStore::sweep` every interval
//! - Log and count what was removed
//! - Stop on the shutdown broadcast

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::store::ExpiringStore;

pub struct Sweeper<S: ExpiringStore + ?Sized> {
    store: Arc<S>,
    interval: Duration,
}

impl<S: ExpiringStore + ?Sized> Sweeper<S> {
    pub fn new(store: Arc<S>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// One pass over the store.
    pub async fn sweep_once(&self) -> usize {
        let removed = self.store.sweep(Utc::now()).await;
        if removed > 0 {
            metrics::record_swept(self.store.name(), removed);
            tracing::debug!(store = self.store.name(), removed, "Swept expired records");
        }
        removed
    }

    /// Sweep every interval until shutdown. The first pass runs one interval in.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            store = self.store.name(),
            interval_secs = self.interval.as_secs(),
            "Sweeper starting"
        );

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!(store = self.store.name(), "Sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    pub fn spawn(self, shutdown: &Shutdown) -> JoinHandle<()> {
        let rx = shutdown.subscribe();
        tokio::spawn(self.run(rx))
    }
}
