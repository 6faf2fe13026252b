// Liveness Monitor - Evicts peers that stopped sending heartbeats
//
// Runs on its own schedule next to the request handlers and shares nothing
// with them except the registry store.

use crate::directory::clock::Clock;
use crate::directory::service::DirectoryService;
use crate::registry::{RegistryError, RegistryStore};
use chrono::Duration;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Default sweep period
pub const SWEEP_INTERVAL_SECS: u64 = 30;

/// Counters for completed sweeps
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub sweeps: u64,
    pub failed_sweeps: u64,
    pub peers_evicted: u64,
}

/// Periodic stale-peer sweep
pub struct LivenessMonitor {
    store: Arc<dyn RegistryStore>,
    clock: Arc<dyn Clock>,
    window: Duration,
    interval: std::time::Duration,
    stats: MonitorStats,
}

impl LivenessMonitor {
    pub fn new(
        store: Arc<dyn RegistryStore>,
        clock: Arc<dyn Clock>,
        window: Duration,
        interval: std::time::Duration,
    ) -> Self {
        Self {
            store,
            clock,
            window,
            interval,
            stats: MonitorStats::default(),
        }
    }

    /// Monitor sharing the service's store, clock and window
    pub fn for_service(service: &DirectoryService, interval: std::time::Duration) -> Self {
        Self::new(
            service.store().clone(),
            service.clock().clone(),
            service.liveness_window(),
            interval,
        )
    }

    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    /// Run one sweep: evict every peer whose heartbeat is older than the window
    pub fn sweep_once(&mut self) -> Result<Vec<String>, RegistryError> {
        let threshold = self.clock.now() - self.window;
        match self.store.evict_stale_peers(threshold) {
            Ok(evicted) => {
                self.stats.sweeps += 1;
                self.stats.peers_evicted += evicted.len() as u64;
                Ok(evicted)
            }
            Err(e) => {
                self.stats.failed_sweeps += 1;
                Err(e)
            }
        }
    }

    /// Sweep forever; failures are logged and the schedule continues
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval = ?self.interval, window_secs = self.window.num_seconds(), "liveness monitor started");
        loop {
            ticker.tick().await;
            match self.sweep_once() {
                Ok(evicted) if evicted.is_empty() => debug!("sweep found no stale peers"),
                Ok(evicted) => {
                    for username in &evicted {
                        info!(username = %username, "removed inactive peer and its files");
                    }
                }
                Err(e) => error!(error = %e, "liveness sweep failed"),
            }
        }
    }

    /// Start the sweep loop as a background task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
