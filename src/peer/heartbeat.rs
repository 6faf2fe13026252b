// Heartbeat - Keeps a peer's announcement visible in the directory
//
// One heartbeat immediately, then one per interval. Failures are logged and
// the loop keeps going; the directory hides the peer's files on its own once
// heartbeats stop arriving.

use crate::peer::client::DirectoryClient;
use crate::registry::PeerAddress;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Periodic heartbeat sender
pub struct HeartbeatLoop {
    client: DirectoryClient,
    username: String,
    address: PeerAddress,
    interval: Duration,
}

impl HeartbeatLoop {
    pub fn new(
        client: DirectoryClient,
        username: &str,
        address: PeerAddress,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            username: username.to_string(),
            address,
            interval,
        }
    }

    /// Send heartbeats until the task is aborted
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(username = %self.username, interval = ?self.interval, "heartbeat started");
        loop {
            ticker.tick().await;
            match self.client.heartbeat(&self.username, &self.address).await {
                Ok(true) => debug!(username = %self.username, "heartbeat acknowledged"),
                Ok(false) => warn!(
                    username = %self.username,
                    "directory no longer knows this peer, register again"
                ),
                Err(e) => warn!(username = %self.username, error = %e, "heartbeat failed"),
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
