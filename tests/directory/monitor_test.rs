// Liveness Monitor Tests
// Sweeps, counters and a loop that survives store failures

use chrono::{DateTime, Duration, TimeZone, Utc};
use peershare::directory::{Clock, LivenessMonitor, ManualClock, SystemClock};
use peershare::registry::{
    FileEntry, MemoryRegistry, Peer, PeerAddress, RegistryError, RegistryStore,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn addr() -> PeerAddress {
    PeerAddress::new("10.0.0.1", 5000)
}

/// Store whose sweeps always fail, counting attempts
#[derive(Default)]
struct FailingStore {
    sweeps: AtomicUsize,
}

impl RegistryStore for FailingStore {
    fn register_peer(&self, _: &str, _: &str, _: &PeerAddress, _: DateTime<Utc>) -> Result<(), RegistryError> {
        Ok(())
    }

    fn verify_and_touch(
        &self,
        username: &str,
        _: &str,
        _: &PeerAddress,
        _: DateTime<Utc>,
    ) -> Result<String, RegistryError> {
        Ok(username.to_string())
    }

    fn touch_heartbeat(&self, _: &str, _: &PeerAddress, _: DateTime<Utc>) -> Result<(), RegistryError> {
        Ok(())
    }

    fn replace_files(
        &self,
        _: &str,
        _: &[String],
        _: &PeerAddress,
        _: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        Ok(())
    }

    fn remove_files(&self, _: &str) -> Result<(), RegistryError> {
        Ok(())
    }

    fn evict_stale_peers(&self, _: DateTime<Utc>) -> Result<Vec<String>, RegistryError> {
        self.sweeps.fetch_add(1, Ordering::SeqCst);
        Err(RegistryError::Database("disk on fire".to_string()))
    }

    fn query_files(
        &self,
        _: Option<&str>,
        _: Option<&str>,
        _: DateTime<Utc>,
    ) -> Result<Vec<FileEntry>, RegistryError> {
        Ok(Vec::new())
    }

    fn peer(&self, _: &str) -> Result<Option<Peer>, RegistryError> {
        Ok(None)
    }
}

// ============================================================================
// SWEEP ONCE
// ============================================================================

#[test]
fn test_sweep_uses_clock_minus_window() {
    let store: Arc<dyn RegistryStore> = Arc::new(MemoryRegistry::new());
    let clock = Arc::new(ManualClock::new(t0()));
    store.register_peer("alice", "pw", &addr(), t0()).unwrap();
    store
        .replace_files("alice", &["a.txt".to_string()], &addr(), t0())
        .unwrap();

    let mut monitor = LivenessMonitor::new(
        store.clone(),
        clock.clone(),
        Duration::seconds(60),
        std::time::Duration::from_secs(30),
    );

    // heartbeat at T, sweep with threshold T keeps the peer
    clock.advance(Duration::seconds(60));
    assert!(monitor.sweep_once().unwrap().is_empty());
    assert!(store.peer("alice").unwrap().is_some());

    clock.advance(Duration::seconds(1));
    assert_eq!(monitor.sweep_once().unwrap(), vec!["alice".to_string()]);
    assert!(store.peer("alice").unwrap().is_none());
    assert!(store
        .query_files(None, None, t0() - Duration::days(1))
        .unwrap()
        .is_empty());

    let stats = monitor.stats();
    assert_eq!(stats.sweeps, 2);
    assert_eq!(stats.peers_evicted, 1);
    assert_eq!(stats.failed_sweeps, 0);
}

#[test]
fn test_failed_sweep_is_counted() {
    let store = Arc::new(FailingStore::default());
    let mut monitor = LivenessMonitor::new(
        store.clone(),
        Arc::new(SystemClock),
        Duration::seconds(60),
        std::time::Duration::from_secs(30),
    );

    assert!(monitor.sweep_once().is_err());
    assert_eq!(monitor.stats().failed_sweeps, 1);
    assert_eq!(monitor.stats().sweeps, 0);
}

// ============================================================================
// BACKGROUND LOOP
// ============================================================================

#[tokio::test]
async fn test_loop_keeps_running_after_errors() {
    let store = Arc::new(FailingStore::default());
    let monitor = LivenessMonitor::new(
        store.clone(),
        Arc::new(SystemClock),
        Duration::seconds(60),
        std::time::Duration::from_millis(20),
    );

    let handle = monitor.spawn();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    assert!(!handle.is_finished());
    assert!(store.sweeps.load(Ordering::SeqCst) >= 3);
    handle.abort();
}

#[tokio::test]
async fn test_loop_evicts_in_background() {
    let store: Arc<dyn RegistryStore> = Arc::new(MemoryRegistry::new());
    let clock = Arc::new(ManualClock::new(t0()));
    store.register_peer("alice", "pw", &addr(), t0()).unwrap();
    clock.advance(Duration::seconds(120));

    let handle = LivenessMonitor::new(
        store.clone(),
        clock.clone(),
        Duration::seconds(60),
        std::time::Duration::from_millis(10),
    )
    .spawn();

    // first tick fires immediately
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(store.peer("alice").unwrap().is_none());
    assert!(clock.now() > t0());
    handle.abort();
}
