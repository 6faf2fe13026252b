// Registry Store Tests
// Every scenario runs against both the in-memory and the sled store

use chrono::{DateTime, Duration, TimeZone, Utc};
use peershare::registry::{MemoryRegistry, PeerAddress, RegistryError, RegistryStore, SledRegistry};
use std::sync::Arc;
use tempfile::TempDir;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn addr(port: u16) -> PeerAddress {
    PeerAddress::new("10.0.0.1", port)
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Both backends; the TempDir keeps the sled directory alive
fn backends() -> Vec<(&'static str, Arc<dyn RegistryStore>, Option<TempDir>)> {
    let temp_dir = TempDir::new().unwrap();
    let memory: Arc<dyn RegistryStore> = Arc::new(MemoryRegistry::new());
    let sled: Arc<dyn RegistryStore> = Arc::new(SledRegistry::open(temp_dir.path()).unwrap());
    vec![("memory", memory, None), ("sled", sled, Some(temp_dir))]
}

fn sorted_filenames(store: &dyn RegistryStore, threshold: DateTime<Utc>) -> Vec<String> {
    let mut files: Vec<String> = store
        .query_files(None, None, threshold)
        .unwrap()
        .into_iter()
        .map(|e| e.filename)
        .collect();
    files.sort();
    files
}

// ============================================================================
// REGISTRATION AND LOGIN
// ============================================================================

#[test]
fn test_register_twice_conflicts() {
    for (name, store, _dir) in backends() {
        store.register_peer("alice", "pw", &addr(5000), t0()).unwrap();
        let second = store.register_peer("alice", "other", &addr(5001), t0());
        assert_eq!(second, Err(RegistryError::Conflict), "{name}");

        // original row untouched
        let peer = store.peer("alice").unwrap().unwrap();
        assert_eq!(peer.password, "pw", "{name}");
        assert_eq!(peer.address, addr(5000), "{name}");
    }
}

#[test]
fn test_register_sets_both_timestamps() {
    for (name, store, _dir) in backends() {
        store.register_peer("alice", "pw", &addr(5000), t0()).unwrap();
        let peer = store.peer("alice").unwrap().unwrap();
        assert_eq!(peer.last_seen, t0(), "{name}");
        assert_eq!(peer.last_heartbeat, t0(), "{name}");
    }
}

#[test]
fn test_login_updates_address_and_last_seen() {
    for (name, store, _dir) in backends() {
        store.register_peer("alice", "pw", &addr(5000), t0()).unwrap();
        let later = t0() + Duration::seconds(10);
        let user = store
            .verify_and_touch("alice", "pw", &PeerAddress::new("10.0.0.9", 7000), later)
            .unwrap();
        assert_eq!(user, "alice", "{name}");

        let peer = store.peer("alice").unwrap().unwrap();
        assert_eq!(peer.address, PeerAddress::new("10.0.0.9", 7000), "{name}");
        assert_eq!(peer.last_seen, later, "{name}");
        assert_eq!(peer.last_heartbeat, t0(), "{name}");
    }
}

#[test]
fn test_login_rejects_wrong_password_and_unknown_user() {
    for (name, store, _dir) in backends() {
        store.register_peer("alice", "pw", &addr(5000), t0()).unwrap();
        assert_eq!(
            store.verify_and_touch("alice", "nope", &addr(5000), t0()),
            Err(RegistryError::InvalidCredentials),
            "{name}"
        );
        assert_eq!(
            store.verify_and_touch("bob", "pw", &addr(5000), t0()),
            Err(RegistryError::InvalidCredentials),
            "{name}"
        );
    }
}

// ============================================================================
// HEARTBEAT
// ============================================================================

#[test]
fn test_heartbeat_updates_row() {
    for (name, store, _dir) in backends() {
        store.register_peer("alice", "pw", &addr(5000), t0()).unwrap();
        let later = t0() + Duration::seconds(30);
        store.touch_heartbeat("alice", &addr(5005), later).unwrap();

        let peer = store.peer("alice").unwrap().unwrap();
        assert_eq!(peer.last_heartbeat, later, "{name}");
        assert_eq!(peer.address, addr(5005), "{name}");
    }
}

#[test]
fn test_heartbeat_for_unknown_peer_is_not_found() {
    for (name, store, _dir) in backends() {
        assert_eq!(
            store.touch_heartbeat("ghost", &addr(5000), t0()),
            Err(RegistryError::NotFound),
            "{name}"
        );
        assert!(store.peer("ghost").unwrap().is_none(), "{name}");
    }
}

// ============================================================================
// ANNOUNCEMENTS
// ============================================================================

#[test]
fn test_replace_files_replaces_whole_set() {
    for (name, store, _dir) in backends() {
        store.register_peer("alice", "pw", &addr(5000), t0()).unwrap();
        store
            .replace_files("alice", &names(&["a.txt", "b.txt"]), &addr(5000), t0())
            .unwrap();
        store
            .replace_files("alice", &names(&["c.txt"]), &addr(5000), t0())
            .unwrap();

        assert_eq!(sorted_filenames(store.as_ref(), t0()), vec!["c.txt"], "{name}");
    }
}

#[test]
fn test_empty_announcement_clears_files() {
    for (name, store, _dir) in backends() {
        store.register_peer("alice", "pw", &addr(5000), t0()).unwrap();
        store
            .replace_files("alice", &names(&["a.txt"]), &addr(5000), t0())
            .unwrap();
        store.replace_files("alice", &[], &addr(5000), t0()).unwrap();

        assert!(sorted_filenames(store.as_ref(), t0()).is_empty(), "{name}");
    }
}

#[test]
fn test_announcement_for_unknown_peer_rejected() {
    for (name, store, _dir) in backends() {
        assert_eq!(
            store.replace_files("ghost", &names(&["a.txt"]), &addr(5000), t0()),
            Err(RegistryError::UnknownPeer),
            "{name}"
        );
        assert!(sorted_filenames(store.as_ref(), t0()).is_empty(), "{name}");
    }
}

#[test]
fn test_entries_carry_announced_address() {
    for (name, store, _dir) in backends() {
        store.register_peer("alice", "pw", &addr(5000), t0()).unwrap();
        store
            .replace_files("alice", &names(&["a.txt"]), &PeerAddress::new("192.0.2.4", 6100), t0())
            .unwrap();

        let files = store.query_files(None, None, t0()).unwrap();
        assert_eq!(files.len(), 1, "{name}");
        assert_eq!(files[0].username, "alice", "{name}");
        assert_eq!(files[0].host, "192.0.2.4", "{name}");
        assert_eq!(files[0].port, 6100, "{name}");
        assert_eq!(files[0].shared_time, t0(), "{name}");
    }
}

#[test]
fn test_remove_files_keeps_peer() {
    for (name, store, _dir) in backends() {
        store.register_peer("alice", "pw", &addr(5000), t0()).unwrap();
        store
            .replace_files("alice", &names(&["a.txt"]), &addr(5000), t0())
            .unwrap();
        store.remove_files("alice").unwrap();

        assert!(sorted_filenames(store.as_ref(), t0()).is_empty(), "{name}");
        assert!(store.peer("alice").unwrap().is_some(), "{name}");
        assert!(store.verify_and_touch("alice", "pw", &addr(5000), t0()).is_ok(), "{name}");
    }
}

#[test]
fn test_remove_files_for_unknown_user_is_noop() {
    for (name, store, _dir) in backends() {
        assert!(store.remove_files("ghost").is_ok(), "{name}");
    }
}

// ============================================================================
// QUERIES
// ============================================================================

#[test]
fn test_query_filters_are_case_insensitive_substrings() {
    for (name, store, _dir) in backends() {
        store.register_peer("Alice", "pw", &addr(5000), t0()).unwrap();
        store.register_peer("bob", "pw", &addr(5001), t0()).unwrap();
        store
            .replace_files("Alice", &names(&["Report.PDF", "notes.txt"]), &addr(5000), t0())
            .unwrap();
        store
            .replace_files("bob", &names(&["report-draft.doc"]), &addr(5001), t0())
            .unwrap();

        let by_name = store.query_files(Some("report"), None, t0()).unwrap();
        assert_eq!(by_name.len(), 2, "{name}");

        let by_both = store.query_files(Some("REPORT"), Some("ali"), t0()).unwrap();
        assert_eq!(by_both.len(), 1, "{name}");
        assert_eq!(by_both[0].filename, "Report.PDF", "{name}");

        let empty_filters = store.query_files(Some(""), Some(""), t0()).unwrap();
        assert_eq!(empty_filters.len(), 3, "{name}");
    }
}

#[test]
fn test_query_hides_files_of_silent_peers() {
    for (name, store, _dir) in backends() {
        store.register_peer("alice", "pw", &addr(5000), t0()).unwrap();
        store.register_peer("bob", "pw", &addr(5001), t0()).unwrap();
        store
            .replace_files("alice", &names(&["a.txt"]), &addr(5000), t0())
            .unwrap();
        store
            .replace_files("bob", &names(&["b.txt"]), &addr(5001), t0())
            .unwrap();
        store
            .touch_heartbeat("bob", &addr(5001), t0() + Duration::seconds(50))
            .unwrap();

        // 106s after alice's last heartbeat, 56s after bob's
        let threshold = t0() + Duration::seconds(106) - Duration::seconds(60);
        assert_eq!(sorted_filenames(store.as_ref(), threshold), vec!["b.txt"], "{name}");

        // exactly at the threshold still counts as live
        assert_eq!(
            sorted_filenames(store.as_ref(), t0()),
            vec!["a.txt", "b.txt"],
            "{name}"
        );
    }
}

// ============================================================================
// EVICTION
// ============================================================================

#[test]
fn test_eviction_removes_peer_and_files() {
    for (name, store, _dir) in backends() {
        store.register_peer("alice", "pw", &addr(5000), t0()).unwrap();
        store.register_peer("bob", "pw", &addr(5001), t0()).unwrap();
        store
            .replace_files("alice", &names(&["a.txt"]), &addr(5000), t0())
            .unwrap();
        store
            .replace_files("bob", &names(&["b.txt"]), &addr(5001), t0())
            .unwrap();
        store
            .touch_heartbeat("bob", &addr(5001), t0() + Duration::seconds(50))
            .unwrap();

        let evicted = store.evict_stale_peers(t0() + Duration::seconds(1)).unwrap();
        assert_eq!(evicted, vec!["alice".to_string()], "{name}");
        assert!(store.peer("alice").unwrap().is_none(), "{name}");
        assert!(store.peer("bob").unwrap().is_some(), "{name}");

        // even with a permissive threshold alice's files are gone
        let files = store
            .query_files(None, None, t0() - Duration::days(1))
            .unwrap();
        assert_eq!(files.len(), 1, "{name}");
        assert_eq!(files[0].filename, "b.txt", "{name}");
    }
}

#[test]
fn test_eviction_boundary_is_inclusive() {
    for (name, store, _dir) in backends() {
        store.register_peer("alice", "pw", &addr(5000), t0()).unwrap();
        let evicted = store.evict_stale_peers(t0()).unwrap();
        assert!(evicted.is_empty(), "{name}");
        assert!(store.peer("alice").unwrap().is_some(), "{name}");
    }
}

#[test]
fn test_evicted_peer_can_register_again() {
    for (name, store, _dir) in backends() {
        store.register_peer("alice", "pw", &addr(5000), t0()).unwrap();
        store.evict_stale_peers(t0() + Duration::seconds(61)).unwrap();

        assert_eq!(
            store.touch_heartbeat("alice", &addr(5000), t0() + Duration::seconds(62)),
            Err(RegistryError::NotFound),
            "{name}"
        );
        assert!(store
            .register_peer("alice", "new", &addr(5000), t0() + Duration::seconds(63))
            .is_ok());
    }
}

#[test]
fn test_concurrent_announcements_never_interleave() {
    for (name, store, _dir) in backends() {
        store.register_peer("alice", "pw", &addr(5000), t0()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let files = vec![format!("set{i}-a"), format!("set{i}-b")];
                    store.replace_files("alice", &files, &addr(5000), t0()).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let files = sorted_filenames(store.as_ref(), t0());
        assert_eq!(files.len(), 2, "{name}");
        let prefix = files[0].split('-').next().unwrap().to_string();
        assert!(files.iter().all(|f| f.starts_with(&prefix)), "{name}");
    }
}

#[test]
fn test_heartbeat_racing_sweep_is_all_or_nothing() {
    for (name, store, _dir) in backends() {
        let sweep_at = t0() + Duration::seconds(120);
        let users: Vec<String> = (0..50).map(|i| format!("peer{i}")).collect();
        for user in &users {
            store.register_peer(user, "pw", &addr(5000), t0()).unwrap();
        }

        let barrier = Arc::new(std::sync::Barrier::new(2));
        let heartbeats = {
            let store = store.clone();
            let barrier = barrier.clone();
            let users = users.clone();
            std::thread::spawn(move || {
                barrier.wait();
                users
                    .iter()
                    .map(|user| store.touch_heartbeat(user, &addr(5000), sweep_at).is_ok())
                    .collect::<Vec<bool>>()
            })
        };
        let sweeper = {
            let store = store.clone();
            std::thread::spawn(move || {
                barrier.wait();
                for _ in 0..20 {
                    store.evict_stale_peers(sweep_at).unwrap();
                }
            })
        };
        let accepted = heartbeats.join().unwrap();
        sweeper.join().unwrap();
        // anything the racing sweeps missed goes now
        store.evict_stale_peers(sweep_at).unwrap();

        for (user, accepted) in users.iter().zip(accepted) {
            let peer = store.peer(user).unwrap();
            assert_eq!(accepted, peer.is_some(), "{name}: {user}");
            if let Some(peer) = peer {
                assert_eq!(peer.last_heartbeat, sweep_at, "{name}: {user}");
            }
        }
    }
}

// ============================================================================
// SLED PERSISTENCE
// ============================================================================

#[test]
fn test_sled_registry_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    {
        let store = SledRegistry::open(temp_dir.path()).unwrap();
        store.register_peer("alice", "pw", &addr(5000), t0()).unwrap();
        store
            .replace_files("alice", &names(&["a.txt"]), &addr(5000), t0())
            .unwrap();
        store.flush().unwrap();
    }

    let store = SledRegistry::open(temp_dir.path()).unwrap();
    assert_eq!(store.peer_count(), 1);
    assert_eq!(sorted_filenames(&store, t0()), vec!["a.txt"]);
}
