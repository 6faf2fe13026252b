// MemoryRegistry - In-process registry
//
// Both collections live behind a single lock held for the full duration of
// each operation, which gives every operation the same all-or-nothing
// visibility the persistent store gets from transactions.

use crate::registry::{FileEntry, Peer, PeerAddress, RegistryError, RegistryStore, SharedFile};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Tables {
    peers: HashMap<String, Peer>,
    files: HashMap<String, Vec<SharedFile>>,
}

/// Registry kept entirely in memory
#[derive(Default)]
pub struct MemoryRegistry {
    tables: RwLock<Tables>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, RegistryError> {
        self.tables
            .read()
            .map_err(|_| RegistryError::Database("registry lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, RegistryError> {
        self.tables
            .write()
            .map_err(|_| RegistryError::Database("registry lock poisoned".to_string()))
    }
}

impl RegistryStore for MemoryRegistry {
    fn register_peer(
        &self,
        username: &str,
        password: &str,
        address: &PeerAddress,
        at: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        let mut tables = self.write()?;
        if tables.peers.contains_key(username) {
            return Err(RegistryError::Conflict);
        }
        tables.peers.insert(
            username.to_string(),
            Peer::new(username, password, address.clone(), at),
        );
        Ok(())
    }

    fn verify_and_touch(
        &self,
        username: &str,
        password: &str,
        address: &PeerAddress,
        at: DateTime<Utc>,
    ) -> Result<String, RegistryError> {
        let mut tables = self.write()?;
        match tables.peers.get_mut(username) {
            Some(peer) if peer.password == password => {
                peer.address = address.clone();
                peer.last_seen = at;
                Ok(peer.username.clone())
            }
            _ => Err(RegistryError::InvalidCredentials),
        }
    }

    fn touch_heartbeat(
        &self,
        username: &str,
        address: &PeerAddress,
        at: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        let mut tables = self.write()?;
        let peer = tables.peers.get_mut(username).ok_or(RegistryError::NotFound)?;
        peer.address = address.clone();
        peer.last_heartbeat = at;
        Ok(())
    }

    fn replace_files(
        &self,
        username: &str,
        filenames: &[String],
        address: &PeerAddress,
        at: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        let mut tables = self.write()?;
        if !tables.peers.contains_key(username) {
            return Err(RegistryError::UnknownPeer);
        }
        let rows = SharedFile::announcement(username, filenames, address, at);
        if rows.is_empty() {
            tables.files.remove(username);
        } else {
            tables.files.insert(username.to_string(), rows);
        }
        Ok(())
    }

    fn remove_files(&self, username: &str) -> Result<(), RegistryError> {
        self.write()?.files.remove(username);
        Ok(())
    }

    fn evict_stale_peers(&self, threshold: DateTime<Utc>) -> Result<Vec<String>, RegistryError> {
        let candidates: Vec<String> = self
            .read()?
            .peers
            .values()
            .filter(|peer| !peer.is_live(threshold))
            .map(|peer| peer.username.clone())
            .collect();

        // Lock per peer so concurrent requests interleave with the sweep
        let mut evicted = Vec::new();
        for username in candidates {
            let mut tables = self.write()?;
            let still_stale = tables
                .peers
                .get(&username)
                .is_some_and(|peer| !peer.is_live(threshold));
            if still_stale {
                tables.peers.remove(&username);
                tables.files.remove(&username);
                evicted.push(username);
            }
        }
        Ok(evicted)
    }

    fn query_files(
        &self,
        filename_substr: Option<&str>,
        username_substr: Option<&str>,
        liveness_threshold: DateTime<Utc>,
    ) -> Result<Vec<FileEntry>, RegistryError> {
        let tables = self.read()?;
        let entries = tables
            .files
            .iter()
            .filter(|(username, _)| {
                tables
                    .peers
                    .get(*username)
                    .is_some_and(|peer| peer.is_live(liveness_threshold))
            })
            .flat_map(|(_, rows)| rows.iter())
            .filter(|file| file.matches(filename_substr, username_substr))
            .cloned()
            .map(FileEntry::from)
            .collect();
        Ok(entries)
    }

    fn peer(&self, username: &str) -> Result<Option<Peer>, RegistryError> {
        Ok(self.read()?.peers.get(username).cloned())
    }
}
