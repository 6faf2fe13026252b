// SledRegistry - Persistent registry using sled
//
// Two trees:
// - peers: username -> Peer
// - files: username -> Vec<SharedFile> (the whole current announcement)
//
// Keeping one files row per username turns "replace the announcement" into a
// single write, and multi-tree transactions cover the peer/file pairs.

use crate::registry::{FileEntry, Peer, PeerAddress, RegistryError, RegistryStore, SharedFile};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{abort, ConflictableTransactionError, TransactionError, Transactional};
use std::path::Path;
use tracing::{debug, warn};

/// Tree names
mod trees {
    pub const PEERS: &str = "peers";
    pub const FILES: &str = "files";
}

impl From<TransactionError<RegistryError>> for RegistryError {
    fn from(err: TransactionError<RegistryError>) -> Self {
        match err {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => e.into(),
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, RegistryError> {
    postcard::to_allocvec(value).map_err(|e| RegistryError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, RegistryError> {
    postcard::from_bytes(bytes).map_err(|e| RegistryError::Deserialization(e.to_string()))
}

/// Decode inside a transaction, aborting on failure
fn decode_tx<T: DeserializeOwned>(
    bytes: &[u8],
) -> Result<T, ConflictableTransactionError<RegistryError>> {
    decode(bytes).map_err(ConflictableTransactionError::Abort)
}

/// Persistent registry
///
/// Uses sled for crash-safe, embedded storage.
/// All writes are atomic and durable after flush.
pub struct SledRegistry {
    db: sled::Db,
    peers: sled::Tree,
    files: sled::Tree,
}

impl SledRegistry {
    /// Open or create a registry at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RegistryError> {
        let db = sled::open(path).map_err(|e| RegistryError::OpenFailed(e.to_string()))?;
        Self::from_db(db)
    }

    /// Open a registry that is deleted when dropped
    pub fn temporary() -> Result<Self, RegistryError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| RegistryError::OpenFailed(e.to_string()))?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, RegistryError> {
        let peers = db.open_tree(trees::PEERS)?;
        let files = db.open_tree(trees::FILES)?;
        Ok(Self { db, peers, files })
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), RegistryError> {
        self.db.flush()?;
        Ok(())
    }

    /// Number of registered peers
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn load_peer(&self, username: &str) -> Result<Option<Peer>, RegistryError> {
        match self.peers.get(username.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl RegistryStore for SledRegistry {
    fn register_peer(
        &self,
        username: &str,
        password: &str,
        address: &PeerAddress,
        at: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        let bytes = encode(&Peer::new(username, password, address.clone(), at))?;
        self.peers.transaction(|peers| {
            if peers.get(username.as_bytes())?.is_some() {
                return abort(RegistryError::Conflict);
            }
            peers.insert(username.as_bytes(), bytes.as_slice())?;
            Ok(())
        })?;
        Ok(())
    }

    fn verify_and_touch(
        &self,
        username: &str,
        password: &str,
        address: &PeerAddress,
        at: DateTime<Utc>,
    ) -> Result<String, RegistryError> {
        let username = self.peers.transaction(|peers| {
            let Some(bytes) = peers.get(username.as_bytes())? else {
                return abort(RegistryError::InvalidCredentials);
            };
            let mut peer: Peer = decode_tx(&bytes)?;
            if peer.password != password {
                return abort(RegistryError::InvalidCredentials);
            }
            peer.address = address.clone();
            peer.last_seen = at;
            let updated = encode(&peer).map_err(ConflictableTransactionError::Abort)?;
            peers.insert(username.as_bytes(), updated)?;
            Ok(peer.username)
        })?;
        Ok(username)
    }

    fn touch_heartbeat(
        &self,
        username: &str,
        address: &PeerAddress,
        at: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        self.peers.transaction(|peers| {
            let Some(bytes) = peers.get(username.as_bytes())? else {
                return abort(RegistryError::NotFound);
            };
            let mut peer: Peer = decode_tx(&bytes)?;
            peer.address = address.clone();
            peer.last_heartbeat = at;
            let updated = encode(&peer).map_err(ConflictableTransactionError::Abort)?;
            peers.insert(username.as_bytes(), updated)?;
            Ok(())
        })?;
        Ok(())
    }

    fn replace_files(
        &self,
        username: &str,
        filenames: &[String],
        address: &PeerAddress,
        at: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        let rows = SharedFile::announcement(username, filenames, address, at);
        let bytes = encode(&rows)?;
        (&self.peers, &self.files).transaction(|(peers, files)| {
            if peers.get(username.as_bytes())?.is_none() {
                return abort(RegistryError::UnknownPeer);
            }
            if rows.is_empty() {
                files.remove(username.as_bytes())?;
            } else {
                files.insert(username.as_bytes(), bytes.as_slice())?;
            }
            Ok(())
        })?;
        Ok(())
    }

    fn remove_files(&self, username: &str) -> Result<(), RegistryError> {
        self.files.remove(username.as_bytes())?;
        Ok(())
    }

    fn evict_stale_peers(&self, threshold: DateTime<Utc>) -> Result<Vec<String>, RegistryError> {
        let mut candidates = Vec::new();
        for result in self.peers.iter() {
            let (key, bytes) = result?;
            // One corrupt row must not stall liveness for everyone else
            let peer: Peer = match decode(&bytes) {
                Ok(peer) => peer,
                Err(e) => {
                    warn!(key = %String::from_utf8_lossy(&key), error = %e, "skipping undecodable peer row");
                    continue;
                }
            };
            if !peer.is_live(threshold) {
                candidates.push(peer.username);
            }
        }

        let mut evicted = Vec::new();
        for username in candidates {
            // A heartbeat that committed after the scan keeps the peer
            let removed = (&self.peers, &self.files).transaction(|(peers, files)| {
                let Some(bytes) = peers.get(username.as_bytes())? else {
                    return Ok(false);
                };
                let peer: Peer = decode_tx(&bytes)?;
                if peer.is_live(threshold) {
                    return Ok(false);
                }
                peers.remove(username.as_bytes())?;
                files.remove(username.as_bytes())?;
                Ok(true)
            })?;
            if removed {
                debug!(username = %username, "evicted stale peer");
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
        let mut entries = Vec::new();
        for result in self.files.iter() {
            let (key, bytes) = result?;
            let owner = String::from_utf8_lossy(&key);
            let live = self
                .load_peer(&owner)?
                .is_some_and(|peer| peer.is_live(liveness_threshold));
            if !live {
                continue;
            }
            let rows: Vec<SharedFile> = decode(&bytes)?;
            entries.extend(
                rows.into_iter()
                    .filter(|file| file.matches(filename_substr, username_substr))
                    .map(FileEntry::from),
            );
        }
        Ok(entries)
    }

    fn peer(&self, username: &str) -> Result<Option<Peer>, RegistryError> {
        self.load_peer(username)
    }
}
