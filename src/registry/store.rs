// Registry Store - The transactional contract
//
// Every operation is atomic and isolated from concurrent operations on the
// same username. Callers pass the wall-clock instant so that time can be
// controlled from the outside.

use crate::registry::{FileEntry, Peer, PeerAddress};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors from registry operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Username already exists")]
    Conflict,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Peer not found")]
    NotFound,

    #[error("Announcement for unregistered peer")]
    UnknownPeer,

    #[error("Failed to open registry: {0}")]
    OpenFailed(String),

    #[error("Database operation failed: {0}")]
    Database(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Deserialization failed: {0}")]
    Deserialization(String),
}

impl RegistryError {
    /// Whether this is a backend failure rather than an expected outcome
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            Self::OpenFailed(_) | Self::Database(_) | Self::Serialization(_) | Self::Deserialization(_)
        )
    }
}

impl From<sled::Error> for RegistryError {
    fn from(err: sled::Error) -> Self {
        RegistryError::Database(err.to_string())
    }
}

/// Storage behind the directory
///
/// The directory service and the liveness monitor both depend on this trait
/// and never on a concrete store.
pub trait RegistryStore: Send + Sync {
    /// Create a peer. Fails with `Conflict` if the username is taken.
    fn register_peer(
        &self,
        username: &str,
        password: &str,
        address: &PeerAddress,
        at: DateTime<Utc>,
    ) -> Result<(), RegistryError>;

    /// Check credentials; on success record the new address and `last_seen`.
    /// Unknown usernames fail the same way as wrong passwords.
    fn verify_and_touch(
        &self,
        username: &str,
        password: &str,
        address: &PeerAddress,
        at: DateTime<Utc>,
    ) -> Result<String, RegistryError>;

    /// Record a heartbeat. `NotFound` means the peer was evicted or never
    /// registered.
    fn touch_heartbeat(
        &self,
        username: &str,
        address: &PeerAddress,
        at: DateTime<Utc>,
    ) -> Result<(), RegistryError>;

    /// Replace the peer's whole announcement in one atomic step
    fn replace_files(
        &self,
        username: &str,
        filenames: &[String],
        address: &PeerAddress,
        at: DateTime<Utc>,
    ) -> Result<(), RegistryError>;

    /// Drop every file announced by the peer; the peer row stays
    fn remove_files(&self, username: &str) -> Result<(), RegistryError>;

    /// Delete peers whose last heartbeat is strictly before `threshold`,
    /// together with their files, one peer per transaction
    fn evict_stale_peers(&self, threshold: DateTime<Utc>) -> Result<Vec<String>, RegistryError>;

    /// Files whose owner heartbeated at or after `liveness_threshold`
    fn query_files(
        &self,
        filename_substr: Option<&str>,
        username_substr: Option<&str>,
        liveness_threshold: DateTime<Utc>,
    ) -> Result<Vec<FileEntry>, RegistryError>;

    /// Look up a peer row
    fn peer(&self, username: &str) -> Result<Option<Peer>, RegistryError>;
}
