// Registry Model - Records held by the directory
//
// Peer rows are keyed by username. SharedFile rows reference their owner by
// username and carry the address the owner advertised when announcing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// PEER ADDRESS
// ============================================================================

/// Network address a peer's listener can be reached at
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddress {
    pub host: String,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ============================================================================
// PEER
// ============================================================================

/// A registered peer
///
/// The password is stored and compared as plaintext. This mirrors the
/// behaviour of the deployed directory and is not a recommendation; hashing
/// and TLS belong to the integrating system.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub username: String,
    pub password: String,
    pub address: PeerAddress,
    pub last_seen: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

impl Peer {
    /// Create a freshly registered peer; both timestamps start at `at`
    pub fn new(username: &str, password: &str, address: PeerAddress, at: DateTime<Utc>) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            address,
            last_seen: at,
            last_heartbeat: at,
        }
    }

    /// Whether the last heartbeat is at or after `threshold`
    pub fn is_live(&self, threshold: DateTime<Utc>) -> bool {
        self.last_heartbeat >= threshold
    }
}

// ============================================================================
// SHARED FILE
// ============================================================================

/// One file from a peer's most recent announcement
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedFile {
    pub filename: String,
    pub username: String,
    pub address: PeerAddress,
    pub shared_time: DateTime<Utc>,
}

impl SharedFile {
    /// Expand an announcement into rows
    pub fn announcement(
        username: &str,
        filenames: &[String],
        address: &PeerAddress,
        at: DateTime<Utc>,
    ) -> Vec<Self> {
        filenames
            .iter()
            .map(|filename| Self {
                filename: filename.clone(),
                username: username.to_string(),
                address: address.clone(),
                shared_time: at,
            })
            .collect()
    }

    /// Case-insensitive substring match against both optional filters.
    /// An absent or empty filter matches everything.
    pub fn matches(&self, filename_substr: Option<&str>, username_substr: Option<&str>) -> bool {
        contains_ignore_case(&self.filename, filename_substr)
            && contains_ignore_case(&self.username, username_substr)
    }
}

fn contains_ignore_case(haystack: &str, needle: Option<&str>) -> bool {
    match needle {
        None => true,
        Some(n) if n.is_empty() => true,
        Some(n) => haystack.to_lowercase().contains(&n.to_lowercase()),
    }
}

// ============================================================================
// FILE ENTRY
// ============================================================================

/// A query result row: a live file and where to fetch it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub filename: String,
    pub username: String,
    pub host: String,
    pub port: u16,
    pub shared_time: DateTime<Utc>,
}

impl FileEntry {
    pub fn address(&self) -> PeerAddress {
        PeerAddress::new(self.host.clone(), self.port)
    }
}

impl From<SharedFile> for FileEntry {
    fn from(file: SharedFile) -> Self {
        Self {
            filename: file.filename,
            username: file.username,
            host: file.address.host,
            port: file.address.port,
            shared_time: file.shared_time,
        }
    }
}
