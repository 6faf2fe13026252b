// Directory Messages - JSON bodies of the directory protocol
//
// Request fields are all optional at the serde level so that a missing field
// surfaces as a validation error from the service, not as a decode failure.
// Field names follow the deployed wire format (`password`, `ip`, `peer_ip`);
// the descriptive names are accepted as aliases.

use crate::registry::FileEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// REQUESTS
// ============================================================================

/// Body of `/register` and `/login`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialsRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, alias = "credential", skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, alias = "host", skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl CredentialsRequest {
    pub fn new(username: &str, password: &str, ip: &str, port: u16) -> Self {
        Self {
            username: Some(username.to_string()),
            password: Some(password.to_string()),
            ip: Some(ip.to_string()),
            port: Some(port),
        }
    }
}

pub type RegisterRequest = CredentialsRequest;
pub type LoginRequest = CredentialsRequest;

/// Body of `/heartbeat`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, alias = "host", skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl HeartbeatRequest {
    pub fn new(username: &str, ip: &str, port: u16) -> Self {
        Self {
            username: Some(username.to_string()),
            ip: Some(ip.to_string()),
            port: Some(port),
        }
    }
}

/// Body of `/disconnect`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl DisconnectRequest {
    pub fn new(username: &str) -> Self {
        Self {
            username: Some(username.to_string()),
        }
    }
}

/// Body of `/share_files`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareFilesRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// The full set of filenames currently shared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<Vec<String>>,
    #[serde(default, alias = "peer_host", skip_serializing_if = "Option::is_none")]
    pub peer_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_port: Option<u16>,
}

impl ShareFilesRequest {
    pub fn new(username: &str, filenames: Vec<String>, peer_ip: &str, peer_port: u16) -> Self {
        Self {
            username: Some(username.to_string()),
            filename: Some(filenames),
            peer_ip: Some(peer_ip.to_string()),
            peer_port: Some(peer_port),
        }
    }
}

/// Query string of `/files` and `/search_files`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl FileQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_filename(mut self, filename: &str) -> Self {
        self.filename = Some(filename.to_string());
        self
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.username = Some(username.to_string());
        self
    }
}

// ============================================================================
// RESPONSES
// ============================================================================

/// Plain acknowledgement, also used for every error body
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Successful login
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub message: String,
    pub username: String,
}

/// Heartbeat acknowledgement; `known` is false when the peer row is gone
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub message: String,
    pub known: bool,
}

/// One row of a listing: `[filename, username, host, port, shared_time]`
pub type FileRow = (String, String, String, u16, DateTime<Utc>);

/// Listing of live files
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesResponse {
    pub files: Vec<FileRow>,
}

impl FilesResponse {
    pub fn from_entries(entries: Vec<FileEntry>) -> Self {
        Self {
            files: entries
                .into_iter()
                .map(|e| (e.filename, e.username, e.host, e.port, e.shared_time))
                .collect(),
        }
    }

    pub fn into_entries(self) -> Vec<FileEntry> {
        self.files
            .into_iter()
            .map(|(filename, username, host, port, shared_time)| FileEntry {
                filename,
                username,
                host,
                port,
                shared_time,
            })
            .collect()
    }
}
