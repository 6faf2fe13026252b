// Configuration - Directory, transfer and peer settings
//
// Every config has sensible defaults, builder-style setters and a validate()
// step that runs before anything binds a socket.

use crate::directory::{LIVENESS_WINDOW_SECS, SWEEP_INTERVAL_SECS};
use crate::registry::PeerAddress;
use crate::transfer::{CHUNK_SIZE, MAX_REQUEST_LEN};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// DIRECTORY CONFIG
// ============================================================================

/// Configuration for the directory server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Address to bind the HTTP API to
    pub bind_address: String,
    /// Port to bind the HTTP API to
    pub bind_port: u16,
    /// Sled database directory; `None` keeps the registry in memory
    pub db_path: Option<PathBuf>,
    /// How long a heartbeat keeps a peer's files visible
    pub liveness_window_secs: u64,
    /// Period of the eviction sweep
    pub sweep_interval_secs: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            bind_port: 5001,
            db_path: None,
            liveness_window_secs: LIVENESS_WINDOW_SECS as u64,
            sweep_interval_secs: SWEEP_INTERVAL_SECS,
        }
    }
}

impl DirectoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bind_address(mut self, addr: &str) -> Self {
        self.bind_address = addr.to_string();
        self
    }

    pub fn with_bind_port(mut self, port: u16) -> Self {
        self.bind_port = port;
        self
    }

    pub fn with_db_path(mut self, path: Option<PathBuf>) -> Self {
        self.db_path = path;
        self
    }

    pub fn with_liveness_window(mut self, secs: u64) -> Self {
        self.liveness_window_secs = secs;
        self
    }

    pub fn with_sweep_interval(mut self, secs: u64) -> Self {
        self.sweep_interval_secs = secs;
        self
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.bind_port)
    }

    pub fn liveness_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.liveness_window_secs as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.liveness_window_secs == 0 {
            return Err(ConfigError::Invalid("liveness_window_secs cannot be 0".to_string()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid("sweep_interval_secs cannot be 0".to_string()));
        }
        if i64::try_from(self.liveness_window_secs).is_err() {
            return Err(ConfigError::Invalid("liveness_window_secs is too large".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// TRANSFER CONFIG
// ============================================================================

/// Configuration shared by the peer listener and the transfer client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Timeout for each individual read in seconds
    pub read_timeout_secs: u64,
    /// Chunk size for streaming file bytes
    pub chunk_size: usize,
    /// Largest filename request the listener reads
    pub max_request_len: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            read_timeout_secs: 10,
            chunk_size: CHUNK_SIZE,
            max_request_len: MAX_REQUEST_LEN,
        }
    }
}

impl TransferConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    pub fn with_read_timeout(mut self, secs: u64) -> Self {
        self.read_timeout_secs = secs;
        self
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size cannot be 0".to_string()));
        }
        if self.max_request_len == 0 {
            return Err(ConfigError::Invalid("max_request_len cannot be 0".to_string()));
        }
        if self.connect_timeout_secs == 0 || self.read_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts cannot be 0".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// PEER CONFIG
// ============================================================================

/// Configuration for a peer session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Base URL of the directory, e.g. `http://10.0.0.5:5001`
    pub directory_url: String,
    /// Address the peer listener binds to
    pub listen_address: String,
    /// Port the peer listener binds to (0 for random)
    pub listen_port: u16,
    /// Host advertised to the directory; detected when unset
    pub advertise_host: Option<String>,
    /// Folder whose files are announced and served
    pub shared_dir: PathBuf,
    /// Folder downloads are written to
    pub download_dir: PathBuf,
    /// Heartbeat period in seconds
    pub heartbeat_interval_secs: u64,
    /// Listener and client settings
    pub transfer: TransferConfig,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            directory_url: "http://127.0.0.1:5001".to_string(),
            listen_address: "0.0.0.0".to_string(),
            listen_port: 0,
            advertise_host: None,
            shared_dir: PathBuf::from("shared_files"),
            download_dir: PathBuf::from("downloads"),
            heartbeat_interval_secs: 30,
            transfer: TransferConfig::default(),
        }
    }
}

impl PeerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_directory_url(mut self, url: &str) -> Self {
        self.directory_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_listen_address(mut self, addr: &str) -> Self {
        self.listen_address = addr.to_string();
        self
    }

    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = port;
        self
    }

    pub fn with_advertise_host(mut self, host: Option<String>) -> Self {
        self.advertise_host = host;
        self
    }

    pub fn with_shared_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shared_dir = dir.into();
        self
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    pub fn with_heartbeat_interval(mut self, secs: u64) -> Self {
        self.heartbeat_interval_secs = secs;
        self
    }

    pub fn with_transfer(mut self, transfer: TransferConfig) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Host to advertise: the configured one, else the detected local IP,
    /// else loopback
    pub fn resolve_advertise_host(&self) -> String {
        if let Some(host) = &self.advertise_host {
            return host.clone();
        }
        local_ip_address::local_ip()
            .map(|ip| ip.to_string())
            .unwrap_or_else(|_| "127.0.0.1".to_string())
    }

    /// Address recorded at registration. Registration binds nothing, so a
    /// random listen port has no meaning here and is rejected.
    pub fn registration_address(&self) -> Result<PeerAddress, ConfigError> {
        if self.listen_port == 0 {
            return Err(ConfigError::Invalid(
                "registration needs an explicit listen_port".to_string(),
            ));
        }
        Ok(PeerAddress::new(self.resolve_advertise_host(), self.listen_port))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.directory_url.starts_with("http://") && !self.directory_url.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "directory_url must be an http(s) URL, got {}",
                self.directory_url
            )));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Invalid("heartbeat_interval_secs cannot be 0".to_string()));
        }
        self.transfer.validate()
    }
}
