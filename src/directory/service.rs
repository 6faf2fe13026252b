// Directory Service - Discovery and liveness, never on the data path
//
// One method per directory request. Required fields are checked before the
// store is touched; atomicity of each write is the store's job.

use crate::directory::clock::{Clock, SystemClock};
use crate::directory::messages::{
    CredentialsRequest, DisconnectRequest, FileQuery, HeartbeatRequest, ShareFilesRequest,
};
use crate::registry::{FileEntry, PeerAddress, RegistryError, RegistryStore};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Default liveness window
pub const LIVENESS_WINDOW_SECS: i64 = 60;

/// Request-scoped directory errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid credentials!")]
    Auth,

    #[error("Username already exists!")]
    Conflict,

    #[error("Peer is not registered")]
    UnknownPeer,

    #[error("Store error: {0}")]
    Store(RegistryError),
}

impl From<RegistryError> for DirectoryError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Conflict => DirectoryError::Conflict,
            RegistryError::InvalidCredentials => DirectoryError::Auth,
            RegistryError::UnknownPeer | RegistryError::NotFound => DirectoryError::UnknownPeer,
            other => DirectoryError::Store(other),
        }
    }
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, DirectoryError> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(DirectoryError::Validation(format!("Missing required field: {field}"))),
    }
}

fn required_port(value: Option<u16>, field: &str) -> Result<u16, DirectoryError> {
    value.ok_or_else(|| DirectoryError::Validation(format!("Missing required field: {field}")))
}

/// Log backend failures before handing them to the caller
fn logged(op: &str, err: RegistryError) -> DirectoryError {
    if err.is_backend() {
        error!(operation = op, error = %err, "registry failure");
    }
    err.into()
}

/// The directory
#[derive(Clone)]
pub struct DirectoryService {
    store: Arc<dyn RegistryStore>,
    clock: Arc<dyn Clock>,
    liveness_window: Duration,
}

impl DirectoryService {
    /// Create a service over a store using the system clock and a 60s window
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            liveness_window: Duration::seconds(LIVENESS_WINDOW_SECS),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_liveness_window(mut self, window: Duration) -> Self {
        self.liveness_window = window;
        self
    }

    pub fn store(&self) -> &Arc<dyn RegistryStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn liveness_window(&self) -> Duration {
        self.liveness_window
    }

    /// Oldest heartbeat that still counts as live right now
    pub fn liveness_threshold(&self) -> DateTime<Utc> {
        self.clock.now() - self.liveness_window
    }

    /// Create a peer record
    pub fn register(&self, req: &CredentialsRequest) -> Result<(), DirectoryError> {
        let username = required(&req.username, "username")?;
        let password = required(&req.password, "password")?;
        let ip = required(&req.ip, "ip")?;
        let port = required_port(req.port, "port")?;

        let address = PeerAddress::new(ip, port);
        self.store
            .register_peer(username, password, &address, self.clock.now())
            .map_err(|e| logged("register", e))?;
        info!(username, %address, "peer registered");
        Ok(())
    }

    /// Authenticate and record the peer's current address
    pub fn login(&self, req: &CredentialsRequest) -> Result<String, DirectoryError> {
        let username = required(&req.username, "username")?;
        let password = required(&req.password, "password")?;
        let ip = required(&req.ip, "ip")?;
        let port = required_port(req.port, "port")?;

        let address = PeerAddress::new(ip, port);
        let username = self
            .store
            .verify_and_touch(username, password, &address, self.clock.now())
            .map_err(|e| logged("login", e))?;
        info!(username = %username, %address, "peer logged in");
        Ok(username)
    }

    /// Record a heartbeat. Returns false when the peer is no longer
    /// registered, which is not an error: the peer should register again.
    pub fn heartbeat(&self, req: &HeartbeatRequest) -> Result<bool, DirectoryError> {
        let username = required(&req.username, "username")?;
        let ip = required(&req.ip, "ip")?;
        let port = required_port(req.port, "port")?;

        let address = PeerAddress::new(ip, port);
        match self.store.touch_heartbeat(username, &address, self.clock.now()) {
            Ok(()) => {
                debug!(username, "heartbeat");
                Ok(true)
            }
            Err(RegistryError::NotFound) => {
                warn!(username, "heartbeat from unregistered peer");
                Ok(false)
            }
            Err(e) => Err(logged("heartbeat", e)),
        }
    }

    /// Withdraw every file the peer shares. The peer row is kept so the
    /// peer can log in again without registering.
    pub fn disconnect(&self, req: &DisconnectRequest) -> Result<(), DirectoryError> {
        let username = required(&req.username, "username")?;
        self.store
            .remove_files(username)
            .map_err(|e| logged("disconnect", e))?;
        info!(username, "peer disconnected");
        Ok(())
    }

    /// Replace the peer's announcement; returns how many files it holds
    pub fn share_files(&self, req: &ShareFilesRequest) -> Result<usize, DirectoryError> {
        let username = required(&req.username, "username")?;
        let filenames = req
            .filename
            .as_ref()
            .ok_or_else(|| DirectoryError::Validation("Missing required field: filename".to_string()))?;
        let ip = required(&req.peer_ip, "peer_ip")?;
        let port = required_port(req.peer_port, "peer_port")?;

        let address = PeerAddress::new(ip, port);
        self.store
            .replace_files(username, filenames, &address, self.clock.now())
            .map_err(|e| logged("share_files", e))?;
        info!(username, count = filenames.len(), %address, "files announced");
        Ok(filenames.len())
    }

    /// Live files matching the optional filters
    pub fn list_files(&self, query: &FileQuery) -> Result<Vec<FileEntry>, DirectoryError> {
        let entries = self
            .store
            .query_files(
                query.filename.as_deref(),
                query.username.as_deref(),
                self.liveness_threshold(),
            )
            .map_err(|e| logged("list_files", e))?;
        debug!(count = entries.len(), "files listed");
        Ok(entries)
    }

    /// Same semantics as [`list_files`](Self::list_files)
    pub fn search_files(&self, query: &FileQuery) -> Result<Vec<FileEntry>, DirectoryError> {
        self.list_files(query)
    }
}
