// Peer Session - A logged-in peer: listener, heartbeat and announcements
//
// start: bind listener -> login with its address -> heartbeat -> announce
// shutdown: disconnect -> stop heartbeat -> stop listener

use crate::config::{ConfigError, PeerConfig};
use crate::directory::FileQuery;
use crate::peer::client::{ClientError, DirectoryClient};
use crate::peer::heartbeat::HeartbeatLoop;
use crate::registry::{FileEntry, PeerAddress};
use crate::storage::{SharedDir, StorageError};
use crate::transfer::{
    ListenerError, ListenerHandle, PeerListener, TransferClient, TransferError, TransferHandle,
};
use std::future::Future;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Directory(#[from] ClientError),

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

/// A running peer
pub struct PeerSession {
    config: PeerConfig,
    username: String,
    address: PeerAddress,
    directory: DirectoryClient,
    shared: SharedDir,
    transfers: TransferClient,
    listener: ListenerHandle,
    heartbeat: JoinHandle<()>,
}

impl PeerSession {
    /// Log in and bring the peer online
    pub async fn start(config: PeerConfig, username: &str, password: &str) -> Result<Self, SessionError> {
        config.validate()?;

        let shared = SharedDir::open(&config.shared_dir).await?;
        tokio::fs::create_dir_all(&config.download_dir)
            .await
            .map_err(StorageError::from)?;

        let listener = PeerListener::bind(
            &config.listen_address,
            config.listen_port,
            shared.clone(),
            config.transfer.clone(),
        )
        .await?;
        let address = PeerAddress::new(config.resolve_advertise_host(), listener.local_addr()?.port());

        let directory = DirectoryClient::new(config.directory_url.clone());
        let username = directory.login(username, password, &address).await?;
        info!(username = %username, %address, "logged in");

        let listener = listener.spawn()?;
        let heartbeat = HeartbeatLoop::new(
            directory.clone(),
            &username,
            address.clone(),
            config.heartbeat_interval(),
        )
        .spawn();

        let session = Self {
            transfers: TransferClient::new(config.transfer.clone()),
            config,
            username,
            address,
            directory,
            shared,
            listener,
            heartbeat,
        };

        if let Err(e) = session.reannounce().await {
            session.stop_tasks();
            return Err(e);
        }
        Ok(session)
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Address advertised to the directory
    pub fn address(&self) -> &PeerAddress {
        &self.address
    }

    pub fn shared_dir(&self) -> &SharedDir {
        &self.shared
    }

    pub fn directory(&self) -> &DirectoryClient {
        &self.directory
    }

    pub fn is_serving(&self) -> bool {
        self.listener.is_running()
    }

    /// Announce the current contents of the shared folder, replacing the
    /// previous announcement. Returns the number of files announced.
    pub async fn reannounce(&self) -> Result<usize, SessionError> {
        let names = self.shared.list().await?;
        let count = names.len();
        self.directory
            .share_files(&self.username, names, &self.address)
            .await?;
        info!(username = %self.username, files = count, "announced shared files");
        Ok(count)
    }

    /// Copy `source` into the shared folder and announce it
    pub async fn share(&self, source: &Path) -> Result<String, SessionError> {
        let name = self.shared.add_file(source).await?;
        self.reannounce().await?;
        Ok(name)
    }

    /// Live files matching `query`
    pub async fn search(&self, query: &FileQuery) -> Result<Vec<FileEntry>, SessionError> {
        Ok(self.directory.search_files(query).await?)
    }

    /// Where a download of `filename` lands
    pub fn download_path(&self, filename: &str) -> Result<PathBuf, SessionError> {
        SharedDir::new(&self.config.download_dir)
            .resolve(filename)
            .ok_or_else(|| StorageError::InvalidName(filename.to_string()).into())
    }

    /// Fetch `entry` from its owner into the download folder
    pub async fn download(&self, entry: &FileEntry) -> Result<(PathBuf, u64), SessionError> {
        let destination = self.download_path(&entry.filename)?;
        let bytes = self
            .transfers
            .fetch(&entry.address(), &entry.filename, &destination)
            .await?;
        Ok((destination, bytes))
    }

    /// Start fetching `entry` in the background
    pub fn start_download(&self, entry: &FileEntry) -> Result<TransferHandle, SessionError> {
        let destination = self.download_path(&entry.filename)?;
        Ok(self
            .transfers
            .start(entry.address(), entry.filename.clone(), destination))
    }

    /// Keep serving and heartbeating until `signal` resolves, then shut down
    pub async fn run_until<F>(self, signal: F) -> Result<(), SessionError>
    where
        F: Future<Output = ()>,
    {
        signal.await;
        info!(username = %self.username, "shutting down");
        self.shutdown().await
    }

    /// Withdraw from the directory and stop serving
    pub async fn shutdown(self) -> Result<(), SessionError> {
        let result = self.directory.disconnect(&self.username).await;
        self.stop_tasks();
        match result {
            Ok(()) => {
                info!(username = %self.username, "disconnected");
                Ok(())
            }
            Err(e) => {
                warn!(username = %self.username, error = %e, "disconnect failed");
                Err(e.into())
            }
        }
    }

    fn stop_tasks(&self) {
        self.heartbeat.abort();
        self.listener.shutdown();
    }
}
