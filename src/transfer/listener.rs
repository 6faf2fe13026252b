// Peer Listener - Serves shared files to other peers
//
// LISTENING -> accept -> AWAIT_REQUEST -> RESPOND -> CLOSE
//
// Every accepted connection gets its own task. Tasks share nothing mutable;
// each owns its socket and file handle, so both are released on every exit
// path when the task ends.

use crate::config::TransferConfig;
use crate::storage::{SharedDir, StorageError};
use crate::transfer::protocol::{decode_request, encode_size_header, FILE_NOT_FOUND};
use std::io;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Listener errors
#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("Failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// How a connection ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServeOutcome {
    /// The client closed without sending a request
    Empty,
    /// The sentinel was sent
    NotFound,
    /// The whole file was streamed
    Served { bytes: u64 },
}

/// TCP endpoint answering file requests
pub struct PeerListener {
    listener: TcpListener,
    shared: SharedDir,
    config: TransferConfig,
}

impl PeerListener {
    /// Bind to `address:port` (port 0 for random)
    pub async fn bind(
        address: &str,
        port: u16,
        shared: SharedDir,
        config: TransferConfig,
    ) -> Result<Self, ListenerError> {
        let bind_addr = format!("{}:{}", address, port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| ListenerError::Bind {
                addr: bind_addr.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            listener,
            shared,
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ListenerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shared_dir(&self) -> &SharedDir {
        &self.shared
    }

    /// Accept connections forever, one task per connection
    pub async fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, root = %self.shared.root().display(), "peer listener accepting");
        }
        loop {
            match self.listener.accept().await {
                Ok((stream, remote)) => {
                    debug!(%remote, "incoming transfer connection");
                    let shared = self.shared.clone();
                    let config = self.config.clone();
                    tokio::spawn(async move {
                        match serve_connection(stream, &shared, &config).await {
                            Ok(outcome) => debug!(%remote, ?outcome, "connection closed"),
                            Err(e) => warn!(%remote, error = %e, "transfer aborted"),
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                }
            }
        }
    }

    /// Run the accept loop in the background
    pub fn spawn(self) -> Result<ListenerHandle, ListenerError> {
        let local_addr = self.local_addr()?;
        let task = tokio::spawn(self.run());
        Ok(ListenerHandle { local_addr, task })
    }
}

/// Handle to a running listener
pub struct ListenerHandle {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting. Connections already being served run to completion.
    pub fn shutdown(&self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Answer a single request on `stream`
pub async fn serve_connection(
    mut stream: TcpStream,
    shared: &SharedDir,
    config: &TransferConfig,
) -> Result<ServeOutcome, ListenerError> {
    stream.set_nodelay(true).ok();

    let mut request = vec![0u8; config.max_request_len];
    let n = timeout(config.read_timeout(), stream.read(&mut request))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "no request received"))??;
    if n == 0 {
        return Ok(ServeOutcome::Empty);
    }

    let opened = match decode_request(&request[..n]) {
        Some(name) => {
            debug!(filename = name, "file requested");
            match shared.open_file(name).await {
                Ok(opened) => opened,
                Err(StorageError::Io(e)) => return Err(e.into()),
                Err(StorageError::InvalidName(_)) => None,
            }
        }
        None => None,
    };

    let Some((file, len)) = opened else {
        stream.write_all(FILE_NOT_FOUND).await?;
        stream.shutdown().await.ok();
        return Ok(ServeOutcome::NotFound);
    };

    stream.write_all(&encode_size_header(len)).await?;

    // Never send more than was announced, even if the file grows meanwhile
    let mut body = file.take(len);
    let mut chunk = vec![0u8; config.chunk_size];
    let mut sent = 0u64;
    loop {
        let read = body.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        stream.write_all(&chunk[..read]).await?;
        sent += read as u64;
    }
    stream.shutdown().await.ok();

    if sent < len {
        warn!(expected = len, sent, "shared file shrank while streaming");
    }
    Ok(ServeOutcome::Served { bytes: sent })
}
