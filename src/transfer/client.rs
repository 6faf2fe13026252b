// Transfer Client - Pulls a file from a remote peer listener
//
// connect (bounded) -> send filename -> read header -> stream body to disk.
// No retries: every failure goes straight back to the caller, and whatever
// was written to the destination stays there.

use crate::config::TransferConfig;
use crate::registry::PeerAddress;
use crate::transfer::progress::{ThroughputMeter, TransferProgress, TransferState};
use crate::transfer::protocol::{
    is_partial_sentinel, parse_response_header, ProtocolError, ResponseHeader,
};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Transfer failures
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("File not found on peer")]
    NotFound,

    #[error("Timed out waiting for peer")]
    Timeout,

    #[error("Connection closed after {received} of {expected} bytes")]
    Truncated { expected: u64, received: u64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn network(err: io::Error) -> TransferError {
    TransferError::Network(err.to_string())
}

/// Client side of the transfer protocol
#[derive(Clone, Debug, Default)]
pub struct TransferClient {
    config: TransferConfig,
}

impl TransferClient {
    pub fn new(config: TransferConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Fetch `filename` from `address` into `destination`; returns the
    /// number of bytes written
    pub async fn fetch(
        &self,
        address: &PeerAddress,
        filename: &str,
        destination: &Path,
    ) -> Result<u64, TransferError> {
        let (progress, _) = watch::channel(TransferProgress::default());
        self.fetch_with_progress(address, filename, destination, &progress)
            .await
    }

    /// Like [`fetch`](Self::fetch), publishing progress to `progress`
    pub async fn fetch_with_progress(
        &self,
        address: &PeerAddress,
        filename: &str,
        destination: &Path,
        progress: &watch::Sender<TransferProgress>,
    ) -> Result<u64, TransferError> {
        progress.send_replace(TransferProgress::default());
        let result = self.download(address, filename, destination, progress).await;
        progress.send_modify(|p| {
            p.throughput_bytes_per_sec = 0.0;
            p.state = if result.is_ok() {
                TransferState::Complete
            } else {
                TransferState::Failed
            };
        });
        match &result {
            Ok(bytes) => info!(%address, filename, bytes, "download complete"),
            Err(e) => warn!(%address, filename, error = %e, "download failed"),
        }
        result
    }

    /// Run the fetch as a background task that can be observed and aborted
    pub fn start(
        &self,
        address: PeerAddress,
        filename: String,
        destination: PathBuf,
    ) -> TransferHandle {
        let (tx, rx) = watch::channel(TransferProgress::default());
        let client = self.clone();
        let task = tokio::spawn(async move {
            client
                .fetch_with_progress(&address, &filename, &destination, &tx)
                .await
        });
        TransferHandle { progress: rx, task }
    }

    async fn download(
        &self,
        address: &PeerAddress,
        filename: &str,
        destination: &Path,
        progress: &watch::Sender<TransferProgress>,
    ) -> Result<u64, TransferError> {
        debug!(%address, filename, "connecting to peer");
        let mut stream = timeout(
            self.config.connect_timeout(),
            TcpStream::connect((address.host.as_str(), address.port)),
        )
        .await
        .map_err(|_| TransferError::Timeout)?
        .map_err(network)?;
        stream.set_nodelay(true).ok();

        stream.write_all(filename.as_bytes()).await.map_err(network)?;

        let mut buf = vec![0u8; self.config.chunk_size.max(64)];
        let mut filled = 0;
        let (total, body_offset) = loop {
            let n = self.read_some(&mut stream, &mut buf[filled..]).await?;
            filled += n;
            let head = &buf[..filled];
            if n == 0 {
                if filled == 0 {
                    return Err(TransferError::Network(
                        "connection closed before a response".to_string(),
                    ));
                }
                break self.header(head)?;
            }
            if !is_partial_sentinel(head) {
                break self.header(head)?;
            }
        };

        progress.send_modify(|p| {
            p.state = TransferState::Downloading;
            p.total_bytes = total;
        });

        let mut file = File::create(destination).await?;
        let mut meter = ThroughputMeter::default();
        let mut received = 0u64;

        // Body bytes that arrived together with the header
        let early = &buf[body_offset..filled];
        let early = &early[..early.len().min(total as usize)];
        if !early.is_empty() {
            file.write_all(early).await?;
            received += early.len() as u64;
            meter.record(early.len() as u64);
            publish(progress, received, &mut meter);
        }

        let outcome = self
            .stream_body(&mut stream, &mut file, &mut buf, total, &mut received, &mut meter, progress)
            .await;
        // Keep whatever arrived, even when the body was cut short
        file.flush().await?;
        outcome?;

        Ok(received)
    }

    #[allow(clippy::too_many_arguments)]
    async fn stream_body(
        &self,
        stream: &mut TcpStream,
        file: &mut File,
        buf: &mut [u8],
        total: u64,
        received: &mut u64,
        meter: &mut ThroughputMeter,
        progress: &watch::Sender<TransferProgress>,
    ) -> Result<(), TransferError> {
        let chunk = self.config.chunk_size.min(buf.len());
        while *received < total {
            let want = chunk.min((total - *received) as usize);
            let n = self.read_some(stream, &mut buf[..want]).await?;
            if n == 0 {
                return Err(TransferError::Truncated {
                    expected: total,
                    received: *received,
                });
            }
            file.write_all(&buf[..n]).await?;
            *received += n as u64;
            meter.record(n as u64);
            publish(progress, *received, meter);
        }
        Ok(())
    }

    fn header(&self, head: &[u8]) -> Result<(u64, usize), TransferError> {
        match parse_response_header(head)? {
            ResponseHeader::NotFound => Err(TransferError::NotFound),
            ResponseHeader::Size { total, body_offset } => Ok((total, body_offset)),
        }
    }

    async fn read_some(&self, stream: &mut TcpStream, buf: &mut [u8]) -> Result<usize, TransferError> {
        timeout(self.config.read_timeout(), stream.read(buf))
            .await
            .map_err(|_| TransferError::Timeout)?
            .map_err(network)
    }
}

fn publish(progress: &watch::Sender<TransferProgress>, received: u64, meter: &mut ThroughputMeter) {
    let rate = meter.rate();
    progress.send_modify(|p| {
        p.bytes_received = received;
        p.throughput_bytes_per_sec = rate;
    });
}

/// A fetch running in the background
pub struct TransferHandle {
    progress: watch::Receiver<TransferProgress>,
    task: JoinHandle<Result<u64, TransferError>>,
}

impl TransferHandle {
    /// Subscribe to progress updates
    pub fn progress(&self) -> watch::Receiver<TransferProgress> {
        self.progress.clone()
    }

    /// Most recent progress snapshot
    pub fn latest(&self) -> TransferProgress {
        *self.progress.borrow()
    }

    /// Abort the fetch. The socket closes as soon as the task is dropped;
    /// the partial destination file is left in place.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Wait for the fetch to finish
    pub async fn join(self) -> Result<u64, TransferError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(TransferError::Cancelled),
            Err(e) => Err(TransferError::Network(format!("transfer task failed: {e}"))),
        }
    }
}
