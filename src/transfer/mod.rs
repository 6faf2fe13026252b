// Transfer module - PEER TO PEER FILE STREAMING
// Raw TCP: filename in, length header plus body out

pub mod client;
pub mod listener;
pub mod progress;
pub mod protocol;

pub use client::{TransferClient, TransferError, TransferHandle};
pub use listener::{serve_connection, ListenerError, ListenerHandle, PeerListener, ServeOutcome};
pub use progress::{ThroughputMeter, TransferProgress, TransferState, THROUGHPUT_WINDOW};
pub use protocol::{ProtocolError, ResponseHeader, CHUNK_SIZE, FILE_NOT_FOUND, MAX_REQUEST_LEN};
