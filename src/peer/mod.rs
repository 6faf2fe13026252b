// Peer module - CLIENT SIDE
// Talks to the directory, keeps the peer alive and moves files

pub mod client;
mod heartbeat;
mod session;

pub use client::{is_unknown_peer, ClientError, DirectoryClient};
pub use heartbeat::HeartbeatLoop;
pub use session::{PeerSession, SessionError};
