//! Peershare - directory-assisted peer-to-peer file sharing.
//!
//! A central directory keeps track of registered peers, the files each one
//! announces and when each was last heard from. Files never pass through the
//! directory: peers fetch them from each other over a small raw TCP protocol.
//!
//! Credentials are stored and sent in plaintext, matching deployed peers.
//! This is not a recommendation; put the directory behind TLS and an
//! authenticating proxy when that matters.

pub mod config;
pub mod directory;
pub mod peer;
pub mod registry;
pub mod storage;
pub mod transfer;

pub use config::{ConfigError, DirectoryConfig, PeerConfig, TransferConfig};
