// Registry module - WHO SHARES WHAT
// Peer records, file announcements and the transactional store behind them

mod memory;
mod model;
mod sled_store;
mod store;

pub use memory::MemoryRegistry;
pub use model::{FileEntry, Peer, PeerAddress, SharedFile};
pub use sled_store::SledRegistry;
pub use store::{RegistryError, RegistryStore};
