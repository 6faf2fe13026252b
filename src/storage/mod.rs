// Storage module - LOCAL FILES
// The shared folder a peer announces and serves from

mod shared_dir;

pub use shared_dir::{SharedDir, StorageError};
