// Directory module - DISCOVERY
// Peer registration, announcements, liveness sweeps and the HTTP API

pub mod api;
mod clock;
pub mod messages;
mod monitor;
mod service;

pub use clock::{Clock, ManualClock, SystemClock};
pub use messages::{
    CredentialsRequest, DisconnectRequest, FileQuery, FileRow, FilesResponse, HeartbeatRequest,
    HeartbeatResponse, LoginRequest, LoginResponse, MessageResponse, RegisterRequest,
    ShareFilesRequest,
};
pub use monitor::{LivenessMonitor, MonitorStats, SWEEP_INTERVAL_SECS};
pub use service::{DirectoryError, DirectoryService, LIVENESS_WINDOW_SECS};
