// Progress - Download progress and throughput
//
// Throughput is the number of bytes received during the trailing window
// (one second by default) divided by the window length.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default throughput window
pub const THROUGHPUT_WINDOW: Duration = Duration::from_secs(1);

/// Phase of a transfer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransferState {
    #[default]
    Connecting,
    Downloading,
    Complete,
    Failed,
}

/// Snapshot published while a transfer runs
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TransferProgress {
    pub state: TransferState,
    pub bytes_received: u64,
    /// Declared size, zero until the header arrives
    pub total_bytes: u64,
    pub throughput_bytes_per_sec: f64,
}

impl TransferProgress {
    /// Received fraction in `0.0..=1.0`
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return if self.state == TransferState::Complete { 1.0 } else { 0.0 };
        }
        (self.bytes_received as f64 / self.total_bytes as f64).min(1.0)
    }

    /// Received percentage in `0.0..=100.0`
    pub fn percent(&self) -> f64 {
        self.fraction() * 100.0
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, TransferState::Complete | TransferState::Failed)
    }
}

/// Sliding-window throughput sampler
#[derive(Clone, Debug)]
pub struct ThroughputMeter {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
    in_window: u64,
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new(THROUGHPUT_WINDOW)
    }
}

impl ThroughputMeter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
            in_window: 0,
        }
    }

    /// Record bytes received now
    pub fn record(&mut self, bytes: u64) {
        self.record_at(Instant::now(), bytes);
    }

    /// Record bytes received at `at`
    pub fn record_at(&mut self, at: Instant, bytes: u64) {
        self.samples.push_back((at, bytes));
        self.in_window += bytes;
        self.expire(at);
    }

    /// Bytes per second over the window ending now
    pub fn rate(&mut self) -> f64 {
        self.rate_at(Instant::now())
    }

    /// Bytes per second over the window ending at `now`
    pub fn rate_at(&mut self, now: Instant) -> f64 {
        self.expire(now);
        self.in_window as f64 / self.window.as_secs_f64()
    }

    fn expire(&mut self, now: Instant) {
        while let Some(&(at, bytes)) = self.samples.front() {
            if now.saturating_duration_since(at) < self.window {
                break;
            }
            self.samples.pop_front();
            self.in_window -= bytes;
        }
    }
}
