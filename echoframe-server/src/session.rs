//! Per-connection session bookkeeping.

use std::net::SocketAddr;
use std::time::Instant;
use uuid::Uuid;

/// A client session.
///
/// Owned exclusively by the handling context of one connection; sessions are
/// never shared between connections.
pub struct Session {
    /// Unique session ID.
    pub id: String,

    /// Remote address.
    pub remote_addr: SocketAddr,

    /// Frames echoed on this connection.
    frames: u64,

    /// Session creation time.
    created_at: Instant,
}

impl Session {
    /// Creates a new session.
    pub fn new(remote_addr: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            remote_addr,
            frames: 0,
            created_at: Instant::now(),
        }
    }

    /// Records an echoed frame.
    pub fn record_frame(&mut self) {
        self.frames += 1;
    }

    /// Returns the number of frames echoed on this connection.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Returns the session age.
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }
}
