//! Server error types.

use std::time::Duration;
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] echoframe_protocol::ProtocolError),

    #[error("connection closed mid-frame: got {got} of {expected} bytes")]
    Truncated { got: usize, expected: usize },

    #[error("idle timeout after {0:?}")]
    IdleTimeout(Duration),
}
