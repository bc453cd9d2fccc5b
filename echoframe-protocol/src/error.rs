//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors that can occur during framing.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u64, max: u32 },
}
