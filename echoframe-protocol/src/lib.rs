//! # echoframe-protocol
//!
//! Wire protocol implementation for echoframe.
//!
//! This crate provides:
//! - Length-prefixed binary framing (4-byte big-endian prefix)
//! - A streaming decoder that accumulates partial reads
//! - Reply mode and protocol constants

pub mod codec;
pub mod error;
pub mod frame;

pub use codec::Decoder;
pub use error::ProtocolError;
pub use frame::{Frame, LEN_PREFIX_SIZE};

use serde::{Deserialize, Serialize};

/// Default port for the echoframe server.
pub const DEFAULT_PORT: u16 = 7340;

/// Default maximum frame payload size (16 MiB).
///
/// The wire format itself places no upper bound on the length prefix, so the
/// cap is enforced by the receiver. A value of 0 disables the cap.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Reply framing mode.
///
/// In `Raw` mode the server echoes the bare payload with no length prefix on
/// the reply; the client knows how many bytes to expect because it sent them.
/// In `Framed` mode replies carry their own length prefix, making the two
/// directions symmetric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyMode {
    /// Echo the bare payload (default).
    #[default]
    Raw,
    /// Re-frame the reply with its own length prefix.
    Framed,
}
