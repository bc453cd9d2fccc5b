//! Binary frame format.
//!
//! Frame layout (4-byte prefix + payload):
//!
//! ```text
//! +------------+------------------+
//! | length N   | payload          |
//! | 4 bytes BE | N bytes          |
//! +------------+------------------+
//! ```

use crate::error::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the length prefix in bytes.
pub const LEN_PREFIX_SIZE: usize = 4;

/// A parsed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame payload.
    pub payload: Bytes,
}

impl Frame {
    /// Creates a new frame with the given payload.
    pub fn new(payload: Bytes) -> Self {
        Self { payload }
    }

    /// Encodes the frame into bytes.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        if self.payload.len() > u32::MAX as usize {
            return Err(ProtocolError::FrameTooLarge {
                size: self.payload.len() as u64,
                max: u32::MAX,
            });
        }

        let mut buf = BytesMut::with_capacity(LEN_PREFIX_SIZE + self.payload.len());
        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);
        Ok(buf)
    }

    /// Decodes a frame from bytes.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was decoded,
    /// `Ok(None)` if more data is needed, or `Err` if the length prefix
    /// exceeds `max_frame_size` (0 disables the cap). The payload is never
    /// split out until all of its bytes are buffered.
    pub fn decode(
        buf: &mut BytesMut,
        max_frame_size: u32,
    ) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < LEN_PREFIX_SIZE {
            return Ok(None);
        }

        // Peek at the prefix without consuming
        let payload_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);

        if max_frame_size != 0 && payload_len > max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: payload_len as u64,
                max: max_frame_size,
            });
        }

        let total_len = LEN_PREFIX_SIZE + payload_len as usize;
        if buf.len() < total_len {
            return Ok(None);
        }

        buf.advance(LEN_PREFIX_SIZE);
        let payload = buf.split_to(payload_len as usize).freeze();

        Ok(Some(Self { payload }))
    }
}
