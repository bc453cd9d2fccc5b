//! Connection management.

use crate::error::ClientError;
use bytes::Bytes;
use echoframe_protocol::{Decoder, Frame, ReplyMode};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server address.
    pub addr: SocketAddr,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Timeout for one echo round trip.
    pub request_timeout: Duration,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
    /// Reply framing mode the server is configured with.
    pub reply_mode: ReplyMode,
}

impl ConnectionConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            reply_mode: ReplyMode::Raw,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }

    pub fn with_reply_mode(mut self, reply_mode: ReplyMode) -> Self {
        self.reply_mode = reply_mode;
        self
    }
}

/// A connection to an echoframe server.
///
/// The protocol is half-duplex: one frame is sent and its echo fully read
/// before the next frame goes out, so the connection needs no request
/// bookkeeping beyond the stream itself.
pub struct Connection {
    config: ConnectionConfig,
    stream: Option<TcpStream>,
    decoder: Decoder,
}

impl Connection {
    /// Creates a new connection (not yet connected).
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            stream: None,
            // Replies are only ever as large as what we sent; no cap needed
            decoder: Decoder::with_max_frame_size(0),
        }
    }

    /// Connects to the server.
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        tracing::debug!("Connecting to {}...", self.config.addr);

        let stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(self.config.addr),
        )
        .await
        .map_err(|_| ClientError::Timeout)?
        .map_err(ClientError::Io)?;

        stream.set_nodelay(true).ok();

        self.decoder.clear();
        self.stream = Some(stream);
        tracing::debug!("Connected to {}", self.config.addr);
        Ok(())
    }

    /// Sends one frame and reads its echo.
    pub async fn echo(&mut self, payload: &[u8]) -> Result<Bytes, ClientError> {
        let encoded = Frame::new(Bytes::copy_from_slice(payload)).encode()?;
        let reply_mode = self.config.reply_mode;
        let request_timeout = self.config.request_timeout;
        let buffer_size = self.config.read_buffer_size;

        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;
        stream.write_all(&encoded).await?;
        tracing::debug!("Sent {} byte frame, waiting for echo...", payload.len());

        tokio::time::timeout(request_timeout, async {
            match reply_mode {
                ReplyMode::Raw => read_raw_reply(stream, payload.len()).await,
                ReplyMode::Framed => {
                    read_framed_reply(stream, &mut self.decoder, buffer_size).await
                }
            }
        })
        .await
        .map_err(|_| ClientError::Timeout)?
    }

    /// Returns whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Closes the connection.
    pub async fn close(&mut self) -> Result<(), ClientError> {
        if let Some(mut stream) = self.stream.take() {
            tracing::debug!("Closing connection to {}", self.config.addr);
            let _ = stream.shutdown().await;
        }
        self.decoder.clear();
        Ok(())
    }
}

/// Reads a raw-mode reply: exactly as many bytes as were sent.
async fn read_raw_reply(stream: &mut TcpStream, len: usize) -> Result<Bytes, ClientError> {
    let mut reply = vec![0u8; len];
    let mut filled = 0;

    while filled < len {
        let n = stream.read(&mut reply[filled..]).await?;
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        filled += n;
    }

    Ok(Bytes::from(reply))
}

/// Reads a framed-mode reply: one complete frame.
async fn read_framed_reply(
    stream: &mut TcpStream,
    decoder: &mut Decoder,
    buffer_size: usize,
) -> Result<Bytes, ClientError> {
    let mut buf = vec![0u8; buffer_size];

    loop {
        if let Some(frame) = decoder.decode_frame()? {
            return Ok(frame.payload);
        }

        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        decoder.extend(&buf[..n]);
    }
}
