//! High-level client API.

use crate::connection::{Connection, ConnectionConfig};
use crate::error::ClientError;
use bytes::Bytes;
use std::net::SocketAddr;

/// Probe payload used by [`Client::ping`].
const PROBE: &[u8] = b"ping";

/// High-level echoframe client.
pub struct Client {
    connection: Connection,
}

impl Client {
    /// Connects to a server with default settings.
    pub async fn connect(addr: SocketAddr) -> Result<Self, ClientError> {
        Self::connect_with_config(ConnectionConfig::new(addr)).await
    }

    /// Connects to a server with explicit settings.
    pub async fn connect_with_config(config: ConnectionConfig) -> Result<Self, ClientError> {
        let mut connection = Connection::new(config);
        connection.connect().await?;
        Ok(Self { connection })
    }

    /// Sends one frame and returns its echo.
    pub async fn echo(&mut self, payload: &[u8]) -> Result<Bytes, ClientError> {
        self.connection.echo(payload).await
    }

    /// Round-trips a small probe frame; succeeds when the echo matches.
    pub async fn ping(&mut self) -> Result<(), ClientError> {
        let reply = self.connection.echo(PROBE).await?;
        if reply.as_ref() != PROBE {
            return Err(ClientError::EchoMismatch);
        }
        Ok(())
    }

    /// Returns whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Closes the connection.
    pub async fn close(&mut self) -> Result<(), ClientError> {
        self.connection.close().await
    }
}
