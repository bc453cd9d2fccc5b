//! TCP server implementation.

use crate::config::Config;
use crate::error::ServerError;
use crate::session::Session;
use bytes::Bytes;
use echoframe_protocol::{
    Frame, ProtocolError, ReplyMode, DEFAULT_MAX_FRAME_SIZE, DEFAULT_PORT, LEN_PREFIX_SIZE,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Server configuration (runtime view).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Idle connection timeout, applied to header and body reads.
    pub idle_timeout: Duration,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Maximum frame payload size in bytes (0 = unlimited).
    pub max_frame_size: u32,
    /// Reply framing mode.
    pub reply_mode: ReplyMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            idle_timeout: Duration::from_secs(300),
            max_connections: 1024,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            reply_mode: ReplyMode::Raw,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_max_frame_size(mut self, max_frame_size: u32) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn with_reply_mode(mut self, reply_mode: ReplyMode) -> Self {
        self.reply_mode = reply_mode;
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }
}

impl From<&Config> for ServerConfig {
    fn from(config: &Config) -> Self {
        Self {
            bind_addr: config.network.bind_addr,
            idle_timeout: config.network.idle_timeout(),
            max_connections: config.network.max_connections,
            max_frame_size: config.limits.max_frame_size,
            reply_mode: config.limits.reply_mode,
        }
    }
}

/// Server statistics.
///
/// Observability counters only; never part of the per-connection data path.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub frames_total: AtomicU64,
    pub errors_total: AtomicU64,
}

/// Framed echo server.
///
/// Accepts stream connections and runs an independent receive-decode-echo
/// loop per connection. Connections share no mutable state.
pub struct Server {
    config: ServerConfig,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Runs the server.
    ///
    /// A bind failure is returned to the caller; nothing after a successful
    /// bind terminates the accept loop except shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);
        self.serve(listener).await
    }

    /// Runs the accept loop on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        self.running.store(true, Ordering::SeqCst);

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.stats.connections_active.load(Ordering::Relaxed)
                                >= self.config.max_connections as u64
                            {
                                tracing::warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

                            let stats = self.stats.clone();
                            let config = self.config.clone();

                            tokio::spawn(async move {
                                let mut stream = stream;
                                let mut session = Session::new(addr);
                                tracing::info!("Client connected: {} (session {})", addr, session.id);

                                if let Err(e) =
                                    Self::handle_connection(&mut stream, &mut session, &config)
                                        .await
                                {
                                    tracing::warn!("[{}] Connection error: {}", addr, e);
                                    stats.errors_total.fetch_add(1, Ordering::Relaxed);
                                }

                                // Closed exactly once whichever state ended the
                                // loop; a close error only gets logged.
                                if let Err(e) = stream.shutdown().await {
                                    tracing::debug!("[{}] Error closing connection: {}", addr, e);
                                }

                                stats.frames_total
                                    .fetch_add(session.frame_count(), Ordering::Relaxed);
                                stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                                tracing::info!(
                                    "Client disconnected: {} ({} frames in {:?})",
                                    addr,
                                    session.frame_count(),
                                    session.age()
                                );
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Handles a single connection: read a length prefix, read the payload,
    /// echo it back, repeat until the peer closes or an error occurs.
    ///
    /// The protocol is half-duplex per connection: a frame's reply is fully
    /// written before the next header is read.
    async fn handle_connection<S>(
        mut stream: S,
        session: &mut Session,
        config: &ServerConfig,
    ) -> Result<(), ServerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            // A clean close between frames is the normal end of the connection.
            let payload_len =
                match with_idle_timeout(config.idle_timeout, read_header(&mut stream)).await? {
                    Some(len) => len,
                    None => return Ok(()),
                };

            if config.max_frame_size != 0 && payload_len > config.max_frame_size {
                return Err(ServerError::Protocol(ProtocolError::FrameTooLarge {
                    size: payload_len as u64,
                    max: config.max_frame_size,
                }));
            }

            let payload = with_idle_timeout(
                config.idle_timeout,
                read_body(&mut stream, payload_len as usize),
            )
            .await?;

            match config.reply_mode {
                ReplyMode::Raw => stream.write_all(&payload).await?,
                ReplyMode::Framed => {
                    let encoded = Frame::new(Bytes::from(payload)).encode()?;
                    stream.write_all(&encoded).await?;
                }
            }

            session.record_frame();
            tracing::debug!(
                "[{}] Echoed {} byte frame ({} on this connection)",
                session.remote_addr,
                payload_len,
                session.frame_count()
            );
        }
    }

    /// Initiates server shutdown. Stops new accepts; in-flight connections
    /// run to their natural completion.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }
}

/// Applies the idle timeout to a read step.
async fn with_idle_timeout<T>(
    idle_timeout: Duration,
    fut: impl Future<Output = Result<T, ServerError>>,
) -> Result<T, ServerError> {
    tokio::time::timeout(idle_timeout, fut)
        .await
        .map_err(|_| ServerError::IdleTimeout(idle_timeout))?
}

/// Reads the 4-byte length prefix.
///
/// Returns `Ok(None)` on a clean close at a frame boundary (zero bytes
/// delivered), `Ok(Some(len))` once all prefix bytes have arrived, or an
/// error for a partial prefix or a failed read.
async fn read_header<S>(stream: &mut S) -> Result<Option<u32>, ServerError>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; LEN_PREFIX_SIZE];
    let mut filled = 0;

    while filled < header.len() {
        let n = stream.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(ServerError::Truncated {
                got: filled,
                expected: header.len(),
            });
        }
        filled += n;
    }

    Ok(Some(u32::from_be_bytes(header)))
}

/// Reads exactly `len` payload bytes, accumulating across however many reads
/// it takes. A single read is never assumed to deliver everything.
async fn read_body<S>(stream: &mut S, len: usize) -> Result<Vec<u8>, ServerError>
where
    S: AsyncRead + Unpin,
{
    let mut body = vec![0u8; len];
    let mut filled = 0;

    while filled < len {
        let n = stream.read(&mut body[filled..]).await?;
        if n == 0 {
            return Err(ServerError::Truncated {
                got: filled,
                expected: len,
            });
        }
        filled += n;
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::net::TcpStream;
    use tokio_test::assert_ok;

    fn test_addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 12345)
    }

    async fn spawn_server(config: ServerConfig) -> (Arc<Server>, SocketAddr) {
        let server = Arc::new(Server::new(config));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let srv = server.clone();
        tokio::spawn(async move { srv.serve(listener).await });

        (server, addr)
    }

    fn frame_bytes(payload: &[u8]) -> Vec<u8> {
        let mut bytes = (payload.len() as u32).to_be_bytes().to_vec();
        bytes.extend_from_slice(payload);
        bytes
    }

    #[tokio::test]
    async fn test_echo_round_trip() {
        let (_server, addr) = spawn_server(ServerConfig::default()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream.write_all(&frame_bytes(b"hello")).await.unwrap();
        let mut reply = [0u8; 5];
        stream.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"hello");

        // The connection stays usable for the next frame
        stream.write_all(&frame_bytes(b"again")).await.unwrap();
        stream.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"again");
    }

    #[tokio::test]
    async fn test_concrete_scenario() {
        let (server, addr) = spawn_server(ServerConfig::default()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        // 0x00000005 "hello" -> "hello"
        stream
            .write_all(&[0x00, 0x00, 0x00, 0x05, b'h', b'e', b'l', b'l', b'o'])
            .await
            .unwrap();
        let mut reply = [0u8; 5];
        stream.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"hello");

        // 0x00000000 -> zero-byte reply, connection still open
        stream.write_all(&[0x00, 0x00, 0x00, 0x00]).await.unwrap();
        stream.write_all(&frame_bytes(b"x")).await.unwrap();
        let mut one = [0u8; 1];
        stream.read_exact(&mut one).await.unwrap();
        assert_eq!(&one, b"x");

        // Close at a frame boundary: no error on the server side
        drop(stream);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(server.stats().errors_total.load(Ordering::Relaxed), 0);
        assert_eq!(server.stats().frames_total.load(Ordering::Relaxed), 3);
        assert_eq!(server.stats().connections_active.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_fragmented_frame() {
        let (_server, addr) = spawn_server(ServerConfig::default()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        // Header one byte at a time, body in two halves
        for b in frame_bytes(b"fragmented")[..LEN_PREFIX_SIZE].iter() {
            stream.write_all(&[*b]).await.unwrap();
            stream.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        stream.write_all(b"fragm").await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        stream.write_all(b"ented").await.unwrap();

        let mut reply = [0u8; 10];
        stream.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"fragmented");
    }

    #[tokio::test]
    async fn test_sequencing() {
        let (_server, addr) = spawn_server(ServerConfig::default()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        // Two frames back to back in one write; replies must come whole and
        // in order
        let mut bytes = frame_bytes(b"first");
        bytes.extend_from_slice(&frame_bytes(b"second"));
        stream.write_all(&bytes).await.unwrap();

        let mut reply = [0u8; 11];
        stream.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"firstsecond");
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let config = ServerConfig::default().with_max_frame_size(1024);
        let (server, addr) = spawn_server(config).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        // Header claiming 1 MiB; the server closes without reading a body
        stream
            .write_all(&(1024u32 * 1024).to_be_bytes())
            .await
            .unwrap();

        let mut buf = [0u8; 16];
        let closed = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(closed, Ok(0) | Err(_)));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(server.stats().errors_total.load(Ordering::Relaxed), 1);
        assert!(server.is_running());
    }

    #[tokio::test]
    async fn test_cap_disabled_accepts_large_frames() {
        let config = ServerConfig::default().with_max_frame_size(0);
        let (_server, addr) = spawn_server(config).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        let payload = vec![0xa7u8; 128 * 1024];
        stream.write_all(&frame_bytes(&payload)).await.unwrap();

        let mut reply = vec![0u8; payload.len()];
        stream.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, payload);
    }

    #[tokio::test]
    async fn test_framed_reply_mode() {
        let config = ServerConfig::default().with_reply_mode(ReplyMode::Framed);
        let (_server, addr) = spawn_server(config).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream.write_all(&frame_bytes(b"hello")).await.unwrap();

        let mut reply = [0u8; LEN_PREFIX_SIZE + 5];
        stream.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply[..LEN_PREFIX_SIZE], &[0, 0, 0, 5]);
        assert_eq!(&reply[LEN_PREFIX_SIZE..], b"hello");
    }

    #[tokio::test]
    async fn test_isolation_under_fault() {
        let (server, addr) = spawn_server(ServerConfig::default()).await;

        // Well-behaved connection, opened first
        let mut good = TcpStream::connect(addr).await.unwrap();

        // Misbehaving connection: header promises 10 bytes, delivers 3
        let mut bad = TcpStream::connect(addr).await.unwrap();
        bad.write_all(&[0, 0, 0, 10]).await.unwrap();
        bad.write_all(b"abc").await.unwrap();
        bad.shutdown().await.unwrap();

        let mut buf = [0u8; 16];
        let closed = tokio::time::timeout(Duration::from_secs(5), bad.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(closed, Ok(0) | Err(_)));

        // The well-behaved connection is unaffected
        good.write_all(&frame_bytes(b"still here")).await.unwrap();
        let mut reply = [0u8; 10];
        good.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"still here");

        assert!(server.is_running());
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let config = ServerConfig::default().with_max_connections(1);
        let (_server, addr) = spawn_server(config).await;

        let mut first = TcpStream::connect(addr).await.unwrap();
        first.write_all(&frame_bytes(b"one")).await.unwrap();
        let mut reply = [0u8; 3];
        first.read_exact(&mut reply).await.unwrap();

        // Over the limit: accepted at the TCP level, then dropped
        let mut second = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 4];
        let closed = tokio::time::timeout(Duration::from_secs(5), second.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(closed, Ok(0) | Err(_)));

        // The first connection is unaffected
        first.write_all(&frame_bytes(b"two")).await.unwrap();
        first.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"two");
    }

    #[tokio::test]
    async fn test_idle_timeout_closes_connection() {
        let config = ServerConfig::default().with_idle_timeout(Duration::from_millis(100));
        let (server, addr) = spawn_server(config).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        // Send nothing; the server gives up on us
        let mut buf = [0u8; 16];
        let closed = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(closed, Ok(0) | Err(_)));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(server.stats().errors_total.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_accepts() {
        let (server, addr) = spawn_server(ServerConfig::default()).await;

        // Prove the accept loop is live before asking it to stop
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(&frame_bytes(b"ping")).await.unwrap();
        let mut reply = [0u8; 4];
        stream.read_exact(&mut reply).await.unwrap();

        server.shutdown();
        while server.is_running() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_clean_close_at_frame_boundary() {
        let (mut client, server_io) = tokio::io::duplex(1024);
        let config = ServerConfig::default();

        let handle = tokio::spawn(async move {
            let mut session = Session::new(test_addr());
            Server::handle_connection(server_io, &mut session, &config).await
        });

        client.write_all(&frame_bytes(b"hello")).await.unwrap();
        let mut reply = [0u8; 5];
        client.read_exact(&mut reply).await.unwrap();
        drop(client);

        tokio_test::assert_ok!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn test_partial_header_is_error() {
        let (mut client, server_io) = tokio::io::duplex(1024);
        let config = ServerConfig::default();

        let handle = tokio::spawn(async move {
            let mut session = Session::new(test_addr());
            Server::handle_connection(server_io, &mut session, &config).await
        });

        client.write_all(&[0, 0]).await.unwrap();
        drop(client);

        let result = handle.await.unwrap();
        assert!(matches!(
            result,
            Err(ServerError::Truncated { got: 2, expected: 4 })
        ));
    }

    #[tokio::test]
    async fn test_partial_body_is_error() {
        let (mut client, server_io) = tokio::io::duplex(1024);
        let config = ServerConfig::default();

        let handle = tokio::spawn(async move {
            let mut session = Session::new(test_addr());
            Server::handle_connection(server_io, &mut session, &config).await
        });

        client.write_all(&[0, 0, 0, 10]).await.unwrap();
        client.write_all(b"abc").await.unwrap();
        drop(client);

        let result = handle.await.unwrap();
        assert!(matches!(
            result,
            Err(ServerError::Truncated {
                got: 3,
                expected: 10
            })
        ));
    }

    #[tokio::test]
    async fn test_server_config_from_config() {
        let mut config = Config::default();
        config.limits.max_frame_size = 512;
        config.network.max_connections = 7;

        let server_config = ServerConfig::from(&config);
        assert_eq!(server_config.max_frame_size, 512);
        assert_eq!(server_config.max_connections, 7);
        assert_eq!(server_config.bind_addr, config.network.bind_addr);
    }
}
