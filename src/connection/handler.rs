//! Connection Handler Module
//!
//! This module handles individual client connections to SimpleDB.
//! Each client gets its own handler task that runs in a loop,
//! reading requests and sending replies.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Read bytes from socket  │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Decode one frame        │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Execute command         │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Encode + flush reply    │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Client disconnects / framing error
//!        │
//!        ▼
//! 5. Handler task ends
//! ```
//!
//! ## Error Handling
//!
//! - A command error is sent back as an error frame and the loop continues.
//! - A clean close between frames ends the session quietly.
//! - A decode failure, or a close in the middle of a frame, ends the session
//!   without a reply: the remaining bytes can no longer be trusted to start
//!   at a frame boundary.
//!
//! ## Buffer Management
//!
//! Incoming bytes accumulate in a `BytesMut` buffer. TCP is a stream protocol,
//! so a read may hold part of a frame or several frames; frames are decoded
//! and answered strictly in arrival order.

use crate::commands::CommandHandler;
use crate::protocol::{ParseError, RespParser, RespValue};
use bytes::{Buf, BytesMut};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, error, info, trace, warn};

/// Default cap on buffered, not yet decoded bytes: one maximum-size bulk
/// string plus room for its header.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = crate::protocol::parser::MAX_BULK_SIZE + 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Per-connection limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Largest partial frame the session will buffer
    pub max_buffer_size: usize,
    /// Maximum array/map nesting, `None` for unbounded
    pub max_depth: Option<usize>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            max_depth: None,
        }
    }
}

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single client connection.
///
/// Generic over the byte stream so the same loop serves a `TcpStream` in
/// production and an in-memory mock in tests.
pub struct ConnectionHandler<S> {
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// The command handler (shared across connections)
    command_handler: CommandHandler,

    parser: RespParser,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,

    max_buffer_size: usize,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The byte stream for this connection
    /// * `addr` - The client's socket address
    /// * `command_handler` - The command handler for executing commands
    /// * `stats` - Shared connection statistics
    /// * `config` - Buffer and nesting limits
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
        config: ConnectionConfig,
    ) -> Self {
        stats.connection_opened();

        let parser = match config.max_depth {
            Some(depth) => RespParser::with_max_depth(depth),
            None => RespParser::new(),
        };

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            parser,
            stats,
            max_buffer_size: config.max_buffer_size,
        }
    }

    /// Runs the connection until it ends and returns why it ended.
    ///
    /// An orderly close by the peer is
    /// [`ConnectionError::ClientDisconnected`]; see
    /// [`ConnectionError::is_disconnect`].
    pub async fn run(mut self) -> ConnectionError {
        info!(client = %self.addr, "Client connected");

        let reason = match self.main_loop().await {
            Ok(never) => match never {},
            Err(e) => e,
        };

        match &reason {
            ConnectionError::ClientDisconnected => {
                info!(client = %self.addr, "Client disconnected")
            }
            ConnectionError::IoError(io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            ConnectionError::ParseError(_) | ConnectionError::UnexpectedEof => {
                warn!(client = %self.addr, error = %reason, "Framing error, closing connection")
            }
            _ => warn!(client = %self.addr, error = %reason, "Connection error"),
        }

        self.stats.connection_closed();
        reason
    }

    /// The main read-execute-respond loop. Only returns on error.
    async fn main_loop(&mut self) -> Result<Infallible, ConnectionError> {
        loop {
            while let Some(command) = self.try_parse_command()? {
                let response = self.command_handler.execute(command);
                self.stats.command_processed();

                self.send_response(&response).await?;
            }

            self.read_more_data().await?;
        }
    }

    /// Attempts to decode one frame from the buffer.
    fn try_parse_command(&mut self) -> Result<Option<RespValue>, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.parser.parse(&self.buffer) {
            Ok(Some((value, consumed))) => {
                self.buffer.advance(consumed);
                trace!(
                    client = %self.addr,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Parsed command"
                );
                Ok(Some(value))
            }
            Ok(None) => {
                trace!(
                    client = %self.addr,
                    buffered = self.buffer.len(),
                    "Incomplete command, need more data"
                );
                Ok(None)
            }
            Err(e) => Err(ConnectionError::ParseError(e)),
        }
    }

    /// Reads more data from the stream into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= self.max_buffer_size {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            if self.buffer.is_empty() {
                return Err(ConnectionError::ClientDisconnected);
            } else {
                return Err(ConnectionError::UnexpectedEof);
            }
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(())
    }

    /// Encodes and flushes one reply.
    async fn send_response(&mut self, response: &RespValue) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            bytes = bytes.len(),
            "Sent response"
        );
        Ok(())
    }
}

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The stream is not valid framing
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Client closed the stream between frames
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Client closed the stream in the middle of a frame
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,
}

impl ConnectionError {
    /// True for an orderly close by the peer.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, ConnectionError::ClientDisconnected)
    }
}

/// Handles a client connection.
///
/// This is a convenience function that creates a ConnectionHandler
/// and runs it to completion.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
    config: ConnectionConfig,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    ConnectionHandler::new(stream, addr, command_handler, stats, config)
        .run()
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageEngine;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_test::io::Builder;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn mock_handler(
        mock: tokio_test::io::Mock,
        config: ConnectionConfig,
    ) -> (ConnectionHandler<tokio_test::io::Mock>, Arc<StorageEngine>, Arc<ConnectionStats>) {
        let storage = Arc::new(StorageEngine::new());
        let stats = Arc::new(ConnectionStats::new());
        let handler = ConnectionHandler::new(
            mock,
            test_addr(),
            CommandHandler::new(Arc::clone(&storage)),
            Arc::clone(&stats),
            config,
        );
        (handler, storage, stats)
    }

    #[tokio::test]
    async fn test_get_missing() {
        let mock = Builder::new()
            .read(b"*2\r\n$3\r\nGET\r\n$7\r\nmissing\r\n")
            .write(b"$-1\r\n")
            .build();
        let (handler, _, _) = mock_handler(mock, ConnectionConfig::default());

        let reason = handler.run().await;
        assert!(matches!(reason, ConnectionError::ClientDisconnected));
    }

    #[tokio::test]
    async fn test_frame_split_across_reads() {
        let mock = Builder::new()
            .read(b"*3\r\n$3\r\nSE")
            .read(b"T\r\n$1\r\na\r\n$")
            .read(b"1\r\n1\r\n")
            .write(b"+OK\r\n")
            .read(b"*2\r\n$3\r\nGET\r\n$1\r\na\r\n")
            .write(b"$1\r\n1\r\n")
            .build();
        let (handler, storage, _) = mock_handler(mock, ConnectionConfig::default());

        assert!(handler.run().await.is_disconnect());
        assert_eq!(storage.get(b"a"), Some(RespValue::bulk_string("1")));
    }

    #[tokio::test]
    async fn test_command_error_keeps_connection_open() {
        let mock = Builder::new()
            .read(b"*1\r\n$3\r\nFOO\r\n")
            .write(b"-unrecognized command 'FOO'\r\n")
            .read(b"*1\r\n$3\r\nGET\r\n")
            .write(b"-wrong number of arguments\r\n")
            .read(b"*0\r\n")
            .write(b"-bad request\r\n")
            .read(b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n")
            .write(b"+OK\r\n")
            .build();
        let (handler, _, stats) = mock_handler(mock, ConnectionConfig::default());

        assert!(handler.run().await.is_disconnect());
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 4);
    }

    #[tokio::test]
    async fn test_pipelined_requests_answered_in_order() {
        let mock = Builder::new()
            .read(b"*5\r\n$4\r\nMSET\r\n$1\r\na\r\n$1\r\n1\r\n$1\r\nb\r\n$1\r\n2\r\n*4\r\n$4\r\nMGET\r\n$1\r\na\r\n$7\r\nmissing\r\n$1\r\nb\r\n*3\r\n$6\r\nDELETE\r\n$1\r\na\r\n$7\r\nmissing\r\n")
            .write(b":2\r\n")
            .write(b"*3\r\n$1\r\n1\r\n$-1\r\n$1\r\n2\r\n")
            .write(b":1\r\n")
            .build();
        let (handler, _, _) = mock_handler(mock, ConnectionConfig::default());

        assert!(handler.run().await.is_disconnect());
    }

    #[tokio::test]
    async fn test_large_request_in_small_reads() {
        let pairs = 40_000;
        let mut frame = format!("*{}\r\n$4\r\nMSET\r\n", 1 + pairs * 2).into_bytes();
        for i in 0..pairs {
            frame.extend_from_slice(format!("$6\r\nk{:05}\r\n:{}\r\n", i, i).as_bytes());
        }

        let mut builder = Builder::new();
        for chunk in frame.chunks(1024) {
            builder.read(chunk);
        }
        builder.write(format!(":{}\r\n", pairs).as_bytes());
        let (handler, storage, stats) =
            mock_handler(builder.build(), ConnectionConfig::default());

        assert!(handler.run().await.is_disconnect());
        assert_eq!(storage.len(), pairs as u64);
        assert_eq!(storage.get(b"k39999"), Some(RespValue::integer(39_999)));
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 1);
        assert_eq!(stats.bytes_read.load(Ordering::Relaxed), frame.len() as u64);
    }

    #[tokio::test]
    async fn test_bad_prefix_closes_without_reply() {
        let mock = Builder::new()
            .read(b"*1\r\n$5\r\nFLUSH\r\n")
            .write(b":0\r\n")
            .read(b"GET x\r\n")
            .build();
        let (handler, _, stats) = mock_handler(mock, ConnectionConfig::default());

        let reason = handler.run().await;
        assert!(matches!(
            reason,
            ConnectionError::ParseError(ParseError::UnknownPrefix(b'G'))
        ));
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_eof_mid_frame() {
        let mock = Builder::new().read(b"*2\r\n$3\r\nGET\r\n$5\r\nab").build();
        let (handler, _, _) = mock_handler(mock, ConnectionConfig::default());

        let reason = handler.run().await;
        assert!(matches!(reason, ConnectionError::UnexpectedEof));
    }

    #[tokio::test]
    async fn test_max_depth() {
        let mock = Builder::new().read(b"*1\r\n*1\r\n*1\r\n:1\r\n").build();
        let config = ConnectionConfig {
            max_depth: Some(2),
            ..ConnectionConfig::default()
        };
        let (handler, _, _) = mock_handler(mock, config);

        let reason = handler.run().await;
        assert!(matches!(
            reason,
            ConnectionError::ParseError(ParseError::NestingTooDeep(2))
        ));
    }

    #[tokio::test]
    async fn test_buffer_limit() {
        let mock = Builder::new().read(b"$100\r\n0123456789").build();
        let config = ConnectionConfig {
            max_buffer_size: 8,
            ..ConnectionConfig::default()
        };
        let (handler, _, _) = mock_handler(mock, config);

        let reason = handler.run().await;
        assert!(matches!(reason, ConnectionError::BufferFull));
    }

    #[tokio::test]
    async fn test_read_error() {
        let mock = Builder::new()
            .read_error(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let (handler, _, _) = mock_handler(mock, ConnectionConfig::default());

        let reason = handler.run().await;
        assert!(matches!(reason, ConnectionError::IoError(_)));
    }

    async fn create_test_server() -> (SocketAddr, Arc<StorageEngine>, Arc<ConnectionStats>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let storage = Arc::new(StorageEngine::new());
        let stats = Arc::new(ConnectionStats::new());

        let storage_clone = Arc::clone(&storage);
        let stats_clone = Arc::clone(&stats);

        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                let handler = CommandHandler::new(Arc::clone(&storage_clone));
                let stats = Arc::clone(&stats_clone);
                tokio::spawn(handle_connection(
                    stream,
                    client_addr,
                    handler,
                    stats,
                    ConnectionConfig::default(),
                ));
            }
        });

        (addr, storage, stats)
    }

    async fn read_exact_reply(client: &mut TcpStream, expected: &[u8]) {
        let mut buf = vec![0u8; expected.len()];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, expected);
    }

    #[tokio::test]
    async fn test_set_get_over_tcp() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$5\r\nalice\r\n")
            .await
            .unwrap();
        read_exact_reply(&mut client, b"+OK\r\n").await;

        client
            .write_all(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
            .await
            .unwrap();
        read_exact_reply(&mut client, b"$5\r\nalice\r\n").await;
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let (addr, _, stats) = create_test_server().await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);

        let mut client = TcpStream::connect(addr).await.unwrap();

        // Give the server time to accept the connection
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);

        client.write_all(b"*1\r\n$5\r\nFLUSH\r\n").await.unwrap();
        read_exact_reply(&mut client, b":0\r\n").await;

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert!(stats.commands_processed.load(Ordering::Relaxed) >= 1);
        assert!(stats.bytes_read.load(Ordering::Relaxed) > 0);
        assert!(stats.bytes_written.load(Ordering::Relaxed) > 0);

        drop(client);

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }
}
