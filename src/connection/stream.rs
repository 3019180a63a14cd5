//! A Single Server Connection
//!
//! [`Connection`] owns one socket to the server together with its read
//! buffer and parser. It knows how to log in (AUTH/SELECT), write a frame
//! and read back one reply; it knows nothing about locking or reconnects.
//!
//! ## Lifecycle
//!
//! ```text
//! 1. TCP connect (TCP_NODELAY on)
//!        │
//!        ▼
//! 2. AUTH [user] <password>      (only with a password)
//!        │
//!        ▼
//! 3. SELECT <db>                 (only for db != 0)
//!        │
//!        ▼
//! 4. Connected: send / receive until the socket fails
//! ```
//!
//! A connection object only exists after step 3 succeeded, so a failed
//! handshake never leaves a half-initialized connection behind.
//!
//! ## Buffer Management
//!
//! Replies are accumulated in a `BytesMut`. A single read may deliver a
//! partial reply or several replies at once (pipelines), so leftover bytes
//! stay buffered for the next `receive`.
//!
//! A partial reply is only parsed again once a new CRLF has arrived, since
//! no reply can complete without one. Large array replies therefore cost
//! one parse per terminated chunk instead of one per read.

use crate::config::Endpoint;
use crate::connection::stats::ClientStats;
use crate::error::{ClientError, ClientResult};
use crate::protocol::parser::MAX_INLINE_SIZE;
use crate::protocol::types::CRLF;
use crate::protocol::{encode_command, RespParser, RespValue};
use bytes::BytesMut;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, info, trace};

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Connection state as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// One handshaken connection to the server.
pub struct Connection<S = TcpStream> {
    /// The socket, buffered for writes
    stream: BufWriter<S>,

    /// Server address (for logging)
    peer: String,

    /// Bytes read but not yet decoded
    buffer: BytesMut,

    parser: RespParser,

    /// Buffer length at the last parse that found no complete reply
    scanned: usize,

    /// Set while a request's replies are still owed by the server
    in_flight: bool,

    stats: Arc<ClientStats>,
}

impl Connection<TcpStream> {
    /// Opens a TCP connection and performs the handshake.
    ///
    /// `connect_timeout` bounds the TCP connect and the handshake together.
    pub async fn connect(
        endpoint: &Endpoint,
        connect_timeout: Option<Duration>,
        stats: Arc<ClientStats>,
    ) -> ClientResult<Self> {
        match connect_timeout {
            Some(limit) => tokio::time::timeout(limit, Self::open(endpoint, stats))
                .await
                .map_err(|_| ClientError::Timeout(limit))?,
            None => Self::open(endpoint, stats).await,
        }
    }

    async fn open(endpoint: &Endpoint, stats: Arc<ClientStats>) -> ClientResult<Self> {
        let addr = endpoint.addr();
        debug!(peer = %addr, "Opening connection");

        let stream = TcpStream::connect(&addr).await?;
        // Disable Nagle to keep request latency low for small payloads.
        stream.set_nodelay(true)?;

        let mut conn = Connection::new(stream, addr, stats);
        conn.handshake(endpoint).await?;

        conn.stats.connection_opened();
        info!(peer = %conn.peer, database = endpoint.database, "Connected");
        Ok(conn)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    /// Wraps an already opened stream. No handshake is performed.
    pub fn new(stream: S, peer: impl Into<String>, stats: Arc<ClientStats>) -> Self {
        Self {
            stream: BufWriter::new(stream),
            peer: peer.into(),
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser: RespParser::new(),
            scanned: 0,
            in_flight: false,
            stats,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// True when a request was written but not all of its replies were
    /// read, e.g. because the caller's future was dropped. Such a
    /// connection is out of step with the server and must not be reused.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Marks the start of a request. Call before the first byte is written.
    pub(crate) fn begin_request(&mut self) {
        self.in_flight = true;
    }

    /// Marks the last expected reply of a request as read.
    pub(crate) fn end_request(&mut self) {
        self.in_flight = false;
    }

    /// Runs AUTH and SELECT as required by the endpoint.
    pub async fn handshake(&mut self, endpoint: &Endpoint) -> ClientResult<()> {
        if let Some(password) = &endpoint.password {
            let reply = match &endpoint.username {
                Some(user) => {
                    self.command(&[&b"AUTH"[..], user.as_bytes(), password.as_bytes()])
                        .await?
                }
                None => self.command(&[&b"AUTH"[..], password.as_bytes()]).await?,
            };
            if !reply.is_ok() {
                return Err(ClientError::Auth(describe(reply)));
            }
            debug!(peer = %self.peer, "Authenticated");
        }

        if endpoint.database != 0 {
            let database = endpoint.database.to_string();
            let reply = self.command(&["SELECT", database.as_str()]).await?;
            if !reply.is_ok() {
                return Err(ClientError::Select {
                    database: endpoint.database,
                    message: describe(reply),
                });
            }
            debug!(peer = %self.peer, database = endpoint.database, "Selected database");
        }

        Ok(())
    }

    async fn command<A: AsRef<[u8]>>(&mut self, args: &[A]) -> ClientResult<RespValue> {
        let frame = encode_command(args).map_err(ClientError::InvalidCommand)?;
        self.send(&frame).await?;
        self.receive().await
    }

    /// Writes one or more encoded frames and flushes them.
    pub async fn send(&mut self, frame: &[u8]) -> ClientResult<()> {
        self.stream.write_all(frame).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(frame.len());
        trace!(peer = %self.peer, bytes = frame.len(), "Sent frame");
        Ok(())
    }

    /// Reads until one complete reply is decoded.
    pub async fn receive(&mut self) -> ClientResult<RespValue> {
        loop {
            if self.worth_parsing() {
                if let Some((value, consumed)) = self.parser.parse(&self.buffer)? {
                    let _ = self.buffer.split_to(consumed);
                    self.scanned = 0;
                    self.stats.reply_received();
                    trace!(
                        peer = %self.peer,
                        consumed = consumed,
                        remaining = self.buffer.len(),
                        "Parsed reply"
                    );
                    return Ok(value);
                }
                self.scanned = self.buffer.len();
            }

            if self.buffer.capacity() - self.buffer.len() < 1024 {
                self.buffer.reserve(INITIAL_BUFFER_SIZE);
            }

            let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
            if n == 0 {
                return Err(if self.buffer.is_empty() {
                    ClientError::ConnectionClosed
                } else {
                    ClientError::UnexpectedEof
                });
            }

            self.stats.bytes_read(n);
            trace!(peer = %self.peer, bytes = n, "Read data");
        }
    }

    /// Whether the bytes read since the last failed parse could complete a
    /// reply: they must complete a CRLF, or be long enough for the line
    /// limit to apply.
    fn worth_parsing(&self) -> bool {
        let fresh = self.buffer.len().saturating_sub(self.scanned);
        if fresh == 0 {
            return false;
        }
        // An unterminated line now exceeds the limit and fails the parse.
        if fresh > MAX_INLINE_SIZE + 2 {
            return true;
        }
        let start = self.scanned.saturating_sub(1);
        self.buffer[start..].windows(2).any(|w| w == CRLF)
    }

    /// Closes the write half of the socket.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!(peer = %self.peer, error = %e, "Error while closing connection");
        }
    }
}

/// Text of a rejected handshake reply.
fn describe(reply: RespValue) -> String {
    match reply {
        RespValue::Error(message) => message,
        other => format!("unexpected reply: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    fn mock_conn(mock: tokio_test::io::Mock) -> Connection<tokio_test::io::Mock> {
        Connection::new(mock, "mock", Arc::new(ClientStats::new()))
    }

    #[tokio::test]
    async fn test_handshake_auth_and_select() {
        let mock = Builder::new()
            .write(b"*2\r\n$4\r\nAUTH\r\n$6\r\nsecret\r\n")
            .read(b"+OK\r\n")
            .write(b"*2\r\n$6\r\nSELECT\r\n$1\r\n3\r\n")
            .read(b"+OK\r\n")
            .build();
        let endpoint = Endpoint::default().password("secret").database(3);

        let mut conn = mock_conn(mock);
        conn.handshake(&endpoint).await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_acl_auth() {
        let mock = Builder::new()
            .write(b"*3\r\n$4\r\nAUTH\r\n$3\r\napp\r\n$2\r\npw\r\n")
            .read(b"+OK\r\n")
            .build();
        let endpoint = Endpoint::default().username("app").password("pw");

        let mut conn = mock_conn(mock);
        conn.handshake(&endpoint).await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_skipped_for_defaults() {
        let mut conn = mock_conn(Builder::new().build());
        conn.handshake(&Endpoint::default()).await.unwrap();
    }

    #[tokio::test]
    async fn test_auth_rejected() {
        let mock = Builder::new()
            .write(b"*2\r\n$4\r\nAUTH\r\n$5\r\nwrong\r\n")
            .read(b"-WRONGPASS invalid username-password pair\r\n")
            .build();
        let endpoint = Endpoint::default().password("wrong").database(1);

        let mut conn = mock_conn(mock);
        let err = conn.handshake(&endpoint).await.unwrap_err();
        match err {
            ClientError::Auth(message) => assert!(message.starts_with("WRONGPASS")),
            other => panic!("expected auth error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_select_rejected() {
        let mock = Builder::new()
            .write(b"*2\r\n$6\r\nSELECT\r\n$2\r\n99\r\n")
            .read(b"-ERR DB index is out of range\r\n")
            .build();
        let endpoint = Endpoint::default().database(99);

        let mut conn = mock_conn(mock);
        let err = conn.handshake(&endpoint).await.unwrap_err();
        assert!(matches!(err, ClientError::Select { database: 99, .. }));
        assert!(err.is_handshake());
    }

    #[tokio::test]
    async fn test_receive_split_reply() {
        let mock = Builder::new()
            .read(b"$5\r\nhel")
            .read(b"lo\r\n:4")
            .read(b"2\r\n")
            .build();

        let mut conn = mock_conn(mock);
        assert_eq!(conn.receive().await.unwrap(), RespValue::bulk_string("hello"));
        assert_eq!(conn.receive().await.unwrap(), RespValue::Integer(42));
        assert_eq!(conn.stats.snapshot().replies_received, 2);
    }

    #[tokio::test]
    async fn test_receive_array_in_many_chunks() {
        let mut mock = Builder::new();
        mock.read(b"*3\r\n$3\r\nfo").read(b"o\r").read(b"\n$3\r").read(b"\nbar");
        mock.read(b"\r\n:7").read(b"\r\n+OK\r\n");
        let mut conn = mock_conn(mock.build());

        assert_eq!(
            conn.receive().await.unwrap(),
            RespValue::array(vec![
                RespValue::bulk_string("foo"),
                RespValue::bulk_string("bar"),
                RespValue::Integer(7),
            ])
        );
        assert_eq!(conn.receive().await.unwrap(), RespValue::ok());
    }

    #[test]
    fn test_parse_skipped_until_crlf_arrives() {
        let mut conn = mock_conn(Builder::new().build());
        assert!(!conn.worth_parsing());

        conn.buffer.extend_from_slice(b"$10\r\nabc");
        assert!(conn.worth_parsing());
        conn.scanned = conn.buffer.len();
        assert!(!conn.worth_parsing());

        // More payload without a terminator cannot complete the reply.
        conn.buffer.extend_from_slice(b"defg");
        assert!(!conn.worth_parsing());

        // A CR at the old end and LF in the new bytes form a terminator.
        conn.buffer.extend_from_slice(b"hij\r");
        conn.scanned = conn.buffer.len();
        conn.buffer.extend_from_slice(b"\n");
        assert!(conn.worth_parsing());
    }

    #[tokio::test]
    async fn test_unterminated_line_fails() {
        let mut line = vec![b'+'];
        line.extend(std::iter::repeat(b'x').take(MAX_INLINE_SIZE + 8));
        let (mut server, client) = tokio::io::duplex(4 * MAX_INLINE_SIZE);
        server.write_all(&line).await.unwrap();
        let mut conn = Connection::new(client, "duplex", Arc::new(ClientStats::new()));

        let err = conn.receive().await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(crate::protocol::ParseError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn test_in_flight_marker() {
        let mut conn = mock_conn(Builder::new().build());
        assert!(!conn.is_in_flight());
        conn.begin_request();
        assert!(conn.is_in_flight());
        conn.end_request();
        assert!(!conn.is_in_flight());
    }

    #[tokio::test]
    async fn test_receive_eof() {
        let mut conn = mock_conn(Builder::new().build());
        assert!(matches!(
            conn.receive().await,
            Err(ClientError::ConnectionClosed)
        ));

        let mut conn = mock_conn(Builder::new().read(b"$5\r\nhe").build());
        assert!(matches!(
            conn.receive().await,
            Err(ClientError::UnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn test_receive_malformed() {
        let mut conn = mock_conn(Builder::new().read(b"?what\r\n").build());
        let err = conn.receive().await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_send_counts_bytes() {
        let frame = b"*1\r\n$4\r\nPING\r\n";
        let mut conn = mock_conn(Builder::new().write(frame).build());
        conn.send(frame).await.unwrap();
        assert_eq!(conn.stats.snapshot().bytes_written, frame.len() as u64);
    }
}
