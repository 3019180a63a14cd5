//! Client Error Types
//!
//! Failures fall into a few groups that callers handle differently:
//!
//! - **Transport**: `Io`, `ConnectionClosed`, `UnexpectedEof`, `Timeout`,
//!   `Abandoned` and malformed replies (`Protocol`). The socket is dropped
//!   and the reconnect policy takes over.
//! - **Handshake**: `Auth` and `Select`. Retrying with the same endpoint
//!   cannot succeed, so these are never retried automatically.
//! - **Availability**: `NotConnected` while the client is between sockets.
//! - **Batch**: `PipelineIncomplete` carries the replies read before a
//!   pipeline failed.
//!
//! A `-ERR` reply from the server is not an error at this level; it is
//! returned as [`RespValue::Error`](crate::protocol::RespValue::Error).

use crate::protocol::{ParseError, RespValue};
use std::time::Duration;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed reply from the server
    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    /// The command could not be encoded
    #[error("invalid command: {0}")]
    InvalidCommand(ParseError),

    /// The server closed the connection
    #[error("connection closed by server")]
    ConnectionClosed,

    /// The server closed the connection in the middle of a reply
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// No usable connection at the moment
    #[error("not connected")]
    NotConnected,

    /// AUTH was rejected
    #[error("authentication failed: {0}")]
    Auth(String),

    /// SELECT was rejected
    #[error("failed to select database {database}: {message}")]
    Select { database: u32, message: String },

    /// A cancelled request left replies unread on the connection
    #[error("connection abandoned with unread replies")]
    Abandoned,

    /// An operation did not finish within its deadline
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// A pipeline failed after some of its replies were read
    #[error("pipeline incomplete: received {} of {expected} replies: {source}", .replies.len())]
    PipelineIncomplete {
        replies: Vec<RespValue>,
        expected: usize,
        #[source]
        source: Box<ClientError>,
    },
}

impl ClientError {
    /// Returns true when the connection that produced this error can no
    /// longer be used.
    pub fn is_transport(&self) -> bool {
        match self {
            ClientError::Io(_)
            | ClientError::Protocol(_)
            | ClientError::ConnectionClosed
            | ClientError::UnexpectedEof
            | ClientError::Abandoned
            | ClientError::Timeout(_) => true,
            ClientError::PipelineIncomplete { source, .. } => source.is_transport(),
            _ => false,
        }
    }

    /// Returns true for handshake rejections, which are never retried.
    pub fn is_handshake(&self) -> bool {
        matches!(self, ClientError::Auth(_) | ClientError::Select { .. })
    }
}
