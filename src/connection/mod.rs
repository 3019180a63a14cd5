//! Connection Module
//!
//! This module owns the socket-level side of the client: one TCP stream to
//! the server, the AUTH/SELECT handshake, and raw frame I/O. Locking,
//! request ordering and reconnects live one layer up in [`crate::client`].
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Connection                            │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ send(frame) │───>│  TcpStream  │───>│ read_buf    │      │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘      │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │ RespParser  │        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Async I/O**: Uses Tokio for non-blocking network operations
//! - **Buffer Management**: BytesMut buffer keeps partial and extra replies
//! - **Generic Streams**: Any `AsyncRead + AsyncWrite` works, which keeps
//!   the handshake testable without a server
//! - **Statistics**: Tracks bytes and replies per client

pub mod stats;
pub mod stream;

// Re-export commonly used types
pub use stats::{ClientStats, StatsSnapshot};
pub use stream::{Connection, ConnectionState};
