//! # FlashKV Client - An Async RESP Client Core
//!
//! `flashkv-client` talks to FlashKV, Redis, or any other server that speaks
//! the Redis Serialization Protocol (RESP). It owns a single connection per
//! client, keeps replies matched to requests, batches commands into
//! pipelines and reconnects after socket failures.
//!
//! ## Features
//!
//! - **RESP Codec**: Binary-safe command encoding and incremental reply parsing
//! - **Handshake**: AUTH (including ACL user names) and SELECT on every connect
//! - **Ordered Queries**: Concurrent callers are serialized per connection
//! - **Pipelines**: N commands in one write, N replies in order
//! - **Reconnects**: No-reconnect or fixed-interval retry policies
//! - **Async I/O**: Built on Tokio
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           flashkv-client                                │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │   Client    │───>│   Session   │───>│ Connection  │───> TCP          │
//! │  │ query/pipe  │    │ (Mutex)     │    │ send/recv   │                  │
//! │  └─────────────┘    └──────▲──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            │                  ▼                         │
//! │  ┌─────────────────────────┴──────┐    ┌─────────────┐                  │
//! │  │        Reconnect task          │    │    RESP     │                  │
//! │  │   (Background Tokio Task)      │    │   Codec     │                  │
//! │  └────────────────────────────────┘    └─────────────┘                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use flashkv_client::{Client, Endpoint, ReconnectPolicy, RespValue};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), flashkv_client::ClientError> {
//!     let endpoint = Endpoint::new("127.0.0.1", 6379).database(1);
//!     let client = Client::connect(endpoint, ReconnectPolicy::interval_millis(100)).await?;
//!
//!     let reply = client.query(&["SET", "name", "Ariz"]).await?;
//!     assert_eq!(reply, RespValue::ok());
//!
//!     let replies = client
//!         .query_pipe(&[vec!["GET", "name"], vec!["GET", "missing"]])
//!         .await?;
//!     assert_eq!(replies, vec![RespValue::bulk_string("Ariz"), RespValue::Null]);
//!
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP encoder, parser and reply types
//! - [`connection`]: One socket, its handshake and raw frame I/O
//! - [`client`]: Dispatcher, pipelines and the reconnect supervisor
//! - [`config`]: Endpoint, reconnect policy and timeouts
//! - [`error`]: Error taxonomy
//!
//! ## Design Highlights
//!
//! ### Ordering Without Request IDs
//!
//! RESP has no request IDs; the server answers in the order it read. A
//! query holds the session lock from its write until its reply is read, so
//! replies can never be handed to the wrong caller.
//!
//! ### Errors Are Not Retried
//!
//! A failed command is never sent again, since it may already have run on
//! the server. Only the connection is re-established; the caller decides
//! whether to repeat the command.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;

// Re-export commonly used types for convenience
pub use client::{Client, Pipeline};
pub use config::{ClientConfig, Endpoint, ReconnectPolicy};
pub use connection::{ConnectionState, StatsSnapshot};
pub use error::{ClientError, ClientResult};
pub use protocol::{ParseError, RespValue};

/// The default port of a Redis-compatible server
pub const DEFAULT_PORT: u16 = 6379;

/// The default host the client connects to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of the client
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
