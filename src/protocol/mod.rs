//! RESP Protocol Implementation
//!
//! This module is the frame codec of the client: it encodes commands into
//! the Redis Serialization Protocol (RESP) and decodes the server's replies.
//!
//! ## Modules
//!
//! - `types`: Defines the `RespValue` reply enum and its serialization
//! - `parser`: Incremental, zero-copy reply parser
//! - `encoder`: Command encoding (arrays of bulk strings)
//!
//! ## Example
//!
//! ```
//! use flashkv_client::protocol::{decode, encode_command, RespValue};
//!
//! let frame = encode_command(&["GET", "name"]).unwrap();
//! assert_eq!(frame, b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n");
//!
//! let (reply, consumed) = decode(b"$4\r\nAriz\r\n").unwrap();
//! assert_eq!(reply, RespValue::bulk_string("Ariz"));
//! assert_eq!(consumed, 10);
//! ```

pub mod encoder;
pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use encoder::{encode_command, encode_command_into};
pub use parser::{decode, ParseError, ParseResult, RespParser};
pub use types::RespValue;
