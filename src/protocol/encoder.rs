//! Command Encoding
//!
//! Every command a client sends is a RESP array of bulk strings:
//!
//! ```text
//! SET foo bar  ->  *3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n
//! ```
//!
//! Arguments are written as raw bytes, so binary values (embedded CRLF,
//! NUL bytes, invalid UTF-8) need no escaping.

use crate::protocol::parser::{ParseError, ParseResult};
use crate::protocol::types::{prefix, CRLF};

/// Encodes a command into a fresh buffer.
///
/// # Example
///
/// ```
/// use flashkv_client::protocol::encode_command;
///
/// let frame = encode_command(&["GET", "key"]).unwrap();
/// assert_eq!(frame, b"*2\r\n$3\r\nGET\r\n$3\r\nkey\r\n");
/// ```
pub fn encode_command<A: AsRef<[u8]>>(args: &[A]) -> ParseResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(encoded_len(args));
    encode_command_into(args, &mut buf)?;
    Ok(buf)
}

/// Appends an encoded command to `buf`.
///
/// Nothing is written when the command is rejected.
pub fn encode_command_into<A: AsRef<[u8]>>(args: &[A], buf: &mut Vec<u8>) -> ParseResult<()> {
    if args.is_empty() {
        return Err(ParseError::EmptyCommand);
    }

    buf.push(prefix::ARRAY);
    buf.extend_from_slice(args.len().to_string().as_bytes());
    buf.extend_from_slice(CRLF);
    for arg in args {
        let arg = arg.as_ref();
        buf.push(prefix::BULK_STRING);
        buf.extend_from_slice(arg.len().to_string().as_bytes());
        buf.extend_from_slice(CRLF);
        buf.extend_from_slice(arg);
        buf.extend_from_slice(CRLF);
    }
    Ok(())
}

/// Upper bound on the encoded size, used to size buffers up front.
fn encoded_len<A: AsRef<[u8]>>(args: &[A]) -> usize {
    // prefix + up to 20 digits + CRLF per header line
    let header = 1 + 20 + 2;
    header + args.iter().map(|a| header + a.as_ref().len() + 2).sum::<usize>()
}
