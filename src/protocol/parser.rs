//! Incremental RESP Reply Parser
//!
//! Replies arrive over a TCP stream, so a single read may hold half a reply
//! or several replies at once. The parser works on whatever bytes are
//! buffered and reports one of three outcomes:
//! - `Ok(Some((value, consumed)))` - a complete reply, `consumed` bytes were used
//! - `Ok(None)` - the reply is not fully buffered yet
//! - `Err(ParseError)` - the bytes are not valid RESP
//!
//! The caller appends network data to a buffer, calls [`RespParser::parse`],
//! advances the buffer by `consumed` on success and reads more on `None`.
//! [`decode`] is the strict variant that turns `None` into
//! [`ParseError::Incomplete`].

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use std::num::ParseIntError;
use thiserror::Error;

/// Errors that can occur while encoding or decoding RESP.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Not enough bytes buffered for a complete frame
    #[error("incomplete frame")]
    Incomplete,

    /// Unknown type prefix byte
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    /// Invalid integer format
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid UTF-8 in a simple string or error message
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length is negative (but not -1 for null)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative (but not -1 for null)
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Protocol violation (missing CRLF, etc.)
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The message exceeds maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// A command needs at least one argument
    #[error("empty command")]
    EmptyCommand,
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting depth (prevent stack overflow)
pub const MAX_NESTING_DEPTH: usize = 512;

/// Maximum length of a status, error or length line (64 KB, same as Redis)
pub const MAX_INLINE_SIZE: usize = 64 * 1024;

/// A zero-copy RESP reply parser.
///
/// # Example
///
/// ```
/// use flashkv_client::protocol::{RespParser, RespValue};
///
/// let mut parser = RespParser::new();
/// let buffer = b"+OK\r\n:1\r\n";
///
/// let (value, consumed) = parser.parse(buffer).unwrap().unwrap();
/// assert_eq!(value, RespValue::ok());
/// assert_eq!(consumed, 5);
/// ```
#[derive(Debug, Clone)]
pub struct RespParser {
    /// Deepest array nesting accepted before failing
    max_depth: usize,
}

impl Default for RespParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RespParser {
    /// Creates a new parser instance.
    pub fn new() -> Self {
        Self {
            max_depth: MAX_NESTING_DEPTH,
        }
    }

    /// Creates a parser with a custom nesting limit.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Attempts to parse one RESP value from the front of `buf`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some((value, consumed)))` - Successfully parsed a value
    /// - `Ok(None)` - Incomplete data, need more bytes
    /// - `Err(e)` - Parse error
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        self.parse_value(buf, 0)
    }

    fn parse_value(&self, buf: &[u8], depth: usize) -> ParseResult<Option<(RespValue, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        if depth > self.max_depth {
            return Err(ParseError::Protocol(format!(
                "maximum nesting depth exceeded: {}",
                self.max_depth
            )));
        }

        match buf[0] {
            prefix::SIMPLE_STRING => parse_line(buf).map(|line| {
                line.map(|(s, consumed)| (RespValue::SimpleString(s.to_string()), consumed))
            }),
            prefix::ERROR => parse_line(buf)
                .map(|line| line.map(|(s, consumed)| (RespValue::Error(s.to_string()), consumed))),
            prefix::INTEGER => self.parse_integer(buf),
            prefix::BULK_STRING => self.parse_bulk_string(buf),
            prefix::ARRAY => self.parse_array(buf, depth),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    /// Parses an integer: `:<integer>\r\n`
    fn parse_integer(&self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        match parse_length_line(buf)? {
            Some((n, consumed)) => Ok(Some((RespValue::Integer(n), consumed))),
            None => Ok(None),
        }
    }

    /// Parses a bulk string: `$<length>\r\n<data>\r\n`
    fn parse_bulk_string(&self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let (length, header) = match parse_length_line(buf)? {
            Some(parsed) => parsed,
            None => return Ok(None),
        };

        if length == -1 {
            return Ok(Some((RespValue::Null, header)));
        }
        if length < 0 {
            return Err(ParseError::InvalidBulkLength(length));
        }

        let length = length as usize;
        if length > MAX_BULK_SIZE {
            return Err(ParseError::MessageTooLarge {
                size: length,
                max: MAX_BULK_SIZE,
            });
        }

        let total_needed = header + length + 2;
        if buf.len() < total_needed {
            return Ok(None);
        }

        if &buf[header + length..total_needed] != CRLF {
            return Err(ParseError::Protocol(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        let data = Bytes::copy_from_slice(&buf[header..header + length]);
        Ok(Some((RespValue::BulkString(data), total_needed)))
    }

    /// Parses an array: `*<count>\r\n<elements...>`
    fn parse_array(&self, buf: &[u8], depth: usize) -> ParseResult<Option<(RespValue, usize)>> {
        let (count, header) = match parse_length_line(buf)? {
            Some(parsed) => parsed,
            None => return Ok(None),
        };

        if count == -1 {
            return Ok(Some((RespValue::Null, header)));
        }
        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }

        let count = count as usize;
        // Never trust the declared count for the allocation size.
        let mut elements = Vec::with_capacity(count.min(1024));
        let mut consumed = header;

        for _ in 0..count {
            match self.parse_value(&buf[consumed..], depth + 1)? {
                Some((value, element_consumed)) => {
                    elements.push(value);
                    consumed += element_consumed;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((RespValue::Array(elements), consumed)))
    }
}

/// Reads a `<prefix><text>\r\n` line and returns the text plus bytes consumed.
///
/// A line longer than [`MAX_INLINE_SIZE`] fails even before its CRLF arrives.
fn parse_line(buf: &[u8]) -> ParseResult<Option<(&str, usize)>> {
    let body = &buf[1..];
    let window = &body[..body.len().min(MAX_INLINE_SIZE + 2)];
    match find_crlf(window) {
        Some(pos) => {
            let s = std::str::from_utf8(&body[..pos])
                .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
            // +1 for prefix, +2 for CRLF
            Ok(Some((s, 1 + pos + 2)))
        }
        // Only a `\r` in the last allowed position may still be completed.
        None if body.len() > MAX_INLINE_SIZE + 1
            || (body.len() == MAX_INLINE_SIZE + 1 && body[MAX_INLINE_SIZE] != b'\r') =>
        {
            Err(ParseError::MessageTooLarge {
                size: body.len(),
                max: MAX_INLINE_SIZE,
            })
        }
        None => Ok(None),
    }
}

/// Reads a `<prefix><integer>\r\n` line.
fn parse_length_line(buf: &[u8]) -> ParseResult<Option<(i64, usize)>> {
    match parse_line(buf)? {
        Some((s, consumed)) => {
            let n: i64 = s
                .parse()
                .map_err(|e: ParseIntError| ParseError::InvalidInteger(e.to_string()))?;
            Ok(Some((n, consumed)))
        }
        None => Ok(None),
    }
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Parses a single RESP value that must already be fully buffered.
///
/// Returns the value and the number of bytes it occupied. Fails with
/// [`ParseError::Incomplete`] when more bytes are needed.
pub fn decode(buf: &[u8]) -> ParseResult<(RespValue, usize)> {
    RespParser::new().parse(buf)?.ok_or(ParseError::Incomplete)
}
