//! Incremental RESP Reply Decoder
//!
//! Replies arrive over TCP in arbitrary chunks, so decoding never assumes a
//! whole frame is present. [`decode`] looks at the front of a buffer and
//! returns:
//! - `Ok(Some((value, consumed)))` - a complete reply, `consumed` bytes long
//! - `Ok(None)` - the reply is not complete yet
//! - `Err(ParseError)` - the stream is not valid RESP
//!
//! After an error the connection is in an unknown state and must be dropped.

use crate::protocol::types::{RespValue, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur while decoding a reply.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    #[error("invalid integer: {0:?}")]
    InvalidInteger(String),

    /// Simple strings and error messages must be UTF-8
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// A negative length other than -1
    #[error("invalid length: {0}")]
    InvalidLength(i64),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("bulk string too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Largest bulk string accepted (the server's own limit)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Replies from the commands we send nest at most two deep (SCAN)
pub const MAX_NESTING_DEPTH: usize = 8;

/// Decodes the reply at the front of `buf`.
///
/// # Example
///
/// ```
/// use keydeck::protocol::{decode, RespValue};
///
/// let (value, consumed) = decode(b":42\r\n").unwrap().unwrap();
/// assert_eq!(value, RespValue::Integer(42));
/// assert_eq!(consumed, 5);
///
/// assert!(decode(b"$5\r\nhel").unwrap().is_none());
/// ```
pub fn decode(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    let mut cursor = Cursor { buf, pos: 0 };
    Ok(cursor.value(0)?.map(|value| (value, cursor.pos)))
}

/// Read position over a partially received reply. Each step returns
/// `Ok(None)` as soon as it runs out of input.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn value(&mut self, depth: usize) -> ParseResult<Option<RespValue>> {
        let Some(&tag) = self.buf.get(self.pos) else {
            return Ok(None);
        };
        self.pos += 1;

        let Some(line) = self.line() else {
            return Ok(None);
        };

        let value = match tag {
            b'+' => RespValue::SimpleString(utf8(line, "simple string")?),
            b'-' => RespValue::Error(utf8(line, "error reply")?),
            b':' => RespValue::Integer(integer(line)?),
            b'$' => match length(line)? {
                None => RespValue::Null,
                Some(len) => match self.bulk(len)? {
                    Some(data) => RespValue::BulkString(data),
                    None => return Ok(None),
                },
            },
            b'*' => match length(line)? {
                None => RespValue::Null,
                Some(count) => {
                    if depth >= MAX_NESTING_DEPTH {
                        return Err(ParseError::ProtocolError(format!(
                            "replies nested deeper than {}",
                            MAX_NESTING_DEPTH
                        )));
                    }
                    let mut items = Vec::with_capacity(count.min(1024));
                    for _ in 0..count {
                        match self.value(depth + 1)? {
                            Some(item) => items.push(item),
                            None => return Ok(None),
                        }
                    }
                    RespValue::Array(items)
                }
            },
            other => return Err(ParseError::UnknownPrefix(other)),
        };
        Ok(Some(value))
    }

    /// Text up to the next CRLF; the cursor moves past the CRLF.
    fn line(&mut self) -> Option<&'a [u8]> {
        let buf: &'a [u8] = self.buf;
        let rest = &buf[self.pos..];
        let end = rest.windows(2).position(|w| w == CRLF)?;
        self.pos += end + 2;
        Some(&rest[..end])
    }

    fn bulk(&mut self, len: usize) -> ParseResult<Option<Bytes>> {
        if len > MAX_BULK_SIZE {
            return Err(ParseError::TooLarge {
                size: len,
                max: MAX_BULK_SIZE,
            });
        }
        let end = self.pos + len;
        if self.buf.len() < end + 2 {
            return Ok(None);
        }
        if &self.buf[end..end + 2] != CRLF {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }
        let data = Bytes::copy_from_slice(&self.buf[self.pos..end]);
        self.pos = end + 2;
        Ok(Some(data))
    }
}

fn utf8(line: &[u8], what: &'static str) -> ParseResult<String> {
    std::str::from_utf8(line)
        .map(str::to_string)
        .map_err(|_| ParseError::InvalidUtf8(what))
}

fn integer(line: &[u8]) -> ParseResult<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ParseError::InvalidInteger(String::from_utf8_lossy(line).into_owned()))
}

/// `$`/`*` header: -1 is null, other negatives are invalid.
fn length(line: &[u8]) -> ParseResult<Option<usize>> {
    match integer(line)? {
        -1 => Ok(None),
        n if n < 0 => Err(ParseError::InvalidLength(n)),
        n => Ok(Some(n as usize)),
    }
}
