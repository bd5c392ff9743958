//! RESP2 values and request encoding.
//!
//! Requests are always arrays of bulk strings. Replies can be any of the
//! five RESP2 types:
//!
//! | Prefix | Type          | Example                |
//! |--------|---------------|------------------------|
//! | `+`    | Simple String | `+OK\r\n`              |
//! | `-`    | Error         | `-WRONGTYPE ...\r\n`   |
//! | `:`    | Integer       | `:-2\r\n`              |
//! | `$`    | Bulk String   | `$5\r\nhello\r\n`      |
//! | `*`    | Array         | `*2\r\n$1\r\n0\r\n*0\r\n` |
//!
//! A null bulk string (`$-1\r\n`) and a null array (`*-1\r\n`) both decode to
//! [`RespValue::Null`].

use bytes::{BufMut, Bytes, BytesMut};

pub const CRLF: &[u8] = b"\r\n";

/// A decoded RESP2 value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Status reply such as `OK` or a `TYPE` name
    SimpleString(String),
    /// Error reply; the first word is the error kind (`ERR`, `WRONGTYPE`, ...)
    Error(String),
    Integer(i64),
    /// Binary-safe payload
    BulkString(Bytes),
    Null,
    Array(Vec<RespValue>),
}

impl RespValue {
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    pub fn null() -> Self {
        RespValue::Null
    }

    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    /// Appends the wire form of this value to `dst`.
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use keydeck::protocol::RespValue;
    ///
    /// let mut buf = BytesMut::new();
    /// RespValue::integer(-2).write_to(&mut buf);
    /// assert_eq!(&buf[..], b":-2\r\n");
    /// ```
    pub fn write_to(&self, dst: &mut BytesMut) {
        match self {
            RespValue::SimpleString(s) => line(dst, b'+', s.as_bytes()),
            RespValue::Error(s) => line(dst, b'-', s.as_bytes()),
            RespValue::Integer(n) => line(dst, b':', n.to_string().as_bytes()),
            RespValue::BulkString(data) => bulk(dst, data),
            RespValue::Null => line(dst, b'$', b"-1"),
            RespValue::Array(values) => {
                line(dst, b'*', values.len().to_string().as_bytes());
                for value in values {
                    value.write_to(dst);
                }
            }
        }
    }

    /// Text of a status reply or a UTF-8 bulk string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespValue::SimpleString(s) => Some(s),
            RespValue::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            RespValue::BulkString(b) => Some(b),
            RespValue::SimpleString(s) => Some(Bytes::from(s)),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<RespValue>> {
        match self {
            RespValue::Array(items) => Some(items),
            _ => None,
        }
    }
}

/// Encodes a request as an array of bulk strings.
///
/// ```
/// use bytes::{Bytes, BytesMut};
/// use keydeck::protocol::encode_command;
///
/// let mut buf = BytesMut::new();
/// encode_command(&[Bytes::from("TYPE"), Bytes::from("user:101")], &mut buf);
/// assert_eq!(&buf[..], b"*2\r\n$4\r\nTYPE\r\n$8\r\nuser:101\r\n");
/// ```
pub fn encode_command(args: &[Bytes], dst: &mut BytesMut) {
    line(dst, b'*', args.len().to_string().as_bytes());
    for arg in args {
        bulk(dst, arg);
    }
}

fn line(dst: &mut BytesMut, tag: u8, body: &[u8]) {
    dst.reserve(body.len() + 3);
    dst.put_u8(tag);
    dst.put_slice(body);
    dst.put_slice(CRLF);
}

fn bulk(dst: &mut BytesMut, data: &[u8]) {
    line(dst, b'$', data.len().to_string().as_bytes());
    dst.reserve(data.len() + 2);
    dst.put_slice(data);
    dst.put_slice(CRLF);
}
