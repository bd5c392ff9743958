//! RESP2 client codec used by [`RespStore`](crate::store::RespStore).
//!
//! - `types`: [`RespValue`] and request encoding
//! - `parser`: incremental decoding of server replies
//!
//! ```
//! use bytes::{Bytes, BytesMut};
//! use keydeck::protocol::{decode, encode_command};
//!
//! let mut request = BytesMut::new();
//! encode_command(&[Bytes::from("TYPE"), Bytes::from("user:101")], &mut request);
//!
//! let (reply, _consumed) = decode(b"+hash\r\n").unwrap().unwrap();
//! assert_eq!(reply.as_str(), Some("hash"));
//! ```

pub mod parser;
pub mod types;

pub use parser::{decode, ParseError, ParseResult};
pub use types::{encode_command, RespValue};
