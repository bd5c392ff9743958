//! RESP2 Client Backend
//!
//! `RespStore` speaks RESP2 over TCP to any Redis-compatible server and keeps
//! a small pool of idle connections.
//!
//! ## Request Lifecycle
//!
//! ```text
//! 1. Check out an idle connection (or open a new one: AUTH, SELECT)
//!        │
//!        ▼
//! 2. Write the command frame, flush
//!        │
//!        ▼
//! 3. Read into the buffer until one complete reply parses
//!        │
//!        ▼
//! 4. Return the connection to the idle pool
//!        │
//!        ▼
//! 5. Decode the reply for the command
//! ```
//!
//! The connection is owned by the call while it is in flight. If the call
//! fails or its future is dropped, the connection is dropped with it; only a
//! connection that has read a complete reply goes back to the pool.

use super::{ScanBatch, Store, StoreError, StoreResult};
use crate::config::StoreConfig;
use crate::model::Shape;
use crate::protocol::{decode, encode_command, RespValue};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

/// Largest reply we are willing to buffer (512 MB, the server's own bulk limit).
const MAX_BUFFER_SIZE: usize = 512 * 1024 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// One open connection to the server.
struct Connection {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
}

impl Connection {
    /// Connects and runs the handshake (`AUTH`, `SELECT`) from `config`.
    async fn open(config: &StoreConfig) -> StoreResult<Self> {
        let stream = tokio::time::timeout(
            config.connect_timeout,
            TcpStream::connect(&config.endpoint),
        )
        .await
        .map_err(|_| {
            StoreError::Connection(format!(
                "connect to {} timed out after {:?}",
                config.endpoint, config.connect_timeout
            ))
        })?
        .map_err(|e| StoreError::Connection(format!("connect to {}: {}", config.endpoint, e)))?;
        stream.set_nodelay(true)?;

        let mut conn = Self {
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
        };

        if let Some(password) = &config.password {
            let reply = conn
                .request(&[Bytes::from_static(b"AUTH"), arg(password)])
                .await?;
            if let RespValue::Error(msg) = reply {
                return Err(StoreError::Connection(format!("authentication failed: {}", msg)));
            }
        }

        if config.database != 0 {
            let reply = conn
                .request(&[
                    Bytes::from_static(b"SELECT"),
                    Bytes::from(config.database.to_string()),
                ])
                .await?;
            if let RespValue::Error(msg) = reply {
                return Err(StoreError::Connection(format!(
                    "SELECT {} failed: {}",
                    config.database, msg
                )));
            }
        }

        debug!(endpoint = %config.endpoint, database = config.database, "Opened store connection");
        Ok(conn)
    }

    /// Sends one command and waits for its reply. Error replies are returned
    /// as values, not as `Err`.
    async fn request(&mut self, args: &[Bytes]) -> StoreResult<RespValue> {
        let mut frame = BytesMut::new();
        encode_command(args, &mut frame);
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        trace!(bytes = frame.len(), "Sent request");
        self.read_reply().await
    }

    async fn read_reply(&mut self) -> StoreResult<RespValue> {
        loop {
            if !self.buffer.is_empty() {
                if let Some((value, consumed)) = decode(&self.buffer)? {
                    let _ = self.buffer.split_to(consumed);
                    return Ok(value);
                }
            }

            if self.buffer.len() >= MAX_BUFFER_SIZE {
                return Err(StoreError::Connection(format!(
                    "reply exceeds {} bytes",
                    MAX_BUFFER_SIZE
                )));
            }
            if self.buffer.capacity() - self.buffer.len() < 1024 {
                self.buffer.reserve(INITIAL_BUFFER_SIZE);
            }

            let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
            if n == 0 {
                return Err(StoreError::Connection(
                    "connection closed by server".to_string(),
                ));
            }
            trace!(bytes = n, buffered = self.buffer.len(), "Read reply data");
        }
    }
}

/// A [`Store`] backed by a Redis-compatible server.
///
/// # Example
///
/// ```no_run
/// use keydeck::config::StoreConfig;
/// use keydeck::store::{RespStore, Store};
///
/// # async fn demo() -> Result<(), keydeck::store::StoreError> {
/// let store = RespStore::connect(StoreConfig::new("127.0.0.1:6379")).await?;
/// let shape = store.key_type("user:101").await?;
/// # Ok(())
/// # }
/// ```
pub struct RespStore {
    config: StoreConfig,
    idle: Mutex<Vec<Connection>>,
}

impl std::fmt::Debug for RespStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RespStore")
            .field("endpoint", &self.config.endpoint)
            .field("database", &self.config.database)
            .field("idle", &self.idle.lock().len())
            .finish()
    }
}

impl RespStore {
    /// Opens a first connection to verify the endpoint and credentials, and
    /// keeps it as the first idle connection.
    pub async fn connect(config: StoreConfig) -> StoreResult<Self> {
        let first = Connection::open(&config).await?;
        Ok(Self {
            config,
            idle: Mutex::new(vec![first]),
        })
    }

    /// Number of idle pooled connections.
    pub fn idle_connections(&self) -> usize {
        self.idle.lock().len()
    }

    async fn checkout(&self) -> StoreResult<Connection> {
        let pooled = self.idle.lock().pop();
        match pooled {
            Some(conn) => Ok(conn),
            None => Connection::open(&self.config).await,
        }
    }

    fn checkin(&self, conn: Connection) {
        let mut idle = self.idle.lock();
        if idle.len() < self.config.pool_size {
            idle.push(conn);
        }
    }

    /// Runs one command. Server error replies become `Err`.
    async fn call(&self, args: Vec<Bytes>) -> StoreResult<RespValue> {
        let mut conn = self.checkout().await?;

        let reply = match conn.request(&args).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(endpoint = %self.config.endpoint, error = %e, "Dropping store connection");
                return Err(e);
            }
        };
        self.checkin(conn);

        match reply {
            RespValue::Error(msg) => Err(classify_error(msg)),
            reply => Ok(reply),
        }
    }
}

fn arg(s: &str) -> Bytes {
    Bytes::copy_from_slice(s.as_bytes())
}

/// Maps a server error reply to a `StoreError`.
fn classify_error(msg: String) -> StoreError {
    if msg.starts_with("WRONGTYPE") {
        StoreError::WrongType(msg)
    } else {
        StoreError::Command(msg)
    }
}

fn unexpected(command: &'static str, reply: &RespValue) -> StoreError {
    StoreError::UnexpectedReply {
        command,
        reply: format!("{:?}", reply),
    }
}

fn expect_integer(command: &'static str, reply: RespValue) -> StoreResult<i64> {
    match reply {
        RespValue::Integer(n) => Ok(n),
        other => Err(unexpected(command, &other)),
    }
}

fn expect_count(command: &'static str, reply: RespValue) -> StoreResult<u64> {
    let n = expect_integer(command, reply)?;
    u64::try_from(n).map_err(|_| unexpected(command, &RespValue::Integer(n)))
}

fn expect_flag(command: &'static str, reply: RespValue) -> StoreResult<bool> {
    Ok(expect_integer(command, reply)? > 0)
}

fn expect_array(command: &'static str, reply: RespValue) -> StoreResult<Vec<RespValue>> {
    match reply {
        RespValue::Array(items) => Ok(items),
        RespValue::Null => Ok(Vec::new()),
        other => Err(unexpected(command, &other)),
    }
}

fn expect_bulk_list(command: &'static str, reply: RespValue) -> StoreResult<Vec<Bytes>> {
    expect_array(command, reply)?
        .into_iter()
        .map(|item| match item {
            RespValue::BulkString(b) => Ok(b),
            other => Err(unexpected(command, &other)),
        })
        .collect()
}

/// Splits a flat `[a1, b1, a2, b2, ...]` reply into pairs.
fn expect_pairs(command: &'static str, reply: RespValue) -> StoreResult<Vec<(Bytes, Bytes)>> {
    let items = expect_bulk_list(command, reply)?;
    if items.len() % 2 != 0 {
        return Err(StoreError::UnexpectedReply {
            command,
            reply: format!("odd number of elements ({})", items.len()),
        });
    }
    let mut pairs = Vec::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(a), Some(b)) = (iter.next(), iter.next()) {
        pairs.push((a, b));
    }
    Ok(pairs)
}

fn parse_score(command: &'static str, raw: &[u8]) -> StoreResult<f64> {
    let text = std::str::from_utf8(raw).map_err(|_| StoreError::UnexpectedReply {
        command,
        reply: "non-UTF-8 score".to_string(),
    })?;
    match text {
        "inf" | "+inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        _ => text.parse().map_err(|_| StoreError::UnexpectedReply {
            command,
            reply: format!("invalid score '{}'", text),
        }),
    }
}

/// Formats a score the way the server parses it back.
fn format_score(score: f64) -> Bytes {
    if score == f64::INFINITY {
        Bytes::from_static(b"+inf")
    } else if score == f64::NEG_INFINITY {
        Bytes::from_static(b"-inf")
    } else {
        Bytes::from(score.to_string())
    }
}

/// Decodes a `PTTL` reply: -2 missing, -1 persistent, otherwise milliseconds.
fn decode_pttl(reply: RespValue) -> StoreResult<Option<Duration>> {
    let ms = expect_integer("PTTL", reply)?;
    Ok((ms >= 0).then(|| Duration::from_millis(ms as u64)))
}

/// True for the error replies servers send for a command they lack.
fn is_unknown_command(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    lower.contains("unknown command") || lower.contains("unknown subcommand")
}

#[async_trait]
impl Store for RespStore {
    fn name(&self) -> &'static str {
        "resp"
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let reply = self.call(vec![Bytes::from_static(b"EXISTS"), arg(key)]).await?;
        expect_flag("EXISTS", reply)
    }

    async fn key_type(&self, key: &str) -> StoreResult<Option<Shape>> {
        let reply = self.call(vec![Bytes::from_static(b"TYPE"), arg(key)]).await?;
        match reply.as_str() {
            Some(name) => Ok(Shape::from_type_name(name)),
            None => Err(unexpected("TYPE", &reply)),
        }
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let reply = self.call(vec![Bytes::from_static(b"PTTL"), arg(key)]).await?;
        decode_pttl(reply)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        match self.call(vec![Bytes::from_static(b"GET"), arg(key)]).await? {
            RespValue::BulkString(value) => Ok(Some(value)),
            RespValue::Null => Ok(None),
            other => Err(unexpected("GET", &other)),
        }
    }

    async fn set(&self, key: &str, value: Bytes) -> StoreResult<()> {
        match self.call(vec![Bytes::from_static(b"SET"), arg(key), value]).await? {
            RespValue::SimpleString(s) if s == "OK" => Ok(()),
            other => Err(unexpected("SET", &other)),
        }
    }

    async fn llen(&self, key: &str) -> StoreResult<u64> {
        let reply = self.call(vec![Bytes::from_static(b"LLEN"), arg(key)]).await?;
        expect_count("LLEN", reply)
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<Bytes>> {
        let reply = self
            .call(vec![
                Bytes::from_static(b"LRANGE"),
                arg(key),
                Bytes::from(start.to_string()),
                Bytes::from(stop.to_string()),
            ])
            .await?;
        expect_bulk_list("LRANGE", reply)
    }

    async fn rpush(&self, key: &str, value: Bytes) -> StoreResult<u64> {
        let reply = self
            .call(vec![Bytes::from_static(b"RPUSH"), arg(key), value])
            .await?;
        expect_count("RPUSH", reply)
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<Bytes>> {
        let reply = self.call(vec![Bytes::from_static(b"SMEMBERS"), arg(key)]).await?;
        expect_bulk_list("SMEMBERS", reply)
    }

    async fn scard(&self, key: &str) -> StoreResult<u64> {
        let reply = self.call(vec![Bytes::from_static(b"SCARD"), arg(key)]).await?;
        expect_count("SCARD", reply)
    }

    async fn sadd(&self, key: &str, members: Vec<Bytes>) -> StoreResult<u64> {
        let mut args = Vec::with_capacity(members.len() + 2);
        args.push(Bytes::from_static(b"SADD"));
        args.push(arg(key));
        args.extend(members);
        expect_count("SADD", self.call(args).await?)
    }

    async fn hgetall(&self, key: &str) -> StoreResult<Vec<(Bytes, Bytes)>> {
        let reply = self.call(vec![Bytes::from_static(b"HGETALL"), arg(key)]).await?;
        expect_pairs("HGETALL", reply)
    }

    async fn hset(&self, key: &str, fields: Vec<(Bytes, Bytes)>) -> StoreResult<u64> {
        let mut args = Vec::with_capacity(fields.len() * 2 + 2);
        args.push(Bytes::from_static(b"HSET"));
        args.push(arg(key));
        for (field, value) in fields {
            args.push(field);
            args.push(value);
        }
        expect_count("HSET", self.call(args).await?)
    }

    async fn zrange_withscores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> StoreResult<Vec<(Bytes, f64)>> {
        let reply = self
            .call(vec![
                Bytes::from_static(b"ZRANGE"),
                arg(key),
                Bytes::from(start.to_string()),
                Bytes::from(stop.to_string()),
                Bytes::from_static(b"WITHSCORES"),
            ])
            .await?;
        expect_pairs("ZRANGE", reply)?
            .into_iter()
            .map(|(member, score)| Ok((member, parse_score("ZRANGE", &score)?)))
            .collect()
    }

    async fn zadd(&self, key: &str, members: Vec<(Bytes, f64)>) -> StoreResult<u64> {
        let mut args = Vec::with_capacity(members.len() * 2 + 3);
        args.push(Bytes::from_static(b"ZADD"));
        args.push(arg(key));
        args.push(Bytes::from_static(b"CH"));
        for (member, score) in members {
            args.push(format_score(score));
            args.push(member);
        }
        expect_count("ZADD", self.call(args).await?)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        // PEXPIRE takes a signed 64-bit millisecond count
        let ms = i64::try_from(ttl.as_millis())
            .map_err(|_| StoreError::InvalidExpire(ttl))?
            .max(1);
        let reply = self
            .call(vec![
                Bytes::from_static(b"PEXPIRE"),
                arg(key),
                Bytes::from(ms.to_string()),
            ])
            .await?;
        expect_flag("PEXPIRE", reply)
    }

    async fn persist(&self, key: &str) -> StoreResult<bool> {
        let reply = self.call(vec![Bytes::from_static(b"PERSIST"), arg(key)]).await?;
        expect_flag("PERSIST", reply)
    }

    async fn del(&self, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut args = Vec::with_capacity(keys.len() + 1);
        args.push(Bytes::from_static(b"DEL"));
        args.extend(keys.iter().map(|k| arg(k)));
        expect_count("DEL", self.call(args).await?)
    }

    async fn scan_step(&self, pattern: &str, cursor: u64, count_hint: usize) -> StoreResult<ScanBatch> {
        let reply = self
            .call(vec![
                Bytes::from_static(b"SCAN"),
                Bytes::from(cursor.to_string()),
                Bytes::from_static(b"MATCH"),
                arg(pattern),
                Bytes::from_static(b"COUNT"),
                Bytes::from(count_hint.max(1).to_string()),
            ])
            .await?;

        let mut parts = expect_array("SCAN", reply)?.into_iter();
        let (next, batch) = match (parts.next(), parts.next()) {
            (Some(RespValue::BulkString(next)), Some(batch)) => (next, batch),
            _ => {
                return Err(StoreError::UnexpectedReply {
                    command: "SCAN",
                    reply: "expected [cursor, keys]".to_string(),
                })
            }
        };
        let next: u64 = std::str::from_utf8(&next)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| StoreError::UnexpectedReply {
                command: "SCAN",
                reply: format!("cursor {:?}", String::from_utf8_lossy(&next)),
            })?;

        let keys: Vec<String> = expect_bulk_list("SCAN", batch)?
            .iter()
            .map(|key| String::from_utf8_lossy(key).into_owned())
            .collect();
        trace!(pattern, cursor, next, found = keys.len(), "Scan step");
        Ok(ScanBatch { cursor: next, keys })
    }

    async fn memory_usage(&self, key: &str) -> StoreResult<Option<u64>> {
        let reply = self
            .call(vec![
                Bytes::from_static(b"MEMORY"),
                Bytes::from_static(b"USAGE"),
                arg(key),
            ])
            .await;

        match reply {
            Ok(RespValue::Null) => Ok(None),
            Ok(reply) => expect_count("MEMORY USAGE", reply).map(Some),
            Err(StoreError::Command(msg)) if is_unknown_command(&msg) => {
                Err(StoreError::Unsupported(format!("MEMORY USAGE ({})", msg)))
            }
            Err(e) => Err(e),
        }
    }
}
