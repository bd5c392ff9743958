//! Store Boundary
//!
//! The [`Store`] trait is the capability set the accessor needs from a
//! key-value engine: existence, type and TTL queries, per-shape reads and
//! writes, expiry control, multi-key delete, pattern scan, and optional memory
//! introspection.
//!
//! ## Backends
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      KeyAccessor                            │
//! └──────────────────────────┬──────────────────────────────────┘
//!                            │ Arc<dyn Store>
//!              ┌─────────────┴─────────────┐
//!              ▼                           ▼
//!    ┌──────────────────┐        ┌──────────────────┐
//!    │    RespStore     │        │   MemoryStore    │
//!    │ pooled TCP/RESP2 │        │ sharded RwLocks  │
//!    └────────┬─────────┘        └────────┬─────────┘
//!             │                           │
//!             ▼                           ▼
//!     Redis-compatible              ExpirySweeper
//!          server              (background Tokio task)
//! ```
//!
//! Every method acts on a single key except `del` and `scan`. Single-key
//! operations are atomic on both backends; nothing spans keys.

pub mod expiry;
pub mod memory;
pub mod resp;

use crate::model::Shape;
use crate::protocol::ParseError;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

pub use expiry::{ExpiryConfig, ExpirySweeper};
pub use memory::MemoryStore;
pub use resp::RespStore;

/// Errors raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server sent bytes that are not valid RESP
    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    /// Could not open or keep a connection
    #[error("connection error: {0}")]
    Connection(String),

    /// The server answered with an error reply
    #[error("command failed: {0}")]
    Command(String),

    /// The key holds a value of another shape
    #[error("WRONGTYPE operation against key '{0}' holding the wrong kind of value")]
    WrongType(String),

    /// The reply did not have the shape the command promises
    #[error("unexpected reply to {command}: {reply}")]
    UnexpectedReply { command: &'static str, reply: String },

    /// The call did not complete within the configured budget
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    /// The expiry cannot be represented by the backend
    #[error("expire time out of range: {0:?}")]
    InvalidExpire(Duration),

    /// The backend does not implement this capability
    #[error("not supported by this store: {0}")]
    Unsupported(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// One step of a cursor scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanBatch {
    /// Cursor for the next step; `0` when the scan is complete.
    pub cursor: u64,
    pub keys: Vec<String>,
}

/// Capability set consumed by [`KeyAccessor`](crate::KeyAccessor).
///
/// Method names follow the Redis commands they correspond to. Reads on a
/// missing key return the empty value for their shape (`None`, `0`, empty
/// vector) rather than an error.
#[async_trait]
pub trait Store: Send + Sync {
    /// A short backend name for logs.
    fn name(&self) -> &'static str;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Shape of the key, or `None` if it does not exist.
    async fn key_type(&self, key: &str) -> StoreResult<Option<Shape>>;

    /// Remaining time to live; `None` when the key is missing or persistent.
    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>>;

    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>>;

    /// Replaces whatever the key held with a string value, clearing its TTL.
    async fn set(&self, key: &str, value: Bytes) -> StoreResult<()>;

    async fn llen(&self, key: &str) -> StoreResult<u64>;

    /// Inclusive range; negative indices count from the tail.
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<Bytes>>;

    /// Appends one element, returning the list length afterwards.
    async fn rpush(&self, key: &str, value: Bytes) -> StoreResult<u64>;

    async fn smembers(&self, key: &str) -> StoreResult<Vec<Bytes>>;

    async fn scard(&self, key: &str) -> StoreResult<u64>;

    /// Returns the number of members that were not already present.
    async fn sadd(&self, key: &str, members: Vec<Bytes>) -> StoreResult<u64>;

    async fn hgetall(&self, key: &str) -> StoreResult<Vec<(Bytes, Bytes)>>;

    /// Returns the number of fields that were newly created.
    async fn hset(&self, key: &str, fields: Vec<(Bytes, Bytes)>) -> StoreResult<u64>;

    /// Members by rank (ascending score), inclusive range, with scores.
    async fn zrange_withscores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> StoreResult<Vec<(Bytes, f64)>>;

    /// Returns the number of members added or whose score changed.
    async fn zadd(&self, key: &str, members: Vec<(Bytes, f64)>) -> StoreResult<u64>;

    /// Returns false if the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Returns true only if an expiration was removed.
    async fn persist(&self, key: &str) -> StoreResult<bool>;

    /// Deletes every listed key in one call, returning how many existed.
    async fn del(&self, keys: &[String]) -> StoreResult<u64>;

    /// One step of a cursor scan over the keys matching the glob `pattern`.
    ///
    /// Start at cursor `0` and continue until a step returns cursor `0`. A key
    /// may appear in more than one step. `count_hint` is the amount of work
    /// per step, not a limit on the keys returned.
    async fn scan_step(&self, pattern: &str, cursor: u64, count_hint: usize) -> StoreResult<ScanBatch>;

    /// Approximate bytes used by the key, `None` if it does not exist.
    ///
    /// Backends without the capability return [`StoreError::Unsupported`].
    async fn memory_usage(&self, key: &str) -> StoreResult<Option<u64>> {
        let _ = key;
        Err(StoreError::Unsupported("MEMORY USAGE".to_string()))
    }
}
