//! # keydeck - An Administrative Accessor for Redis-Compatible Stores
//!
//! keydeck lets an operator browse, write, expire and delete keys in a live
//! key-value store without going through the store's own shell. It works
//! with strings, lists, sets, hashes and sorted sets.
//!
//! ## Features
//!
//! - **Uniform Inspection**: any key becomes a [`KeyDescriptor`], with a
//!   sampled rendering of its value, TTL, expiry time and memory usage
//! - **Typed Writes**: a value is classified once into a [`Payload`] and stored
//!   under a key prefixed with its [`Encoding`] label
//! - **Paged Listing**: pattern scans with bounded, ordered fan-out of the
//!   per-key lookups
//! - **Pattern Deletes**: one multi-key delete for everything a pattern matches
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              KeyAccessor                                │
//! │                                                                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐     │
//! │  │  Inspector  │  │   Writer    │  │ TTL Manager │  │ Enumerator  │     │
//! │  │  resolve()  │  │  write()    │  │             │  │ list/delete │     │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘     │
//! │         │                │                │                │            │
//! │         └────────────────┴───────┬────────┴────────────────┘            │
//! │                                  ▼                                      │
//! │                    timed(call) - per-call timeout                       │
//! └──────────────────────────────────┬──────────────────────────────────────┘
//!                                    │ Arc<dyn Store>
//!                     ┌──────────────┴──────────────┐
//!                     ▼                             ▼
//!              ┌─────────────┐               ┌─────────────┐
//!              │  RespStore  │               │ MemoryStore │
//!              │  RESP2/TCP  │               │  64 shards  │
//!              └─────────────┘               └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use keydeck::config::StoreConfig;
//! use keydeck::store::RespStore;
//! use keydeck::KeyAccessor;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = RespStore::connect(StoreConfig::new("127.0.0.1:6379")).await?;
//!     let accessor = KeyAccessor::new(Arc::new(store));
//!
//!     let page = accessor.list_by_pattern("user:*", 1, 20).await?;
//!     println!("{} keys match", page.total_match_count);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`accessor`]: the [`KeyAccessor`] and its four operation groups
//! - [`store`]: the [`Store`](store::Store) trait and its two backends
//! - [`protocol`]: RESP types and parser used by the network backend
//! - [`model`]: descriptors, listings and write outcomes
//! - [`config`]: accessor and connection settings
//!
//! ## Consistency
//!
//! Each store call is atomic on its own key. Nothing spans keys: a pattern
//! delete races with concurrent writers, and a list write is a delete
//! followed by one push per element.

pub mod accessor;
pub mod config;
pub mod error;
pub mod model;
pub mod protocol;
pub mod store;

// Re-export commonly used types for convenience
pub use accessor::{
    CreateKeyRequest, DataType, Encoding, KeyAccessor, Payload, WritePath, WriteRequest,
};
pub use config::{AccessorConfig, StoreConfig};
pub use error::{Error, Result};
pub use model::{KeyDescriptor, KeyEntry, KeyFailure, PagedKeyListing, Shape, WriteOutcome};

/// Version of keydeck
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
