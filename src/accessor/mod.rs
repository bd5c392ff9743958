//! The Key Accessor
//!
//! [`KeyAccessor`] is the administrative surface over a [`Store`]. Each
//! submodule adds one group of operations to it:
//!
//! - `inspector`: [`KeyAccessor::resolve`], a uniform summary of any key
//! - `writer`: [`KeyAccessor::write`], payload classification and encoders
//! - `ttl`: [`KeyAccessor::set_or_clear_ttl`]
//! - `enumerator`: paged listing and pattern deletes
//!
//! ## Call Discipline
//!
//! Every store call goes through [`KeyAccessor::timed`], which bounds it by
//! `call_timeout`. Failures are logged once, with the operation and the key
//! or pattern, at the point they are turned into [`Error::Store`].
//!
//! The accessor holds no mutable state. Cloning it is cheap and clones share
//! the same store.

mod enumerator;
mod inspector;
mod ttl;
mod writer;

pub use writer::{CreateKeyRequest, DataType, Encoding, Payload, WritePath, WriteRequest};

use crate::config::AccessorConfig;
use crate::error::{Error, Result};
use crate::model::MAX_TTL_SECONDS;
use crate::store::{Store, StoreError, StoreResult};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

/// Administrative handle over a key-value store.
///
/// # Example
///
/// ```
/// use keydeck::{KeyAccessor, WriteRequest};
/// use keydeck::store::MemoryStore;
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> keydeck::Result<()> {
/// let accessor = KeyAccessor::new(Arc::new(MemoryStore::new()));
///
/// let request = WriteRequest::infer("greeting", serde_json::json!("hello"), None)?;
/// let outcome = accessor.write(request).await?;
/// assert_eq!(outcome.physical_key, "String:greeting");
///
/// let descriptor = accessor.resolve("String:greeting").await?;
/// assert_eq!(descriptor.rendered_value.as_deref(), Some("hello"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct KeyAccessor {
    store: Arc<dyn Store>,
    config: AccessorConfig,
}

impl std::fmt::Debug for KeyAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyAccessor")
            .field("store", &self.store.name())
            .field("config", &self.config)
            .finish()
    }
}

impl KeyAccessor {
    /// Creates an accessor with the default configuration.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_config(store, AccessorConfig::default())
    }

    pub fn with_config(store: Arc<dyn Store>, config: AccessorConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &AccessorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Runs one store call under the per-call timeout.
    async fn timed<T, F>(&self, call: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.config.call_timeout)),
        }
    }
}

/// Logs a failed store call and wraps it with its context.
fn store_failure(op: &'static str, target: &str, source: StoreError) -> Error {
    error!(op, target, error = %source, "Store call failed");
    Error::Store {
        op,
        target: target.to_string(),
        source,
    }
}

/// TTL for a request's `ttl_seconds`: `None` for zero or negative, rejected
/// above [`MAX_TTL_SECONDS`].
fn ttl_from_seconds(seconds: i64) -> Result<Option<Duration>> {
    if seconds <= 0 {
        return Ok(None);
    }
    if seconds > MAX_TTL_SECONDS {
        return Err(Error::validation(format!(
            "ttl of {} seconds exceeds the maximum of {}",
            seconds, MAX_TTL_SECONDS
        )));
    }
    Ok(Some(Duration::from_secs(seconds as u64)))
}

/// `now + ttl`, or `None` if that is not representable.
fn expiry_from_now(ttl: Duration) -> Option<DateTime<Utc>> {
    let delta = chrono::Duration::from_std(ttl).ok()?;
    Utc::now().checked_add_signed(delta)
}
