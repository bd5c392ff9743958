//! TTL Manager

use super::{store_failure, ttl_from_seconds, KeyAccessor};
use crate::error::Result;
use tracing::info;

impl KeyAccessor {
    /// Sets or clears the expiry of `key`.
    ///
    /// `ttl_seconds <= 0` removes any expiry; a positive value expires the key
    /// that many seconds from now, up to
    /// [`MAX_TTL_SECONDS`](crate::model::MAX_TTL_SECONDS). Returns whether the
    /// store changed anything: `false` for a missing key, or when clearing a
    /// key that had no expiry.
    pub async fn set_or_clear_ttl(&self, key: &str, ttl_seconds: i64) -> Result<bool> {
        let changed = match ttl_from_seconds(ttl_seconds)? {
            None => self
                .timed(self.store.persist(key))
                .await
                .map_err(|e| store_failure("persist", key, e))?,
            Some(ttl) => self
                .timed(self.store.expire(key, ttl))
                .await
                .map_err(|e| store_failure("expire", key, e))?,
        };

        info!(key, ttl_seconds, changed, "TTL updated");
        Ok(changed)
    }
}
