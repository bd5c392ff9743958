//! Key Enumerator
//!
//! Paged listing and pattern deletes.
//!
//! ## Page Hydration
//!
//! ```text
//!  scan(pattern) ──> [k0 k1 k2 ... kN]        total_match_count = N+1
//!                        │
//!                        ▼  skip (page-1)*page_size, take page_size
//!                    [k10 ... k19]
//!                        │
//!                        ▼  resolve, at most fanout_limit in flight
//!                    [d10 ... d19]            window order kept
//! ```
//!
//! The scan is a cursor loop; each step is a separate store call with its
//! own timeout, so a large keyspace does not run one call out of time.
//!
//! A lookup that fails becomes a [`KeyFailure`] in its slot; the page itself
//! still succeeds. Dropping the returned future drops every lookup that is
//! still running.

use super::{store_failure, KeyAccessor};
use crate::error::{Error, Result};
use crate::model::{KeyEntry, KeyFailure, PagedKeyListing};
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use std::collections::HashSet;
use tracing::{debug, info, trace};

impl KeyAccessor {
    /// Lists one page of the keys matching `pattern`, each resolved to a
    /// descriptor. `page` starts at 1.
    pub async fn list_by_pattern(
        &self,
        pattern: &str,
        page: usize,
        page_size: usize,
    ) -> Result<PagedKeyListing> {
        if page < 1 {
            return Err(Error::validation("page must be at least 1"));
        }
        if page_size < 1 {
            return Err(Error::validation("pageSize must be at least 1"));
        }

        let matches = self.scan(pattern).await?;
        let total_match_count = matches.len();
        let skip = (page - 1).saturating_mul(page_size);

        let keys: Vec<KeyEntry> = stream::iter(matches.into_iter().skip(skip).take(page_size))
            .map(|key| async move {
                match self.resolve(&key).await {
                    Ok(descriptor) => KeyEntry::Resolved(descriptor),
                    Err(e) => KeyEntry::Failed(KeyFailure {
                        key,
                        error: e.to_string(),
                    }),
                }
            })
            .buffered(self.config.fanout_limit.max(1))
            .collect()
            .await;

        debug!(
            pattern,
            page,
            page_size,
            total_match_count,
            returned = keys.len(),
            failed = keys.iter().filter(|entry| entry.is_failed()).count(),
            "Listed keys"
        );

        Ok(PagedKeyListing {
            pattern: pattern.to_string(),
            total_match_count,
            page,
            page_size,
            queried_at: Utc::now(),
            keys,
        })
    }

    /// Deletes every key matching `pattern` with a single multi-key delete.
    ///
    /// No matches is not an error: nothing is sent and `0` is returned.
    pub async fn delete_by_pattern(&self, pattern: &str) -> Result<u64> {
        let matches = self.scan(pattern).await?;
        if matches.is_empty() {
            debug!(pattern, "No keys match, nothing to delete");
            return Ok(0);
        }

        let deleted = self
            .timed(self.store.del(&matches))
            .await
            .map_err(|e| store_failure("delete_by_pattern", pattern, e))?;

        info!(pattern, matched = matches.len(), deleted, "Deleted keys by pattern");
        Ok(deleted)
    }

    /// Deletes a single key. Returns `false` if it did not exist.
    pub async fn delete_key(&self, key: &str) -> Result<bool> {
        let deleted = self
            .timed(self.store.del(&[key.to_string()]))
            .await
            .map_err(|e| store_failure("delete_key", key, e))?;

        info!(key, deleted = deleted > 0, "Deleted key");
        Ok(deleted > 0)
    }

    /// Every key matching `pattern`, in first-seen order without duplicates.
    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let mut cursor = 0;
        let mut steps = 0usize;
        let mut seen = HashSet::new();
        let mut keys = Vec::new();

        loop {
            let batch = self
                .timed(self.store.scan_step(pattern, cursor, self.config.scan_count))
                .await
                .map_err(|e| store_failure("scan", pattern, e))?;
            steps += 1;

            // A key may come back in more than one step
            for key in batch.keys {
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }

            if batch.cursor == 0 {
                trace!(pattern, steps, found = keys.len(), "Scan complete");
                return Ok(keys);
            }
            cursor = batch.cursor;
        }
    }
}
