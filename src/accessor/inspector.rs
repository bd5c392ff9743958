//! Key Inspector
//!
//! Turns any key into a [`KeyDescriptor`], whatever its shape. Collections
//! are sampled, never read in full past what the shape's read command
//! returns; string values are cut at [`MAX_RENDERED_STRING`] characters.

use super::{expiry_from_now, store_failure, KeyAccessor};
use crate::error::{Error, Result};
use crate::model::{KeyDescriptor, Shape, MAX_RENDERED_STRING, TRUNCATION_MARKER};
use crate::store::{StoreError, StoreResult};
use bytes::Bytes;
use tracing::{debug, warn};

/// Elements shown for lists, sets and sorted sets.
const SAMPLE_SIZE: usize = 5;

/// Field/value pairs shown for hashes.
const HASH_SAMPLE_SIZE: usize = 3;

impl KeyAccessor {
    /// Summarizes `key`.
    ///
    /// A key that does not exist (or vanishes while being inspected) yields a
    /// descriptor with `exists == false` rather than an error. Memory usage is
    /// best effort and never fails the call.
    pub async fn resolve(&self, key: &str) -> Result<KeyDescriptor> {
        let fail = |e| store_failure("resolve", key, e);

        if !self.timed(self.store.exists(key)).await.map_err(fail)? {
            return Ok(KeyDescriptor::missing(key));
        }

        let shape = match self.timed(self.store.key_type(key)).await.map_err(fail)? {
            Some(shape) => shape,
            None => {
                debug!(key, "Key vanished before its type was read");
                return Ok(KeyDescriptor::missing(key));
            }
        };

        let ttl = self.timed(self.store.ttl(key)).await.map_err(fail)?;

        let rendered_value = match self.render(key, &shape).await.map_err(fail)? {
            Some(rendered) => rendered,
            None => {
                debug!(key, "Key vanished before its value was read");
                return Ok(KeyDescriptor::missing(key));
            }
        };

        let memory_usage_bytes = self.memory_usage(key).await;

        Ok(KeyDescriptor {
            key: key.to_string(),
            exists: true,
            shape: Some(shape),
            ttl,
            expires_at: ttl.and_then(expiry_from_now),
            rendered_value: Some(rendered_value),
            memory_usage_bytes,
        })
    }

    /// Shape-specific rendering. `None` if a string key disappeared.
    async fn render(&self, key: &str, shape: &Shape) -> StoreResult<Option<String>> {
        let rendered = match shape {
            Shape::String => match self.timed(self.store.get(key)).await? {
                Some(value) => truncate_rendering(lossy(&value)),
                None => return Ok(None),
            },
            Shape::List => {
                let length = self.timed(self.store.llen(key)).await?;
                let first = self
                    .timed(self.store.lrange(key, 0, SAMPLE_SIZE as i64 - 1))
                    .await?;
                format!("[List - Length: {}, First 5: {}]", length, join(&first))
            }
            Shape::Set => {
                let count = self.timed(self.store.scard(key)).await?;
                let members = self.timed(self.store.smembers(key)).await?;
                let sample: Vec<Bytes> = members.into_iter().take(SAMPLE_SIZE).collect();
                format!("[Set - Count: {}, Sample: {}]", count, join(&sample))
            }
            Shape::Hash => {
                let fields = self.timed(self.store.hgetall(key)).await?;
                let sample = fields
                    .iter()
                    .take(HASH_SAMPLE_SIZE)
                    .map(|(field, value)| format!("{}:{}", lossy(field), lossy(value)))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("[Hash - Fields: {}, Sample: {}]", fields.len(), sample)
            }
            Shape::SortedSet => {
                let ranked = self
                    .timed(self.store.zrange_withscores(key, 0, SAMPLE_SIZE as i64 - 1))
                    .await?;
                let sample = ranked
                    .iter()
                    .map(|(member, score)| format!("{}:{}", lossy(member), score))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("[SortedSet - Sample with scores: {}]", sample)
            }
            Shape::Unknown(name) => format!("[Type not fully supported: {}]", name),
        };
        Ok(Some(rendered))
    }

    /// Memory introspection step of `resolve`. Every failure is swallowed.
    async fn memory_usage(&self, key: &str) -> Option<u64> {
        match self.timed(self.store.memory_usage(key)).await {
            Ok(bytes) => bytes,
            Err(StoreError::Unsupported(reason)) => {
                debug!(key, error = %Error::UnsupportedIntrospection(reason), "Memory usage not available");
                None
            }
            Err(e) => {
                warn!(key, error = %e, "Memory usage lookup failed");
                None
            }
        }
    }
}

fn lossy(bytes: &Bytes) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn join(items: &[Bytes]) -> String {
    items.iter().map(lossy).collect::<Vec<_>>().join(", ")
}

/// Cuts a string rendering at `MAX_RENDERED_STRING` characters.
fn truncate_rendering(value: String) -> String {
    match value.char_indices().nth(MAX_RENDERED_STRING) {
        Some((cut, _)) => {
            let mut truncated = value[..cut].to_string();
            truncated.push_str(TRUNCATION_MARKER);
            truncated
        }
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::testing::InstrumentedStore;
    use crate::store::{MemoryStore, Store};
    use std::sync::Arc;
    use std::time::Duration;

    fn accessor_over(store: &Arc<MemoryStore>) -> KeyAccessor {
        KeyAccessor::new(store.clone())
    }

    fn b(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    #[tokio::test]
    async fn test_absent_key_is_not_an_error() {
        let accessor = KeyAccessor::new(Arc::new(MemoryStore::new()));
        let descriptor = accessor.resolve("ghost").await.unwrap();
        assert_eq!(descriptor, KeyDescriptor::missing("ghost"));
    }

    #[tokio::test]
    async fn test_string_rendered_verbatim() {
        let store = Arc::new(MemoryStore::new());
        store.set("greeting", b("hello world"));

        let descriptor = accessor_over(&store).resolve("greeting").await.unwrap();
        assert!(descriptor.exists);
        assert_eq!(descriptor.shape, Some(Shape::String));
        assert_eq!(descriptor.rendered_value.as_deref(), Some("hello world"));
        assert_eq!(descriptor.ttl, None);
        assert_eq!(descriptor.expires_at, None);
        assert!(descriptor.memory_usage_bytes.is_some());
    }

    #[tokio::test]
    async fn test_long_string_is_truncated() {
        let store = Arc::new(MemoryStore::new());
        store.set("exact", Bytes::from("x".repeat(500)));
        store.set("long", Bytes::from("y".repeat(501)));

        let accessor = accessor_over(&store);
        let exact = accessor.resolve("exact").await.unwrap();
        assert_eq!(exact.rendered_value.unwrap(), "x".repeat(500));

        let long = accessor.resolve("long").await.unwrap().rendered_value.unwrap();
        assert_eq!(long, format!("{}... [truncated]", "y".repeat(500)));
    }

    #[test]
    fn test_truncation_counts_characters() {
        let value = "é".repeat(600);
        let truncated = truncate_rendering(value);
        assert_eq!(
            truncated.chars().count(),
            MAX_RENDERED_STRING + TRUNCATION_MARKER.chars().count()
        );
        assert!(truncated.ends_with(TRUNCATION_MARKER));
    }

    #[tokio::test]
    async fn test_list_rendering_samples_first_five() {
        let store = Arc::new(MemoryStore::new());
        let items = (1..=7).map(|i| b(&format!("e{}", i))).collect();
        store.rpush("queue", items).unwrap();

        let descriptor = accessor_over(&store).resolve("queue").await.unwrap();
        assert_eq!(descriptor.shape, Some(Shape::List));
        assert_eq!(
            descriptor.rendered_value.unwrap(),
            "[List - Length: 7, First 5: e1, e2, e3, e4, e5]"
        );
    }

    #[tokio::test]
    async fn test_set_rendering() {
        let store = Arc::new(MemoryStore::new());
        store.sadd("tags", vec![b("a"), b("b")]).unwrap();

        let rendered = accessor_over(&store)
            .resolve("tags")
            .await
            .unwrap()
            .rendered_value
            .unwrap();
        assert_eq!(rendered, "[Set - Count: 2, Sample: a, b]");
    }

    #[tokio::test]
    async fn test_hash_rendering_samples_three_pairs() {
        let store = Arc::new(MemoryStore::new());
        let fields = ["f1", "f2", "f3", "f4"]
            .iter()
            .map(|f| (b(f), b("v")))
            .collect();
        store.hset("profile", fields).unwrap();

        let rendered = accessor_over(&store)
            .resolve("profile")
            .await
            .unwrap()
            .rendered_value
            .unwrap();
        assert_eq!(rendered, "[Hash - Fields: 4, Sample: f1:v, f2:v, f3:v]");
    }

    #[tokio::test]
    async fn test_sorted_set_rendering_by_rank() {
        let store = Arc::new(MemoryStore::new());
        store
            .zadd("board", vec![(b("bob"), 2.5), (b("ann"), 1.0)])
            .unwrap();

        let rendered = accessor_over(&store)
            .resolve("board")
            .await
            .unwrap()
            .rendered_value
            .unwrap();
        assert_eq!(rendered, "[SortedSet - Sample with scores: ann:1, bob:2.5]");
    }

    #[tokio::test]
    async fn test_ttl_and_expiry_are_reported() {
        let store = Arc::new(MemoryStore::new());
        store.set_with_ttl("session", b("s"), Duration::from_secs(30));

        let descriptor = accessor_over(&store).resolve("session").await.unwrap();
        let ttl = descriptor.ttl.unwrap();
        assert!(ttl > Duration::ZERO && ttl <= Duration::from_secs(30));

        let remaining = descriptor.expires_at.unwrap() - chrono::Utc::now();
        assert!(remaining <= chrono::Duration::seconds(30));
        assert!(remaining > chrono::Duration::seconds(28));
    }

    #[tokio::test]
    async fn test_unsupported_memory_usage_is_swallowed() {
        let store = Arc::new(MemoryStore::new().without_memory_introspection());
        store.set("k", b("v"));

        let descriptor = accessor_over(&store).resolve("k").await.unwrap();
        assert!(descriptor.exists);
        assert_eq!(descriptor.memory_usage_bytes, None);
    }

    #[tokio::test]
    async fn test_failed_lookup_is_a_store_error() {
        let inner = Arc::new(MemoryStore::new());
        inner.set("bad", b("v"));
        let store: Arc<dyn Store> = Arc::new(InstrumentedStore::new(inner).failing_on("bad"));

        let err = KeyAccessor::new(store).resolve("bad").await.unwrap_err();
        assert!(matches!(err, Error::Store { op: "resolve", ref target, .. } if target == "bad"));
    }
}
