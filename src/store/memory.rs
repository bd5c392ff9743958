//! In-Process Store with Expiry Support
//!
//! `MemoryStore` implements the full [`Store`] capability set in memory. It is
//! the backend used by the test suite and the benchmarks, and a convenient
//! stand-in for a live server when experimenting with the accessor.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Keys are spread over 64 shards, each behind its own lock.
//! 2. **Lazy Expiry**: Expired keys are detected and dropped on access.
//! 3. **Active Expiry**: [`ExpirySweeper`](super::ExpirySweeper) reclaims keys nobody reads.
//! 4. **One Keyspace**: Every shape lives in the same map, so a key has exactly one shape.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      MemoryStore                            │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each operation holds one shard lock for its whole duration, which makes
//! every single-key operation atomic.

use super::{ScanBatch, Store, StoreError, StoreResult};
use crate::model::Shape;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::hash_map::Entry as MapEntry;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Number of shards for the store.
const NUM_SHARDS: usize = 64;

/// Fixed per-key overhead used by the memory estimate.
const ENTRY_OVERHEAD: u64 = 64;

/// A stored value of one of the five shapes.
#[derive(Debug, Clone)]
pub enum Value {
    String(Bytes),
    List(VecDeque<Bytes>),
    Set(BTreeSet<Bytes>),
    Hash(BTreeMap<Bytes, Bytes>),
    /// Kept ordered by (score, member).
    SortedSet(Vec<(Bytes, f64)>),
}

impl Value {
    fn shape(&self) -> Shape {
        match self {
            Value::String(_) => Shape::String,
            Value::List(_) => Shape::List,
            Value::Set(_) => Shape::Set,
            Value::Hash(_) => Shape::Hash,
            Value::SortedSet(_) => Shape::SortedSet,
        }
    }

    /// Collections are never stored empty; a string may be.
    fn is_empty_collection(&self) -> bool {
        match self {
            Value::String(_) => false,
            Value::List(items) => items.is_empty(),
            Value::Set(members) => members.is_empty(),
            Value::Hash(fields) => fields.is_empty(),
            Value::SortedSet(members) => members.is_empty(),
        }
    }

    fn payload_bytes(&self) -> u64 {
        let bytes = match self {
            Value::String(v) => v.len(),
            Value::List(items) => items.iter().map(Bytes::len).sum(),
            Value::Set(members) => members.iter().map(Bytes::len).sum(),
            Value::Hash(fields) => fields.iter().map(|(f, v)| f.len() + v.len()).sum(),
            Value::SortedSet(members) => members.iter().map(|(m, _)| m.len() + 8).sum(),
        };
        bytes as u64
    }
}

/// Represents a stored value with optional expiry time.
#[derive(Debug, Clone)]
pub struct Entry {
    pub value: Value,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// A deadline past what `Instant` can represent leaves the entry persistent.
    pub fn with_ttl(value: Value, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now().checked_add(ttl),
        }
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|exp| Instant::now() >= exp)
            .unwrap_or(false)
    }

    /// Remaining time to live, or None if no expiry.
    pub fn ttl(&self) -> Option<Duration> {
        self.expires_at
            .map(|exp| exp.saturating_duration_since(Instant::now()))
    }
}

type ShardMap = HashMap<String, Entry>;

/// The in-memory store.
///
/// Designed to be wrapped in an `Arc` and shared; all operations are
/// thread-safe.
///
/// # Example
///
/// ```
/// use keydeck::store::MemoryStore;
/// use bytes::Bytes;
///
/// let store = MemoryStore::new();
/// store.set("name", Bytes::from("Ariz"));
/// assert_eq!(store.get("name").unwrap(), Some(Bytes::from("Ariz")));
///
/// store.rpush("queue", vec![Bytes::from("a"), Bytes::from("b")]).unwrap();
/// assert_eq!(store.llen("queue").unwrap(), 2);
/// ```
pub struct MemoryStore {
    shards: Vec<RwLock<ShardMap>>,

    /// Number of live keys (approximate)
    key_count: AtomicU64,

    /// Number of expired keys cleaned up
    expired_count: AtomicU64,

    /// Whether `memory_usage` answers or reports the capability as missing
    memory_introspection: bool,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("shards", &self.shards.len())
            .field("key_count", &self.key_count.load(Ordering::Relaxed))
            .field("memory_introspection", &self.memory_introspection)
            .finish()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| RwLock::new(HashMap::new())).collect(),
            key_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
            memory_introspection: true,
        }
    }

    /// Makes `memory_usage` behave like a server without `MEMORY USAGE`.
    pub fn without_memory_introspection(mut self) -> Self {
        self.memory_introspection = false;
        self
    }

    #[inline]
    fn get_shard(&self, key: &str) -> &RwLock<ShardMap> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % NUM_SHARDS]
    }

    /// Removes `key` if it has expired. Returns whether a live entry remains.
    fn purge_expired(&self, data: &mut ShardMap, key: &str) -> bool {
        match data.get(key) {
            Some(entry) if entry.is_expired() => {
                data.remove(key);
                self.key_count.fetch_sub(1, Ordering::Relaxed);
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Runs `f` on the live entry for `key`.
    ///
    /// Read lock on the fast path; an expired entry is dropped under the
    /// write lock and reported as missing.
    fn read<T>(&self, key: &str, f: impl FnOnce(&Entry) -> T) -> Option<T> {
        let shard = self.get_shard(key);
        {
            let data = shard.read();
            match data.get(key) {
                Some(entry) if !entry.is_expired() => return Some(f(entry)),
                Some(_) => {}
                None => return None,
            }
        }
        self.purge_expired(&mut shard.write(), key);
        None
    }

    /// Applies `apply` to the collection at `key`, creating it with `init` if
    /// missing. A collection left empty is removed.
    fn update<T>(
        &self,
        key: &str,
        init: impl FnOnce() -> Value,
        apply: impl FnOnce(&mut Value) -> Option<T>,
    ) -> StoreResult<T> {
        let mut data = self.get_shard(key).write();
        self.purge_expired(&mut data, key);

        let entry = match data.entry(key.to_string()) {
            MapEntry::Occupied(occupied) => occupied.into_mut(),
            MapEntry::Vacant(vacant) => {
                self.key_count.fetch_add(1, Ordering::Relaxed);
                vacant.insert(Entry::new(init()))
            }
        };

        let result = apply(&mut entry.value);
        if entry.value.is_empty_collection() {
            data.remove(key);
            self.key_count.fetch_sub(1, Ordering::Relaxed);
        }
        result.ok_or_else(|| StoreError::WrongType(key.to_string()))
    }

    /// Sets a string value without expiry, replacing any previous value.
    pub fn set(&self, key: &str, value: Bytes) {
        self.insert(key, Entry::new(Value::String(value)));
    }

    /// Sets a string value that expires after `ttl`.
    pub fn set_with_ttl(&self, key: &str, value: Bytes, ttl: Duration) {
        self.insert(key, Entry::with_ttl(Value::String(value), ttl));
    }

    fn insert(&self, key: &str, entry: Entry) {
        let mut data = self.get_shard(key).write();
        if data.insert(key.to_string(), entry).is_none() {
            self.key_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        match self.read(key, |entry| entry.value.clone()) {
            Some(Value::String(value)) => Ok(Some(value)),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(None),
        }
    }

    pub fn exists(&self, key: &str) -> bool {
        self.read(key, |_| ()).is_some()
    }

    pub fn key_type(&self, key: &str) -> Option<Shape> {
        self.read(key, |entry| entry.value.shape())
    }

    /// Remaining TTL; `None` for a missing or persistent key.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.read(key, Entry::ttl).flatten()
    }

    /// Sets an expiry on an existing key. Returns false if the key doesn't exist.
    ///
    /// A `ttl` whose deadline cannot be represented is rejected with
    /// [`StoreError::InvalidExpire`] and leaves the key untouched.
    pub fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let deadline = Instant::now()
            .checked_add(ttl)
            .ok_or(StoreError::InvalidExpire(ttl))?;

        let mut data = self.get_shard(key).write();
        if !self.purge_expired(&mut data, key) {
            return Ok(false);
        }
        match data.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(deadline);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Removes the expiry from a key. Returns true only if one was removed.
    pub fn persist(&self, key: &str) -> bool {
        let mut data = self.get_shard(key).write();
        if !self.purge_expired(&mut data, key) {
            return false;
        }
        data.get_mut(key)
            .and_then(|entry| entry.expires_at.take())
            .is_some()
    }

    /// Deletes the given keys, returning how many were live.
    pub fn del(&self, keys: &[String]) -> u64 {
        let mut deleted = 0;
        for key in keys {
            let mut data = self.get_shard(key).write();
            let live = self.purge_expired(&mut data, key);
            if live && data.remove(key.as_str()).is_some() {
                self.key_count.fetch_sub(1, Ordering::Relaxed);
                deleted += 1;
            }
        }
        deleted
    }

    /// Returns every live key matching the glob `pattern`, sorted.
    ///
    /// Supported patterns:
    /// - `*` matches everything
    /// - `h?llo` matches hello, hallo, but not hllo
    /// - `h[ae]llo` matches hello and hallo, but not hillo
    /// - `h[^e]llo`, `h[a-b]llo` and `\*` escapes
    pub fn keys(&self, pattern: &str) -> Vec<String> {
        let mut result = Vec::new();
        for shard in &self.shards {
            let data = shard.read();
            for (key, entry) in data.iter() {
                if !entry.is_expired() && glob_match(pattern.as_bytes(), key.as_bytes()) {
                    result.push(key.clone());
                }
            }
        }
        result.sort();
        result
    }

    pub fn llen(&self, key: &str) -> StoreResult<u64> {
        match self.read(key, |entry| match &entry.value {
            Value::List(items) => Some(items.len() as u64),
            _ => None,
        }) {
            Some(Some(len)) => Ok(len),
            Some(None) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(0),
        }
    }

    /// Returns a range of list elements. Both ends are inclusive and negative
    /// indices count from the end.
    pub fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<Bytes>> {
        match self.read(key, |entry| match &entry.value {
            Value::List(items) => {
                let (skip, take) = clamp_range(items.len(), start, stop);
                Some(items.iter().skip(skip).take(take).cloned().collect())
            }
            _ => None,
        }) {
            Some(Some(items)) => Ok(items),
            Some(None) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(Vec::new()),
        }
    }

    /// Pushes values to the tail of a list, creating it if needed.
    ///
    /// Returns the length of the list after the push.
    pub fn rpush(&self, key: &str, values: Vec<Bytes>) -> StoreResult<u64> {
        self.update(
            key,
            || Value::List(VecDeque::new()),
            |value| match value {
                Value::List(items) => {
                    items.extend(values);
                    Some(items.len() as u64)
                }
                _ => None,
            },
        )
    }

    pub fn smembers(&self, key: &str) -> StoreResult<Vec<Bytes>> {
        match self.read(key, |entry| match &entry.value {
            Value::Set(members) => Some(members.iter().cloned().collect()),
            _ => None,
        }) {
            Some(Some(members)) => Ok(members),
            Some(None) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(Vec::new()),
        }
    }

    pub fn scard(&self, key: &str) -> StoreResult<u64> {
        match self.read(key, |entry| match &entry.value {
            Value::Set(members) => Some(members.len() as u64),
            _ => None,
        }) {
            Some(Some(count)) => Ok(count),
            Some(None) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(0),
        }
    }

    /// Adds members to a set. Returns how many were not already present.
    pub fn sadd(&self, key: &str, members: Vec<Bytes>) -> StoreResult<u64> {
        self.update(
            key,
            || Value::Set(BTreeSet::new()),
            |value| match value {
                Value::Set(set) => Some(members.into_iter().filter(|m| set.insert(m.clone())).count() as u64),
                _ => None,
            },
        )
    }

    pub fn hgetall(&self, key: &str) -> StoreResult<Vec<(Bytes, Bytes)>> {
        match self.read(key, |entry| match &entry.value {
            Value::Hash(fields) => Some(
                fields
                    .iter()
                    .map(|(f, v)| (f.clone(), v.clone()))
                    .collect(),
            ),
            _ => None,
        }) {
            Some(Some(fields)) => Ok(fields),
            Some(None) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(Vec::new()),
        }
    }

    /// Sets hash fields. Returns how many fields were newly created.
    pub fn hset(&self, key: &str, fields: Vec<(Bytes, Bytes)>) -> StoreResult<u64> {
        self.update(
            key,
            || Value::Hash(BTreeMap::new()),
            |value| match value {
                Value::Hash(map) => Some(
                    fields
                        .into_iter()
                        .filter(|(field, v)| map.insert(field.clone(), v.clone()).is_none())
                        .count() as u64,
                ),
                _ => None,
            },
        )
    }

    /// Members by rank with their scores. Both ends inclusive.
    pub fn zrange_withscores(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<(Bytes, f64)>> {
        match self.read(key, |entry| match &entry.value {
            Value::SortedSet(members) => {
                let (skip, take) = clamp_range(members.len(), start, stop);
                Some(members.iter().skip(skip).take(take).cloned().collect())
            }
            _ => None,
        }) {
            Some(Some(members)) => Ok(members),
            Some(None) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(Vec::new()),
        }
    }

    /// Adds or rescores members. Returns how many were added or changed.
    pub fn zadd(&self, key: &str, members: Vec<(Bytes, f64)>) -> StoreResult<u64> {
        self.update(
            key,
            || Value::SortedSet(Vec::new()),
            |value| match value {
                Value::SortedSet(set) => {
                    let mut changed = 0;
                    for (member, score) in members {
                        match set.iter_mut().find(|(m, _)| *m == member) {
                            Some((_, current)) if *current == score => {}
                            Some((_, current)) => {
                                *current = score;
                                changed += 1;
                            }
                            None => {
                                set.push((member, score));
                                changed += 1;
                            }
                        }
                    }
                    set.sort_by(|(ma, sa), (mb, sb)| sa.total_cmp(sb).then_with(|| ma.cmp(mb)));
                    Some(changed)
                }
                _ => None,
            },
        )
    }

    /// Approximate memory held by a key: key, payload and a fixed overhead.
    pub fn memory_usage(&self, key: &str) -> Option<u64> {
        self.read(key, |entry| {
            key.len() as u64 + entry.value.payload_bytes() + ENTRY_OVERHEAD
        })
    }

    /// Returns the approximate number of live keys.
    pub fn len(&self) -> u64 {
        self.key_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of keys reclaimed by expiry so far.
    pub fn expired_count(&self) -> u64 {
        self.expired_count.load(Ordering::Relaxed)
    }

    /// Removes expired keys from all shards. Called by the expiry sweeper.
    ///
    /// Returns the number of keys that were cleaned up.
    pub fn cleanup_expired(&self) -> u64 {
        let mut cleaned = 0u64;

        for shard in &self.shards {
            let mut data = shard.write();
            let before = data.len();
            data.retain(|_, entry| !entry.is_expired());
            cleaned += (before - data.len()) as u64;
        }

        if cleaned > 0 {
            self.key_count.fetch_sub(cleaned, Ordering::Relaxed);
            self.expired_count.fetch_add(cleaned, Ordering::Relaxed);
        }

        cleaned
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(MemoryStore::exists(self, key))
    }

    async fn key_type(&self, key: &str) -> StoreResult<Option<Shape>> {
        Ok(MemoryStore::key_type(self, key))
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        Ok(MemoryStore::ttl(self, key))
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        MemoryStore::get(self, key)
    }

    async fn set(&self, key: &str, value: Bytes) -> StoreResult<()> {
        MemoryStore::set(self, key, value);
        Ok(())
    }

    async fn llen(&self, key: &str) -> StoreResult<u64> {
        MemoryStore::llen(self, key)
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<Bytes>> {
        MemoryStore::lrange(self, key, start, stop)
    }

    async fn rpush(&self, key: &str, value: Bytes) -> StoreResult<u64> {
        MemoryStore::rpush(self, key, vec![value])
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<Bytes>> {
        MemoryStore::smembers(self, key)
    }

    async fn scard(&self, key: &str) -> StoreResult<u64> {
        MemoryStore::scard(self, key)
    }

    async fn sadd(&self, key: &str, members: Vec<Bytes>) -> StoreResult<u64> {
        MemoryStore::sadd(self, key, members)
    }

    async fn hgetall(&self, key: &str) -> StoreResult<Vec<(Bytes, Bytes)>> {
        MemoryStore::hgetall(self, key)
    }

    async fn hset(&self, key: &str, fields: Vec<(Bytes, Bytes)>) -> StoreResult<u64> {
        MemoryStore::hset(self, key, fields)
    }

    async fn zrange_withscores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> StoreResult<Vec<(Bytes, f64)>> {
        MemoryStore::zrange_withscores(self, key, start, stop)
    }

    async fn zadd(&self, key: &str, members: Vec<(Bytes, f64)>) -> StoreResult<u64> {
        MemoryStore::zadd(self, key, members)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        MemoryStore::expire(self, key, ttl)
    }

    async fn persist(&self, key: &str) -> StoreResult<bool> {
        Ok(MemoryStore::persist(self, key))
    }

    async fn del(&self, keys: &[String]) -> StoreResult<u64> {
        Ok(MemoryStore::del(self, keys))
    }

    /// The cursor is an offset into the sorted matches.
    async fn scan_step(&self, pattern: &str, cursor: u64, count_hint: usize) -> StoreResult<ScanBatch> {
        let matches = self.keys(pattern);
        let start = usize::try_from(cursor).unwrap_or(usize::MAX).min(matches.len());
        let end = start.saturating_add(count_hint.max(1)).min(matches.len());
        let next = if end >= matches.len() { 0 } else { end as u64 };

        Ok(ScanBatch {
            cursor: next,
            keys: matches[start..end].to_vec(),
        })
    }

    async fn memory_usage(&self, key: &str) -> StoreResult<Option<u64>> {
        if !self.memory_introspection {
            return Err(StoreError::Unsupported("MEMORY USAGE".to_string()));
        }
        Ok(MemoryStore::memory_usage(self, key))
    }
}

/// Converts an inclusive, possibly negative `[start, stop]` range over `len`
/// items into `(skip, take)`.
fn clamp_range(len: usize, start: i64, stop: i64) -> (usize, usize) {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if start > stop || start >= len {
        return (0, 0);
    }
    (start as usize, (stop - start + 1) as usize)
}

/// Redis-style glob matching over bytes.
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    if pattern.is_empty() {
        return text.is_empty();
    }

    match pattern[0] {
        b'*' => (0..=text.len()).any(|i| glob_match(&pattern[1..], &text[i..])),
        b'?' => !text.is_empty() && glob_match(&pattern[1..], &text[1..]),
        b'[' => {
            if text.is_empty() {
                return false;
            }

            let mut i = 1;
            let mut matched = false;
            let negate = pattern.get(1) == Some(&b'^');
            if negate {
                i += 1;
            }

            while i < pattern.len() && pattern[i] != b']' {
                if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
                    if text[0] >= pattern[i] && text[0] <= pattern[i + 2] {
                        matched = true;
                    }
                    i += 3;
                    continue;
                }
                if pattern[i] == text[0] {
                    matched = true;
                }
                i += 1;
            }

            if i >= pattern.len() {
                // Unterminated class never matches
                return false;
            }
            matched != negate && glob_match(&pattern[i + 1..], &text[1..])
        }
        b'\\' if pattern.len() > 1 => {
            !text.is_empty() && pattern[1] == text[0] && glob_match(&pattern[2..], &text[1..])
        }
        c => !text.is_empty() && c == text[0] && glob_match(&pattern[1..], &text[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    #[test]
    fn test_set_and_get() {
        let store = MemoryStore::new();
        store.set("key", b("value"));
        assert_eq!(store.get("key").unwrap(), Some(b("value")));
        assert_eq!(store.get("nonexistent").unwrap(), None);
    }

    #[test]
    fn test_one_shape_per_key() {
        let store = MemoryStore::new();
        store.set("k", b("v"));
        assert!(matches!(
            store.rpush("k", vec![b("x")]),
            Err(StoreError::WrongType(_))
        ));
        assert!(matches!(store.llen("k"), Err(StoreError::WrongType(_))));

        store.sadd("s", vec![b("a")]).unwrap();
        assert!(matches!(store.get("s"), Err(StoreError::WrongType(_))));
    }

    #[test]
    fn test_set_replaces_collection_and_clears_ttl() {
        let store = MemoryStore::new();
        store.rpush("k", vec![b("a")]).unwrap();
        assert!(store.expire("k", Duration::from_secs(60)).unwrap());
        store.set("k", b("v"));
        assert_eq!(store.key_type("k"), Some(Shape::String));
        assert_eq!(store.ttl("k"), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_del_counts_live_keys() {
        let store = MemoryStore::new();
        store.set("a", b("1"));
        store.set("b", b("2"));
        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(store.del(&keys), 2);
        assert_eq!(store.del(&keys), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_unrepresentable_expiry() {
        let store = MemoryStore::new();
        store.set("key", b("value"));

        assert!(matches!(
            store.expire("key", Duration::MAX),
            Err(StoreError::InvalidExpire(_))
        ));
        assert!(matches!(
            store.expire("key", Duration::from_secs(i64::MAX as u64)),
            Err(StoreError::InvalidExpire(_))
        ));
        assert!(store.exists("key"));
        assert_eq!(store.ttl("key"), None);

        // Writing with such a TTL keeps the key, without expiry
        store.set_with_ttl("forever", b("v"), Duration::MAX);
        assert!(store.exists("forever"));
        assert_eq!(store.ttl("forever"), None);
    }

    #[test]
    fn test_long_expiry_is_kept() {
        let store = MemoryStore::new();
        store.set("key", b("value"));
        let century = Duration::from_secs(100 * 365 * 24 * 3600);

        assert!(store.expire("key", century).unwrap());
        let ttl = store.ttl("key").unwrap();
        assert!(ttl > century - Duration::from_secs(5) && ttl <= century);
    }

    #[tokio::test]
    async fn test_scan_steps_cover_all_matches() {
        let store = MemoryStore::new();
        for i in 0..7 {
            store.set(&format!("user:{}", i), b("u"));
        }
        store.set("other", b("o"));

        let mut cursor = 0;
        let mut steps = 0;
        let mut seen = Vec::new();
        loop {
            let batch = store.scan_step("user:*", cursor, 3).await.unwrap();
            assert!(batch.keys.len() <= 3);
            seen.extend(batch.keys);
            steps += 1;
            if batch.cursor == 0 {
                break;
            }
            cursor = batch.cursor;
        }

        assert_eq!(steps, 3);
        assert_eq!(seen, store.keys("user:*"));

        let empty = store.scan_step("none:*", 0, 3).await.unwrap();
        assert_eq!(empty, ScanBatch::default());
    }

    #[test]
    fn test_lazy_expiry() {
        let store = MemoryStore::new();
        store.set_with_ttl("key", b("value"), Duration::from_millis(50));
        assert!(store.exists("key"));

        std::thread::sleep(Duration::from_millis(100));

        assert_eq!(store.get("key").unwrap(), None);
        assert!(!store.exists("key"));
        assert_eq!(store.key_type("key"), None);
        assert_eq!(store.expired_count(), 1);
    }

    #[test]
    fn test_ttl_expire_persist() {
        let store = MemoryStore::new();
        assert_eq!(store.ttl("nonexistent"), None);
        assert!(!store.expire("nonexistent", Duration::from_secs(5)).unwrap());

        store.set("key", b("value"));
        assert_eq!(store.ttl("key"), None);
        assert!(!store.persist("key"));

        assert!(store.expire("key", Duration::from_secs(60)).unwrap());
        let ttl = store.ttl("key").unwrap();
        assert!(ttl > Duration::from_secs(59) && ttl <= Duration::from_secs(60));

        assert!(store.persist("key"));
        assert_eq!(store.ttl("key"), None);
    }

    #[test]
    fn test_rpush_and_lrange() {
        let store = MemoryStore::new();
        assert_eq!(store.rpush("list", vec![b("a"), b("b"), b("c")]).unwrap(), 3);
        assert_eq!(store.rpush("list", vec![b("d")]).unwrap(), 4);

        assert_eq!(store.lrange("list", 0, 1).unwrap(), vec![b("a"), b("b")]);
        assert_eq!(store.lrange("list", -2, -1).unwrap(), vec![b("c"), b("d")]);
        assert_eq!(store.lrange("list", 0, 100).unwrap().len(), 4);
        assert!(store.lrange("list", 5, 10).unwrap().is_empty());
        assert!(store.lrange("missing", 0, -1).unwrap().is_empty());
    }

    #[test]
    fn test_sadd_deduplicates() {
        let store = MemoryStore::new();
        assert_eq!(store.sadd("s", vec![b("a"), b("b"), b("a")]).unwrap(), 2);
        assert_eq!(store.sadd("s", vec![b("b"), b("c")]).unwrap(), 1);
        assert_eq!(store.scard("s").unwrap(), 3);
        assert_eq!(store.smembers("s").unwrap(), vec![b("a"), b("b"), b("c")]);
    }

    #[test]
    fn test_hset_counts_new_fields() {
        let store = MemoryStore::new();
        assert_eq!(store.hset("h", vec![(b("f1"), b("1")), (b("f2"), b("2"))]).unwrap(), 2);
        assert_eq!(store.hset("h", vec![(b("f1"), b("9")), (b("f3"), b("3"))]).unwrap(), 1);
        let fields = store.hgetall("h").unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0], (b("f1"), b("9")));
    }

    #[test]
    fn test_zadd_counts_added_and_rescored() {
        let store = MemoryStore::new();
        assert_eq!(store.zadd("z", vec![(b("bob"), 2.0), (b("ann"), 1.0)]).unwrap(), 2);
        // unchanged score is not counted, rescore is
        assert_eq!(store.zadd("z", vec![(b("ann"), 1.0), (b("bob"), 0.5)]).unwrap(), 1);

        let ranked = store.zrange_withscores("z", 0, -1).unwrap();
        assert_eq!(ranked, vec![(b("bob"), 0.5), (b("ann"), 1.0)]);
    }

    #[test]
    fn test_empty_collections_are_not_stored() {
        let store = MemoryStore::new();
        assert_eq!(store.sadd("s", vec![]).unwrap(), 0);
        assert!(!store.exists("s"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_keys_pattern_sorted() {
        let store = MemoryStore::new();
        store.set("user:2", b("b"));
        store.set("user:1", b("a"));
        store.sadd("user:tags", vec![b("x")]).unwrap();
        store.set("session:1", b("c"));

        assert_eq!(store.keys("user:*"), vec!["user:1", "user:2", "user:tags"]);
        assert_eq!(store.keys("*").len(), 4);
        assert_eq!(store.keys("user:?"), vec!["user:1", "user:2"]);
    }

    #[test]
    fn test_glob_pattern() {
        assert!(glob_match(b"h?llo", b"hello"));
        assert!(!glob_match(b"h?llo", b"hllo"));
        assert!(glob_match(b"h[ae]llo", b"hallo"));
        assert!(!glob_match(b"h[ae]llo", b"hillo"));
        assert!(glob_match(b"h[^e]llo", b"hallo"));
        assert!(!glob_match(b"h[^e]llo", b"hello"));
        assert!(glob_match(b"h[a-c]llo", b"hbllo"));
        assert!(!glob_match(b"h[a-c]llo", b"hdllo"));
        assert!(glob_match(b"a\\*b", b"a*b"));
        assert!(!glob_match(b"a\\*b", b"axb"));
        assert!(!glob_match(b"h[ae", b"ha"));
    }

    #[test]
    fn test_memory_usage_estimate() {
        let store = MemoryStore::new();
        store.set("key", b("value"));
        assert_eq!(store.memory_usage("key"), Some(3 + 5 + ENTRY_OVERHEAD));
        assert_eq!(store.memory_usage("missing"), None);
    }

    #[test]
    fn test_cleanup_expired() {
        let store = MemoryStore::new();
        for i in 0..10 {
            store.set_with_ttl(&format!("key{}", i), b("v"), Duration::from_millis(10));
        }
        store.set("persistent", b("v"));
        assert_eq!(store.len(), 11);

        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(store.cleanup_expired(), 10);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..10)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..100 {
                        store.sadd(&format!("set{}", t), vec![b(&i.to_string())]).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 10);
        assert_eq!(store.scard("set3").unwrap(), 100);
    }

    #[tokio::test]
    async fn test_trait_memory_usage_can_be_disabled() {
        let store: Box<dyn Store> = Box::new(MemoryStore::new().without_memory_introspection());
        assert!(matches!(
            store.memory_usage("k").await,
            Err(StoreError::Unsupported(_))
        ));
    }
}
