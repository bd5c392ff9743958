//! Request-scoped data types returned by the accessor.
//!
//! Nothing here is retained between calls; every value is rebuilt from the
//! store on each request.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Maximum number of characters of a string value kept in a descriptor.
pub const MAX_RENDERED_STRING: usize = 500;

/// Largest TTL the accessor accepts, in seconds (100 years).
pub const MAX_TTL_SECONDS: i64 = 100 * 365 * 24 * 60 * 60;

/// Appended to a string rendering that was cut at [`MAX_RENDERED_STRING`].
pub const TRUNCATION_MARKER: &str = "... [truncated]";

/// The storage shape of a key as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    String,
    List,
    Set,
    Hash,
    SortedSet,
    /// Any other type (streams, modules, ...), keeping the store's name for it.
    Unknown(String),
}

impl Shape {
    /// Maps a `TYPE` reply to a shape. Returns `None` for `none` (missing key).
    pub fn from_type_name(name: &str) -> Option<Self> {
        let shape = match name.to_ascii_lowercase().as_str() {
            "none" => return None,
            "string" => Shape::String,
            "list" => Shape::List,
            "set" => Shape::Set,
            "hash" => Shape::Hash,
            "zset" => Shape::SortedSet,
            _ => Shape::Unknown(name.to_string()),
        };
        Some(shape)
    }

    pub fn label(&self) -> &str {
        match self {
            Shape::String => "String",
            Shape::List => "List",
            Shape::Set => "Set",
            Shape::Hash => "Hash",
            Shape::SortedSet => "SortedSet",
            Shape::Unknown(_) => "Unknown",
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Shape {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Summary of one key at the moment it was resolved.
///
/// When `exists` is false every other field is `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyDescriptor {
    pub key: String,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape: Option<Shape>,
    #[serde(
        rename = "ttlSeconds",
        serialize_with = "serialize_ttl",
        skip_serializing_if = "Option::is_none"
    )]
    pub ttl: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_usage_bytes: Option<u64>,
}

impl KeyDescriptor {
    /// Descriptor for a key the store does not hold.
    pub fn missing(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            exists: false,
            shape: None,
            ttl: None,
            expires_at: None,
            rendered_value: None,
            memory_usage_bytes: None,
        }
    }
}

fn serialize_ttl<S: Serializer>(ttl: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
    match ttl {
        Some(ttl) => serializer.serialize_f64(ttl.as_secs_f64()),
        None => serializer.serialize_none(),
    }
}

/// A lookup that failed while hydrating a page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyFailure {
    pub key: String,
    pub error: String,
}

/// One slot of a [`PagedKeyListing`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum KeyEntry {
    Resolved(KeyDescriptor),
    Failed(KeyFailure),
}

impl KeyEntry {
    pub fn key(&self) -> &str {
        match self {
            KeyEntry::Resolved(descriptor) => &descriptor.key,
            KeyEntry::Failed(failure) => &failure.key,
        }
    }

    pub fn descriptor(&self) -> Option<&KeyDescriptor> {
        match self {
            KeyEntry::Resolved(descriptor) => Some(descriptor),
            KeyEntry::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, KeyEntry::Failed(_))
    }
}

/// One page of keys matching a pattern.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedKeyListing {
    pub pattern: String,
    /// Size of the whole match set, independent of paging.
    pub total_match_count: usize,
    pub page: usize,
    pub page_size: usize,
    pub queried_at: DateTime<Utc>,
    pub keys: Vec<KeyEntry>,
}

/// What a write did to the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOutcome {
    /// The key as supplied by the caller.
    pub key: String,
    /// The key actually written: `"{encoding}:{key}"`.
    pub physical_key: String,
    pub encoding: String,
    /// Elements pushed, members or fields added, or 1 for a scalar.
    pub affected: u64,
    pub ttl_applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}
