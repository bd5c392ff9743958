//! Write Dispatcher
//!
//! A write is classified once into a [`Payload`], and every payload variant
//! has exactly one [`Encoding`]. The encoding's label prefixes the stored key:
//! writing `"hello"` to `greeting` stores `String:greeting`.
//!
//! | Payload      | Encoding    | Store operation                          |
//! |--------------|-------------|------------------------------------------|
//! | `Text`       | `String`    | set                                      |
//! | `Integer`    | `Integer`   | set (decimal)                            |
//! | `Boolean`    | `Toggle`    | set (`1` / `0`)                          |
//! | `Structured` | `Json`      | set (compact JSON)                       |
//! | `Sequence`   | `List`      | delete, then one right-push per element  |
//! | `Mapping`    | `Hash`      | one hash-set with every field            |
//! | `Members`    | `Set`       | one set-add with every member            |
//! | `Scored`     | `SortedSet` | one sorted-add (`CH`) with every member  |
//!
//! The `List` encoder is not atomic: if a push fails part way, the elements
//! pushed before it stay in the store and the previous list is already gone.
//!
//! ## TTL Placement
//!
//! A positive `ttl_seconds` is applied after the write succeeds. One above
//! [`MAX_TTL_SECONDS`](crate::model::MAX_TTL_SECONDS) fails validation and
//! nothing is written. On the
//! [`WritePath::Inferred`] path it is applied to the key *as supplied*, not
//! to the prefixed key that was written; unless that unprefixed key also
//! exists, nothing expires. On the [`WritePath::Declared`] path it is applied
//! to the prefixed key.

use super::{expiry_from_now, store_failure, ttl_from_seconds, KeyAccessor};
use crate::error::{Error, Result};
use crate::model::WriteOutcome;
use crate::store::StoreResult;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// How a payload is stored, and the prefix of the key it is stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    String,
    Integer,
    Toggle,
    List,
    Json,
    Hash,
    Set,
    SortedSet,
}

impl Encoding {
    pub fn label(&self) -> &'static str {
        match self {
            Encoding::String => "String",
            Encoding::Integer => "Integer",
            Encoding::Toggle => "Toggle",
            Encoding::List => "List",
            Encoding::Json => "Json",
            Encoding::Hash => "Hash",
            Encoding::Set => "Set",
            Encoding::SortedSet => "SortedSet",
        }
    }

    /// `"{label}:{key}"`
    pub fn physical_key(&self, key: &str) -> String {
        format!("{}:{}", self.label(), key)
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A classified write value.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Integer(i64),
    Text(String),
    Boolean(bool),
    Sequence(Vec<String>),
    Members(Vec<String>),
    Mapping(BTreeMap<String, String>),
    Scored(BTreeMap<String, f64>),
    Structured(JsonValue),
}

impl Payload {
    pub fn encoding(&self) -> Encoding {
        match self {
            Payload::Integer(_) => Encoding::Integer,
            Payload::Text(_) => Encoding::String,
            Payload::Boolean(_) => Encoding::Toggle,
            Payload::Sequence(_) => Encoding::List,
            Payload::Members(_) => Encoding::Set,
            Payload::Mapping(_) => Encoding::Hash,
            Payload::Scored(_) => Encoding::SortedSet,
            Payload::Structured(_) => Encoding::Json,
        }
    }

    /// Classifies an untyped JSON value.
    ///
    /// Numbers must be integral; arrays keep string elements verbatim and
    /// render anything else as compact JSON; objects and `null` are stored as
    /// JSON documents.
    pub fn infer(value: JsonValue) -> Result<Self> {
        let payload = match value {
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Payload::Integer(i)
                } else {
                    match n.as_f64() {
                        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                            Payload::Integer(f as i64)
                        }
                        _ => {
                            return Err(Error::validation(format!(
                                "number {} is not an integer in the 64-bit range",
                                n
                            )))
                        }
                    }
                }
            }
            JsonValue::String(s) => Payload::Text(s),
            JsonValue::Bool(b) => Payload::Boolean(b),
            JsonValue::Array(items) => Payload::Sequence(
                items
                    .into_iter()
                    .map(|item| match item {
                        JsonValue::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect(),
            ),
            other @ (JsonValue::Object(_) | JsonValue::Null) => Payload::Structured(other),
        };
        Ok(payload)
    }
}

/// Which entry contract produced a [`WriteRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePath {
    /// Shape inferred from an untyped value.
    Inferred,
    /// Shape declared by the caller.
    Declared,
}

/// A validated write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub key: String,
    pub payload: Payload,
    /// `None` or `<= 0` leaves the key without expiry.
    /// At most [`MAX_TTL_SECONDS`](crate::model::MAX_TTL_SECONDS).
    pub ttl_seconds: Option<i64>,
    pub path: WritePath,
}

impl WriteRequest {
    /// Builds a write from an untyped JSON value.
    pub fn infer(key: impl Into<String>, value: JsonValue, ttl_seconds: Option<i64>) -> Result<Self> {
        let key = non_empty_key(key.into())?;
        ttl_from_seconds(ttl_seconds.unwrap_or(0))?;
        Ok(Self {
            key,
            payload: Payload::infer(value)?,
            ttl_seconds,
            path: WritePath::Inferred,
        })
    }

    pub fn physical_key(&self) -> String {
        self.payload.encoding().physical_key(&self.key)
    }

    fn ttl(&self) -> Result<Option<Duration>> {
        ttl_from_seconds(self.ttl_seconds.unwrap_or(0))
    }

    fn ttl_target(&self) -> String {
        match self.path {
            WritePath::Inferred => self.key.clone(),
            WritePath::Declared => self.physical_key(),
        }
    }
}

fn non_empty_key(key: String) -> Result<String> {
    if key.is_empty() {
        return Err(Error::validation("key must not be empty"));
    }
    Ok(key)
}

/// Shapes a caller may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    String,
    List,
    Set,
    Hash,
    SortedSet,
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "string" => Ok(DataType::String),
            "list" => Ok(DataType::List),
            "set" => Ok(DataType::Set),
            "hash" => Ok(DataType::Hash),
            "sortedset" | "zset" => Ok(DataType::SortedSet),
            _ => Err(Error::validation(format!("unsupported data type '{}'", s))),
        }
    }
}

/// Explicit-shape write as received from a client.
///
/// ```
/// use keydeck::{CreateKeyRequest, WriteRequest};
///
/// let body = r#"{ "key": "tags", "dataType": "Set", "setValues": ["a", "b"], "ttlSeconds": 60 }"#;
/// let request: CreateKeyRequest = serde_json::from_str(body).unwrap();
/// let write = WriteRequest::try_from(request).unwrap();
/// assert_eq!(write.physical_key(), "Set:tags");
/// ```
///
/// `dataType` defaults to `String` when absent.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKeyRequest {
    pub key: String,
    #[serde(default = "default_data_type")]
    pub data_type: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub list_values: Option<Vec<String>>,
    #[serde(default)]
    pub set_values: Option<Vec<String>>,
    #[serde(default)]
    pub hash_values: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub sorted_set_values: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub ttl_seconds: Option<i64>,
}

fn default_data_type() -> String {
    "String".to_string()
}

impl Default for CreateKeyRequest {
    fn default() -> Self {
        Self {
            key: String::new(),
            data_type: default_data_type(),
            value: None,
            list_values: None,
            set_values: None,
            hash_values: None,
            sorted_set_values: None,
            ttl_seconds: None,
        }
    }
}

impl TryFrom<CreateKeyRequest> for WriteRequest {
    type Error = Error;

    fn try_from(request: CreateKeyRequest) -> Result<Self> {
        let key = non_empty_key(request.key)?;
        ttl_from_seconds(request.ttl_seconds.unwrap_or(0))?;
        let data_type: DataType = request.data_type.parse()?;

        let payload = match data_type {
            DataType::String => Payload::Text(required(request.value, "value", |v| v.is_empty())?),
            DataType::List => Payload::Sequence(required(request.list_values, "listValues", Vec::is_empty)?),
            DataType::Set => Payload::Members(required(request.set_values, "setValues", Vec::is_empty)?),
            DataType::Hash => Payload::Mapping(required(request.hash_values, "hashValues", BTreeMap::is_empty)?),
            DataType::SortedSet => Payload::Scored(required(
                request.sorted_set_values,
                "sortedSetValues",
                BTreeMap::is_empty,
            )?),
        };

        Ok(Self {
            key,
            payload,
            ttl_seconds: request.ttl_seconds,
            path: WritePath::Declared,
        })
    }
}

fn required<T>(field: Option<T>, name: &str, is_empty: impl Fn(&T) -> bool) -> Result<T> {
    match field {
        Some(value) if !is_empty(&value) => Ok(value),
        _ => Err(Error::validation(format!("{} is required and must not be empty", name))),
    }
}

impl KeyAccessor {
    /// Stores the payload under its prefixed key, then applies the TTL.
    pub async fn write(&self, request: WriteRequest) -> Result<WriteOutcome> {
        let encoding = request.payload.encoding();
        let physical_key = request.physical_key();
        let ttl = request.ttl()?;
        let ttl_target = request.ttl_target();

        let affected = self
            .encode(&physical_key, request.payload)
            .await
            .map_err(|e| store_failure("write", &physical_key, e))?;

        let mut ttl_applied = false;
        let mut expires_at = None;
        if let Some(ttl) = ttl {
            ttl_applied = self
                .timed(self.store.expire(&ttl_target, ttl))
                .await
                .map_err(|e| store_failure("write", &ttl_target, e))?;
            if ttl_applied {
                expires_at = expiry_from_now(ttl);
            } else {
                debug!(key = %ttl_target, "TTL target does not exist, no expiry set");
            }
        }

        info!(
            key = %request.key,
            physical_key = %physical_key,
            encoding = %encoding,
            affected,
            ttl_applied,
            "Key written"
        );

        Ok(WriteOutcome {
            key: request.key,
            physical_key,
            encoding: encoding.label().to_string(),
            affected,
            ttl_applied,
            expires_at,
        })
    }

    /// Runs the encoder for `payload` against `physical_key`.
    async fn encode(&self, physical_key: &str, payload: Payload) -> StoreResult<u64> {
        match payload {
            Payload::Text(text) => self.set_scalar(physical_key, Bytes::from(text)).await,
            Payload::Integer(n) => self.set_scalar(physical_key, Bytes::from(n.to_string())).await,
            Payload::Boolean(flag) => {
                let value = if flag { "1" } else { "0" };
                self.set_scalar(physical_key, Bytes::from_static(value.as_bytes()))
                    .await
            }
            Payload::Structured(value) => {
                self.set_scalar(physical_key, Bytes::from(value.to_string()))
                    .await
            }
            Payload::Sequence(items) => {
                self.timed(self.store.del(&[physical_key.to_string()]))
                    .await?;
                let mut pushed = 0;
                for item in items {
                    self.timed(self.store.rpush(physical_key, Bytes::from(item)))
                        .await?;
                    pushed += 1;
                }
                Ok(pushed)
            }
            Payload::Mapping(fields) => {
                let fields = fields
                    .into_iter()
                    .map(|(field, value)| (Bytes::from(field), Bytes::from(value)))
                    .collect();
                self.timed(self.store.hset(physical_key, fields)).await
            }
            Payload::Members(members) => {
                let members = members.into_iter().map(Bytes::from).collect();
                self.timed(self.store.sadd(physical_key, members)).await
            }
            Payload::Scored(members) => {
                let members = members
                    .into_iter()
                    .map(|(member, score)| (Bytes::from(member), score))
                    .collect();
                self.timed(self.store.zadd(physical_key, members)).await
            }
        }
    }

    async fn set_scalar(&self, physical_key: &str, value: Bytes) -> StoreResult<u64> {
        self.timed(self.store.set(physical_key, value)).await?;
        Ok(1)
    }
}
