//! Error types returned by [`KeyAccessor`](crate::KeyAccessor).

use crate::store::StoreError;
use thiserror::Error;

/// Accessor error.
#[derive(Debug, Error)]
pub enum Error {
    /// The request is malformed: missing or empty field for the declared
    /// shape, unrecognized shape tag, non-integral number, bad paging.
    #[error("validation error: {0}")]
    Validation(String),

    /// The store lacks memory introspection. Only raised inside `resolve`,
    /// which swallows it.
    #[error("memory introspection unsupported: {0}")]
    UnsupportedIntrospection(String),

    /// A store call failed.
    #[error("{op} failed for '{target}': {source}")]
    Store {
        /// Accessor operation that issued the call
        op: &'static str,
        /// Key or pattern it was acting on
        target: String,
        #[source]
        source: StoreError,
    },
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// True if this is a store call that ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Store {
                source: StoreError::Timeout(_),
                ..
            }
        )
    }
}

/// Convenience type alias for Result with the accessor Error.
pub type Result<T> = std::result::Result<T, Error>;
