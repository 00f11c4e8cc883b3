//! Error types for the memoizing cache
//!
//! Provides unified error handling using thiserror.
//!
//! Only [`CacheError::Configuration`] ever reaches a caller. Failures of the
//! wrapped computation are the caller's own error type and pass through
//! `get` untouched; the remaining variants are produced by the eviction and
//! refresh engines and are contained there (logged and counted).

use thiserror::Error;

use crate::cache::CacheKey;

// == Cache Error Enum ==
/// Unified error type for the cache engine.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Invalid construction parameters
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Key was already removed by a concurrent remover
    #[error("Key absent: {0}")]
    KeyAbsent(CacheKey),

    /// Size eviction could not remove a candidate within the retry bound
    #[error("Eviction inconsistency: no candidate removed after {attempts} attempts")]
    EvictionInconsistency { attempts: usize },

    /// Recomputing a single key during a refresh sweep failed
    #[error("Refresh of {key} failed: {reason}")]
    RefreshKey { key: CacheKey, reason: String },

    /// An engine path was invoked under the wrong refresh mode
    #[error("Misuse: {0}")]
    Misuse(String),
}

impl CacheError {
    /// Shorthand for building a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        CacheError::Configuration(msg.into())
    }
}

// == Call Error ==
/// Failure of a call forwarded through the
/// [`CacheRegistry`](crate::registry::CacheRegistry): either the cache could
/// not be built or the computation itself failed.
#[derive(Error, Debug)]
pub enum CallError<E> {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Computation failed: {0}")]
    Compute(E),
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;
