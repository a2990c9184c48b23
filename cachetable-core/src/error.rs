//! Error types for cache tables.

use thiserror::Error;

/// Errors returned by [`Registry`](crate::Registry) and [`Table`](crate::Table).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The key is absent from the table, or was evicted by a sweep
    #[error("key '{key}' not found in table '{table}'")]
    NotFound {
        /// Name of the table that was searched
        table: String,
        /// The key that was looked up
        key: String,
    },

    /// No Tokio runtime was available to run sweep timers
    #[error(
        "cachetable requires a Tokio runtime: construct the registry from within a runtime \
         or pass one with CacheConfig::with_runtime"
    )]
    NoRuntime,
}

impl CacheError {
    /// Returns `true` if this error reports a missing key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound { .. })
    }
}
