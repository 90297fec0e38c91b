//! Error types for monoselect-cache

use thiserror::Error;

/// Errors that can occur while reading or writing cache metadata
#[derive(Error, Debug)]
pub enum CacheError {
    /// The store could not be reached or refused the request
    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    /// The remote store answered with an unexpected status
    #[error("cache store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// A key cannot be mapped onto the store's namespace
    #[error("invalid cache key {component}/{content_hash}: {reason}")]
    InvalidKey {
        component: String,
        content_hash: String,
        reason: String,
    },

    /// No store was selected, see [`crate::store_from_env`]
    #[error("cache store is not configured (set MONOSELECT_CACHE_URL or MONOSELECT_CACHE_DIR)")]
    NotConfigured,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        CacheError::Unavailable(err.to_string())
    }
}
