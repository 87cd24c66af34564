use thiserror::Error;

/// Failures raised by the storage and cache layer.
///
/// Most cache operations swallow these at the point of origin and degrade
/// to a cache miss; only the chapter download entry point hands them back
/// to its caller.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to read stored value `{key}`: {reason}")]
    StorageRead { key: String, reason: String },

    #[error("failed to write stored value `{key}`: {reason}")]
    StorageWrite { key: String, reason: String },

    #[error("download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("request to {endpoint} failed: {reason}")]
    Api { endpoint: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;
