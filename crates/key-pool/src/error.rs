//! Error types for pool operations

/// Errors from pool operations.
///
/// Domain outcomes (pool full, duplicate key, index out of range) are plain
/// `bool`/`Option` results; these variants cover storage faults and the
/// failover loop.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("key store error: {0}")]
    Store(String),

    #[error("no active API keys available")]
    NoActiveCredentials,

    #[error("upstream error: {0}")]
    Upstream(#[from] chat::ChatError),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
