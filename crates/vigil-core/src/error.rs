//! Error types for the storage layer.
//!
//! Each crate in Vigil defines its own error enum. A `StoreError` always
//! means the problem is in persisting or reading back a record, not in
//! the session lifecycle itself.

/// Errors that can occur while reading or writing persisted records.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Serialization failed (turning a record into a string).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed. The stored value is malformed, truncated,
    /// or was written by an incompatible version.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The backing key-value store reported a failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}
