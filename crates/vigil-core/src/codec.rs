//! Codec trait and implementations for persisted records.
//!
//! The storage port only moves strings. A codec turns a record into one
//! of those strings and back. [`JsonCodec`] is the only implementation;
//! JSON keeps the stored session human-readable when debugging a device.

use serde::{Serialize, de::DeserializeOwned};

use crate::StoreError;

/// Encodes values to strings and decodes them back.
///
/// `DeserializeOwned` (rather than `Deserialize<'de>`) means the decoded
/// value owns its data, so the input string can be dropped right after.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value.
    ///
    /// # Errors
    /// Returns [`StoreError::Encode`] if the value can't be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, StoreError>;

    /// Deserializes a value.
    ///
    /// # Errors
    /// Returns [`StoreError::Decode`] if the input is malformed or doesn't
    /// match `T`.
    fn decode<T: DeserializeOwned>(&self, data: &str) -> Result<T, StoreError>;
}

/// A [`Codec`] backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, StoreError> {
        serde_json::to_string(value).map_err(StoreError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &str) -> Result<T, StoreError> {
        serde_json::from_str(data).map_err(StoreError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Session, Timestamp};

    #[test]
    fn test_json_codec_decode_garbage_returns_decode_error() {
        let result: Result<Session, _> = JsonCodec.decode("{not json");

        assert!(matches!(result, Err(StoreError::Decode(_))));
    }

    #[test]
    fn test_json_codec_decode_missing_field_returns_decode_error() {
        let result: Result<Session, _> = JsonCodec.decode(r#"{"access_token":"a"}"#);

        assert!(matches!(result, Err(StoreError::Decode(_))));
    }

    #[test]
    fn test_json_codec_session_field_names() {
        let session = Session::new("a", "r", Timestamp(42));

        let json = JsonCodec.encode(&session).unwrap();

        assert!(json.contains(r#""access_token":"a""#));
        assert!(json.contains(r#""refresh_token":"r""#));
        assert!(json.contains(r#""expires_at":42"#));
    }
}
