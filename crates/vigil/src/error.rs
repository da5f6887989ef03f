//! Unified error type for Vigil.

use vigil_core::StoreError;
use vigil_recovery::RecoveryError;
use vigil_session::{AuthError, SessionError};

/// Top-level error that wraps every layer's error.
///
/// Each variant has a `#[from]` impl, so `?` lifts a layer error into a
/// `VigilError` without ceremony.
#[derive(Debug, thiserror::Error)]
pub enum VigilError {
    /// Reading or writing the persisted session record.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A provider call failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A session manager operation failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The recovery coordinator is gone.
    #[error(transparent)]
    Recovery(#[from] RecoveryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_auth_error_keeps_message() {
        let err: VigilError = AuthError::Rejected("bad token".into()).into();

        assert!(matches!(err, VigilError::Auth(_)));
        assert!(err.to_string().contains("bad token"));
    }

    #[test]
    fn test_from_session_error() {
        let err: VigilError = SessionError::NoSession.into();
        assert!(matches!(err, VigilError::Session(SessionError::NoSession)));
    }

    #[test]
    fn test_from_recovery_error() {
        let err: VigilError = RecoveryError::Unavailable.into();
        assert!(matches!(err, VigilError::Recovery(_)));
    }

    #[test]
    fn test_from_store_error() {
        let err: VigilError = StoreError::Backend("disk full".into()).into();
        assert!(err.to_string().contains("disk full"));
    }
}
