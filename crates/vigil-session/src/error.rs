//! Error types for the session layer.

use vigil_core::StoreError;
use vigil_retry::{Classify, ErrorKind};

/// Failures reported by an [`AuthProvider`](crate::AuthProvider).
///
/// The split matters: connectivity failures are handed to recovery and
/// replayed later, everything else is terminal for the operation that hit
/// it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The provider couldn't be reached, or the call timed out.
    #[error("auth provider unreachable: {0}")]
    Connectivity(String),

    /// The provider answered with an error.
    #[error("auth provider error: {0}")]
    Provider(String),

    /// The provider refused the credentials (revoked or malformed token).
    #[error("credentials rejected: {0}")]
    Rejected(String),
}

impl AuthError {
    /// `true` for failures that should be queued for recovery rather than
    /// retried in place.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }
}

impl Classify for AuthError {
    fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Connectivity(_) => Some(ErrorKind::Connectivity),
            // Free-form provider messages go to the phrase check.
            Self::Provider(_) | Self::Rejected(_) => None,
        }
    }
}

/// Errors returned by [`SessionManager`](crate::SessionManager) operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The operation needs a current session and there is none.
    #[error("no active session")]
    NoSession,

    /// A refresh attempt failed with a non-connectivity error.
    ///
    /// If the retry budget isn't spent yet, another attempt is already
    /// scheduled when the caller sees this.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// The provider rejected a logout or similar direct call.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Reading or writing the persisted session record failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The operation was overtaken by `initialize`, `destroy`, `logout`,
    /// or expiry before it completed.
    #[error("operation cancelled by a session reset")]
    Cancelled,

    /// The manager's background task has stopped.
    #[error("session manager is no longer running")]
    Unavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_connectivity_only_for_connectivity_variant() {
        assert!(AuthError::Connectivity("offline".into()).is_connectivity());
        assert!(!AuthError::Provider("500".into()).is_connectivity());
        assert!(!AuthError::Rejected("revoked".into()).is_connectivity());
    }

    #[test]
    fn test_error_kind_tags_connectivity() {
        assert_eq!(
            AuthError::Connectivity("dns".into()).error_kind(),
            Some(ErrorKind::Connectivity)
        );
        assert_eq!(AuthError::Rejected("revoked".into()).error_kind(), None);
    }
}
