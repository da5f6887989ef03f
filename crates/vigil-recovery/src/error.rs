//! Error types for the recovery layer.

/// Errors returned by [`RecoveryCoordinator`](crate::RecoveryCoordinator)
/// operations.
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    /// The coordinator was destroyed or its task has stopped.
    #[error("recovery coordinator is no longer running")]
    Unavailable,
}
