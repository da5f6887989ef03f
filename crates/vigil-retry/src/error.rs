//! Error types for the retry layer.

/// Why [`RetryExecutor::execute_with_retry`](crate::RetryExecutor::execute_with_retry)
/// gave up.
///
/// Generic over the operation's own error type `E`, so callers get their
/// original error back untouched when the operation itself failed.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// The operation failed and was either not retryable or out of attempts.
    /// This is the last error it returned.
    #[error("{0}")]
    Operation(E),

    /// The service's circuit breaker is open. The operation was not called.
    #[error("circuit breaker for `{service}` is open")]
    CircuitOpen {
        /// The service name the breaker is registered under.
        service: String,
    },

    /// No policy is registered under the requested name.
    #[error("no retry policy named `{0}`")]
    UnknownPolicy(String),
}

impl<E> RetryError<E> {
    /// `true` for the synthetic fail-fast rejection.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// The operation's own error, if that is why we stopped.
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Operation(e) => Some(e),
            _ => None,
        }
    }
}
