//! The retry executor: runs operations under named policies.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, trace, warn};

use crate::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, Classify, RetryError, RetryPolicy,
};

/// Runs fallible async operations under named retry policies, optionally
/// behind per-service circuit breakers.
///
/// Policies and breaker configs are registered up front (`&mut self`);
/// execution takes `&self`, so one executor can be shared behind an `Arc`.
/// Breaker state is created lazily the first time a service is used and
/// lives as long as the executor.
#[derive(Debug, Default)]
pub struct RetryExecutor {
    policies: HashMap<String, RetryPolicy>,
    breaker_configs: HashMap<String, CircuitBreakerConfig>,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
}

impl RetryExecutor {
    /// Service name of the default breaker guarding the auth provider.
    pub const AUTH_SERVICE: &'static str = "auth";

    /// Service name of the default breaker guarding the backing database.
    pub const DATABASE_SERVICE: &'static str = "database";

    /// An executor with no policies and no breakers.
    pub fn new() -> Self {
        Self::default()
    }

    /// An executor with the `database`, `network`, `api`, `file`, and `auth`
    /// policies and default breakers for `database` and `auth`.
    pub fn with_defaults() -> Self {
        let mut executor = Self::new();
        for (name, policy) in RetryPolicy::defaults() {
            executor.register_policy(name, policy);
        }
        executor.register_circuit_breaker(Self::DATABASE_SERVICE, CircuitBreakerConfig::default());
        executor.register_circuit_breaker(Self::AUTH_SERVICE, CircuitBreakerConfig::default());
        executor
    }

    /// Adds or replaces a policy.
    pub fn register_policy(&mut self, name: impl Into<String>, policy: RetryPolicy) {
        self.policies.insert(name.into(), policy.validated());
    }

    /// Adds or replaces a breaker config. Any existing breaker state for
    /// the service is dropped.
    pub fn register_circuit_breaker(
        &mut self,
        service: impl Into<String>,
        config: CircuitBreakerConfig,
    ) {
        let service = service.into();
        self.lock_breakers().remove(&service);
        self.breaker_configs.insert(service, config.validated());
    }

    /// Looks up a policy by name.
    pub fn policy(&self, name: &str) -> Option<&RetryPolicy> {
        self.policies.get(name)
    }

    /// The breaker state for a registered service, or `None` if the
    /// service has no breaker.
    pub fn circuit_state(&self, service: &str) -> Option<CircuitState> {
        self.with_breaker(service, |b| b.state())
    }

    /// Consecutive failures recorded against a service's breaker.
    pub fn circuit_failures(&self, service: &str) -> Option<u32> {
        self.with_breaker(service, |b| b.failure_count())
    }

    /// Runs `operation` under the named policy.
    ///
    /// For `attempt` in `1..=max_attempts`: go through the service's breaker
    /// if it has one, call the operation, and on failure either give up (not
    /// retryable, or last attempt) or sleep
    /// `min(base * multiplier^(attempt-1), max) + jitter` and go again.
    ///
    /// # Errors
    /// - [`RetryError::UnknownPolicy`] if `policy_name` isn't registered.
    /// - [`RetryError::CircuitOpen`] if the breaker rejected an attempt. The
    ///   operation is not called for that attempt and no further attempts
    ///   are made.
    /// - [`RetryError::Operation`] with the last error otherwise.
    pub async fn execute_with_retry<T, E, F, Fut>(
        &self,
        policy_name: &str,
        service: Option<&str>,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        let policy = self
            .policies
            .get(policy_name)
            .ok_or_else(|| RetryError::<E>::UnknownPolicy(policy_name.to_owned()))?;
        let breaker = service.filter(|s| self.breaker_configs.contains_key(*s));

        let mut attempt = 1;
        loop {
            if let Some(service) = breaker {
                let admitted = self.with_breaker(service, CircuitBreaker::try_acquire);
                if admitted == Some(false) {
                    debug!(service, policy = policy_name, attempt, "rejected by open circuit");
                    return Err(RetryError::CircuitOpen {
                        service: service.to_owned(),
                    });
                }
            }

            trace!(policy = policy_name, attempt, "executing operation");
            match operation().await {
                Ok(value) => {
                    if let Some(service) = breaker {
                        self.with_breaker(service, CircuitBreaker::record_success);
                    }
                    if attempt > 1 {
                        debug!(policy = policy_name, attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if let Some(service) = breaker {
                        self.with_breaker(service, CircuitBreaker::record_failure);
                    }

                    if !policy.is_retryable(&error) {
                        debug!(policy = policy_name, attempt, %error, "not retryable");
                        return Err(RetryError::Operation(error));
                    }
                    if attempt >= policy.max_attempts {
                        warn!(policy = policy_name, attempt, %error, "retry attempts exhausted");
                        return Err(RetryError::Operation(error));
                    }

                    let delay = policy.delay_for(attempt);
                    debug!(
                        policy = policy_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "operation failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Runs `f` against the service's breaker, creating it on first use.
    /// The lock is held only for the duration of `f`, never across an await.
    fn with_breaker<R>(&self, service: &str, f: impl FnOnce(&mut CircuitBreaker) -> R) -> Option<R> {
        let config = *self.breaker_configs.get(service)?;
        let mut breakers = self.lock_breakers();
        let breaker = breakers
            .entry(service.to_owned())
            .or_insert_with(|| CircuitBreaker::new(service, config));
        Some(f(breaker))
    }

    fn lock_breakers(&self) -> MutexGuard<'_, HashMap<String, CircuitBreaker>> {
        // A panic while holding the lock leaves the map itself intact.
        self.breakers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_defaults_registers_named_policies() {
        let ex = RetryExecutor::with_defaults();

        for name in ["database", "network", "api", "file", "auth"] {
            assert!(ex.policy(name).is_some(), "missing policy {name}");
        }
        assert!(ex.policy("nope").is_none());
    }

    #[test]
    fn test_with_defaults_registers_auth_and_database_breakers() {
        let ex = RetryExecutor::with_defaults();

        assert_eq!(ex.circuit_state("auth"), Some(CircuitState::Closed));
        assert_eq!(ex.circuit_state("database"), Some(CircuitState::Closed));
        assert_eq!(ex.circuit_state("storage"), None);
    }

    #[tokio::test]
    async fn test_execute_unknown_policy_returns_error() {
        let ex = RetryExecutor::new();

        let result: Result<(), RetryError<String>> =
            ex.execute_with_retry("missing", None, || async { Ok(()) }).await;

        assert!(matches!(result, Err(RetryError::UnknownPolicy(name)) if name == "missing"));
    }
}
