//! Retry policy configuration.

use std::collections::BTreeSet;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::classify::{Classify, ErrorKind, looks_transient};

/// How often, how patiently, and for which failures to retry.
///
/// Policies are registered by name on a
/// [`RetryExecutor`](crate::RetryExecutor) at startup and never mutated
/// afterwards. Callers pick one by name per call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. At least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Upper bound on the backoff delay (before jitter is added).
    pub max_delay: Duration,
    /// Growth factor applied per attempt. At least 1.0.
    pub backoff_multiplier: f64,
    /// Uniform random extra delay in `0..=jitter_max`.
    pub jitter_max: Duration,
    /// Tagged error kinds this policy retries.
    pub retryable: BTreeSet<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::api()
    }
}

impl RetryPolicy {
    /// Backing database calls: few attempts, moderate patience.
    pub fn database() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(10_000),
            backoff_multiplier: 2.0,
            jitter_max: Duration::from_millis(1_000),
            retryable: [
                ErrorKind::Connectivity,
                ErrorKind::Timeout,
                ErrorKind::ServiceUnavailable,
                ErrorKind::Conflict,
            ]
            .into(),
        }
    }

    /// Raw network calls: more attempts, starting sooner.
    pub fn network() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(30_000),
            backoff_multiplier: 2.0,
            jitter_max: Duration::from_millis(500),
            retryable: [
                ErrorKind::Connectivity,
                ErrorKind::Timeout,
                ErrorKind::ServiceUnavailable,
            ]
            .into(),
        }
    }

    /// HTTP API calls, including rate-limit responses.
    pub fn api() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(15_000),
            backoff_multiplier: 2.0,
            jitter_max: Duration::from_millis(1_000),
            retryable: [
                ErrorKind::Connectivity,
                ErrorKind::Timeout,
                ErrorKind::RateLimited,
                ErrorKind::ServiceUnavailable,
            ]
            .into(),
        }
    }

    /// Local file operations.
    pub fn file() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(5_000),
            backoff_multiplier: 1.5,
            jitter_max: Duration::from_millis(200),
            retryable: [ErrorKind::Io, ErrorKind::Timeout].into(),
        }
    }

    /// Auth provider calls: one attempt, nothing retried in place.
    ///
    /// The session layer schedules its own refresh retries and hands
    /// connectivity failures to recovery, so this profile exists only to put
    /// the call behind the `auth` circuit breaker.
    pub fn auth() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(1_000),
            backoff_multiplier: 1.0,
            jitter_max: Duration::ZERO,
            retryable: BTreeSet::new(),
        }
    }

    /// The profiles every executor starts with.
    pub fn defaults() -> [(&'static str, Self); 5] {
        [
            ("database", Self::database()),
            ("network", Self::network()),
            ("api", Self::api()),
            ("file", Self::file()),
            ("auth", Self::auth()),
        ]
    }

    /// Clamp out-of-range values so the policy is safe to use.
    ///
    /// Rules:
    /// - `max_attempts` at least 1.
    /// - `backoff_multiplier` finite and at least 1.0.
    /// - `max_delay` at least `base_delay`.
    pub fn validated(mut self) -> Self {
        if self.max_attempts == 0 {
            warn!("max_attempts is 0; clamping to 1");
            self.max_attempts = 1;
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            warn!(
                multiplier = self.backoff_multiplier,
                "backoff_multiplier out of range; clamping to 1.0"
            );
            self.backoff_multiplier = 1.0;
        }
        if self.max_delay < self.base_delay {
            warn!(
                base_ms = self.base_delay.as_millis() as u64,
                max_ms = self.max_delay.as_millis() as u64,
                "max_delay below base_delay; raising it"
            );
            self.max_delay = self.base_delay;
        }
        self
    }

    /// `min(base_delay * multiplier^(attempt-1), max_delay)`, no jitter.
    ///
    /// `attempt` is the 1-based number of the attempt that just failed.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }

    /// A uniform random draw from `0..=jitter_max`, at millisecond grain.
    pub fn jitter(&self) -> Duration {
        let max_ms = u64::try_from(self.jitter_max.as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=max_ms))
    }

    /// Backoff plus jitter: the sleep before the next attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_delay(attempt) + self.jitter()
    }

    /// Whether this policy retries `error`.
    ///
    /// A tagged error is retried iff its kind is in [`Self::retryable`]. An
    /// untagged error is retried iff its message looks transient.
    pub fn is_retryable<E: Classify + ?Sized>(&self, error: &E) -> bool {
        match error.error_kind() {
            Some(kind) => self.retryable.contains(&kind),
            None => looks_transient(&error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    fn policy(base_ms: u64, max_ms: u64, multiplier: f64) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
            backoff_multiplier: multiplier,
            jitter_max: Duration::ZERO,
            retryable: BTreeSet::new(),
        }
    }

    // =====================================================================
    // backoff_delay()
    // =====================================================================

    #[test]
    fn test_backoff_delay_grows_geometrically() {
        let p = policy(1_000, 60_000, 2.0);

        assert_eq!(p.backoff_delay(1), Duration::from_millis(1_000));
        assert_eq!(p.backoff_delay(2), Duration::from_millis(2_000));
        assert_eq!(p.backoff_delay(3), Duration::from_millis(4_000));
    }

    #[test]
    fn test_backoff_delay_capped_at_max() {
        let p = policy(1_000, 5_000, 2.0);

        assert_eq!(p.backoff_delay(4), Duration::from_millis(5_000));
        assert_eq!(p.backoff_delay(40), Duration::from_millis(5_000));
    }

    #[test]
    fn test_jitter_zero_when_disabled() {
        let p = policy(1_000, 5_000, 2.0);
        assert_eq!(p.jitter(), Duration::ZERO);
        assert_eq!(p.delay_for(2), Duration::from_millis(2_000));
    }

    #[test]
    fn test_jitter_stays_within_bound() {
        let p = RetryPolicy {
            jitter_max: Duration::from_millis(250),
            ..policy(1_000, 5_000, 2.0)
        };

        for _ in 0..200 {
            assert!(p.jitter() <= Duration::from_millis(250));
        }
    }

    // =====================================================================
    // validated()
    // =====================================================================

    #[test]
    fn test_validated_clamps_bad_values() {
        let p = RetryPolicy {
            max_attempts: 0,
            ..policy(2_000, 1_000, 0.5)
        }
        .validated();

        assert_eq!(p.max_attempts, 1);
        assert_eq!(p.backoff_multiplier, 1.0);
        assert_eq!(p.max_delay, Duration::from_millis(2_000));
    }

    #[test]
    fn test_validated_keeps_default_profiles_unchanged() {
        for (_, p) in RetryPolicy::defaults() {
            assert_eq!(p.clone().validated(), p);
        }
    }

    // =====================================================================
    // is_retryable()
    // =====================================================================

    #[test]
    fn test_is_retryable_tagged_error_uses_kind_set() {
        let db = RetryPolicy::database();
        let file = RetryPolicy::file();
        let err = io::Error::from(io::ErrorKind::PermissionDenied);

        // PermissionDenied classifies as Io.
        assert!(!db.is_retryable(&err));
        assert!(file.is_retryable(&err));
    }

    #[test]
    fn test_is_retryable_untagged_error_uses_phrases() {
        let p = RetryPolicy::api();

        assert!(p.is_retryable("connection reset by peer"));
        assert!(!p.is_retryable("email already registered"));
    }
}
