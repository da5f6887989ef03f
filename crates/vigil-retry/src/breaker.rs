//! Per-service circuit breaker.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Breaker thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker. At least 1.
    pub failure_threshold: u32,
    /// How long the breaker stays open before letting a probe through.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// Clamp `failure_threshold` to at least 1.
    pub fn validated(mut self) -> Self {
        if self.failure_threshold == 0 {
            warn!("failure_threshold is 0; clamping to 1");
            self.failure_threshold = 1;
        }
        self
    }
}

/// Where a breaker is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow normally; failures are being counted.
    Closed,
    /// Calls are rejected without being attempted.
    Open,
    /// The reset timeout elapsed; the next outcome decides.
    HalfOpen,
}

/// A failure-detecting gate in front of one named service.
///
/// Counters only move in response to outcomes. Time alone never resets a
/// breaker: an open breaker just becomes *eligible* for a probe, and that
/// transition happens when someone next asks to go through.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    service: String,
    config: CircuitBreakerConfig,
    state: CircuitState,
    failure_count: u32,
    next_attempt_at: Option<Instant>,
}

impl CircuitBreaker {
    /// A closed breaker with no recorded failures.
    pub fn new(service: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            service: service.into(),
            config: config.validated(),
            state: CircuitState::Closed,
            failure_count: 0,
            next_attempt_at: None,
        }
    }

    /// Asks permission to call the service now.
    ///
    /// An open breaker whose `next_attempt_at` has passed moves to
    /// `HalfOpen` and admits the call. Otherwise an open breaker rejects.
    pub fn try_acquire(&mut self) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let due = self.next_attempt_at.is_none_or(|at| Instant::now() >= at);
                if due {
                    self.state = CircuitState::HalfOpen;
                    info!(service = %self.service, "circuit half-open, admitting probe");
                }
                due
            }
        }
    }

    /// Records a successful call: closes the breaker and zeroes the count.
    pub fn record_success(&mut self) {
        if self.state != CircuitState::Closed {
            info!(service = %self.service, "circuit closed");
        }
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.next_attempt_at = None;
    }

    /// Records a failed call.
    ///
    /// A failure while half-open reopens immediately. A failure while
    /// closed opens the breaker once the consecutive count reaches the
    /// threshold. Either way `next_attempt_at` becomes now + reset timeout.
    pub fn record_failure(&mut self) {
        self.failure_count = self.failure_count.saturating_add(1);

        let should_open = match self.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => self.failure_count >= self.config.failure_threshold,
            CircuitState::Open => false,
        };

        if should_open {
            self.state = CircuitState::Open;
            self.next_attempt_at = Some(Instant::now() + self.config.reset_timeout);
            warn!(
                service = %self.service,
                failures = self.failure_count,
                reset_secs = self.config.reset_timeout.as_secs_f64(),
                "circuit opened"
            );
        } else {
            debug!(
                service = %self.service,
                failures = self.failure_count,
                threshold = self.config.failure_threshold,
                "circuit failure recorded"
            );
        }
    }

    /// Current state. Does not perform the `Open → HalfOpen` transition.
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Consecutive failures since the last success.
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// When an open breaker will next admit a probe.
    pub fn next_attempt_at(&self) -> Option<Instant> {
        self.next_attempt_at
    }

    /// The service this breaker guards.
    pub fn service(&self) -> &str {
        &self.service
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "db",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                reset_timeout: Duration::from_secs(60),
            },
        )
    }

    #[test]
    fn test_new_breaker_is_closed() {
        let b = breaker(3);
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.failure_count(), 0);
        assert!(b.next_attempt_at().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_failure_opens_exactly_at_threshold() {
        let mut b = breaker(3);

        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Closed);

        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_attempt_at_is_failure_instant_plus_reset() {
        let mut b = breaker(1);
        let before = Instant::now();

        b.record_failure();

        assert_eq!(b.next_attempt_at(), Some(before + Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_acquire_rejects_until_reset_timeout() {
        let mut b = breaker(1);
        b.record_failure();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!b.try_acquire());
        assert_eq!(b.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(b.try_acquire());
        assert_eq!(b.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_success_closes_and_resets_count() {
        let mut b = breaker(2);
        b.record_failure();
        b.record_failure();
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(b.try_acquire());

        b.record_success();

        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_with_fresh_deadline() {
        let mut b = breaker(2);
        b.record_failure();
        b.record_failure();
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(b.try_acquire());
        let reopened_at = Instant::now();

        b.record_failure();

        assert_eq!(b.state(), CircuitState::Open);
        assert_eq!(b.next_attempt_at(), Some(reopened_at + Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_alone_does_not_reset_counters() {
        let mut b = breaker(3);
        b.record_failure();
        b.record_failure();

        tokio::time::advance(Duration::from_secs(3_600)).await;

        assert_eq!(b.failure_count(), 2);
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[test]
    fn test_success_between_failures_restarts_count() {
        let mut b = breaker(3);
        b.record_failure();
        b.record_failure();
        b.record_success();
        b.record_failure();

        assert_eq!(b.failure_count(), 1);
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[test]
    fn test_zero_threshold_clamped_to_one() {
        let b = breaker(0);
        assert_eq!(b.config.failure_threshold, 1);
    }
}
