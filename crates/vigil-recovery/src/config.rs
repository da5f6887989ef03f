//! Recovery configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;
use vigil_retry::RetryPolicy;

/// Tunables for the recovery coordinator.
///
/// The defaults are the ones the coordinator was designed around: three
/// recovery attempts per offline episode, backing off from one second to
/// at most thirty, and a pending queue that never holds more than ten
/// actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Attempts per offline→online episode before giving up. Default: 3.
    pub max_recovery_attempts: u32,

    /// Backoff base: attempt `n` failing waits `base_delay * 2^n`.
    /// Default: 1 s.
    pub base_delay: Duration,

    /// Backoff ceiling. Default: 30 s.
    pub max_delay: Duration,

    /// Snapshots older than this aren't offered to the provider.
    /// Default: 1 h.
    pub snapshot_max_age: Duration,

    /// Queue length that triggers trimming. Default: 10.
    pub max_pending: usize,

    /// Entries kept (newest first) when the queue is trimmed. Default: 5.
    pub trim_to: usize,

    /// Replay attempts per pending action before it is dropped. Default: 3.
    pub max_action_retries: u32,

    /// Upper bound on each provider call made during recovery or replay.
    /// Default: 30 s.
    pub provider_timeout: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_recovery_attempts: 3,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            snapshot_max_age: Duration::from_secs(3_600),
            max_pending: 10,
            trim_to: 5,
            max_action_retries: 3,
            provider_timeout: Duration::from_secs(30),
        }
    }
}

impl RecoveryConfig {
    /// Validates and clamps values to safe ranges.
    ///
    /// Rules:
    /// - `max_recovery_attempts`, `max_action_retries`, `max_pending`, and
    ///   `trim_to` at least 1.
    /// - `trim_to` at most `max_pending`.
    /// - `max_delay` at least `base_delay`.
    pub fn validated(mut self) -> Self {
        if self.max_recovery_attempts == 0 {
            warn!("max_recovery_attempts is 0; clamping to 1");
            self.max_recovery_attempts = 1;
        }
        if self.max_action_retries == 0 {
            warn!("max_action_retries is 0; clamping to 1");
            self.max_action_retries = 1;
        }
        if self.max_pending == 0 {
            warn!("max_pending is 0; clamping to 1");
            self.max_pending = 1;
        }
        if self.trim_to == 0 || self.trim_to > self.max_pending {
            let clamped = self.trim_to.clamp(1, self.max_pending);
            warn!(trim_to = self.trim_to, clamped, "trim_to out of range; clamping");
            self.trim_to = clamped;
        }
        if self.max_delay < self.base_delay {
            warn!("max_delay below base_delay; raising it");
            self.max_delay = self.base_delay;
        }
        if self.provider_timeout.is_zero() {
            warn!("provider_timeout is 0; using 30s");
            self.provider_timeout = Duration::from_secs(30);
        }
        self
    }

    /// Delay before the next recovery attempt, after `attempts` have failed:
    /// `min(base_delay * 2^attempts, max_delay)`.
    pub fn retry_delay(&self, attempts: u32) -> Duration {
        let schedule = RetryPolicy {
            max_attempts: self.max_recovery_attempts,
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            backoff_multiplier: 2.0,
            jitter_max: Duration::ZERO,
            retryable: Default::default(),
        };
        schedule.backoff_delay(attempts.saturating_add(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        let config = RecoveryConfig::default();

        assert_eq!(config.retry_delay(1), Duration::from_secs(2));
        assert_eq!(config.retry_delay(2), Duration::from_secs(4));
        assert_eq!(config.retry_delay(4), Duration::from_secs(16));
        assert_eq!(config.retry_delay(5), Duration::from_secs(30));
        assert_eq!(config.retry_delay(20), Duration::from_secs(30));
    }

    #[test]
    fn test_validated_clamps_queue_bounds() {
        let config = RecoveryConfig {
            max_pending: 4,
            trim_to: 9,
            max_recovery_attempts: 0,
            ..RecoveryConfig::default()
        }
        .validated();

        assert_eq!(config.trim_to, 4);
        assert_eq!(config.max_recovery_attempts, 1);
    }

    #[test]
    fn test_validated_keeps_defaults_unchanged() {
        assert_eq!(RecoveryConfig::default().validated(), RecoveryConfig::default());
    }
}
