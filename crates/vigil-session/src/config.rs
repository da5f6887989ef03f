//! Session manager configuration.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;
use vigil_retry::{RetryExecutor, RetryPolicy};

// ---------------------------------------------------------------------------
// RoleTimeouts
// ---------------------------------------------------------------------------

/// How long a session may live for a given role, regardless of token TTL.
///
/// The expiry timer fires at `max(time until token expiry, role timeout)`,
/// so a role timeout only ever lengthens the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleTimeouts {
    /// Used for sessions without a role or with an unlisted role.
    pub default: Duration,
    /// Per-role overrides, keyed by the session's role string.
    pub by_role: HashMap<String, Duration>,
}

impl Default for RoleTimeouts {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(30 * 60),
            by_role: HashMap::new(),
        }
    }
}

impl RoleTimeouts {
    /// The timeout for `role`, falling back to [`Self::default`].
    pub fn for_role(&self, role: Option<&str>) -> Duration {
        role.and_then(|r| self.by_role.get(r))
            .copied()
            .unwrap_or(self.default)
    }
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Tunables for the session manager.
///
/// Every field has a default, and a config deserialized from a partial file
/// fills the gaps from [`Default`]. Call [`SessionConfig::validated`] (the
/// builder does) to clamp values that would break the timer arithmetic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Minimum session length per role.
    pub role_timeouts: RoleTimeouts,

    /// How long before token expiry the first warning fires. Default: 5 min.
    pub first_warning_lead: Duration,

    /// How long before token expiry the final warning fires. Default: 1 min.
    /// Never larger than `first_warning_lead`.
    pub final_warning_lead: Duration,

    /// How long before token expiry the refresh timer fires. Default: 10 min.
    pub refresh_threshold: Duration,

    /// Attempts per refresh cycle before giving up and expiring. Default: 3.
    pub refresh_retry_attempts: u32,

    /// Base of the `delay * 2^(attempt-1)` backoff between local refresh
    /// retries. Default: 1 s.
    pub refresh_retry_delay: Duration,

    /// Upper bound on one provider refresh call. A timeout counts as a
    /// connectivity failure. Default: 30 s.
    pub refresh_timeout: Duration,

    /// Policy name used when the manager has a [`RetryExecutor`].
    pub refresh_policy: String,

    /// Breaker the refresh call goes through when the manager has a
    /// [`RetryExecutor`]. `None` skips the breaker.
    pub refresh_service: Option<String>,

    /// Whether [`track_activity`](crate::SessionManager::track_activity)
    /// pushes the expiry timer out. Default: `true`.
    pub extend_on_activity: bool,

    /// Inactivity after which the manager reports the user idle.
    /// Default: 15 min.
    pub idle_threshold: Duration,

    /// How often idleness is checked. `Duration::ZERO` disables the check.
    /// Default: 60 s.
    pub activity_check_interval: Duration,

    /// Prefix of the storage key; the record lives at `<prefix>data`.
    pub storage_prefix: String,

    /// Persisted records older than this are discarded on load.
    /// Default: 24 h.
    pub persisted_max_age: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            role_timeouts: RoleTimeouts::default(),
            first_warning_lead: Duration::from_secs(5 * 60),
            final_warning_lead: Duration::from_secs(60),
            refresh_threshold: Duration::from_secs(10 * 60),
            refresh_retry_attempts: 3,
            refresh_retry_delay: Duration::from_secs(1),
            refresh_timeout: Duration::from_secs(30),
            refresh_policy: "auth".to_owned(),
            refresh_service: Some(RetryExecutor::AUTH_SERVICE.to_owned()),
            extend_on_activity: true,
            idle_threshold: Duration::from_secs(15 * 60),
            activity_check_interval: Duration::from_secs(60),
            storage_prefix: "vigil.session.".to_owned(),
            persisted_max_age: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl SessionConfig {
    /// Validates and clamps values to safe ranges.
    ///
    /// Rules:
    /// - `final_warning_lead` at most `first_warning_lead`.
    /// - `refresh_retry_attempts` at least 1.
    /// - `refresh_timeout` non-zero (falls back to the default 30 s).
    pub fn validated(mut self) -> Self {
        if self.final_warning_lead > self.first_warning_lead {
            warn!(
                first_secs = self.first_warning_lead.as_secs(),
                final_secs = self.final_warning_lead.as_secs(),
                "final_warning_lead exceeds first_warning_lead; clamping"
            );
            self.final_warning_lead = self.first_warning_lead;
        }

        if self.refresh_retry_attempts == 0 {
            warn!("refresh_retry_attempts is 0; clamping to 1");
            self.refresh_retry_attempts = 1;
        }

        if self.refresh_timeout.is_zero() {
            warn!("refresh_timeout is 0; using 30s");
            self.refresh_timeout = Duration::from_secs(30);
        }

        self
    }

    /// The timeout for a session with `role`.
    pub fn timeout_for_role(&self, role: Option<&str>) -> Duration {
        self.role_timeouts.for_role(role)
    }

    /// The schedule for local refresh retries, as a jitter-free policy.
    ///
    /// `backoff_delay(n)` is `refresh_retry_delay * 2^(n-1)`.
    pub fn refresh_backoff(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.refresh_retry_attempts,
            base_delay: self.refresh_retry_delay,
            max_delay: Duration::MAX,
            backoff_multiplier: 2.0,
            jitter_max: Duration::ZERO,
            retryable: Default::default(),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
