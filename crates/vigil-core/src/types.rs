//! Core types shared by every Vigil layer.
//!
//! These are the values that cross component boundaries: the session the
//! manager owns, the instant it expires at, and the tags the recovery
//! coordinator uses to remember what could not be done while offline.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock;

// ---------------------------------------------------------------------------
// Timestamp
// ---------------------------------------------------------------------------

/// An absolute wall-clock instant, in milliseconds since the Unix epoch.
///
/// Newtype over `u64` so an expiry instant can't be confused with a
/// duration or a retry counter. `#[serde(transparent)]` keeps the JSON
/// form a plain number, which is what the persisted record stores.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The current instant according to [`clock::now`].
    pub fn now() -> Self {
        clock::now()
    }

    /// Builds a timestamp from raw epoch milliseconds.
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Raw epoch milliseconds.
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// `self + d`, saturating at `u64::MAX`.
    pub fn saturating_add(self, d: Duration) -> Self {
        Self(self.0.saturating_add(millis(d)))
    }

    /// `self - d`, saturating at the epoch.
    pub fn saturating_sub(self, d: Duration) -> Self {
        Self(self.0.saturating_sub(millis(d)))
    }

    /// How long after `earlier` this instant is. Zero if `earlier` is later.
    pub fn saturating_duration_since(self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// An access/refresh token pair plus the instant it stops being valid.
///
/// A session is immutable once issued. Refreshing produces a brand-new
/// `Session` that replaces the old one wholesale; nothing ever edits the
/// tokens in place.
///
/// `role` is optional metadata the auth provider may attach. It only
/// selects which configured timeout applies to the session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token presented on each request.
    pub access_token: String,

    /// Long-lived token exchanged for a new session on refresh.
    pub refresh_token: String,

    /// Absolute expiry instant of the access token.
    pub expires_at: Timestamp,

    /// Role claim used to pick a session timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Session {
    /// Creates a session with no role claim.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: Timestamp,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
            role: None,
        }
    }

    /// Creates a session that expires `ttl` from now.
    pub fn expiring_in(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self::new(access_token, refresh_token, Timestamp::now().saturating_add(ttl))
    }

    /// Attaches a role claim.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// `true` once `now` has reached the expiry instant.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    /// `max(0, expires_at - now)`.
    pub fn time_until_expiry(&self, now: Timestamp) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}

/// Tokens never show up in logs. `{:?}` prints their length only.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &format_args!("<{} bytes>", self.access_token.len()))
            .field("refresh_token", &format_args!("<{} bytes>", self.refresh_token.len()))
            .field("expires_at", &self.expires_at)
            .field("role", &self.role)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// PendingActionKind
// ---------------------------------------------------------------------------

/// An operation that could not be completed because connectivity was down.
///
/// The recovery coordinator queues these and replays them once the
/// platform reports it is back online. Each variant carries only what its
/// replay needs, which today is nothing: the current session is read from
/// the session manager at replay time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingActionKind {
    /// Exchange the refresh token for a new session.
    Refresh,
    /// Re-arm the expiry timer from the moment of replay.
    ExtendSession,
    /// Tell the provider to revoke the session.
    Logout,
}

impl fmt::Display for PendingActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Refresh => "refresh",
            Self::ExtendSession => "extend_session",
            Self::Logout => "logout",
        };
        f.write_str(name)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn session_at(ms: u64) -> Session {
        Session::new("access", "refresh", Timestamp(ms))
    }

    // =====================================================================
    // Timestamp
    // =====================================================================

    #[test]
    fn test_timestamp_serializes_as_plain_number() {
        let json = serde_json::to_string(&Timestamp(1_700_000_000_000)).unwrap();
        assert_eq!(json, "1700000000000");
    }

    #[test]
    fn test_timestamp_duration_since_saturates_at_zero() {
        let early = Timestamp(1_000);
        let late = Timestamp(4_500);

        assert_eq!(late.saturating_duration_since(early), Duration::from_millis(3_500));
        assert_eq!(early.saturating_duration_since(late), Duration::ZERO);
    }

    #[test]
    fn test_timestamp_saturating_sub_stops_at_epoch() {
        assert_eq!(Timestamp(500).saturating_sub(Duration::from_secs(1)), Timestamp(0));
    }

    // =====================================================================
    // Session
    // =====================================================================

    #[test]
    fn test_session_is_expired_at_boundary() {
        let session = session_at(10_000);

        assert!(!session.is_expired_at(Timestamp(9_999)));
        assert!(session.is_expired_at(Timestamp(10_000)));
    }

    #[test]
    fn test_session_time_until_expiry_never_negative() {
        let session = session_at(10_000);

        assert_eq!(session.time_until_expiry(Timestamp(4_000)), Duration::from_secs(6));
        assert_eq!(session.time_until_expiry(Timestamp(20_000)), Duration::ZERO);
    }

    #[test]
    fn test_session_debug_redacts_tokens() {
        let session = Session::new("super-secret-access", "super-secret-refresh", Timestamp(1));

        let printed = format!("{session:?}");

        assert!(!printed.contains("super-secret"), "tokens leaked: {printed}");
        assert!(printed.contains("expires_at"));
    }

    #[test]
    fn test_session_role_omitted_from_json_when_absent() {
        let json = serde_json::to_string(&session_at(1)).unwrap();
        assert!(!json.contains("role"));

        let with_role = session_at(1).with_role("admin");
        let back: Session =
            serde_json::from_str(&serde_json::to_string(&with_role).unwrap()).unwrap();
        assert_eq!(back.role.as_deref(), Some("admin"));
    }

    // =====================================================================
    // PendingActionKind
    // =====================================================================

    #[test]
    fn test_pending_action_kind_snake_case_json() {
        let json = serde_json::to_string(&PendingActionKind::ExtendSession).unwrap();
        assert_eq!(json, "\"extend_session\"");
        assert_eq!(PendingActionKind::ExtendSession.to_string(), "extend_session");
    }
}
