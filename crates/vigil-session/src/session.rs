//! Session state: what the manager knows about the current session.

use std::fmt;

use serde::{Deserialize, Serialize};
use vigil_core::{Session, Timestamp};

// ---------------------------------------------------------------------------
// LifecycleState
// ---------------------------------------------------------------------------

/// Where the current session is in its life.
///
/// ```text
///   Uninitialized ──(initialize)──→ Active ──→ WarnedFirst ──→ WarnedFinal
///         ↑                           ↑              │               │
///         │                           └──(refresh / extend)──────────┤
///         │                                                          ▼
///         └───────────────(initialize / destroy)─────────────── Expired
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// No session yet, or the manager was destroyed or logged out.
    #[default]
    Uninitialized,
    /// A session is live and no warning has fired.
    Active,
    /// The first warning fired.
    WarnedFirst,
    /// The final warning fired.
    WarnedFinal,
    /// The session expired and was cleared. Needs a new `initialize`.
    Expired,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Active => "active",
            Self::WarnedFirst => "warned_first",
            Self::WarnedFinal => "warned_final",
            Self::Expired => "expired",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Which warnings have already fired for the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WarningsShown {
    pub first: bool,
    pub last: bool,
}

/// The manager's view of the current session.
///
/// `is_refreshing` is true for exactly as long as one provider refresh call
/// is outstanding; there is never more than one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub session: Option<Session>,
    pub last_activity_at: Timestamp,
    pub warnings_shown: WarningsShown,
    pub is_refreshing: bool,
    pub refresh_attempts: u32,
}

impl SessionState {
    /// Fresh state around `session`, with activity stamped at `now`.
    pub fn new(session: Option<Session>, now: Timestamp) -> Self {
        Self {
            session,
            last_activity_at: now,
            warnings_shown: WarningsShown::default(),
            is_refreshing: false,
            refresh_attempts: 0,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(None, Timestamp::from_millis(0))
    }
}

// ---------------------------------------------------------------------------
// RefreshOutcome
// ---------------------------------------------------------------------------

/// What a call to [`SessionManager::refresh`](crate::SessionManager::refresh)
/// achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The provider issued a new session.
    Refreshed(Session),
    /// Connectivity is down; the refresh was queued for recovery.
    Deferred,
    /// There was no session to refresh.
    NoSession,
}
