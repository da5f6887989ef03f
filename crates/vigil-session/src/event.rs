//! What the session manager tells the application.
//!
//! Every lifecycle change is a [`SessionEvent`] delivered to one
//! [`SessionObserver`]. The application turns warnings into banners,
//! `Expired` into a re-login flow, and so on. Events are delivered from
//! inside the session actor, so observers must return quickly; forwarding
//! into a channel (the `UnboundedSender` impl) is the usual choice.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use vigil_core::Session;

/// Which of the two expiry warnings fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// The early heads-up, `first_warning_lead` before expiry.
    First,
    /// The last call, `final_warning_lead` before expiry.
    Final,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => f.write_str("first"),
            Self::Final => f.write_str("final"),
        }
    }
}

/// A session lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session is about to expire. Each kind fires at most once per
    /// session.
    Warning {
        kind: WarningKind,
        remaining: Duration,
    },

    /// The session ended. All local state has been cleared.
    Expired,

    /// A refresh produced a new session.
    Refreshed(Session),

    /// Refresh gave up after exhausting its retry budget. Followed by
    /// [`SessionEvent::Expired`].
    RefreshFailed(String),

    /// [`track_activity`](crate::SessionManager::track_activity) was called.
    ActivityDetected,

    /// No activity for at least `idle_threshold`. Fires once per idle
    /// stretch.
    Idle { idle_for: Duration },
}

/// Receives [`SessionEvent`]s.
pub trait SessionObserver: Send + Sync + 'static {
    fn on_event(&self, event: SessionEvent);
}

/// Ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {
    fn on_event(&self, _event: SessionEvent) {}
}

/// Forwards events into a channel. A closed receiver drops them.
impl SessionObserver for mpsc::UnboundedSender<SessionEvent> {
    fn on_event(&self, event: SessionEvent) {
        let _ = self.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_event_unbounded_sender_forwards() {
        let (tx, mut rx) = mpsc::unbounded_channel();

        tx.on_event(SessionEvent::ActivityDetected);

        assert_eq!(rx.try_recv().unwrap(), SessionEvent::ActivityDetected);
    }

    #[test]
    fn test_on_event_closed_receiver_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        tx.on_event(SessionEvent::Expired);
    }

    #[test]
    fn test_warning_kind_displays_lowercase() {
        assert_eq!(WarningKind::First.to_string(), "first");
        assert_eq!(WarningKind::Final.to_string(), "final");
    }
}
