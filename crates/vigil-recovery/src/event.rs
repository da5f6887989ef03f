//! Notifications published by the recovery coordinator.

use std::fmt;

use vigil_core::PendingActionKind;

/// Where a recovered session came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySource {
    /// The snapshot stored when the session layer went offline.
    Snapshot,
    /// The provider's own idea of the current session.
    Provider,
}

impl fmt::Display for RecoverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Snapshot => f.write_str("snapshot"),
            Self::Provider => f.write_str("provider"),
        }
    }
}

/// Something the coordinator did, broadcast to every subscriber.
///
/// Subscribers that fall behind lose the oldest events; see
/// [`RecoveryCoordinator::subscribe`](crate::RecoveryCoordinator::subscribe).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryEvent {
    /// Connectivity was lost.
    Offline,
    /// Connectivity came back; a recovery attempt follows.
    Online,
    /// A session was restored and handed to the session manager. Pending
    /// actions have been replayed by the time this is sent.
    Recovered { source: RecoverySource },
    /// Every attempt for this offline episode failed.
    RecoveryFailed { attempts: u32 },
    /// A pending action was replayed successfully.
    ActionReplayed(PendingActionKind),
    /// A pending action ran out of replays and was discarded.
    ActionDropped(PendingActionKind),
}
