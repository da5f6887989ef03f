//! The hook the session manager uses to hand work to recovery.
//!
//! The session manager never decides on its own how to survive an outage.
//! When it finds itself offline, or a provider call fails for connectivity
//! reasons, it tells a [`RecoverySink`] what it couldn't do and which
//! session it had, then carries on. `vigil-recovery` implements this for
//! its coordinator handle; a manager built without a sink assumes it is
//! always online.

use vigil_core::{PendingActionKind, Session};

/// Receives operations the session manager had to defer.
///
/// Called from inside the session actor, so implementations must not block.
pub trait RecoverySink: Send + Sync + 'static {
    /// The last observed connectivity state.
    fn is_online(&self) -> bool;

    /// Queue `kind` for replay once connectivity returns.
    fn record_pending_action(&self, kind: PendingActionKind);

    /// Keep `session` as the candidate to restore after the outage.
    fn store_session_for_recovery(&self, session: Session);
}
