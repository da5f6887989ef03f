//! The recovery coordinator handle.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use vigil_core::{Connectivity, PendingActionKind, Session};
use vigil_session::{AuthProvider, RecoverySink, SessionManager};

use crate::actor::{Command, RecoveryActor, RecoveryStatus};
use crate::queue::PendingAction;
use crate::{RecoveryConfig, RecoveryError, RecoveryEvent, RecoverySource};

const EVENT_CAPACITY: usize = 64;

/// Handle to a running recovery coordinator.
///
/// The coordinator watches a [`Connectivity`] signal. While offline it
/// collects the operations the session manager couldn't perform (through
/// its [`RecoverySink`] impl) and the last session it had. When
/// connectivity returns it restores a session, hands it to the attached
/// [`SessionManager`], and replays the queue.
///
/// Clone it freely; all clones drive the same task. Pass one clone to
/// [`SessionManagerBuilder::recovery`](vigil_session::SessionManagerBuilder::recovery)
/// and then [`attach`](Self::attach) the built manager.
///
/// The attached manager and the coordinator hold handles to each other, so
/// the task runs until [`destroy`](Self::destroy) is called.
#[derive(Clone)]
pub struct RecoveryCoordinator {
    commands: mpsc::UnboundedSender<Command>,
    connectivity: Connectivity,
    events: broadcast::Sender<RecoveryEvent>,
}

impl RecoveryCoordinator {
    /// Spawns a coordinator listening to `connectivity`.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn new<P: AuthProvider>(
        provider: Arc<P>,
        connectivity: Connectivity,
        config: RecoveryConfig,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let actor = RecoveryActor::new(
            config.validated(),
            provider,
            connectivity.subscribe(),
            commands_rx,
            events_tx.clone(),
        );
        tokio::spawn(actor.run());

        Self {
            commands: commands_tx,
            connectivity,
            events: events_tx,
        }
    }

    /// Sets the manager that recovered sessions and replayed actions go to.
    pub async fn attach(&self, manager: SessionManager) -> Result<(), RecoveryError> {
        self.request(|reply| Command::Attach { manager, reply }).await
    }

    /// Queues `kind` for replay. Fire-and-forget; ignored once destroyed.
    pub fn record_pending_action(&self, kind: PendingActionKind) {
        let _ = self.commands.send(Command::RecordPending(kind));
    }

    /// Replaces the session snapshot offered to the provider on recovery.
    pub fn store_session_for_recovery(&self, session: Session) {
        let _ = self.commands.send(Command::StoreSnapshot(session));
    }

    /// Runs one recovery attempt now.
    ///
    /// Returns the source of the restored session, or `None` if nothing
    /// could be restored (a retry may have been scheduled) or this offline
    /// episode's attempts are used up.
    pub async fn attempt_recovery(&self) -> Result<Option<RecoverySource>, RecoveryError> {
        self.request(|reply| Command::AttemptRecovery { reply }).await
    }

    /// Replays every queued action once.
    ///
    /// Failed actions go back in the queue with their retry count bumped;
    /// ones that have failed `max_action_retries` times are dropped.
    pub async fn retry_pending_actions(&self) -> Result<(), RecoveryError> {
        self.request(|reply| Command::RetryPending { reply }).await
    }

    /// The connectivity signal's current value.
    pub fn is_currently_online(&self) -> bool {
        self.connectivity.is_online()
    }

    pub async fn status(&self) -> Result<RecoveryStatus, RecoveryError> {
        self.request(|reply| Command::Status { reply }).await
    }

    pub async fn pending_actions(&self) -> Result<Vec<PendingAction>, RecoveryError> {
        Ok(self.status().await?.pending)
    }

    pub async fn recovery_attempts(&self) -> Result<u32, RecoveryError> {
        Ok(self.status().await?.recovery_attempts)
    }

    pub async fn has_snapshot(&self) -> Result<bool, RecoveryError> {
        Ok(self.status().await?.has_snapshot)
    }

    /// Subscribes to [`RecoveryEvent`]s from this point on.
    ///
    /// The channel holds the latest 64 events; a slow receiver gets
    /// `RecvError::Lagged` and skips ahead.
    pub fn subscribe(&self) -> broadcast::Receiver<RecoveryEvent> {
        self.events.subscribe()
    }

    /// Stops listening, cancels any scheduled attempt, and drops the queue
    /// and snapshot. Idempotent.
    pub async fn destroy(&self) {
        let _ = self.request(|reply| Command::Destroy { reply }).await;
    }

    /// `false` once destroyed.
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    async fn request<R>(
        &self,
        command: impl FnOnce(oneshot::Sender<R>) -> Command,
    ) -> Result<R, RecoveryError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply_tx))
            .map_err(|_| RecoveryError::Unavailable)?;
        reply_rx.await.map_err(|_| RecoveryError::Unavailable)
    }
}

impl RecoverySink for RecoveryCoordinator {
    fn is_online(&self) -> bool {
        self.is_currently_online()
    }

    fn record_pending_action(&self, kind: PendingActionKind) {
        RecoveryCoordinator::record_pending_action(self, kind);
    }

    fn store_session_for_recovery(&self, session: Session) {
        RecoveryCoordinator::store_session_for_recovery(self, session);
    }
}
