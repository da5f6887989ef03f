//! The recovery task: watches connectivity, owns the pending queue and the
//! session snapshot, and drives recovery attempts.

use std::future::{self, Future};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use vigil_core::{PendingActionKind, Session, clock};
use vigil_session::{AuthError, AuthProvider, SessionError, SessionManager};

use crate::queue::{PendingAction, PendingQueue};
use crate::{RecoveryConfig, RecoveryEvent, RecoverySource};

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub(crate) enum Command {
    RecordPending(PendingActionKind),
    StoreSnapshot(Session),
    Attach {
        manager: SessionManager,
        reply: oneshot::Sender<()>,
    },
    AttemptRecovery {
        reply: oneshot::Sender<Option<RecoverySource>>,
    },
    RetryPending {
        reply: oneshot::Sender<()>,
    },
    Status {
        reply: oneshot::Sender<RecoveryStatus>,
    },
    Destroy {
        reply: oneshot::Sender<()>,
    },
}

/// Point-in-time view of the coordinator's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryStatus {
    /// Connectivity as the coordinator last observed it.
    pub online: bool,
    /// Queued actions, oldest first.
    pub pending: Vec<PendingAction>,
    /// Attempts made in the current offline episode.
    pub recovery_attempts: u32,
    /// Whether a session snapshot is held.
    pub has_snapshot: bool,
}

struct Snapshot {
    session: Session,
    stored_at: Instant,
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

pub(crate) struct RecoveryActor<P> {
    config: RecoveryConfig,
    provider: Arc<P>,
    manager: Option<SessionManager>,
    connectivity: watch::Receiver<bool>,
    watching: bool,
    online: bool,
    queue: PendingQueue,
    snapshot: Option<Snapshot>,
    recovery_attempts: u32,
    next_attempt: Option<Instant>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: broadcast::Sender<RecoveryEvent>,
}

impl<P: AuthProvider> RecoveryActor<P> {
    pub(crate) fn new(
        config: RecoveryConfig,
        provider: Arc<P>,
        mut connectivity: watch::Receiver<bool>,
        commands: mpsc::UnboundedReceiver<Command>,
        events: broadcast::Sender<RecoveryEvent>,
    ) -> Self {
        let online = *connectivity.borrow_and_update();
        Self {
            queue: PendingQueue::new(config.max_pending, config.trim_to),
            config,
            provider,
            manager: None,
            connectivity,
            watching: true,
            online,
            snapshot: None,
            recovery_attempts: 0,
            next_attempt: None,
            commands,
            events,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!(online = self.online, "recovery actor started");

        loop {
            let next = self.next_attempt;
            tokio::select! {
                // Commands first: an action recorded between two signal
                // changes must be queued before the reconnect replays.
                biased;

                cmd = self.commands.recv() => match cmd {
                    Some(Command::Destroy { reply }) => {
                        self.destroy();
                        let _ = reply.send(());
                        break;
                    }
                    Some(cmd) => self.handle(cmd).await,
                    None => break,
                },
                changed = self.connectivity.changed(), if self.watching => match changed {
                    Ok(()) => {
                        let online = *self.connectivity.borrow_and_update();
                        self.on_connectivity(online).await;
                    }
                    Err(_) => self.watching = false,
                },
                () = sleep_until(next) => {
                    self.next_attempt = None;
                    self.attempt_recovery().await;
                }
            }
        }

        debug!("recovery actor stopped");
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::RecordPending(kind) => self.record(kind),
            Command::StoreSnapshot(session) => {
                debug!(expires_at = %session.expires_at, "session stored for recovery");
                self.snapshot = Some(Snapshot {
                    session,
                    stored_at: Instant::now(),
                });
            }
            Command::Attach { manager, reply } => {
                self.manager = Some(manager);
                let _ = reply.send(());
            }
            Command::AttemptRecovery { reply } => {
                let recovered = self.attempt_recovery().await;
                let _ = reply.send(recovered);
            }
            Command::RetryPending { reply } => {
                self.retry_pending_actions().await;
                let _ = reply.send(());
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
            // Handled in `run` so the loop can stop.
            Command::Destroy { reply } => {
                let _ = reply.send(());
            }
        }
    }

    // -- Connectivity -------------------------------------------------------

    /// Reacts to a connectivity notification.
    ///
    /// The signal only notifies on real transitions, so a notification that
    /// carries the value we already hold means a round trip was merged
    /// before this task saw it. Going back online is replayed in full.
    async fn on_connectivity(&mut self, online: bool) {
        if online == self.online {
            if !online {
                debug!("connectivity flapped while offline; nothing to do");
                return;
            }
            info!("missed a brief outage; treating it as a reconnect");
            self.go_offline();
        }
        self.online = online;

        if online {
            info!(pending = self.queue.len(), "connectivity restored; recovering session");
            self.recovery_attempts = 0;
            self.emit(RecoveryEvent::Online);
            self.attempt_recovery().await;
        } else {
            self.go_offline();
        }
    }

    fn go_offline(&mut self) {
        info!("connectivity lost");
        self.online = false;
        self.next_attempt = None;
        self.emit(RecoveryEvent::Offline);
    }

    // -- Pending queue ------------------------------------------------------

    fn record(&mut self, kind: PendingActionKind) {
        let evicted = self.queue.push(PendingAction::new(kind, clock::now()));
        debug!(%kind, queued = self.queue.len(), "pending action recorded");
        if evicted > 0 {
            warn!(evicted, kept = self.queue.len(), "pending queue full; dropped oldest actions");
        }
    }

    async fn retry_pending_actions(&mut self) {
        let actions = self.queue.take_all();
        if actions.is_empty() {
            return;
        }
        info!(count = actions.len(), "replaying pending actions");

        for mut action in actions {
            let kind = action.kind;
            match self.replay(kind).await {
                Ok(()) => {
                    debug!(%kind, "pending action replayed");
                    self.emit(RecoveryEvent::ActionReplayed(kind));
                }
                Err(reason) => {
                    action.retry_count += 1;
                    if action.retry_count < self.config.max_action_retries {
                        debug!(%kind, retries = action.retry_count, %reason, "replay failed; re-queued");
                        self.queue.push(action);
                    } else {
                        warn!(%kind, retries = action.retry_count, %reason, "replay failed; dropping action");
                        self.emit(RecoveryEvent::ActionDropped(kind));
                    }
                }
            }
        }
    }

    async fn replay(&mut self, kind: PendingActionKind) -> Result<(), String> {
        match kind {
            PendingActionKind::Refresh => {
                let manager = self.manager.as_ref().ok_or("no session manager attached")?;
                match manager.refresh().await {
                    Ok(_) => Ok(()),
                    // The manager has its own retry schedule for provider
                    // errors; queueing again would double it.
                    Err(SessionError::RefreshFailed(reason)) => {
                        debug!(%reason, "replayed refresh failed; session manager retries");
                        Ok(())
                    }
                    Err(SessionError::NoSession) => {
                        debug!("no session left to refresh");
                        Ok(())
                    }
                    Err(e) => Err(e.to_string()),
                }
            }
            PendingActionKind::ExtendSession => {
                let manager = self.manager.as_ref().ok_or("no session manager attached")?;
                manager.extend_session(None).await.map_err(|e| e.to_string())
            }
            PendingActionKind::Logout => {
                // Local state goes first so a failed sign-out can't leave the
                // user logged in.
                if let Some(manager) = &self.manager {
                    manager.destroy().await;
                }
                self.snapshot = None;
                self.bounded(self.provider.sign_out())
                    .await
                    .map_err(|e| e.to_string())
            }
        }
    }

    // -- Recovery -----------------------------------------------------------

    /// One recovery attempt. Returns where the session came from on success.
    ///
    /// A queued logout wins over restoring: the queue is replayed instead
    /// and no session is brought back.
    async fn attempt_recovery(&mut self) -> Option<RecoverySource> {
        if self.queue.contains(PendingActionKind::Logout) {
            let superseded = self.queue.drop_before_last(PendingActionKind::Logout);
            info!(superseded, "sign-out pending; replaying it instead of restoring");
            self.next_attempt = None;
            self.snapshot = None;
            self.recovery_attempts = 0;
            self.retry_pending_actions().await;
            return None;
        }

        let max = self.config.max_recovery_attempts;
        if self.recovery_attempts >= max {
            debug!(attempts = self.recovery_attempts, "recovery budget spent");
            return None;
        }
        self.recovery_attempts += 1;
        let attempt = self.recovery_attempts;
        debug!(attempt, max, "attempting session recovery");

        let Some((session, source)) = self.restore().await else {
            if attempt >= max {
                warn!(attempts = attempt, "session recovery failed");
                self.emit(RecoveryEvent::RecoveryFailed { attempts: attempt });
            } else {
                let delay = self.config.retry_delay(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "recovery attempt failed; retrying");
                self.next_attempt = Some(Instant::now() + delay);
            }
            return None;
        };

        self.next_attempt = None;
        self.snapshot = None;
        if let Some(manager) = &self.manager {
            if let Err(e) = manager.resume(session).await {
                warn!(error = %e, "session manager unavailable during recovery");
            }
        }
        self.retry_pending_actions().await;

        info!(%source, attempt, "session recovered");
        self.recovery_attempts = 0;
        self.emit(RecoveryEvent::Recovered { source });
        Some(source)
    }

    /// The snapshot if it is fresh and the provider accepts it, otherwise
    /// whatever session the provider reports.
    async fn restore(&self) -> Option<(Session, RecoverySource)> {
        if let Some(snapshot) = &self.snapshot {
            let age = snapshot.stored_at.elapsed();
            if age < self.config.snapshot_max_age {
                let call = self
                    .provider
                    .set_session(&snapshot.session.access_token, &snapshot.session.refresh_token);
                match self.bounded(call).await {
                    Ok(session) => return Some((session, RecoverySource::Snapshot)),
                    Err(e) => debug!(error = %e, "snapshot rejected; asking provider"),
                }
            } else {
                debug!(age_secs = age.as_secs(), "snapshot too old to restore");
            }
        }

        match self.bounded(self.provider.get_current_session()).await {
            Ok(Some(session)) => Some((session, RecoverySource::Provider)),
            Ok(None) => {
                debug!("provider has no current session");
                None
            }
            Err(e) => {
                debug!(error = %e, "provider session lookup failed");
                None
            }
        }
    }

    /// Runs a provider call under `provider_timeout`; running out of time
    /// counts as a connectivity failure.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, AuthError>>,
    ) -> Result<T, AuthError> {
        let limit = self.config.provider_timeout;
        tokio::time::timeout(limit, call)
            .await
            .unwrap_or_else(|_| Err(timed_out(limit)))
    }

    // -- Teardown and queries -----------------------------------------------

    fn destroy(&mut self) {
        self.watching = false;
        self.next_attempt = None;
        self.queue.clear();
        self.snapshot = None;
        self.manager = None;
        info!("recovery coordinator destroyed");
    }

    fn status(&self) -> RecoveryStatus {
        RecoveryStatus {
            online: self.online,
            pending: self.queue.to_vec(),
            recovery_attempts: self.recovery_attempts,
            has_snapshot: self.snapshot.is_some(),
        }
    }

    fn emit(&self, event: RecoveryEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

fn timed_out(limit: Duration) -> AuthError {
    AuthError::Connectivity(format!("provider call timed out after {}ms", limit.as_millis()))
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}
