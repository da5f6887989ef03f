//! The session manager handle and its builder.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use vigil_core::{KeyValueStore, Session, Timestamp, clock};
use vigil_retry::RetryExecutor;

use crate::actor::{Command, SessionActor, Snapshot};
use crate::{
    AuthProvider, LifecycleState, RecoverySink, RefreshOutcome, SessionConfig, SessionError,
    SessionObserver,
};

/// Handle to a running session manager.
///
/// Cheap to clone: every clone talks to the same background task. Queries
/// (`is_valid`, `state`, `session`, ...) read a snapshot the task publishes
/// after every change and never wait. Operations send a command and await
/// the reply.
///
/// The task stops when the last handle is dropped.
///
/// ## Lifecycle
///
/// ```text
/// initialize(Some) ──→ timers armed ──→ warnings ──→ refresh ──→ timers re-armed
///                           │                          │
///                           │                (retries exhausted)
///                           ▼                          ▼
///                    destroy()/logout()            Expired
/// ```
#[derive(Clone)]
pub struct SessionManager {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<Snapshot>,
}

impl SessionManager {
    /// Starts building a manager around `provider`, persisting to `storage`.
    pub fn builder<P: AuthProvider, S: KeyValueStore>(
        provider: Arc<P>,
        storage: S,
    ) -> SessionManagerBuilder<P, S> {
        SessionManagerBuilder {
            provider,
            storage,
            config: SessionConfig::default(),
            recovery: None,
            executor: None,
        }
    }

    // -- Operations ---------------------------------------------------------

    /// Replaces all state with `session` and starts its timers.
    ///
    /// `None` just clears prior timers and state. A session that is already
    /// past its expiry is expired immediately: `observer` receives
    /// [`SessionEvent::Expired`](crate::SessionEvent::Expired) and no timers
    /// are armed. Warnings that are already due are delivered before this
    /// returns.
    pub async fn initialize(
        &self,
        session: Option<Session>,
        observer: impl SessionObserver,
    ) -> Result<(), SessionError> {
        let observer: Arc<dyn SessionObserver> = Arc::new(observer);
        self.request(|reply| Command::Initialize {
            session,
            observer,
            reply,
        })
        .await
    }

    /// Like [`initialize`](Self::initialize) but keeps the current observer.
    /// Used by recovery to install a restored session.
    pub async fn resume(&self, session: Session) -> Result<(), SessionError> {
        self.request(|reply| Command::Resume { session, reply }).await
    }

    /// Initializes from the persisted record, if one exists and is fresh.
    ///
    /// Returns the restored session, or `None` when there was nothing
    /// usable (absent, stale, or already expired).
    pub async fn restore_persisted(
        &self,
        observer: impl SessionObserver,
    ) -> Result<Option<Session>, SessionError> {
        let observer: Arc<dyn SessionObserver> = Arc::new(observer);
        self.request(|reply| Command::RestorePersisted { observer, reply })
            .await?
    }

    /// Records user activity. Fire-and-forget; safe to call on every input
    /// event.
    pub fn track_activity(&self) {
        let _ = self.commands.send(Command::TrackActivity);
    }

    /// Refreshes the token now.
    ///
    /// Single-flight: if a refresh is already running, this waits for it and
    /// returns its outcome instead of starting another provider call.
    ///
    /// # Errors
    /// - [`SessionError::RefreshFailed`] when the provider call failed for a
    ///   non-connectivity reason. A retry is scheduled unless the budget is
    ///   spent, in which case the session has expired.
    /// - [`SessionError::Cancelled`] if the session was reset meanwhile.
    pub async fn refresh(&self) -> Result<RefreshOutcome, SessionError> {
        self.request(|reply| Command::Refresh { reply }).await?
    }

    /// Pushes the expiry timer out to now + `duration`, or now + the role
    /// timeout when `None`.
    ///
    /// # Errors
    /// [`SessionError::NoSession`] if there is nothing to extend.
    pub async fn extend_session(&self, duration: Option<Duration>) -> Result<(), SessionError> {
        self.request(|reply| Command::Extend { duration, reply })
            .await?
    }

    /// Clears the local session and signs out with the provider.
    ///
    /// Local state is gone before this returns, whatever the provider says.
    /// When offline, or when sign-out fails for connectivity reasons, the
    /// sign-out is queued for recovery and this returns `Ok`.
    ///
    /// # Errors
    /// [`SessionError::Auth`] if the provider rejected the sign-out.
    pub async fn logout(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Logout { reply }).await?
    }

    /// Cancels every timer, drops the observer, and clears memory and
    /// storage. Idempotent, and fine to call before `initialize`.
    ///
    /// Once this returns no timer scheduled earlier will fire. The manager
    /// can be initialized again afterwards.
    pub async fn destroy(&self) {
        let _ = self.request(|reply| Command::Destroy { reply }).await;
    }

    // -- Queries ------------------------------------------------------------

    /// `true` iff there is a session and it hasn't reached its expiry.
    pub fn is_valid(&self) -> bool {
        let now = clock::now();
        self.snapshot
            .borrow()
            .state
            .session
            .as_ref()
            .is_some_and(|s| !s.is_expired_at(now))
    }

    /// Time left on the token; zero without a session.
    pub fn time_until_expiry(&self) -> Duration {
        let now = clock::now();
        self.snapshot
            .borrow()
            .state
            .session
            .as_ref()
            .map(|s| s.time_until_expiry(now))
            .unwrap_or_default()
    }

    pub fn state(&self) -> LifecycleState {
        self.snapshot.borrow().lifecycle
    }

    pub fn session(&self) -> Option<Session> {
        self.snapshot.borrow().state.session.clone()
    }

    pub fn last_activity_at(&self) -> Timestamp {
        self.snapshot.borrow().state.last_activity_at
    }

    pub fn is_refreshing(&self) -> bool {
        self.snapshot.borrow().state.is_refreshing
    }

    /// Refresh attempts since the last success or `initialize`.
    pub fn refresh_attempts(&self) -> u32 {
        self.snapshot.borrow().state.refresh_attempts
    }

    /// `true` once an idle check found no activity for `idle_threshold`,
    /// until the next [`track_activity`](Self::track_activity).
    pub fn is_idle(&self) -> bool {
        self.snapshot.borrow().idle
    }

    /// `false` once the background task has stopped.
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    async fn request<R>(
        &self,
        command: impl FnOnce(oneshot::Sender<R>) -> Command,
    ) -> Result<R, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply_tx))
            .map_err(|_| SessionError::Unavailable)?;
        reply_rx.await.map_err(|_| SessionError::Unavailable)
    }
}

// ---------------------------------------------------------------------------
// SessionManagerBuilder
// ---------------------------------------------------------------------------

/// Configures and spawns a [`SessionManager`].
pub struct SessionManagerBuilder<P, S> {
    provider: Arc<P>,
    storage: S,
    config: SessionConfig,
    recovery: Option<Arc<dyn RecoverySink>>,
    executor: Option<Arc<RetryExecutor>>,
}

impl<P: AuthProvider, S: KeyValueStore> SessionManagerBuilder<P, S> {
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Where to send work that can't be done offline. Without one the
    /// manager assumes it is always online.
    pub fn recovery(mut self, sink: Arc<dyn RecoverySink>) -> Self {
        self.recovery = Some(sink);
        self
    }

    /// Routes refresh calls through `executor`, using the config's
    /// `refresh_policy` and `refresh_service`.
    pub fn retry_executor(mut self, executor: Arc<RetryExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Spawns the session task and returns its handle.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn build(self) -> SessionManager {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::default());

        let actor = SessionActor::new(
            self.config.validated(),
            self.provider,
            self.storage,
            self.recovery,
            self.executor,
            commands_rx,
            snapshot_tx,
        );
        tokio::spawn(actor.run());

        SessionManager {
            commands: commands_tx,
            snapshot: snapshot_rx,
        }
    }
}
