//! The session actor: one Tokio task that owns the session and its timers.
//!
//! Every timer is a deadline field in [`Deadlines`]. The run loop sleeps
//! until the earliest one and hands control to
//! [`SessionActor::fire_due_timers`], which reads the current state and
//! decides what to do. Rescheduling overwrites a deadline; cancelling sets
//! it to `None`. Because commands and timer firings are processed one at a
//! time by the same task, a timer can never observe state from before a
//! `destroy` that has already been handled.
//!
//! Provider calls run in a spawned task so the actor keeps answering
//! queries while a refresh is outstanding. The result comes back on an
//! internal channel, tagged with the generation it was started in. A reset
//! (`initialize`, `destroy`, `logout`, expiry) bumps the generation and
//! aborts the task, so a late answer can't resurrect a session.

use std::future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use vigil_core::{KeyValueStore, PendingActionKind, Session, SessionStore, Timestamp, clock};
use vigil_retry::{RetryError, RetryExecutor};

use crate::{
    AuthError, AuthProvider, LifecycleState, RecoverySink, RefreshOutcome, SessionConfig,
    SessionError, SessionEvent, SessionObserver, SessionState, WarningKind,
};

pub(crate) type RefreshReply = oneshot::Sender<Result<RefreshOutcome, SessionError>>;

/// Requests from [`SessionManager`](crate::SessionManager) handles.
pub(crate) enum Command {
    Initialize {
        session: Option<Session>,
        observer: Arc<dyn SessionObserver>,
        reply: oneshot::Sender<()>,
    },
    Resume {
        session: Session,
        reply: oneshot::Sender<()>,
    },
    RestorePersisted {
        observer: Arc<dyn SessionObserver>,
        reply: oneshot::Sender<Result<Option<Session>, SessionError>>,
    },
    TrackActivity,
    Refresh {
        reply: RefreshReply,
    },
    Extend {
        duration: Option<Duration>,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Logout {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Destroy {
        reply: oneshot::Sender<()>,
    },
}

/// What handles can read without a round trip to the actor.
#[derive(Debug, Clone, Default)]
pub(crate) struct Snapshot {
    pub(crate) state: SessionState,
    pub(crate) lifecycle: LifecycleState,
    pub(crate) idle: bool,
}

// ---------------------------------------------------------------------------
// Deadlines
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Deadlines {
    expiry: Option<Instant>,
    /// Wall-clock twin of `expiry`. Tokio timers stop while the system is
    /// suspended; this one doesn't.
    session_end: Option<Timestamp>,
    first_warning: Option<Instant>,
    final_warning: Option<Instant>,
    refresh: Option<Instant>,
    idle_check: Option<Instant>,
}

impl Deadlines {
    fn next(&self) -> Option<Instant> {
        [
            self.expiry,
            self.first_warning,
            self.final_warning,
            self.refresh,
            self.idle_check,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Clears `slot` and returns `true` if its deadline has passed.
fn take_due(slot: &mut Option<Instant>, now: Instant) -> bool {
    if slot.is_some_and(|deadline| deadline <= now) {
        *slot = None;
        true
    } else {
        false
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Refresh call
// ---------------------------------------------------------------------------

enum RefreshFailure {
    Connectivity(String),
    Other(String),
}

struct RefreshDone {
    generation: u64,
    result: Result<Session, RefreshFailure>,
}

/// One provider refresh, bounded by `timeout` and routed through the
/// executor when there is one.
async fn call_refresh<P: AuthProvider>(
    provider: Arc<P>,
    executor: Option<Arc<RetryExecutor>>,
    policy: String,
    service: Option<String>,
    refresh_token: String,
    timeout: Duration,
) -> Result<Session, RefreshFailure> {
    let attempt = || {
        let provider = Arc::clone(&provider);
        let token = refresh_token.clone();
        async move {
            tokio::time::timeout(timeout, provider.refresh_session(&token))
                .await
                .unwrap_or_else(|_| {
                    Err(AuthError::Connectivity(format!(
                        "refresh timed out after {}ms",
                        timeout.as_millis()
                    )))
                })
        }
    };

    let result = match &executor {
        Some(executor) => {
            executor
                .execute_with_retry(&policy, service.as_deref(), attempt)
                .await
        }
        None => attempt().await.map_err(RetryError::Operation),
    };

    // An open breaker is not a network outage: it's handled like any other
    // provider failure.
    result.map_err(|e| match e {
        RetryError::Operation(e) if e.is_connectivity() => {
            RefreshFailure::Connectivity(e.to_string())
        }
        other => RefreshFailure::Other(other.to_string()),
    })
}

// ---------------------------------------------------------------------------
// SessionActor
// ---------------------------------------------------------------------------

pub(crate) struct SessionActor<P, S> {
    config: SessionConfig,
    provider: Arc<P>,
    store: SessionStore<S>,
    recovery: Option<Arc<dyn RecoverySink>>,
    executor: Option<Arc<RetryExecutor>>,
    observer: Option<Arc<dyn SessionObserver>>,

    state: SessionState,
    lifecycle: LifecycleState,
    idle: bool,
    generation: u64,
    deadlines: Deadlines,
    refresh_task: Option<JoinHandle<()>>,
    refresh_waiters: Vec<RefreshReply>,

    commands: mpsc::UnboundedReceiver<Command>,
    done_tx: mpsc::UnboundedSender<RefreshDone>,
    done_rx: mpsc::UnboundedReceiver<RefreshDone>,
    snapshot: watch::Sender<Snapshot>,
}

impl<P: AuthProvider, S: KeyValueStore> SessionActor<P, S> {
    pub(crate) fn new(
        config: SessionConfig,
        provider: Arc<P>,
        storage: S,
        recovery: Option<Arc<dyn RecoverySink>>,
        executor: Option<Arc<RetryExecutor>>,
        commands: mpsc::UnboundedReceiver<Command>,
        snapshot: watch::Sender<Snapshot>,
    ) -> Self {
        let store = SessionStore::new(storage, &config.storage_prefix, config.persisted_max_age);
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            config,
            provider,
            store,
            recovery,
            executor,
            observer: None,
            state: SessionState::default(),
            lifecycle: LifecycleState::Uninitialized,
            idle: false,
            generation: 0,
            deadlines: Deadlines::default(),
            refresh_task: None,
            refresh_waiters: Vec::new(),
            commands,
            done_tx,
            done_rx,
            snapshot,
        }
    }

    /// Processes commands, refresh results, and timers until every handle
    /// has been dropped.
    pub(crate) async fn run(mut self) {
        debug!("session actor started");

        loop {
            let next = self.deadlines.next();
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle(cmd).await,
                    None => break,
                },
                Some(done) = self.done_rx.recv() => self.on_refresh_done(done).await,
                () = sleep_until(next) => self.fire_due_timers().await,
            }
        }

        if let Some(task) = self.refresh_task.take() {
            task.abort();
        }
        debug!("session actor stopped");
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Initialize {
                session,
                observer,
                reply,
            } => {
                self.observer = Some(observer);
                self.begin(session).await;
                let _ = reply.send(());
            }
            Command::Resume { session, reply } => {
                self.begin(Some(session)).await;
                let _ = reply.send(());
            }
            Command::RestorePersisted { observer, reply } => {
                let result = self.restore_persisted(observer).await;
                let _ = reply.send(result);
            }
            Command::TrackActivity => {
                if !self.expire_if_overdue().await {
                    self.track_activity();
                }
            }
            Command::Refresh { reply } => {
                self.expire_if_overdue().await;
                self.start_refresh(Some(reply));
            }
            Command::Extend { duration, reply } => {
                self.expire_if_overdue().await;
                let _ = reply.send(self.extend(duration));
            }
            Command::Logout { reply } => self.logout(reply).await,
            Command::Destroy { reply } => {
                self.destroy().await;
                let _ = reply.send(());
            }
        }
    }

    // -- Lifecycle ----------------------------------------------------------

    /// Replaces all state with `session` and arms its timers.
    async fn begin(&mut self, session: Option<Session>) {
        self.reset();

        let Some(session) = session else {
            self.lifecycle = LifecycleState::Uninitialized;
            self.publish();
            debug!("initialized without a session");
            return;
        };

        let now = clock::now();
        self.state = SessionState::new(Some(session.clone()), now);

        if session.is_expired_at(now) {
            warn!(expires_at = %session.expires_at, "session already expired at initialize");
            self.expire().await;
            return;
        }

        self.lifecycle = LifecycleState::Active;
        self.persist().await;
        self.arm_timers(&session, now);
        info!(
            expires_in_secs = session.time_until_expiry(now).as_secs(),
            role = session.role.as_deref().unwrap_or("-"),
            "session initialized"
        );
        self.publish();

        // Warnings that are already due go out before the caller hears back.
        self.fire_due_timers().await;
    }

    async fn restore_persisted(
        &mut self,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<Option<Session>, SessionError> {
        let record = self.store.load().await?;
        self.observer = Some(observer);

        let Some(record) = record else {
            debug!("no persisted session to restore");
            return Ok(None);
        };

        self.begin(Some(record.session)).await;
        if self.state.session.is_some() {
            self.state.last_activity_at = record.last_activity_at;
            self.publish();
        }
        Ok(self.state.session.clone())
    }

    /// Emits `Expired`, then clears memory, storage, and timers.
    async fn expire(&mut self) {
        info!("session expired");
        self.lifecycle = LifecycleState::Expired;
        self.emit(SessionEvent::Expired);

        self.reset();
        self.clear_store().await;
        self.lifecycle = LifecycleState::Expired;
        self.publish();
    }

    async fn logout(&mut self, reply: oneshot::Sender<Result<(), SessionError>>) {
        self.reset();
        self.lifecycle = LifecycleState::Uninitialized;
        self.clear_store().await;
        self.publish();
        info!("logged out locally");

        if !self.is_online() {
            info!("offline; deferring provider sign-out");
            self.defer(PendingActionKind::Logout, None);
            let _ = reply.send(Ok(()));
            return;
        }

        let provider = Arc::clone(&self.provider);
        let recovery = self.recovery.clone();
        let timeout = self.config.refresh_timeout;
        tokio::spawn(async move {
            let result = tokio::time::timeout(timeout, provider.sign_out())
                .await
                .unwrap_or_else(|_| Err(AuthError::Connectivity("sign-out timed out".into())));

            let result = match (result, recovery) {
                (Ok(()), _) => Ok(()),
                (Err(e), Some(recovery)) if e.is_connectivity() => {
                    warn!(error = %e, "sign-out failed; deferring to recovery");
                    recovery.record_pending_action(PendingActionKind::Logout);
                    Ok(())
                }
                (Err(e), _) => Err(SessionError::Auth(e)),
            };
            let _ = reply.send(result);
        });
    }

    async fn destroy(&mut self) {
        self.reset();
        self.observer = None;
        self.lifecycle = LifecycleState::Uninitialized;
        self.clear_store().await;
        self.publish();
        debug!("session manager destroyed");
    }

    /// Cancels timers, the in-flight refresh, and its waiters, and empties
    /// the session state. Does not touch storage or the observer.
    fn reset(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.deadlines.clear();
        if let Some(task) = self.refresh_task.take() {
            task.abort();
        }
        for waiter in self.refresh_waiters.drain(..) {
            let _ = waiter.send(Err(SessionError::Cancelled));
        }
        self.state = SessionState::new(None, clock::now());
        self.idle = false;
    }

    // -- Timers -------------------------------------------------------------

    fn arm_timers(&mut self, session: &Session, now: Timestamp) {
        let at = Instant::now();
        let ttl = session.time_until_expiry(now);
        let role_timeout = self.config.timeout_for_role(session.role.as_deref());
        let shown = self.state.warnings_shown;

        self.set_expiry(ttl.max(role_timeout));
        self.deadlines.first_warning =
            (!shown.first).then(|| at + ttl.saturating_sub(self.config.first_warning_lead));
        self.deadlines.final_warning =
            (!shown.last).then(|| at + ttl.saturating_sub(self.config.final_warning_lead));

        // A token that's already inside the threshold is refreshed halfway to
        // expiry, so a provider issuing short tokens can't cause a refresh loop.
        let refresh_in = if ttl > self.config.refresh_threshold {
            ttl - self.config.refresh_threshold
        } else {
            ttl / 2
        };
        self.deadlines.refresh = Some(at + refresh_in);

        self.arm_idle_check(at);
    }

    fn set_expiry(&mut self, delay: Duration) {
        self.deadlines.expiry = Some(Instant::now() + delay);
        self.deadlines.session_end = Some(clock::now().saturating_add(delay));
    }

    /// Expires the session if wall time has passed its end, which happens
    /// when the system slept through the expiry timer.
    async fn expire_if_overdue(&mut self) -> bool {
        let now = clock::now();
        let overdue = self.deadlines.session_end.is_some_and(|end| now >= end);
        if overdue {
            info!(%now, "wall clock passed session end; expiring");
            self.expire().await;
        }
        overdue
    }

    fn arm_idle_check(&mut self, from: Instant) {
        let interval = self.config.activity_check_interval;
        self.deadlines.idle_check = (!interval.is_zero()).then(|| from + interval);
    }

    /// The single dispatcher for every timer.
    async fn fire_due_timers(&mut self) {
        if self.expire_if_overdue().await {
            return;
        }
        let now = Instant::now();

        if take_due(&mut self.deadlines.expiry, now) {
            debug!("expiry timer fired");
            self.expire().await;
            return;
        }

        let first_due = take_due(&mut self.deadlines.first_warning, now);
        let final_due = take_due(&mut self.deadlines.final_warning, now);
        if first_due && !self.state.warnings_shown.first {
            self.state.warnings_shown.first = true;
            self.raise_warning(WarningKind::First);
        }
        if final_due && !self.state.warnings_shown.last {
            self.state.warnings_shown.last = true;
            self.raise_warning(WarningKind::Final);
        }

        if take_due(&mut self.deadlines.refresh, now) {
            self.start_refresh(None);
        }

        if take_due(&mut self.deadlines.idle_check, now) {
            self.check_idle();
            self.arm_idle_check(now);
        }

        self.publish();
    }

    fn raise_warning(&mut self, kind: WarningKind) {
        let remaining = self
            .state
            .session
            .as_ref()
            .map(|s| s.time_until_expiry(clock::now()))
            .unwrap_or_default();
        self.lifecycle = match kind {
            WarningKind::First => LifecycleState::WarnedFirst,
            WarningKind::Final => LifecycleState::WarnedFinal,
        };
        info!(%kind, remaining_secs = remaining.as_secs(), "session expiry warning");
        self.emit(SessionEvent::Warning { kind, remaining });
    }

    fn check_idle(&mut self) {
        if self.idle || self.state.session.is_none() {
            return;
        }
        let idle_for = clock::now().saturating_duration_since(self.state.last_activity_at);
        if idle_for >= self.config.idle_threshold {
            self.idle = true;
            debug!(idle_secs = idle_for.as_secs(), "user idle");
            self.emit(SessionEvent::Idle { idle_for });
        }
    }

    // -- Activity and extension ---------------------------------------------

    fn track_activity(&mut self) {
        let now = clock::now();
        self.state.last_activity_at = now;
        self.idle = false;

        let extension = self
            .state
            .session
            .as_ref()
            .filter(|_| self.config.extend_on_activity)
            .map(|session| {
                let role_timeout = self.config.timeout_for_role(session.role.as_deref());
                session.time_until_expiry(now).max(role_timeout)
            });
        if let Some(delay) = extension {
            self.set_expiry(delay);
        }

        self.emit(SessionEvent::ActivityDetected);
    }

    fn extend(&mut self, duration: Option<Duration>) -> Result<(), SessionError> {
        let Some(session) = self.state.session.clone() else {
            return Err(SessionError::NoSession);
        };

        let delay = duration
            .unwrap_or_else(|| self.config.timeout_for_role(session.role.as_deref()));
        self.set_expiry(delay);
        self.lifecycle = LifecycleState::Active;
        info!(extend_secs = delay.as_secs(), "session extended");

        if !self.is_online() {
            self.defer(PendingActionKind::ExtendSession, Some(&session));
        }

        self.publish();
        Ok(())
    }

    // -- Refresh ------------------------------------------------------------

    /// Starts a refresh, joins the one in flight, or defers it to recovery.
    fn start_refresh(&mut self, reply: Option<RefreshReply>) {
        let Some(session) = self.state.session.clone() else {
            trace!("refresh requested without a session");
            if let Some(reply) = reply {
                let _ = reply.send(Ok(RefreshOutcome::NoSession));
            }
            return;
        };

        if self.state.is_refreshing {
            trace!("refresh already in flight; joining it");
            self.refresh_waiters.extend(reply);
            return;
        }

        if !self.is_online() {
            info!("offline; deferring token refresh");
            self.deadlines.refresh = None;
            self.defer(PendingActionKind::Refresh, Some(&session));
            if let Some(reply) = reply {
                let _ = reply.send(Ok(RefreshOutcome::Deferred));
            }
            return;
        }

        self.state.is_refreshing = true;
        self.state.refresh_attempts += 1;
        self.deadlines.refresh = None;
        self.refresh_waiters.extend(reply);
        debug!(attempt = self.state.refresh_attempts, "refreshing token");

        let call = call_refresh(
            Arc::clone(&self.provider),
            self.executor.clone(),
            self.config.refresh_policy.clone(),
            self.config.refresh_service.clone(),
            session.refresh_token.clone(),
            self.config.refresh_timeout,
        );
        let generation = self.generation;
        let done = self.done_tx.clone();
        self.refresh_task = Some(tokio::spawn(async move {
            let result = call.await;
            let _ = done.send(RefreshDone { generation, result });
        }));

        self.publish();
    }

    async fn on_refresh_done(&mut self, done: RefreshDone) {
        if done.generation != self.generation {
            trace!("discarding refresh result from a previous session");
            return;
        }
        self.refresh_task = None;
        self.state.is_refreshing = false;

        match done.result {
            Ok(session) => {
                let now = clock::now();
                info!(expires_at = %session.expires_at, "token refreshed");
                self.state.session = Some(session.clone());
                self.state.refresh_attempts = 0;
                self.state.warnings_shown = Default::default();
                self.lifecycle = LifecycleState::Active;
                self.persist().await;
                self.arm_timers(&session, now);
                self.publish();
                self.reply_waiters(|| Ok(RefreshOutcome::Refreshed(session.clone())));
                self.emit(SessionEvent::Refreshed(session));
            }
            Err(RefreshFailure::Connectivity(reason)) if self.recovery.is_some() => {
                warn!(%reason, "refresh failed on connectivity; deferring to recovery");
                let session = self.state.session.clone();
                self.defer(PendingActionKind::Refresh, session.as_ref());
                self.publish();
                self.reply_waiters(|| Ok(RefreshOutcome::Deferred));
            }
            Err(RefreshFailure::Connectivity(reason) | RefreshFailure::Other(reason)) => {
                let attempt = self.state.refresh_attempts;
                if attempt < self.config.refresh_retry_attempts {
                    let delay = self.config.refresh_backoff().backoff_delay(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %reason,
                        "refresh failed; retrying"
                    );
                    self.deadlines.refresh = Some(Instant::now() + delay);
                    self.publish();
                    self.reply_waiters(|| Err(SessionError::RefreshFailed(reason.clone())));
                } else {
                    warn!(attempt, %reason, "refresh retries exhausted");
                    self.reply_waiters(|| Err(SessionError::RefreshFailed(reason.clone())));
                    self.emit(SessionEvent::RefreshFailed(reason));
                    self.expire().await;
                }
            }
        }
    }

    fn reply_waiters(&mut self, outcome: impl Fn() -> Result<RefreshOutcome, SessionError>) {
        for waiter in self.refresh_waiters.drain(..) {
            let _ = waiter.send(outcome());
        }
    }

    // -- Plumbing -----------------------------------------------------------

    fn is_online(&self) -> bool {
        self.recovery.as_ref().is_none_or(|r| r.is_online())
    }

    fn defer(&self, kind: PendingActionKind, session: Option<&Session>) {
        let Some(recovery) = &self.recovery else {
            return;
        };
        if let Some(session) = session {
            recovery.store_session_for_recovery(session.clone());
        }
        recovery.record_pending_action(kind);
    }

    async fn persist(&self) {
        let Some(session) = &self.state.session else {
            return;
        };
        if let Err(e) = self.store.save(session, self.state.last_activity_at).await {
            warn!(key = self.store.key(), error = %e, "failed to persist session");
        }
    }

    async fn clear_store(&self) {
        if let Err(e) = self.store.clear().await {
            warn!(key = self.store.key(), error = %e, "failed to clear persisted session");
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(Snapshot {
            state: self.state.clone(),
            lifecycle: self.lifecycle,
            idle: self.idle,
        });
    }

    /// Publishes the snapshot, then tells the observer.
    fn emit(&self, event: SessionEvent) {
        self.publish();
        if let Some(observer) = &self.observer {
            observer.on_event(event);
        }
    }
}
