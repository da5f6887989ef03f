//! The `Vigil` builder and handle.
//!
//! This is the usual entry point. It ties the layers together:
//! connectivity → retry executor → recovery coordinator ⇄ session manager.

use std::sync::Arc;

use vigil_core::{Connectivity, KeyValueStore, MemoryStore};
use vigil_recovery::{RecoveryConfig, RecoveryCoordinator};
use vigil_retry::RetryExecutor;
use vigil_session::{AuthProvider, RecoverySink, SessionConfig, SessionManager};

use crate::VigilError;

/// Builder for a fully wired [`Vigil`].
///
/// # Example
///
/// ```rust,ignore
/// use vigil::prelude::*;
///
/// let vigil = Vigil::builder(Arc::new(MyProvider))
///     .session_config(SessionConfig::default())
///     .online(true)
///     .build()
///     .await?;
/// vigil.sessions().initialize(Some(session), observer).await?;
/// ```
pub struct VigilBuilder<P, S = MemoryStore> {
    provider: Arc<P>,
    storage: S,
    session_config: SessionConfig,
    recovery_config: RecoveryConfig,
    connectivity: Option<Connectivity>,
    online: bool,
    executor: Option<Arc<RetryExecutor>>,
}

impl<P: AuthProvider> VigilBuilder<P> {
    /// A builder with default configs, in-memory storage, and an online
    /// connectivity signal.
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            storage: MemoryStore::new(),
            session_config: SessionConfig::default(),
            recovery_config: RecoveryConfig::default(),
            connectivity: None,
            online: true,
            executor: None,
        }
    }
}

impl<P: AuthProvider, S: KeyValueStore> VigilBuilder<P, S> {
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    pub fn recovery_config(mut self, config: RecoveryConfig) -> Self {
        self.recovery_config = config;
        self
    }

    /// Where the session record is persisted.
    pub fn storage<S2: KeyValueStore>(self, storage: S2) -> VigilBuilder<P, S2> {
        VigilBuilder {
            provider: self.provider,
            storage,
            session_config: self.session_config,
            recovery_config: self.recovery_config,
            connectivity: self.connectivity,
            online: self.online,
            executor: self.executor,
        }
    }

    /// Initial connectivity state of a fresh signal. Ignored when
    /// [`connectivity`](Self::connectivity) supplies one.
    pub fn online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }

    /// Uses an existing signal, e.g. one a network monitor already feeds.
    pub fn connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Shares an executor (and its circuit breakers) with the rest of the
    /// application. Defaults to [`RetryExecutor::with_defaults`].
    pub fn retry_executor(mut self, executor: Arc<RetryExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Spawns the recovery coordinator and the session manager and links
    /// them.
    ///
    /// # Errors
    /// [`VigilError::Recovery`] if the coordinator stopped before the
    /// manager could be attached.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub async fn build(self) -> Result<Vigil, VigilError> {
        let connectivity = self
            .connectivity
            .unwrap_or_else(|| Connectivity::new(self.online));
        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(RetryExecutor::with_defaults()));

        let recovery = RecoveryCoordinator::new(
            Arc::clone(&self.provider),
            connectivity.clone(),
            self.recovery_config,
        );
        let sink: Arc<dyn RecoverySink> = Arc::new(recovery.clone());
        let sessions = SessionManager::builder(self.provider, self.storage)
            .config(self.session_config)
            .recovery(sink)
            .retry_executor(Arc::clone(&executor))
            .build();
        recovery.attach(sessions.clone()).await?;

        tracing::info!(online = connectivity.is_online(), "vigil started");
        Ok(Vigil {
            sessions,
            recovery,
            connectivity,
            executor,
        })
    }
}

/// A running session manager and recovery coordinator, wired together.
///
/// Cloning is cheap and every clone drives the same components. Call
/// [`destroy`](Self::destroy) to stop them.
#[derive(Clone)]
pub struct Vigil {
    sessions: SessionManager,
    recovery: RecoveryCoordinator,
    connectivity: Connectivity,
    executor: Arc<RetryExecutor>,
}

impl Vigil {
    pub fn builder<P: AuthProvider>(provider: Arc<P>) -> VigilBuilder<P> {
        VigilBuilder::new(provider)
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn recovery(&self) -> &RecoveryCoordinator {
        &self.recovery
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn retry_executor(&self) -> &Arc<RetryExecutor> {
        &self.executor
    }

    /// Feeds a platform connectivity signal.
    pub fn set_online(&self, online: bool) {
        self.connectivity.set_online(online);
    }

    /// Tears down the session manager, then the coordinator. Idempotent.
    pub async fn destroy(&self) {
        self.sessions.destroy().await;
        self.recovery.destroy().await;
        tracing::info!("vigil destroyed");
    }
}
