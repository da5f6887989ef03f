//! Connectivity-aware recovery for Vigil sessions.
//!
//! The session manager handles the happy path. This crate handles the
//! network going away underneath it:
//!
//! 1. **While offline** the session manager reports what it couldn't do
//!    (a refresh, an extension, a sign-out) and the session it had. The
//!    [`RecoveryCoordinator`] keeps both: the actions in a bounded queue,
//!    the session as a snapshot.
//! 2. **When connectivity returns** the coordinator restores a session,
//!    preferring a fresh snapshot and falling back to asking the provider,
//!    hands it to the session manager, and replays the queue.
//! 3. **If restoring fails** it tries again with exponential backoff, a
//!    bounded number of times per offline episode.
//!
//! # Wiring
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use vigil_core::{Connectivity, MemoryStore};
//! # use vigil_recovery::{RecoveryConfig, RecoveryCoordinator};
//! # use vigil_session::{AuthProvider, SessionManager};
//! # async fn wire<P: AuthProvider>(provider: Arc<P>) {
//! let connectivity = Connectivity::new(true);
//! let recovery = RecoveryCoordinator::new(
//!     Arc::clone(&provider),
//!     connectivity.clone(),
//!     RecoveryConfig::default(),
//! );
//! let sessions = SessionManager::builder(provider, MemoryStore::new())
//!     .recovery(Arc::new(recovery.clone()))
//!     .build();
//! recovery.attach(sessions.clone()).await.unwrap();
//! # }
//! ```

mod actor;
mod config;
mod coordinator;
mod error;
mod event;
mod queue;

pub use actor::RecoveryStatus;
pub use config::RecoveryConfig;
pub use coordinator::RecoveryCoordinator;
pub use error::RecoveryError;
pub use event::{RecoveryEvent, RecoverySource};
pub use queue::PendingAction;
