//! # Vigil
//!
//! Keeps a client's authenticated session alive: expiry and warning timers,
//! single-flight token refresh behind a circuit breaker, activity tracking,
//! and recovery of the session and any deferred work after the network
//! drops.
//!
//! The layers live in their own crates and can be used on their own. This
//! crate wires them together and re-exports the pieces most applications
//! need.
//!
//! | Crate | Provides |
//! |-------|----------|
//! | `vigil-core` | `Session`, storage port, connectivity signal, clock |
//! | `vigil-retry` | retry policies, circuit breakers, `RetryExecutor` |
//! | `vigil-session` | `AuthProvider`, `SessionManager`, session events |
//! | `vigil-recovery` | `RecoveryCoordinator`, pending-action replay |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vigil::prelude::*;
//!
//! # async fn run<P: AuthProvider>(provider: P, session: Session) -> Result<(), VigilError> {
//! let vigil = Vigil::builder(Arc::new(provider)).build().await?;
//! vigil.sessions().initialize(Some(session), NoopObserver).await?;
//!
//! // Later, from the platform's network monitor:
//! vigil.set_online(false);
//! # Ok(())
//! # }
//! ```

mod client;
mod error;

pub use client::{Vigil, VigilBuilder};
pub use error::VigilError;

pub use vigil_core;
pub use vigil_recovery;
pub use vigil_retry;
pub use vigil_session;

/// Commonly used types, for a single `use vigil::prelude::*;`.
pub mod prelude {
    pub use crate::{Vigil, VigilBuilder, VigilError};
    pub use vigil_core::{
        Connectivity, KeyValueStore, MemoryStore, PendingActionKind, Session, Timestamp,
    };
    pub use vigil_recovery::{
        PendingAction, RecoveryConfig, RecoveryCoordinator, RecoveryEvent, RecoverySource,
    };
    pub use vigil_retry::{CircuitBreakerConfig, CircuitState, RetryExecutor, RetryPolicy};
    pub use vigil_session::{
        AuthError, AuthProvider, LifecycleState, NoopObserver, RefreshOutcome, RoleTimeouts,
        SessionConfig, SessionError, SessionEvent, SessionManager, SessionObserver, WarningKind,
    };
}
