//! Session lifecycle management for Vigil.
//!
//! This crate keeps one authenticated session alive on a client:
//!
//! 1. **Expiry**: a timer at `max(token TTL, role timeout)` ends the
//!    session and clears it from memory and storage.
//! 2. **Warnings**: a first and a final [`SessionEvent::Warning`] ahead of
//!    expiry, each at most once per session.
//! 3. **Refresh**: a timer `refresh_threshold` before expiry exchanges the
//!    refresh token through the [`AuthProvider`], single-flight, with local
//!    backoff for provider errors and hand-off to recovery for
//!    connectivity errors.
//! 4. **Activity**: [`SessionManager::track_activity`] stamps the last
//!    activity, optionally pushes expiry out, and drives idle detection.
//!
//! # How it fits in the stack
//!
//! ```text
//! Recovery Layer (above)  ← replays deferred work through SessionManager
//!     ↕  (RecoverySink)
//! Session Layer (this crate)  ← owns the session and its timers
//!     ↕
//! Retry + Core (below)  ← circuit breaker, types, storage, clock
//! ```

#![allow(async_fn_in_trait)]

mod actor;
mod auth;
mod config;
mod error;
mod event;
mod manager;
mod recovery;
mod session;

pub use auth::AuthProvider;
pub use config::{RoleTimeouts, SessionConfig};
pub use error::{AuthError, SessionError};
pub use event::{NoopObserver, SessionEvent, SessionObserver, WarningKind};
pub use manager::{SessionManager, SessionManagerBuilder};
pub use recovery::RecoverySink;
pub use session::{LifecycleState, RefreshOutcome, SessionState, WarningsShown};
