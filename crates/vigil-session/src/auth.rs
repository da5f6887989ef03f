//! The auth provider port.
//!
//! Vigil doesn't talk to any identity service itself. Supabase, Auth0, a
//! custom token endpoint: whatever issues the access/refresh pair is wrapped
//! in an [`AuthProvider`] and handed to the session manager and the
//! recovery coordinator.

use std::future::Future;

use vigil_core::Session;

use crate::AuthError;

/// The operations Vigil needs from an identity service.
///
/// # Trait bounds
///
/// - `Send + Sync` → one provider is shared by the session manager, the
///   recovery coordinator, and any refresh task in flight.
/// - `'static` → it lives as long as the components holding it.
///
/// # Errors
///
/// Every method reports failures as [`AuthError`]. Return
/// [`AuthError::Connectivity`] for anything that might succeed once the
/// network is back; Vigil queues those operations instead of failing them.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use vigil_core::Session;
/// use vigil_session::{AuthError, AuthProvider};
///
/// /// Issues a fresh one-hour session for any refresh token.
/// struct DevProvider;
///
/// impl AuthProvider for DevProvider {
///     async fn get_current_session(&self) -> Result<Option<Session>, AuthError> {
///         Ok(None)
///     }
///
///     async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthError> {
///         Ok(Session::expiring_in("access", refresh_token, Duration::from_secs(3_600)))
///     }
///
///     async fn set_session(&self, access: &str, refresh: &str) -> Result<Session, AuthError> {
///         Ok(Session::expiring_in(access, refresh, Duration::from_secs(3_600)))
///     }
///
///     async fn sign_out(&self) -> Result<(), AuthError> {
///         Ok(())
///     }
/// }
/// ```
pub trait AuthProvider: Send + Sync + 'static {
    /// The session the provider currently considers active, if any.
    fn get_current_session(
        &self,
    ) -> impl Future<Output = Result<Option<Session>, AuthError>> + Send;

    /// Exchanges a refresh token for a new session.
    fn refresh_session(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<Session, AuthError>> + Send;

    /// Re-establishes a session from a stored token pair.
    fn set_session(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> impl Future<Output = Result<Session, AuthError>> + Send;

    /// Ends the session on the provider side.
    fn sign_out(&self) -> impl Future<Output = Result<(), AuthError>> + Send;
}
