//! End-to-end tests: the facade wiring a session manager to a recovery
//! coordinator, on a paused clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use vigil::prelude::*;

const HOUR: Duration = Duration::from_secs(3_600);

// =========================================================================
// Helpers
// =========================================================================

/// Refreshes succeed unless `fail_refresh` is set; everything else
/// succeeds.
#[derive(Default)]
struct MockProvider {
    fail_refresh: bool,
    refresh_calls: AtomicU32,
}

impl AuthProvider for MockProvider {
    async fn get_current_session(&self) -> Result<Option<Session>, AuthError> {
        Ok(None)
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_refresh {
            return Err(AuthError::Provider("invalid_grant".into()));
        }
        Ok(Session::expiring_in("refreshed", refresh_token, HOUR))
    }

    async fn set_session(&self, access: &str, refresh: &str) -> Result<Session, AuthError> {
        Ok(Session::expiring_in(access, refresh, HOUR))
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        Ok(())
    }
}

fn session() -> Session {
    Session::expiring_in("a0", "r0", HOUR)
}

// =========================================================================
// Wiring
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_build_links_manager_and_coordinator() {
    let provider = Arc::new(MockProvider::default());
    let vigil = Vigil::builder(Arc::clone(&provider)).build().await.unwrap();
    let mut events = vigil.recovery().subscribe();
    vigil.sessions().initialize(Some(session()), NoopObserver).await.unwrap();

    vigil.set_online(false);
    assert_eq!(events.recv().await.unwrap(), RecoveryEvent::Offline);
    assert_eq!(vigil.sessions().refresh().await.unwrap(), RefreshOutcome::Deferred);

    vigil.set_online(true);
    assert_eq!(events.recv().await.unwrap(), RecoveryEvent::Online);
    assert_eq!(
        events.recv().await.unwrap(),
        RecoveryEvent::ActionReplayed(PendingActionKind::Refresh)
    );

    assert_eq!(provider.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(vigil.sessions().session().unwrap().access_token, "refreshed");
}

#[tokio::test(start_paused = true)]
async fn test_build_offline_starts_disconnected() {
    let vigil = Vigil::builder(Arc::new(MockProvider::default()))
        .online(false)
        .build()
        .await
        .unwrap();

    assert!(!vigil.connectivity().is_online());
    assert!(!vigil.recovery().is_currently_online());
}

#[tokio::test(start_paused = true)]
async fn test_build_shares_supplied_connectivity() {
    let connectivity = Connectivity::new(true);
    let vigil = Vigil::builder(Arc::new(MockProvider::default()))
        .connectivity(connectivity.clone())
        .build()
        .await
        .unwrap();

    connectivity.set_online(false);

    assert!(!vigil.recovery().is_currently_online());
}

#[tokio::test(start_paused = true)]
async fn test_refresh_goes_through_auth_breaker() {
    let provider = Arc::new(MockProvider::default());
    let vigil = Vigil::builder(provider).build().await.unwrap();
    vigil.sessions().initialize(Some(session()), NoopObserver).await.unwrap();

    vigil.sessions().refresh().await.unwrap();

    let executor = vigil.retry_executor();
    assert_eq!(
        executor.circuit_state(RetryExecutor::AUTH_SERVICE),
        Some(CircuitState::Closed)
    );
    assert_eq!(executor.circuit_failures(RetryExecutor::AUTH_SERVICE), Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_refresh_failure_surfaces_as_vigil_error() {
    let provider = Arc::new(MockProvider {
        fail_refresh: true,
        ..MockProvider::default()
    });
    let vigil = Vigil::builder(provider).build().await.unwrap();
    vigil.sessions().initialize(Some(session()), NoopObserver).await.unwrap();

    let result: Result<RefreshOutcome, VigilError> =
        vigil.sessions().refresh().await.map_err(VigilError::from);

    assert!(matches!(
        result,
        Err(VigilError::Session(SessionError::RefreshFailed(_)))
    ));
}

// =========================================================================
// Persistence and teardown
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_persisted_session_survives_rebuild() {
    let storage = Arc::new(MemoryStore::new());
    let first = Vigil::builder(Arc::new(MockProvider::default()))
        .storage(Arc::clone(&storage))
        .build()
        .await
        .unwrap();
    first.sessions().initialize(Some(session()), NoopObserver).await.unwrap();
    drop(first);

    let second = Vigil::builder(Arc::new(MockProvider::default()))
        .storage(Arc::clone(&storage))
        .build()
        .await
        .unwrap();
    let restored = second.sessions().restore_persisted(NoopObserver).await.unwrap();

    assert_eq!(restored.map(|s| s.access_token), Some("a0".to_string()));
    assert!(second.sessions().is_valid());
}

#[tokio::test(start_paused = true)]
async fn test_destroy_silences_timers_and_stops_recovery() {
    let vigil = Vigil::builder(Arc::new(MockProvider::default()))
        .build()
        .await
        .unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel::<SessionEvent>();
    vigil.sessions().initialize(Some(session()), tx).await.unwrap();

    vigil.destroy().await;
    tokio::time::sleep(2 * HOUR).await;

    assert!(rx.recv().await.is_none());
    assert!(!vigil.recovery().is_running());
    assert!(vigil.sessions().session().is_none());

    vigil.destroy().await;
}
