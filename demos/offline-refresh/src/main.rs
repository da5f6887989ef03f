use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vigil::prelude::*;

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Stands in for a hosted identity service. Every refresh issues the next
/// numbered token; calls fail with a connectivity error while the shared
/// `reachable` flag is down.
struct DemoProvider {
    reachable: Arc<AtomicBool>,
    issued: AtomicU32,
    ttl: Duration,
}

impl DemoProvider {
    fn issue(&self, refresh_token: &str) -> Session {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Session::expiring_in(format!("access-{n}"), refresh_token, self.ttl)
    }

    fn check_network(&self) -> Result<(), AuthError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AuthError::Connectivity("network is unreachable".into()))
        }
    }
}

impl AuthProvider for DemoProvider {
    async fn get_current_session(&self) -> Result<Option<Session>, AuthError> {
        self.check_network()?;
        Ok(None)
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthError> {
        self.check_network()?;
        Ok(self.issue(refresh_token))
    }

    async fn set_session(&self, _access: &str, refresh: &str) -> Result<Session, AuthError> {
        self.check_network()?;
        Ok(self.issue(refresh))
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.check_network()
    }
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

/// Short timings so the whole lifecycle plays out in under a minute.
fn demo_config() -> SessionConfig {
    SessionConfig {
        role_timeouts: RoleTimeouts {
            default: Duration::ZERO,
            ..RoleTimeouts::default()
        },
        first_warning_lead: Duration::from_secs(10),
        final_warning_lead: Duration::from_secs(5),
        refresh_threshold: Duration::from_secs(8),
        activity_check_interval: Duration::ZERO,
        ..SessionConfig::default()
    }
}

/// Goes offline, asks for a refresh, comes back online, and returns the
/// access token the session ends up with.
async fn run(network: Arc<AtomicBool>) -> Result<String, VigilError> {
    let provider = Arc::new(DemoProvider {
        reachable: Arc::clone(&network),
        issued: AtomicU32::new(0),
        ttl: Duration::from_secs(30),
    });
    let vigil = Vigil::builder(provider)
        .session_config(demo_config())
        .build()
        .await?;

    let (tx, mut session_events) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = session_events.recv().await {
            info!(?event, "session event");
        }
    });
    let mut recovery_events = vigil.recovery().subscribe();

    let session = Session::expiring_in("access-0", "refresh-0", Duration::from_secs(30));
    vigil.sessions().initialize(Some(session), tx).await?;
    info!(expires_in = ?vigil.sessions().time_until_expiry(), "signed in");

    network.store(false, Ordering::SeqCst);
    vigil.set_online(false);
    tokio::time::sleep(Duration::from_secs(2)).await;

    let outcome = vigil.sessions().refresh().await?;
    info!(?outcome, pending = vigil.recovery().pending_actions().await?.len(), "refresh while offline");

    tokio::time::sleep(Duration::from_secs(3)).await;
    network.store(true, Ordering::SeqCst);
    vigil.set_online(true);

    while let Ok(event) = recovery_events.recv().await {
        info!(?event, "recovery event");
        if matches!(event, RecoveryEvent::Recovered { .. }) {
            break;
        }
    }

    let token = vigil
        .sessions()
        .session()
        .map(|s| s.access_token)
        .unwrap_or_default();
    info!(%token, "back online");

    vigil.sessions().logout().await?;
    vigil.destroy().await;
    Ok(token)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let token = run(Arc::new(AtomicBool::new(true))).await?;
    eprintln!("finished with {token}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_run_replays_offline_refresh() {
        let token = run(Arc::new(AtomicBool::new(true))).await.unwrap();

        // access-1 restores the snapshot, access-2 is the replayed refresh.
        assert_eq!(token, "access-2");
    }
}
