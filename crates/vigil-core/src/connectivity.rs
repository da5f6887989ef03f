//! The shared online/offline signal.
//!
//! The platform (a network monitor, a browser `online` event bridge, a
//! test) pushes transitions into a [`Connectivity`]. Components read the
//! latest value or subscribe to changes. Both the session manager and the
//! recovery coordinator may observe it independently; only the platform
//! writes it.

use std::sync::Arc;

use tokio::sync::watch;

/// Last observed connectivity state, shared by cloning.
///
/// Backed by a `watch` channel: readers always see the most recent value,
/// and subscribers are woken only when it actually changes.
#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    /// Creates a signal with the given initial state.
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    /// Records a platform signal. Repeating the current state is a no-op
    /// and does not wake subscribers.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!(online, "connectivity changed");
        }
    }

    /// The last observed state.
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// A receiver that resolves `changed()` on every transition.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_online() {
        assert!(Connectivity::default().is_online());
    }

    #[test]
    fn test_clones_share_state() {
        let a = Connectivity::new(true);
        let b = a.clone();

        a.set_online(false);

        assert!(!b.is_online());
    }

    #[tokio::test]
    async fn test_subscribe_sees_transition() {
        let signal = Connectivity::new(true);
        let mut rx = signal.subscribe();

        signal.set_online(false);

        rx.changed().await.unwrap();
        assert!(!*rx.borrow_and_update());
    }

    #[test]
    fn test_set_same_state_does_not_notify() {
        let signal = Connectivity::new(true);
        let rx = signal.subscribe();

        signal.set_online(true);

        assert!(!rx.has_changed().unwrap());
    }
}
