//! The key-value storage port and the persisted session record.
//!
//! Vigil doesn't own a storage engine. It needs exactly three operations
//! (`get`, `set`, `remove`) over string keys and string values, which is
//! what browser local storage, a keychain, or a file all offer. The
//! [`KeyValueStore`] trait is that contract; [`MemoryStore`] is the
//! in-process implementation used by tests and by hosts without storage.
//!
//! [`SessionStore`] sits on top and owns the single `<prefix>data` entry
//! the session manager writes.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Codec, JsonCodec, Session, StoreError, Timestamp};

// ---------------------------------------------------------------------------
// KeyValueStore
// ---------------------------------------------------------------------------

/// Asynchronous string key-value storage.
///
/// Implementations must make each call atomic per key. Vigil has a single
/// writer for every key it uses, so no cross-key transactions are needed.
pub trait KeyValueStore: Send + Sync + 'static {
    /// Reads a value. `Ok(None)` means the key is absent.
    fn get(&self, key: &str)
    -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Writes a value, replacing any previous one.
    fn set(&self, key: &str, value: String)
    -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Deletes a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}

impl<T: KeyValueStore> KeyValueStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key).await
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-memory storage. Data is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .entries
            .read()
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .insert(key.to_owned(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PersistedSession
// ---------------------------------------------------------------------------

/// The record stored under `<prefix>data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    /// The session as it was when written.
    pub session: Session,
    /// Last user activity seen by the session manager.
    pub last_activity_at: Timestamp,
    /// When the record was written. Drives the staleness check on load.
    pub stored_at: Timestamp,
}

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

/// Reads and writes the persisted session record.
///
/// Records older than `max_age` are treated as absent and deleted on load,
/// so a device that sat unused for days doesn't resurrect a session.
pub struct SessionStore<S> {
    backend: S,
    key: String,
    max_age: Duration,
    codec: JsonCodec,
}

impl<S: KeyValueStore> SessionStore<S> {
    /// Suffix appended to the configured prefix to form the storage key.
    pub const RECORD_SUFFIX: &'static str = "data";

    /// Creates a store writing to `<prefix>data`.
    pub fn new(backend: S, prefix: &str, max_age: Duration) -> Self {
        Self {
            backend,
            key: format!("{prefix}{}", Self::RECORD_SUFFIX),
            max_age,
            codec: JsonCodec,
        }
    }

    /// The storage key this store writes to.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Writes a fresh record stamped with the current time.
    ///
    /// # Errors
    /// Returns [`StoreError`] if encoding or the backend write fails.
    pub async fn save(
        &self,
        session: &Session,
        last_activity_at: Timestamp,
    ) -> Result<PersistedSession, StoreError> {
        let record = PersistedSession {
            session: session.clone(),
            last_activity_at,
            stored_at: Timestamp::now(),
        };
        let encoded = self.codec.encode(&record)?;
        self.backend.set(&self.key, encoded).await?;
        tracing::trace!(key = %self.key, "session record persisted");
        Ok(record)
    }

    /// Loads the record if one exists and is no older than `max_age`.
    ///
    /// Stale or undecodable records are removed and reported as `None`.
    ///
    /// # Errors
    /// Returns [`StoreError::Backend`] if the backend read or cleanup fails.
    pub async fn load(&self) -> Result<Option<PersistedSession>, StoreError> {
        let Some(raw) = self.backend.get(&self.key).await? else {
            return Ok(None);
        };

        let record: PersistedSession = match self.codec.decode(&raw) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "discarding unreadable session record");
                self.backend.remove(&self.key).await?;
                return Ok(None);
            }
        };

        let age = Timestamp::now().saturating_duration_since(record.stored_at);
        if age > self.max_age {
            tracing::debug!(
                key = %self.key,
                age_secs = age.as_secs(),
                max_age_secs = self.max_age.as_secs(),
                "discarding stale session record"
            );
            self.backend.remove(&self.key).await?;
            return Ok(None);
        }

        Ok(Some(record))
    }

    /// Deletes the record.
    ///
    /// # Errors
    /// Returns [`StoreError::Backend`] if the backend delete fails.
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.backend.remove(&self.key).await
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn store(backend: Arc<MemoryStore>) -> SessionStore<Arc<MemoryStore>> {
        SessionStore::new(backend, "vigil.session.", DAY)
    }

    fn session() -> Session {
        Session::expiring_in("access", "refresh", Duration::from_secs(3600))
    }

    // =====================================================================
    // MemoryStore
    // =====================================================================

    #[tokio::test]
    async fn test_memory_store_set_get_remove() {
        let kv = MemoryStore::new();
        kv.set("k", "v".into()).await.unwrap();

        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("v"));

        kv.remove("k").await.unwrap();
        assert_eq!(kv.get("k").await.unwrap(), None);
        assert!(kv.is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_remove_absent_key_is_ok() {
        let kv = MemoryStore::new();

        assert!(kv.remove("missing").await.is_ok());
    }

    // =====================================================================
    // SessionStore
    // =====================================================================

    #[test]
    fn test_session_store_key_uses_prefix() {
        let s = store(Arc::new(MemoryStore::new()));
        assert_eq!(s.key(), "vigil.session.data");
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_store_load_within_max_age_returns_record() {
        let backend = Arc::new(MemoryStore::new());
        let s = store(Arc::clone(&backend));
        let activity = Timestamp::now();
        let saved = s.save(&session(), activity).await.unwrap();

        tokio::time::advance(DAY).await;

        let loaded = s.load().await.unwrap().expect("record within 24h");
        assert_eq!(loaded, saved);
        assert_eq!(loaded.last_activity_at, activity);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_store_load_is_idempotent() {
        let s = store(Arc::new(MemoryStore::new()));
        s.save(&session(), Timestamp::now()).await.unwrap();

        let first = s.load().await.unwrap();
        let second = s.load().await.unwrap();

        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_store_load_stale_record_discards_it() {
        let backend = Arc::new(MemoryStore::new());
        let s = store(Arc::clone(&backend));
        s.save(&session(), Timestamp::now()).await.unwrap();

        tokio::time::advance(DAY + Duration::from_secs(1)).await;

        assert!(s.load().await.unwrap().is_none());
        assert!(backend.is_empty(), "stale record should be removed");
    }

    #[tokio::test]
    async fn test_session_store_load_corrupt_record_discards_it() {
        let backend = Arc::new(MemoryStore::new());
        backend.set("vigil.session.data", "garbage".into()).await.unwrap();
        let s = store(Arc::clone(&backend));

        assert!(s.load().await.unwrap().is_none());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_session_store_clear_removes_record() {
        let backend = Arc::new(MemoryStore::new());
        let s = store(Arc::clone(&backend));
        s.save(&session(), Timestamp::now()).await.unwrap();

        s.clear().await.unwrap();

        assert!(s.load().await.unwrap().is_none());
    }
}
