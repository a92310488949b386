//! Session store: the app's only process-wide mutable state.
//!
//! One writer, many readers. The cached session is only ever replaced from
//! inside [`SessionStore`], and every replacement is broadcast to
//! subscribers as a [`SessionChange`] in the order it happened.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use courier_types::events::{AuthEvent, SessionChange};
use courier_types::models::Session;

use crate::backend::AuthBackend;
use crate::error::ClientError;

/// Refresh this long before the access token expires, or halfway through
/// its lifetime when that comes later.
const DEFAULT_REFRESH_MARGIN_SECS: i64 = 60;
/// Wait before retrying a refresh that failed for a transient reason.
const REFRESH_RETRY: StdDuration = StdDuration::from_secs(30);
/// Floor between two background refreshes.
const MIN_REFRESH_INTERVAL: StdDuration = StdDuration::from_secs(5);

/// Local persistence for the session, so a user stays signed in across
/// launches.
pub trait SessionStorage: Send + Sync {
    fn load(&self) -> Result<Option<Session>, ClientError>;
    fn save(&self, session: &Session) -> Result<(), ClientError>;
    fn clear(&self) -> Result<(), ClientError>;
}

/// Session kept in memory only.
#[derive(Default)]
pub struct MemorySessionStorage {
    slot: Mutex<Option<Session>>,
}

impl SessionStorage for MemorySessionStorage {
    fn load(&self) -> Result<Option<Session>, ClientError> {
        let slot = self.slot.lock().map_err(|e| ClientError::Storage(e.to_string()))?;
        Ok(slot.clone())
    }

    fn save(&self, session: &Session) -> Result<(), ClientError> {
        let mut slot = self.slot.lock().map_err(|e| ClientError::Storage(e.to_string()))?;
        *slot = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        let mut slot = self.slot.lock().map_err(|e| ClientError::Storage(e.to_string()))?;
        *slot = None;
        Ok(())
    }
}

/// Session persisted as JSON in a single file. Writes go to a sibling temp
/// file first and are renamed into place.
pub struct FileSessionStorage {
    path: PathBuf,
}

impl FileSessionStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SessionStorage for FileSessionStorage {
    fn load(&self) -> Result<Option<Session>, ClientError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ClientError::Storage(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| ClientError::Storage(format!("corrupt session file: {e}")))
    }

    fn save(&self, session: &Session) -> Result<(), ClientError> {
        let json = serde_json::to_vec(session).map_err(|e| ClientError::Storage(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)
            .and_then(|_| std::fs::rename(&tmp, &self.path))
            .map_err(|e| ClientError::Storage(format!("failed to write {}: {e}", self.path.display())))
    }

    fn clear(&self) -> Result<(), ClientError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::Storage(e.to_string())),
        }
    }
}

#[derive(Default)]
struct Cache {
    /// Whether persisted storage has been read yet.
    loaded: bool,
    session: Option<Session>,
    refresh_at: Option<DateTime<Utc>>,
}

/// Cached, persisted, self-refreshing session with change notifications.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    auth: Arc<dyn AuthBackend>,
    storage: Arc<dyn SessionStorage>,
    cache: RwLock<Cache>,
    events_tx: broadcast::Sender<SessionChange>,
    /// Serializes every write so there is exactly one writer at a time.
    write_lock: tokio::sync::Mutex<()>,
    refresh_margin: Duration,
}

impl SessionStore {
    pub fn new(auth: Arc<dyn AuthBackend>, storage: Arc<dyn SessionStorage>) -> Self {
        let (events_tx, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(StoreInner {
                auth,
                storage,
                cache: RwLock::new(Cache::default()),
                events_tx,
                write_lock: tokio::sync::Mutex::new(()),
                refresh_margin: Duration::seconds(DEFAULT_REFRESH_MARGIN_SECS),
            }),
        }
    }

    /// Subscribe to session changes. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.inner.events_tx.subscribe()
    }

    /// The cached session, without touching storage or the network.
    pub fn current(&self) -> Option<Session> {
        self.inner
            .cache
            .read()
            .map(|c| c.session.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().session.clone())
    }

    /// The current session, restoring it from storage on first use and
    /// refreshing it when it is inside the refresh window.
    ///
    /// # Errors
    ///
    /// Storage failures and network failures during a needed refresh. A
    /// refresh the backend rejects ends the session and yields `Ok(None)`.
    pub async fn get_session(&self) -> Result<Option<Session>, ClientError> {
        if !self.is_loaded() {
            let _guard = self.inner.write_lock.lock().await;
            if !self.is_loaded() {
                let restored = self.inner.storage.load()?;
                // Lifetime of a restored session is unknown; use the full margin.
                let refresh_at = restored.as_ref().map(|s| s.expires_at - self.inner.refresh_margin);
                self.write_cache(restored.clone(), refresh_at);
                self.emit(AuthEvent::InitialSession, restored);
            }
        }

        if !self.refresh_due(Utc::now()) {
            return Ok(self.current());
        }

        match self.refresh_when_due().await {
            Ok(session) => Ok(session),
            Err(e) if e.is_rejection() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, ClientError> {
        let _guard = self.inner.write_lock.lock().await;
        let session = self.inner.auth.sign_in(email, password).await?;
        info!(user_id = %session.user_id(), "Signed in");
        self.replace(AuthEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    /// Create an account. Returns `None` when the backend requires the email
    /// address to be confirmed first; the store stays signed out then.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>, ClientError> {
        let _guard = self.inner.write_lock.lock().await;
        let response = self.inner.auth.sign_up(email, password).await?;
        match response.session {
            Some(session) => {
                info!(user_id = %session.user_id(), "Signed up and signed in");
                self.replace(AuthEvent::SignedIn, Some(session.clone()));
                Ok(Some(session))
            }
            None => {
                info!(user_id = %response.user.id, "Signed up; awaiting email confirmation");
                Ok(None)
            }
        }
    }

    /// End the session. The local session is dropped even when the backend
    /// call fails.
    pub async fn sign_out(&self) {
        let _guard = self.inner.write_lock.lock().await;
        let Some(session) = self.current() else {
            return;
        };
        if let Err(e) = self.inner.auth.sign_out(&session.access_token).await {
            warn!("Backend sign-out failed, clearing local session anyway: {}", e);
        }
        self.replace(AuthEvent::SignedOut, None);
    }

    /// Exchange the refresh token for a new session.
    ///
    /// A rejected refresh token ends the session.
    pub async fn refresh(&self) -> Result<Session, ClientError> {
        let _guard = self.inner.write_lock.lock().await;
        self.refresh_locked().await
    }

    /// Refresh only if the session is still due once the write lock is held,
    /// so concurrent callers share a single refresh.
    async fn refresh_when_due(&self) -> Result<Option<Session>, ClientError> {
        let _guard = self.inner.write_lock.lock().await;
        if !self.refresh_due(Utc::now()) {
            return Ok(self.current());
        }
        self.refresh_locked().await.map(Some)
    }

    async fn refresh_locked(&self) -> Result<Session, ClientError> {
        let Some(current) = self.current() else {
            return Err(ClientError::Backend {
                status: 401,
                message: "Auth session missing!".into(),
            });
        };

        match self.inner.auth.refresh(&current.refresh_token).await {
            Ok(session) => {
                debug!(expires_at = %session.expires_at, "Session refreshed");
                self.replace(AuthEvent::TokenRefreshed, Some(session.clone()));
                Ok(session)
            }
            Err(e) if e.is_rejection() => {
                warn!("Refresh token rejected, signing out: {}", e);
                self.replace(AuthEvent::SignedOut, None);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Keep the session fresh in the background for as long as the app runs.
    pub fn spawn_auto_refresh(&self) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move { store.auto_refresh_loop().await })
    }

    async fn auto_refresh_loop(self) {
        let mut changes = self.subscribe();
        loop {
            let wait = match self.refresh_deadline() {
                Some(at) => (at - Utc::now()).to_std().unwrap_or(StdDuration::ZERO),
                // Nothing to refresh until someone signs in.
                None => StdDuration::MAX,
            };

            tokio::select! {
                change = changes.recv() => {
                    if let Err(broadcast::error::RecvError::Closed) = change {
                        return;
                    }
                    // Session replaced; recompute the deadline.
                }
                _ = sleep_for(wait) => {
                    let pause = match self.refresh().await {
                        Err(e) if !e.is_rejection() => {
                            warn!("Background refresh failed, retrying: {}", e);
                            REFRESH_RETRY
                        }
                        _ => MIN_REFRESH_INTERVAL,
                    };
                    tokio::time::sleep(pause).await;
                }
            }
        }
    }

    fn is_loaded(&self) -> bool {
        self.inner
            .cache
            .read()
            .map(|c| c.loaded)
            .unwrap_or_else(|poisoned| poisoned.into_inner().loaded)
    }

    fn refresh_deadline(&self) -> Option<DateTime<Utc>> {
        self.inner
            .cache
            .read()
            .map(|c| c.refresh_at)
            .unwrap_or_else(|poisoned| poisoned.into_inner().refresh_at)
    }

    fn refresh_due(&self, now: DateTime<Utc>) -> bool {
        self.refresh_deadline().is_some_and(|at| at <= now)
    }

    fn write_cache(&self, session: Option<Session>, refresh_at: Option<DateTime<Utc>>) {
        let mut cache = self
            .inner
            .cache
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        cache.loaded = true;
        cache.session = session;
        cache.refresh_at = refresh_at;
    }

    /// The single write path: update the cache, persist, then notify.
    fn replace(&self, event: AuthEvent, session: Option<Session>) {
        let now = Utc::now();
        let refresh_at = session
            .as_ref()
            .map(|s| s.refresh_at(now, self.inner.refresh_margin));
        self.write_cache(session.clone(), refresh_at);

        let persisted = match &session {
            Some(s) => self.inner.storage.save(s),
            None => self.inner.storage.clear(),
        };
        if let Err(e) = persisted {
            warn!("Failed to persist session: {}", e);
        }

        self.emit(event, session);
    }

    fn emit(&self, event: AuthEvent, session: Option<Session>) {
        // No subscribers is fine.
        let _ = self.inner.events_tx.send(SessionChange { event, session });
    }
}

async fn sleep_for(duration: StdDuration) {
    if duration == StdDuration::MAX {
        std::future::pending::<()>().await;
    } else {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackend, session_expiring_in};

    fn store(backend: &Arc<FakeBackend>, storage: Arc<dyn SessionStorage>) -> SessionStore {
        SessionStore::new(backend.clone(), storage)
    }

    #[tokio::test]
    async fn invalid_credentials_leave_session_absent() {
        let backend = Arc::new(FakeBackend::default());
        let store = store(&backend, Arc::new(MemorySessionStorage::default()));

        let err = store.sign_in("ada@example.com", "wrong").await.unwrap_err();

        assert_eq!(err.to_string(), "Invalid login credentials");
        assert!(store.current().is_none());
        assert!(store.get_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sign_in_is_broadcast_and_persisted() {
        let backend = Arc::new(FakeBackend::default());
        let storage = Arc::new(MemorySessionStorage::default());
        let store = store(&backend, storage.clone());
        let mut changes = store.subscribe();

        let session = store.sign_in("ada@example.com", "hunter22").await.unwrap();

        let change = changes.recv().await.unwrap();
        assert_eq!(change.event, AuthEvent::SignedIn);
        assert_eq!(change.session.as_ref(), Some(&session));
        assert_eq!(storage.load().unwrap(), Some(session));
    }

    #[tokio::test]
    async fn sign_up_awaiting_confirmation_stays_signed_out() {
        let backend = Arc::new(FakeBackend::requiring_confirmation());
        let store = store(&backend, Arc::new(MemorySessionStorage::default()));
        let mut changes = store.subscribe();

        let session = store.sign_up("ada@example.com", "hunter22").await.unwrap();

        assert!(session.is_none());
        assert!(store.current().is_none());
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn restored_session_inside_refresh_window_is_refreshed() {
        let backend = Arc::new(FakeBackend::default());
        let storage = Arc::new(MemorySessionStorage::default());
        storage.save(&session_expiring_in(Duration::seconds(10))).unwrap();
        let store = store(&backend, storage);
        let mut changes = store.subscribe();

        let session = store.get_session().await.unwrap().unwrap();

        assert!(session.expires_at > Utc::now() + Duration::minutes(30));
        assert_eq!(changes.recv().await.unwrap().event, AuthEvent::InitialSession);
        assert_eq!(changes.recv().await.unwrap().event, AuthEvent::TokenRefreshed);
        assert_eq!(backend.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn rejected_refresh_signs_out() {
        let backend = Arc::new(FakeBackend::default());
        backend.reject_refresh();
        let storage = Arc::new(MemorySessionStorage::default());
        storage.save(&session_expiring_in(Duration::seconds(-5))).unwrap();
        let store = store(&backend, storage.clone());

        assert!(store.get_session().await.unwrap().is_none());
        assert!(store.current().is_none());
        assert!(storage.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn sign_out_clears_even_if_backend_fails() {
        let backend = Arc::new(FakeBackend::default());
        let store = store(&backend, Arc::new(MemorySessionStorage::default()));
        store.sign_in("ada@example.com", "hunter22").await.unwrap();
        backend.fail_sign_out();

        store.sign_out().await;

        assert!(store.current().is_none());
    }

    #[tokio::test]
    async fn file_storage_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let backend = Arc::new(FakeBackend::default());

        let first = store(&backend, Arc::new(FileSessionStorage::new(&path)));
        let session = first.sign_in("ada@example.com", "hunter22").await.unwrap();

        let second = store(&backend, Arc::new(FileSessionStorage::new(&path)));
        assert_eq!(second.get_session().await.unwrap(), Some(session));

        second.sign_out().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn corrupt_session_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();
        let backend = Arc::new(FakeBackend::default());

        let store = store(&backend, Arc::new(FileSessionStorage::new(&path)));
        assert!(matches!(store.get_session().await, Err(ClientError::Storage(_))));
    }

    #[tokio::test]
    async fn short_lived_session_is_not_refreshed_on_every_read() {
        let backend = Arc::new(FakeBackend::default());
        backend.set_session_ttl(Duration::seconds(30));
        let store = store(&backend, Arc::new(MemorySessionStorage::default()));
        store.sign_in("ada@example.com", "hunter22").await.unwrap();

        for _ in 0..5 {
            assert!(store.get_session().await.unwrap().is_some());
        }

        assert_eq!(backend.refresh_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn short_lived_session_refreshes_at_a_bounded_rate() {
        let backend = Arc::new(FakeBackend::default());
        backend.set_session_ttl(Duration::seconds(30));
        let store = store(&backend, Arc::new(MemorySessionStorage::default()));
        store.sign_in("ada@example.com", "hunter22").await.unwrap();

        let task = store.spawn_auto_refresh();
        for _ in 0..200 {
            tokio::task::yield_now().await;
        }
        assert_eq!(backend.refresh_calls(), 0);

        // Half of the 30s lifetime, plus slack.
        tokio::time::sleep(StdDuration::from_secs(16)).await;
        assert!(backend.refresh_calls() >= 1);
        assert!(backend.refresh_calls() <= 2);
        task.abort();
    }

    #[tokio::test]
    async fn concurrent_reads_share_one_refresh() {
        let backend = Arc::new(FakeBackend::default());
        let storage = Arc::new(MemorySessionStorage::default());
        storage.save(&session_expiring_in(Duration::seconds(10))).unwrap();
        let store = store(&backend, storage);

        let (a, b) = tokio::join!(store.get_session(), store.get_session());

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(backend.refresh_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_refresh_fires_before_expiry() {
        let backend = Arc::new(FakeBackend::default());
        backend.set_session_ttl(Duration::seconds(120));
        let store = store(&backend, Arc::new(MemorySessionStorage::default()));
        store.sign_in("ada@example.com", "hunter22").await.unwrap();

        let task = store.spawn_auto_refresh();
        // 120s lifetime minus the 60s margin
        tokio::time::sleep(StdDuration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert!(backend.refresh_calls() >= 1);
        task.abort();
    }
}
