//! Launch wiring: one session store shared by the guard, the flows and the
//! push registration task.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use courier_types::events::AuthEvent;

use crate::auth_flow::AuthFlows;
use crate::backend::{AuthBackend, BackendClient, ProfileBackend};
use crate::config::ClientConfig;
use crate::guard::{NavigationGuard, Navigator};
use crate::profile::ProfileFlow;
use crate::push::{ForegroundPresentation, PushPlatform, register_for_push};
use crate::session::{FileSessionStorage, MemorySessionStorage, SessionStorage, SessionStore};

pub struct App {
    pub store: SessionStore,
    pub guard: Arc<NavigationGuard>,
    pub auth: AuthFlows,
    pub profile: Arc<ProfileFlow>,
    platform: Arc<dyn PushPlatform>,
}

/// Background tasks started by [`App::launch`]. Dropping this does not stop
/// them.
pub struct Running {
    pub guard: JoinHandle<()>,
    pub auto_refresh: JoinHandle<()>,
    pub push: JoinHandle<()>,
}

impl Running {
    pub fn abort(&self) {
        self.guard.abort();
        self.auto_refresh.abort();
        self.push.abort();
    }
}

impl App {
    pub fn new(
        auth: Arc<dyn AuthBackend>,
        profiles: Arc<dyn ProfileBackend>,
        storage: Arc<dyn SessionStorage>,
        navigator: Arc<dyn Navigator>,
        platform: Arc<dyn PushPlatform>,
    ) -> Self {
        let store = SessionStore::new(auth, storage);
        Self {
            guard: Arc::new(NavigationGuard::new(store.clone(), navigator.clone())),
            auth: AuthFlows::new(store.clone(), navigator),
            profile: Arc::new(ProfileFlow::new(store.clone(), profiles)),
            store,
            platform,
        }
    }

    /// Build against the HTTP backend described by `config`.
    pub fn from_config(
        config: &ClientConfig,
        navigator: Arc<dyn Navigator>,
        platform: Arc<dyn PushPlatform>,
    ) -> Self {
        let backend = Arc::new(BackendClient::new(config));
        let storage: Arc<dyn SessionStorage> = match &config.session_path {
            Some(path) => Arc::new(FileSessionStorage::new(path)),
            None => Arc::new(MemorySessionStorage::default()),
        };
        Self::new(backend.clone(), backend, storage, navigator, platform)
    }

    /// Start the guard, background refresh and push registration.
    pub fn launch(&self) -> Running {
        self.platform.set_foreground_presentation(ForegroundPresentation::default());

        let guard = self.guard.clone();
        Running {
            guard: tokio::spawn(async move { guard.run().await }),
            auto_refresh: self.store.spawn_auto_refresh(),
            push: self.spawn_push_registration(),
        }
    }

    /// Obtain the device token and store it against whoever is signed in,
    /// now or at the next sign-in.
    fn spawn_push_registration(&self) -> JoinHandle<()> {
        let store = self.store.clone();
        let profile = self.profile.clone();
        let platform = self.platform.clone();
        // Subscribe up front so a sign-in during token retrieval is not missed.
        let mut changes = store.subscribe();

        tokio::spawn(async move {
            let Some(token) = register_for_push(platform.as_ref()).await else {
                return;
            };

            let user_id = match store.current() {
                Some(session) => session.user_id(),
                None => loop {
                    match changes.recv().await {
                        Ok(change) if change.event == AuthEvent::SignedIn => {
                            if let Some(session) = change.session {
                                break session.user_id();
                            }
                        }
                        Ok(_) | Err(RecvError::Lagged(_)) => {
                            if let Some(session) = store.current() {
                                break session.user_id();
                            }
                        }
                        Err(RecvError::Closed) => return,
                    }
                },
            };

            match profile.store_push_token(user_id, &token).await {
                Ok(()) => info!(%user_id, "Push token registered"),
                Err(e) => warn!("Failed to store push token: {}", e),
            }
        })
    }
}
