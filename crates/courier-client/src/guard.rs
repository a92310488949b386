//! Session-gated navigation.
//!
//! [`decide_route`] is the whole policy; [`NavigationGuard`] only feeds it
//! session state and applies what it returns.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, warn};

use courier_types::events::SessionChange;

use crate::session::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Loading,
    Unauthenticated,
    Authenticated,
}

/// Top-level areas of the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteGroup {
    /// The launch index, `/`.
    Root,
    /// Sign-in and sign-up screens.
    Auth,
    /// Everything behind a session.
    App,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Index,
    Login,
    Register,
    Home,
}

impl Route {
    pub fn path(self) -> &'static str {
        match self {
            Self::Index => "/",
            Self::Login => "/login",
            Self::Register => "/register",
            Self::Home => "/home",
        }
    }

    pub fn group(self) -> RouteGroup {
        match self {
            Self::Index => RouteGroup::Root,
            Self::Login | Self::Register => RouteGroup::Auth,
            Self::Home => RouteGroup::App,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAction {
    /// Replace the current screen; no back entry.
    Replace(Route),
}

/// Where to send the user, if anywhere, given the session state and the
/// area they are in.
pub fn decide_route(state: GuardState, group: RouteGroup) -> Option<RouteAction> {
    match (state, group) {
        (GuardState::Loading, _) => None,
        (GuardState::Unauthenticated, RouteGroup::Auth) => None,
        (GuardState::Unauthenticated, _) => Some(RouteAction::Replace(Route::Login)),
        (GuardState::Authenticated, RouteGroup::App) => None,
        (GuardState::Authenticated, _) => Some(RouteAction::Replace(Route::Home)),
    }
}

/// The UI's router, as seen by the app core.
pub trait Navigator: Send + Sync {
    fn current_group(&self) -> RouteGroup;
    fn replace(&self, route: Route);
}

/// Keeps the visible route consistent with the session for the lifetime of
/// the app.
pub struct NavigationGuard {
    store: SessionStore,
    navigator: Arc<dyn Navigator>,
    state: Mutex<GuardState>,
}

impl NavigationGuard {
    pub fn new(store: SessionStore, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            store,
            navigator,
            state: Mutex::new(GuardState::Loading),
        }
    }

    pub fn state(&self) -> GuardState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Resolve the initial session, then follow session changes until the
    /// store goes away.
    pub async fn run(&self) {
        // Subscribe before the first fetch so no change can slip between them.
        let mut changes = self.store.subscribe();
        self.start().await;

        loop {
            match changes.recv().await {
                Ok(change) => self.on_change(&change),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Navigation guard lagged behind session changes");
                    let state = authenticated(self.store.current().is_some());
                    self.transition(state);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    /// Fetch the session once and leave `Loading`.
    pub async fn start(&self) {
        let state = match self.store.get_session().await {
            Ok(session) => authenticated(session.is_some()),
            Err(e) => {
                error!("Failed to load session at launch: {}", e);
                GuardState::Unauthenticated
            }
        };
        self.transition(state);
    }

    fn on_change(&self, change: &SessionChange) {
        debug!(event = ?change.event, "Session change");
        self.transition(authenticated(change.session.is_some()));
    }

    fn transition(&self, next: GuardState) {
        {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            *state = next;
        }
        self.apply(next);
    }

    fn apply(&self, state: GuardState) {
        if let Some(RouteAction::Replace(route)) = decide_route(state, self.navigator.current_group()) {
            debug!(to = route.path(), "Guard redirect");
            self.navigator.replace(route);
        }
    }
}

fn authenticated(signed_in: bool) -> GuardState {
    if signed_in {
        GuardState::Authenticated
    } else {
        GuardState::Unauthenticated
    }
}
