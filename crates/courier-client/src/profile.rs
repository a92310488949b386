//! Profile reads and field-scoped writes.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use courier_types::models::{Profile, ProfilePatch, Session};

use crate::backend::ProfileBackend;
use crate::error::UpdateError;
use crate::session::SessionStore;

const EMPTY_USERNAME: &str = "Please enter a username";

pub struct ProfileFlow {
    store: SessionStore,
    profiles: Arc<dyn ProfileBackend>,
}

impl ProfileFlow {
    pub fn new(store: SessionStore, profiles: Arc<dyn ProfileBackend>) -> Self {
        Self { store, profiles }
    }

    /// Set the display name. Only `username` and `updated_at` are written;
    /// the push token on the same row is left alone.
    ///
    /// The backend notifies the relay on its own after the write; this
    /// returns as soon as the row is stored.
    pub async fn update_profile(&self, user_id: Uuid, username: &str) -> Result<(), UpdateError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(UpdateError::Validation(EMPTY_USERNAME));
        }

        let session = self.session().await?;
        let patch = ProfilePatch::username(user_id, username, Utc::now());
        self.profiles.upsert_profile(&session.access_token, &patch).await?;

        info!(%user_id, "Profile updated");
        Ok(())
    }

    pub async fn load_profile(&self, user_id: Uuid) -> Result<Option<Profile>, UpdateError> {
        let session = self.session().await?;
        Ok(self.profiles.select_profile(&session.access_token, user_id).await?)
    }

    /// Record this installation's push token against the user. Writes
    /// `fcm_token` only.
    pub async fn store_push_token(&self, user_id: Uuid, token: &str) -> Result<(), UpdateError> {
        let session = self.session().await?;
        self.profiles
            .upsert_profile(&session.access_token, &ProfilePatch::fcm_token(user_id, token))
            .await?;

        debug!(%user_id, "Push token stored");
        Ok(())
    }

    async fn session(&self) -> Result<Session, UpdateError> {
        self.store.get_session().await?.ok_or(UpdateError::NotAuthenticated)
    }
}
