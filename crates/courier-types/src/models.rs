use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The authenticated identity behind a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
}

/// Credential bundle issued by the backend on sign-in or sign-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: AuthUser,
}

impl Session {
    pub fn user_id(&self) -> Uuid {
        self.user.id
    }

    /// When to refresh a session received at `received_at`: `margin` before
    /// expiry, but no earlier than halfway through its lifetime.
    pub fn refresh_at(&self, received_at: DateTime<Utc>, margin: Duration) -> DateTime<Utc> {
        let half_life = ((self.expires_at - received_at) / 2).max(Duration::zero());
        self.expires_at - margin.min(half_life)
    }
}

/// A row of the `profiles` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub username: Option<String>,
    pub fcm_token: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Field-scoped upsert of a profile row.
///
/// Fields left as `None` are not sent and are never overwritten, so the
/// username writer and the push token writer can race on the same row
/// without clobbering each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePatch {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fcm_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProfilePatch {
    pub fn username(id: Uuid, username: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            username: Some(username.into()),
            fcm_token: None,
            updated_at: Some(now),
        }
    }

    pub fn fcm_token(id: Uuid, token: impl Into<String>) -> Self {
        Self {
            id,
            username: None,
            fcm_token: Some(token.into()),
            updated_at: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.fcm_token.is_none()
    }
}
