use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AuthUser, Session};

// -- JWT Claims --

/// Access token claims issued by the backend and checked on every
/// authenticated data call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Sign-up result. `session` is absent when the account must confirm its
/// email before it can sign in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignUpResponse {
    pub user: AuthUser,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GrantQuery {
    pub grant_type: String,
}

/// Error body returned by the backend; `message` is shown to the user as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

// -- Relay --

/// Body posted to the relay by the row-change trigger.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayRequest {
    pub record: RelayRecord,
}

/// The changed profile row as seen by the relay. Only `fcm_token` matters;
/// everything else is carried along untouched.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayRecord {
    #[serde(default)]
    pub fcm_token: Option<String>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

impl RelayRecord {
    /// The target device token, treating an empty string as absent.
    pub fn push_token(&self) -> Option<&str> {
        self.fcm_token.as_deref().filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayMessage {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayFailure {
    pub error: String,
}
