use serde::{Deserialize, Serialize};

use crate::models::{Profile, Session};

/// Why the session changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEvent {
    /// The session restored from local storage at startup
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// A session change as delivered to subscribers, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionChange {
    pub event: AuthEvent,
    pub session: Option<Session>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RowChangeKind {
    Insert,
    Update,
}

/// Row-change notification for the `profiles` table.
///
/// Delivered at most once per write: the trigger does not wait for an
/// acknowledgment and never retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowChange {
    #[serde(rename = "type")]
    pub kind: RowChangeKind,
    pub table: String,
    pub record: Profile,
}

impl RowChange {
    pub fn profile(kind: RowChangeKind, record: Profile) -> Self {
        Self {
            kind,
            table: "profiles".to_string(),
            record,
        }
    }
}
