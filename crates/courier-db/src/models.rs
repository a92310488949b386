//! Database row types. These map directly to SQLite rows and are kept
//! distinct from the courier-types models so the storage layer stays
//! independent of the wire format.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use courier_types::models::Profile;

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub email_confirmed: bool,
}

#[derive(Debug, Clone)]
pub struct ProfileRow {
    pub id: String,
    pub username: Option<String>,
    pub fcm_token: Option<String>,
    pub updated_at: String,
}

impl ProfileRow {
    pub fn into_model(self) -> Result<Profile> {
        let id: Uuid = self
            .id
            .parse()
            .map_err(|e| anyhow!("Corrupt profile id '{}': {}", self.id, e))?;
        let updated_at = DateTime::parse_from_rfc3339(&self.updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| anyhow!("Corrupt updated_at '{}' on profile '{}': {}", self.updated_at, self.id, e))?;

        Ok(Profile {
            id,
            username: self.username,
            fcm_token: self.fcm_token,
            updated_at,
        })
    }
}
