use crate::Database;
use crate::models::{ProfileRow, UserRow};
use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;

use courier_types::events::RowChangeKind;
use courier_types::models::ProfilePatch;

impl Database {
    // -- Users --

    /// Insert a user. Returns `false` when the email is already taken.
    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        password_hash: &str,
        email_confirmed: bool,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, email, password, email_confirmed) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, email, password_hash, email_confirmed],
            );
            match inserted {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    // -- Refresh tokens --

    pub fn insert_refresh_token(&self, token_hash: &str, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO refresh_tokens (token_hash, user_id) VALUES (?1, ?2)",
                (token_hash, user_id),
            )?;
            Ok(())
        })
    }

    /// Delete a refresh token and return its owner. Each token can be
    /// exchanged exactly once; a second attempt returns `None`.
    pub fn consume_refresh_token(&self, token_hash: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "DELETE FROM refresh_tokens WHERE token_hash = ?1 RETURNING user_id",
                [token_hash],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Delete every outstanding refresh token of a user (sign-out).
    pub fn revoke_refresh_tokens(&self, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM refresh_tokens WHERE user_id = ?1", [user_id])?;
            Ok(n)
        })
    }

    // -- Profiles --

    /// Insert-or-update a profile row touching only the fields the patch
    /// carries. Returns whether the row was created and the row as stored.
    pub fn upsert_profile(&self, patch: &ProfilePatch) -> Result<(RowChangeKind, ProfileRow)> {
        let id = patch.id.to_string();
        let updated_at = patch.updated_at.unwrap_or_else(Utc::now).to_rfc3339();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let existed = tx
                .query_row("SELECT 1 FROM profiles WHERE id = ?1", [&id], |_| Ok(()))
                .optional()?
                .is_some();

            tx.execute(
                "INSERT INTO profiles (id, username, fcm_token, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    username   = COALESCE(excluded.username, profiles.username),
                    fcm_token  = COALESCE(excluded.fcm_token, profiles.fcm_token),
                    updated_at = excluded.updated_at",
                rusqlite::params![&id, &patch.username, &patch.fcm_token, &updated_at],
            )?;

            let row = query_profile(&tx, &id)?
                .ok_or_else(|| anyhow::anyhow!("Profile {} vanished after upsert", id))?;
            tx.commit()?;

            let kind = if existed {
                RowChangeKind::Update
            } else {
                RowChangeKind::Insert
            };
            Ok((kind, row))
        })
    }

    pub fn get_profile(&self, id: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| query_profile(conn, id))
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, email, password, email_confirmed FROM users WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                password: row.get(2)?,
                email_confirmed: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_profile(conn: &Connection, id: &str) -> Result<Option<ProfileRow>> {
    let mut stmt =
        conn.prepare("SELECT id, username, fcm_token, updated_at FROM profiles WHERE id = ?1")?;

    let row = stmt
        .query_row([id], |row| {
            Ok(ProfileRow {
                id: row.get(0)?,
                username: row.get(1)?,
                fcm_token: row.get(2)?,
                updated_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
