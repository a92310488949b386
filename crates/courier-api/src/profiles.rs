use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::debug;
use uuid::Uuid;

use courier_types::api::Claims;
use courier_types::events::RowChange;
use courier_types::models::{Profile, ProfilePatch};

use crate::auth::AppState;
use crate::error::{ApiError, blocking};

/// Row-level write policy: a user may only write their own profile.
fn check_owner(claims: &Claims, id: Uuid) -> Result<(), ApiError> {
    if claims.sub != id {
        return Err(ApiError::Forbidden(
            "new row violates row-level security policy for table \"profiles\"".into(),
        ));
    }
    Ok(())
}

/// `POST /rest/v1/profiles` — field-scoped upsert keyed by `id`.
pub async fn upsert_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(patch): Json<ProfilePatch>,
) -> Result<Json<Profile>, ApiError> {
    check_owner(&claims, patch.id)?;

    if patch.is_empty() {
        return Err(ApiError::BadRequest("No profile fields to update".into()));
    }
    if let Some(username) = &patch.username {
        if username.trim().is_empty() {
            return Err(ApiError::BadRequest("username must not be empty".into()));
        }
    }

    let db = state.db.clone();
    let (kind, profile) = blocking(move || {
        let (kind, row) = db.upsert_profile(&patch)?;
        Ok((kind, row.into_model()?))
    })
    .await?;

    debug!(profile_id = %profile.id, ?kind, "Profile upserted");

    // Fire-and-forget: the response never waits on the trigger.
    state.trigger.fire(RowChange::profile(kind, profile.clone()));

    Ok(Json(profile))
}

/// `GET /rest/v1/profiles/{id}`
pub async fn get_profile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Profile>, ApiError> {
    let not_found = || ApiError::NotFound("Profile not found".into());
    // Other users' rows are filtered out of reads, not refused.
    if claims.sub != id {
        return Err(not_found());
    }

    let db = state.db.clone();
    let profile = blocking(move || {
        db.get_profile(&id.to_string())?
            .map(|row| row.into_model())
            .transpose()
    })
    .await?
    .ok_or_else(not_found)?;

    Ok(Json(profile))
}
