use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::warn;
use uuid::Uuid;

use alumnet_db::models::UserRow;
use alumnet_types::api::UserProfile;

use crate::AppState;
use crate::error::ApiError;

/// Public profile — credential hash never leaves the db layer. Profiles are
/// near-immutable, so reads go through the 24h TTL cache.
pub async fn get_profile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(profile) = state.profile_cache.get(&id) {
        return Ok(Json(profile));
    }

    let row = state
        .db
        .get_user_by_id(&id.to_string())?
        .ok_or_else(|| ApiError::NotFound(format!("User {} not found", id)))?;

    let profile = profile_from_row(&row);
    state.profile_cache.insert(id, profile.clone());
    Ok(Json(profile))
}

pub fn profile_from_row(row: &UserRow) -> UserProfile {
    UserProfile {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt user id '{}': {}", row.id, e);
            Uuid::default()
        }),
        username: row.username.clone(),
        role: row.role.parse().unwrap_or_else(|e| {
            warn!("Corrupt role on user '{}': {}", row.id, e);
            alumnet_types::models::Role::Student
        }),
        display_name: row.display_name.clone(),
        college: row.college.clone(),
        graduation_year: row.graduation_year,
        batch_id: row.batch_id.as_ref().and_then(|b| b.parse().ok()),
    }
}
