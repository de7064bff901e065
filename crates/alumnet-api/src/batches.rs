use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::warn;
use uuid::Uuid;

use alumnet_types::api::{BatchResponse, UserProfile};

use crate::AppState;
use crate::error::ApiError;
use crate::users::profile_from_row;

pub async fn get_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .db
        .get_batch(&batch_id.to_string())?
        .ok_or_else(|| ApiError::NotFound(format!("Batch {} not found", batch_id)))?;
    let member_count = state.db.batch_member_count(&row.id)?;

    Ok(Json(BatchResponse {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt batch id '{}': {}", row.id, e);
            Uuid::default()
        }),
        college: row.college,
        graduation_year: row.graduation_year,
        member_count,
    }))
}

pub async fn get_members(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    if state.db.get_batch(&batch_id.to_string())?.is_none() {
        return Err(ApiError::NotFound(format!("Batch {} not found", batch_id)));
    }

    let members: Vec<UserProfile> = state
        .db
        .get_batch_members(&batch_id.to_string())?
        .iter()
        .map(profile_from_row)
        .collect();
    Ok(Json(members))
}
