use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use alumnet_db::jobs::NewJob;
use alumnet_db::models::JobRow;
use alumnet_db::payments::PaymentInsert;
use alumnet_payments::signature::verify_payment_signature;
use alumnet_types::api::{Claims, CreateJobRequest, JobResponse, UnlockJobRequest};
use alumnet_types::models::Role;

use crate::AppState;
use crate::error::ApiError;

pub async fn create_job(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateJobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    match claims.role {
        Role::Alumni => {}
        Role::Student | Role::Admin => {
            return Err(ApiError::Forbidden("Only alumni can post jobs".into()));
        }
    }
    if req.title.trim().is_empty() || req.company.trim().is_empty() {
        return Err(ApiError::Validation("Title and company are required".into()));
    }
    if let Some(price) = req.unlock_price {
        if price <= 0 {
            return Err(ApiError::Validation(
                "unlockPrice must be positive when set".into(),
            ));
        }
    }

    let job_id = Uuid::new_v4();
    state.db.insert_job(&NewJob {
        id: &job_id.to_string(),
        alumni_id: &claims.sub.to_string(),
        title: &req.title,
        company: &req.company,
        description: &req.description,
        apply_link: &req.apply_link,
        unlock_price: req.unlock_price,
    })?;

    let row = state
        .db
        .get_job(&job_id.to_string())?
        .ok_or_else(|| anyhow::anyhow!("job row missing after insert"))?;
    // The poster always sees their own link.
    Ok((StatusCode::CREATED, Json(job_response(&row, true))))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state.db.list_jobs()?;
    let unlocked = state.db.unlocked_job_ids(&claims.sub.to_string())?;
    let caller = claims.sub.to_string();

    let jobs: Vec<JobResponse> = rows
        .iter()
        .map(|row| {
            let visible = row.unlock_price.is_none()
                || row.alumni_id == caller
                || unlocked.contains(&row.id);
            job_response(row, visible)
        })
        .collect();
    Ok(Json(jobs))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .db
        .get_job(&job_id.to_string())?
        .ok_or_else(|| ApiError::NotFound(format!("Job {} not found", job_id)))?;

    let visible = row.unlock_price.is_none()
        || row.alumni_id == claims.sub.to_string()
        || state.db.has_unlocked(&row.id, &claims.sub.to_string())?;
    Ok(Json(job_response(&row, visible)))
}

/// Pay-to-unlock: same signature verification and replay handling as the
/// subscription payment path, then an append to the posting's unlock list.
pub async fn unlock_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UnlockJobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .db
        .get_job(&job_id.to_string())?
        .ok_or_else(|| ApiError::NotFound(format!("Job {} not found", job_id)))?;

    if row.unlock_price.is_none() {
        return Err(ApiError::Validation("This posting is not gated".into()));
    }

    let caller = claims.sub.to_string();
    if state.db.has_unlocked(&row.id, &caller)? {
        return Ok(Json(job_response(&row, true)));
    }

    if !verify_payment_signature(
        &req.order_id,
        &req.payment_id,
        &req.signature,
        &state.payment_secret,
    ) {
        warn!(order_id = %req.order_id, job_id = %job_id, "job unlock signature mismatch");
        return Err(ApiError::Validation("Invalid payment signature".into()));
    }

    // A payment backs exactly one unlock. A (orderId, paymentId) pair that
    // was already recorded — for any posting or purpose — is spent.
    let outcome = state.db.insert_payment(
        &Uuid::new_v4().to_string(),
        &req.order_id,
        &req.payment_id,
        &caller,
        Some(&row.alumni_id),
        "job_unlock",
    )?;
    if outcome == PaymentInsert::Duplicate {
        warn!(order_id = %req.order_id, job_id = %job_id, "replayed payment on job unlock");
        return Err(ApiError::Conflict(
            "This payment has already been used".into(),
        ));
    }

    state.db.insert_unlock(
        &Uuid::new_v4().to_string(),
        &row.id,
        &caller,
        &req.payment_id,
    )?;

    info!(job_id = %job_id, user_id = %claims.sub, "job posting unlocked");
    Ok(Json(job_response(&row, true)))
}

fn job_response(row: &JobRow, link_visible: bool) -> JobResponse {
    JobResponse {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt job id '{}': {}", row.id, e);
            Uuid::default()
        }),
        alumni_id: row.alumni_id.parse().unwrap_or_else(|e| {
            warn!("Corrupt alumni_id on job '{}': {}", row.id, e);
            Uuid::default()
        }),
        title: row.title.clone(),
        company: row.company.clone(),
        description: row.description.clone(),
        apply_link: link_visible.then(|| row.apply_link.clone()),
        unlock_price: row.unlock_price,
        unlocked: link_visible,
        created_at: alumnet_db::parse_ts(&row.created_at),
    }
}
