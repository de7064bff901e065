use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::warn;
use uuid::Uuid;

use alumnet_db::models::SubscriptionRow;
use alumnet_db::subscriptions::{
    ActivationOutcome, MONTHLY_AMOUNT, QUARTERLY_AMOUNT,
};
use alumnet_types::api::{
    Claims, CreateSubscriptionRequest, SubscriptionInfo, SubscriptionStatusResponse,
};
use alumnet_types::models::{Role, SubscriptionTier};

use crate::AppState;
use crate::error::ApiError;

/// Gate status for the upsell screen: counter, remaining free sends, and
/// the active subscription if any. Subscription state is derived live from
/// both subscription tables, with the cached flag as a third source.
pub async fn status(
    State(state): State<AppState>,
    Path((student_id, alumni_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    if claims.sub != student_id && claims.role != Role::Admin {
        return Err(ApiError::Forbidden("Not your subscription status".into()));
    }

    let gate = state.db.gate_status(
        &student_id.to_string(),
        &alumni_id.to_string(),
        chrono::Utc::now(),
    )?;

    let has_subscription = gate.subscribed();
    let remaining = gate.remaining();
    let subscription = gate
        .monthly
        .as_ref()
        .map(|row| info_from_row(row, SubscriptionTier::Monthly))
        .or_else(|| {
            gate.quarterly
                .as_ref()
                .map(|row| info_from_row(row, SubscriptionTier::Quarterly))
        });

    Ok(Json(SubscriptionStatusResponse {
        has_subscription,
        message_count: gate.message_count,
        remaining_messages: remaining,
        requires_subscription: !has_subscription && remaining == 0,
        subscription,
    }))
}

/// Activate a subscription backed by an already-verified payment.
pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateSubscriptionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if claims.sub != req.student_id && claims.role != Role::Admin {
        return Err(ApiError::Forbidden(
            "Cannot create subscriptions for another user".into(),
        ));
    }

    let student = state
        .db
        .get_user_by_id(&req.student_id.to_string())?
        .ok_or_else(|| ApiError::NotFound(format!("User {} not found", req.student_id)))?;
    if student.role != Role::Student.as_str() {
        return Err(ApiError::Validation(
            "Subscriptions are for student accounts".into(),
        ));
    }

    // Verify-then-activate: the payment must have cleared signature
    // verification first, for this student and this purpose.
    if !state
        .db
        .payment_verified(&req.payment_id, &req.student_id.to_string(), "subscription")?
    {
        return Err(ApiError::Validation(format!(
            "Payment {} has not been verified",
            req.payment_id
        )));
    }

    let sub_id = Uuid::new_v4();
    let now = chrono::Utc::now();

    let (outcome, amount) = match req.subscription_type {
        SubscriptionTier::Monthly => {
            let alumni_id = req.alumni_id.ok_or_else(|| {
                ApiError::Validation("alumniId is required for a monthly subscription".into())
            })?;
            if state.db.get_user_by_id(&alumni_id.to_string())?.is_none() {
                return Err(ApiError::NotFound(format!("User {} not found", alumni_id)));
            }

            let outcome = state.db.activate_monthly(
                &sub_id.to_string(),
                &req.student_id.to_string(),
                &alumni_id.to_string(),
                &req.payment_id,
                now,
            )?;
            (outcome, MONTHLY_AMOUNT)
        }
        SubscriptionTier::Quarterly => {
            let outcome = state.db.activate_quarterly(
                &sub_id.to_string(),
                &req.student_id.to_string(),
                &req.payment_id,
                now,
            )?;
            (outcome, QUARTERLY_AMOUNT)
        }
    };

    match outcome {
        ActivationOutcome::AlreadyActive => Err(ApiError::Conflict(
            "An active subscription for this scope already exists".into(),
        )),
        ActivationOutcome::Activated => {
            let months = match req.subscription_type {
                SubscriptionTier::Monthly => 1,
                SubscriptionTier::Quarterly => 3,
            };
            Ok((
                StatusCode::CREATED,
                Json(SubscriptionInfo {
                    id: sub_id,
                    subscription_type: req.subscription_type,
                    amount,
                    start_date: now,
                    end_date: now + chrono::Months::new(months),
                }),
            ))
        }
    }
}

fn info_from_row(row: &SubscriptionRow, tier: SubscriptionTier) -> SubscriptionInfo {
    SubscriptionInfo {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt subscription id '{}': {}", row.id, e);
            Uuid::default()
        }),
        subscription_type: tier,
        amount: row.amount,
        start_date: alumnet_db::parse_ts(&row.start_date),
        end_date: alumnet_db::parse_ts(&row.end_date),
    }
}
