use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use alumnet_db::payments::PaymentInsert;
use alumnet_payments::signature::{verify_payment_signature, verify_webhook_signature};
use alumnet_payments::webhook;
use alumnet_types::api::{Claims, PaymentVerifyRequest, PaymentVerifyResponse};

use crate::AppState;
use crate::error::ApiError;

pub const WEBHOOK_SIGNATURE_HEADER: &str = "X-Razorpay-Signature";

/// Checkout callback: authenticate the gateway signature, then persist the
/// payment. Replays of the same (orderId, paymentId) are acknowledged
/// without re-recording.
pub async fn verify(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PaymentVerifyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if claims.sub != req.student_id {
        return Err(ApiError::Forbidden(
            "Cannot verify payments for another user".into(),
        ));
    }

    if !verify_payment_signature(
        &req.order_id,
        &req.payment_id,
        &req.signature,
        &state.payment_secret,
    ) {
        warn!(order_id = %req.order_id, "payment signature mismatch");
        return Err(ApiError::Validation("Invalid payment signature".into()));
    }

    if state
        .db
        .get_user_by_id(&req.student_id.to_string())?
        .is_none()
    {
        return Err(ApiError::NotFound(format!(
            "User {} not found",
            req.student_id
        )));
    }

    let outcome = state.db.insert_payment(
        &Uuid::new_v4().to_string(),
        &req.order_id,
        &req.payment_id,
        &req.student_id.to_string(),
        req.alumni_id.map(|id| id.to_string()).as_deref(),
        "subscription",
    )?;

    let already_processed = outcome == PaymentInsert::Duplicate;
    if already_processed {
        info!(order_id = %req.order_id, "replayed payment callback ignored");
    } else {
        info!(order_id = %req.order_id, payment_id = %req.payment_id, "payment verified");
    }

    Ok(Json(PaymentVerifyResponse {
        verified: true,
        already_processed,
        order_id: req.order_id,
        payment_id: req.payment_id,
    }))
}

/// Server-to-server webhook. The header signature over the raw body is the
/// authentication; the event handlers are acknowledged stubs.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let signature = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Validation("Missing webhook signature header".into()))?;

    if !verify_webhook_signature(&body, signature, &state.webhook_secret) {
        warn!("webhook signature mismatch");
        return Err(ApiError::Validation("Invalid webhook signature".into()));
    }

    let event = webhook::dispatch(&body)
        .map_err(|e| ApiError::Validation(format!("Malformed webhook body: {}", e)))?;

    Ok(Json(serde_json::json!({
        "status": "ok",
        "event": format!("{:?}", event),
    })))
}
