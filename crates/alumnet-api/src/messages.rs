use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

use alumnet_db::gate::{FREE_MESSAGE_LIMIT, GateOutcome, GatedSend};
use alumnet_db::models::MessageRow;
use alumnet_types::api::{Claims, LimitReachedResponse, MessageResponse, SendMessageRequest};
use alumnet_types::models::Role;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor pagination — pass the `created_at` of the oldest message from
    /// the previous page to fetch older ones.
    pub before: Option<String>,
}

fn default_limit() -> u32 {
    50
}

/// Direct send. Only the student -> alumni direction is gated; everything
/// else goes straight through.
pub async fn send_message(
    State(state): State<AppState>,
    Path((sender_id, receiver_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Response, ApiError> {
    if claims.sub != sender_id {
        return Err(ApiError::Forbidden(
            "Cannot send messages as another user".into(),
        ));
    }
    if req.content.trim().is_empty() {
        return Err(ApiError::Validation("Message content is required".into()));
    }

    let receiver = state
        .db
        .get_user_by_id(&receiver_id.to_string())?
        .ok_or_else(|| ApiError::NotFound(format!("User {} not found", receiver_id)))?;
    let receiver_role: Role = receiver
        .role
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt role on user '{}': {}", receiver.id, e))?;

    let message_id = Uuid::new_v4();
    let now = chrono::Utc::now();

    let gated = matches!(
        (claims.role, receiver_role),
        (Role::Student, Role::Alumni)
    );

    if !gated {
        state.db.insert_message(
            &message_id.to_string(),
            &sender_id.to_string(),
            &receiver_id.to_string(),
            &req.content,
            req.message_type.as_str(),
        )?;

        return Ok(created_response(
            message_id, sender_id, receiver_id, &req, now, None,
        ));
    }

    // Gate check, insert, and counter increment share one transaction.
    // Run the blocking DB work off the async runtime.
    let db = state.clone();
    let content = req.content.clone();
    let message_type = req.message_type;
    let outcome = tokio::task::spawn_blocking(move || {
        db.db.gated_send(
            &GatedSend {
                message_id: &message_id.to_string(),
                student_id: &sender_id.to_string(),
                alumni_id: &receiver_id.to_string(),
                content: &content,
                message_type: message_type.as_str(),
            },
            now,
        )
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        anyhow::anyhow!("task join error")
    })??;

    match outcome {
        GateOutcome::Sent { remaining } => Ok(created_response(
            message_id, sender_id, receiver_id, &req, now, remaining,
        )),
        GateOutcome::LimitReached => Ok((
            StatusCode::TOO_MANY_REQUESTS,
            Json(LimitReachedResponse {
                error: "message_limit_reached".into(),
                message: format!(
                    "You have used all {} free messages to {}. Subscribe to continue the conversation.",
                    FREE_MESSAGE_LIMIT, receiver.display_name
                ),
                remaining_messages: 0,
                requires_subscription: true,
                alumni_id: receiver_id,
                alumni_name: receiver.display_name,
            }),
        )
            .into_response()),
    }
}

fn created_response(
    id: Uuid,
    sender_id: Uuid,
    receiver_id: Uuid,
    req: &SendMessageRequest,
    now: chrono::DateTime<chrono::Utc>,
    remaining: Option<i64>,
) -> Response {
    (
        StatusCode::CREATED,
        Json(MessageResponse {
            id,
            sender_id,
            receiver_id,
            content: req.content.clone(),
            message_type: req.message_type,
            is_read: false,
            created_at: now,
            remaining_messages: remaining,
        }),
    )
        .into_response()
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Path((user_a, user_b)): Path<(Uuid, Uuid)>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    if claims.sub != user_a && claims.sub != user_b {
        return Err(ApiError::Forbidden(
            "Not a participant in this conversation".into(),
        ));
    }

    let db = state.clone();
    let limit = query.limit.min(200);
    let before = query.before;
    let rows = tokio::task::spawn_blocking(move || {
        db.db
            .get_conversation(&user_a.to_string(), &user_b.to_string(), limit, before.as_deref())
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        anyhow::anyhow!("task join error")
    })??;

    let messages: Vec<MessageResponse> = rows.iter().map(message_from_row).collect();
    Ok(Json(messages))
}

/// Mark everything the counterpart sent to the caller as read.
pub async fn mark_read(
    State(state): State<AppState>,
    Path((user_a, user_b)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    if claims.sub != user_a {
        return Err(ApiError::Forbidden(
            "Can only mark your own conversation read".into(),
        ));
    }

    let updated = state
        .db
        .mark_conversation_read(&user_a.to_string(), &user_b.to_string())?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}

fn message_from_row(row: &MessageRow) -> MessageResponse {
    MessageResponse {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt message id '{}': {}", row.id, e);
            Uuid::default()
        }),
        sender_id: row.sender_id.parse().unwrap_or_else(|e| {
            warn!("Corrupt sender_id on message '{}': {}", row.id, e);
            Uuid::default()
        }),
        receiver_id: row.receiver_id.parse().unwrap_or_else(|e| {
            warn!("Corrupt receiver_id on message '{}': {}", row.id, e);
            Uuid::default()
        }),
        content: row.content.clone(),
        message_type: row.message_type.parse().unwrap_or_else(|e| {
            warn!("Corrupt message_type on message '{}': {}", row.id, e);
            alumnet_types::models::MessageType::Text
        }),
        is_read: row.is_read,
        created_at: alumnet_db::parse_ts(&row.created_at),
        remaining_messages: None,
    }
}
