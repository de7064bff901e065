use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, warn};
use uuid::Uuid;

use alumnet_db::chat::{ChatInsert, ChatMutation, ReactionChange};
use alumnet_db::models::BatchMessageRow;
use alumnet_types::api::{
    BatchMessageRequest, BatchMessageResponse, Claims, EditBatchMessageRequest, ReactionGroup,
    ReactionRequest,
};

use crate::AppState;
use crate::error::ApiError;
use crate::messages::MessageQuery;

/// Batch chat is member-only; no message-count gate applies here.
fn require_member(state: &AppState, batch_id: Uuid, user_id: Uuid) -> Result<(), ApiError> {
    if state.db.get_batch(&batch_id.to_string())?.is_none() {
        return Err(ApiError::NotFound(format!("Batch {} not found", batch_id)));
    }
    if !state
        .db
        .is_batch_member(&batch_id.to_string(), &user_id.to_string())?
    {
        return Err(ApiError::Forbidden("Not a member of this batch".into()));
    }
    Ok(())
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<BatchMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_member(&state, batch_id, claims.sub)?;
    if req.content.trim().is_empty() {
        return Err(ApiError::Validation("Message content is required".into()));
    }

    let message_id = Uuid::new_v4();
    let inserted = state.db.insert_batch_message(
        &message_id.to_string(),
        &batch_id.to_string(),
        &claims.sub.to_string(),
        &req.content,
        req.parent_id.map(|p| p.to_string()).as_deref(),
    )?;

    if inserted == ChatInsert::ParentNotFound {
        return Err(ApiError::NotFound(
            "Parent message not found in this batch".into(),
        ));
    }

    let sender_name = state.db.get_display_name(&claims.sub.to_string())?;
    Ok((
        StatusCode::CREATED,
        Json(BatchMessageResponse {
            id: message_id,
            batch_id,
            sender_id: claims.sub,
            sender_name,
            content: req.content,
            parent_id: req.parent_id,
            is_deleted: false,
            edited_at: None,
            created_at: chrono::Utc::now(),
            reactions: vec![],
            read_by: vec![],
        }),
    ))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    require_member(&state, batch_id, claims.sub)?;

    // Run all blocking DB queries off the async runtime.
    let db = state.clone();
    let bid = batch_id.to_string();
    let limit = query.limit.min(200);
    let before = query.before;

    let (rows, reaction_rows, read_rows) = tokio::task::spawn_blocking(move || {
        let rows = db.db.get_batch_messages(&bid, limit, before.as_deref())?;
        let message_ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let reaction_rows = db.db.get_reactions_for_messages(&message_ids)?;
        let read_rows = db.db.get_reads_for_messages(&message_ids)?;
        Ok::<_, anyhow::Error>((rows, reaction_rows, read_rows))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        anyhow::anyhow!("task join error")
    })??;

    // Group reactions by message_id -> emoji -> user_ids (cheap in-memory
    // work, fine on the async thread).
    let mut reaction_map: HashMap<String, HashMap<String, Vec<Uuid>>> = HashMap::new();
    for r in &reaction_rows {
        let emoji_map = reaction_map.entry(r.message_id.clone()).or_default();
        let user_ids = emoji_map.entry(r.emoji.clone()).or_default();
        if let Ok(uid) = r.user_id.parse::<Uuid>() {
            user_ids.push(uid);
        }
    }

    let mut read_map: HashMap<String, Vec<Uuid>> = HashMap::new();
    for r in &read_rows {
        if let Ok(uid) = r.user_id.parse::<Uuid>() {
            read_map.entry(r.message_id.clone()).or_default().push(uid);
        }
    }

    let messages: Vec<BatchMessageResponse> = rows
        .into_iter()
        .map(|row| {
            let reactions = reaction_map
                .get(&row.id)
                .map(|emoji_map| {
                    emoji_map
                        .iter()
                        .map(|(emoji, user_ids)| ReactionGroup {
                            emoji: emoji.clone(),
                            count: user_ids.len(),
                            user_ids: user_ids.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default();
            let read_by = read_map.get(&row.id).cloned().unwrap_or_default();

            response_from_row(&row, reactions, read_by)
        })
        .collect();

    Ok(Json(messages))
}

pub async fn edit_message(
    State(state): State<AppState>,
    Path((batch_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<EditBatchMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_member(&state, batch_id, claims.sub)?;
    if req.content.trim().is_empty() {
        return Err(ApiError::Validation("Message content is required".into()));
    }

    let outcome = state.db.edit_batch_message(
        &message_id.to_string(),
        &claims.sub.to_string(),
        &req.content,
    )?;
    check_mutation(outcome)?;

    let row = state
        .db
        .get_batch_message(&message_id.to_string())?
        .ok_or_else(|| ApiError::NotFound("Message not found".into()))?;
    Ok(Json(response_from_row(&row, vec![], vec![])))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path((batch_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    require_member(&state, batch_id, claims.sub)?;

    let outcome = state
        .db
        .delete_batch_message(&message_id.to_string(), &claims.sub.to_string())?;
    check_mutation(outcome)?;

    Ok(Json(serde_json::json!({ "deleted": true })))
}

pub async fn set_reaction(
    State(state): State<AppState>,
    Path((batch_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ReactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_member(&state, batch_id, claims.sub)?;
    require_message_in_batch(&state, batch_id, message_id)?;
    if req.emoji.is_empty() {
        return Err(ApiError::Validation("Emoji is required".into()));
    }

    let change = state.db.set_reaction(
        &Uuid::new_v4().to_string(),
        &message_id.to_string(),
        &claims.sub.to_string(),
        &req.emoji,
    )?;

    let change = match change {
        ReactionChange::Added => "added",
        ReactionChange::Replaced => "replaced",
        ReactionChange::Removed => "removed",
    };
    Ok(Json(serde_json::json!({ "reaction": change })))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path((batch_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    require_member(&state, batch_id, claims.sub)?;
    require_message_in_batch(&state, batch_id, message_id)?;

    state
        .db
        .mark_batch_message_read(&message_id.to_string(), &claims.sub.to_string())?;
    Ok(Json(serde_json::json!({ "read": true })))
}

fn require_message_in_batch(
    state: &AppState,
    batch_id: Uuid,
    message_id: Uuid,
) -> Result<(), ApiError> {
    match state.db.get_batch_message(&message_id.to_string())? {
        Some(row) if row.batch_id == batch_id.to_string() => Ok(()),
        _ => Err(ApiError::NotFound("Message not found in this batch".into())),
    }
}

fn check_mutation(outcome: ChatMutation) -> Result<(), ApiError> {
    match outcome {
        ChatMutation::Applied => Ok(()),
        ChatMutation::NotFound => Err(ApiError::NotFound("Message not found".into())),
        ChatMutation::NotAuthor => {
            Err(ApiError::Forbidden("Only the author can modify a message".into()))
        }
        ChatMutation::Deleted => Err(ApiError::Gone("Message was deleted".into())),
    }
}

fn response_from_row(
    row: &BatchMessageRow,
    reactions: Vec<ReactionGroup>,
    read_by: Vec<Uuid>,
) -> BatchMessageResponse {
    BatchMessageResponse {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt batch message id '{}': {}", row.id, e);
            Uuid::default()
        }),
        batch_id: row.batch_id.parse().unwrap_or_else(|e| {
            warn!("Corrupt batch_id on message '{}': {}", row.id, e);
            Uuid::default()
        }),
        sender_id: row.sender_id.parse().unwrap_or_else(|e| {
            warn!("Corrupt sender_id on message '{}': {}", row.id, e);
            Uuid::default()
        }),
        sender_name: row.sender_name.clone(),
        content: row.content.clone(),
        parent_id: row.parent_id.as_ref().and_then(|p| p.parse().ok()),
        is_deleted: row.is_deleted,
        edited_at: row.edited_at.as_deref().map(alumnet_db::parse_ts),
        created_at: alumnet_db::parse_ts(&row.created_at),
        reactions,
        read_by,
    }
}
