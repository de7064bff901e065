use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{MessageType, Role, SubscriptionTier};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the handlers. Canonical
/// definition lives here in alumnet-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub role: Role,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub role: Role,
    pub display_name: String,
    pub college: Option<String>,
    pub graduation_year: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
    pub token: String,
}

// -- Users --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub display_name: String,
    pub college: Option<String>,
    pub graduation_year: Option<i64>,
    pub batch_id: Option<Uuid>,
}

// -- Direct messages --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub message_type: MessageType,
    pub is_read: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Free sends left toward this alumni; null when no gate applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_messages: Option<i64>,
}

/// 429 body rendered by the client as a subscription upsell.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitReachedResponse {
    pub error: String,
    pub message: String,
    pub remaining_messages: i64,
    pub requires_subscription: bool,
    pub alumni_id: Uuid,
    pub alumni_name: String,
}

// -- Subscriptions --

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionInfo {
    pub id: Uuid,
    pub subscription_type: SubscriptionTier,
    pub amount: i64,
    pub start_date: chrono::DateTime<chrono::Utc>,
    pub end_date: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatusResponse {
    pub has_subscription: bool,
    pub message_count: i64,
    pub remaining_messages: i64,
    pub requires_subscription: bool,
    pub subscription: Option<SubscriptionInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateSubscriptionRequest {
    pub student_id: Uuid,
    pub alumni_id: Option<Uuid>,
    pub subscription_type: SubscriptionTier,
    pub payment_id: String,
}

// -- Payments --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PaymentVerifyRequest {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
    pub student_id: Uuid,
    pub alumni_id: Option<Uuid>,
    pub request_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentVerifyResponse {
    pub verified: bool,
    pub already_processed: bool,
    pub order_id: String,
    pub payment_id: String,
}

// -- Batches --

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub id: Uuid,
    pub college: String,
    pub graduation_year: i64,
    pub member_count: i64,
}

// -- Batch chat --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BatchMessageRequest {
    pub content: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EditBatchMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReactionRequest {
    pub emoji: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionGroup {
    pub emoji: String,
    pub count: usize,
    pub user_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMessageResponse {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub content: String,
    pub parent_id: Option<Uuid>,
    pub is_deleted: bool,
    pub edited_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub reactions: Vec<ReactionGroup>,
    pub read_by: Vec<Uuid>,
}

// -- Job postings --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateJobRequest {
    pub title: String,
    pub company: String,
    pub description: String,
    pub apply_link: String,
    pub unlock_price: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub id: Uuid,
    pub alumni_id: Uuid,
    pub title: String,
    pub company: String,
    pub description: String,
    /// Hidden on gated postings until the caller unlocks them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apply_link: Option<String>,
    pub unlock_price: Option<i64>,
    pub unlocked: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UnlockJobRequest {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}
