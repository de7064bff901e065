//! Database row types mapping directly to SQLite rows. Distinct from the
//! alumnet-types API models to keep the DB layer independent of the wire
//! shapes.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub role: String,
    pub display_name: String,
    pub college: Option<String>,
    pub graduation_year: Option<i64>,
    pub batch_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct BatchRow {
    pub id: String,
    pub college: String,
    pub graduation_year: i64,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub message_type: String,
    pub is_read: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct PairLimitRow {
    pub id: String,
    pub student_id: String,
    pub alumni_id: String,
    pub message_count: i64,
    pub is_subscribed: bool,
}

/// Monthly rows carry `alumni_id = Some(..)`; quarterly rows carry `None`.
#[derive(Debug, Clone)]
pub struct SubscriptionRow {
    pub id: String,
    pub student_id: String,
    pub alumni_id: Option<String>,
    pub amount: i64,
    pub platform_fee: i64,
    pub alumni_share: i64,
    pub start_date: String,
    pub end_date: String,
    pub payment_id: String,
}

#[derive(Debug, Clone)]
pub struct PaymentRow {
    pub id: String,
    pub order_id: String,
    pub payment_id: String,
    pub student_id: String,
    pub alumni_id: Option<String>,
    pub purpose: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct BatchMessageRow {
    pub id: String,
    pub batch_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    pub parent_id: Option<String>,
    pub is_deleted: bool,
    pub edited_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct ReactionRow {
    pub message_id: String,
    pub user_id: String,
    pub emoji: String,
}

#[derive(Debug, Clone)]
pub struct ReadReceiptRow {
    pub message_id: String,
    pub user_id: String,
    pub read_at: String,
}

#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub alumni_id: String,
    pub title: String,
    pub company: String,
    pub description: String,
    pub apply_link: String,
    pub unlock_price: Option<i64>,
    pub created_at: String,
}
