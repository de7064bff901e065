pub mod auth;
pub mod batch_chat;
pub mod batches;
pub mod cache;
pub mod error;
pub mod jobs;
pub mod messages;
pub mod middleware;
pub mod payments;
pub mod subscriptions;
pub mod users;

use std::sync::Arc;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post, put},
};
use uuid::Uuid;

use alumnet_db::Database;
use alumnet_types::api::UserProfile;

use crate::cache::TtlCache;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub payment_secret: String,
    pub webhook_secret: String,
    pub profile_cache: TtlCache<Uuid, UserProfile>,
}

pub type AppState = Arc<AppStateInner>;

/// Full application router. Public routes: auth and the gateway webhook
/// (its signature is the authentication); everything else requires a
/// bearer token.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route(
            "/api/subscriptions/razorpay/callback",
            post(payments::webhook),
        )
        .with_state(state.clone());

    let protected = Router::new()
        .route("/api/users/{id}", get(users::get_profile))
        .route(
            "/api/messages/{sender_id}/{receiver_id}",
            get(messages::get_conversation).post(messages::send_message),
        )
        .route(
            "/api/messages/{sender_id}/{receiver_id}/read",
            post(messages::mark_read),
        )
        .route(
            "/api/subscriptions/status/{student_id}/{alumni_id}",
            get(subscriptions::status),
        )
        .route("/api/subscriptions/create", post(subscriptions::create))
        .route("/api/payment/verify", post(payments::verify))
        .route("/api/batches/{batch_id}", get(batches::get_batch))
        .route("/api/batches/{batch_id}/members", get(batches::get_members))
        .route(
            "/api/batches/{batch_id}/messages",
            get(batch_chat::get_messages).post(batch_chat::send_message),
        )
        .route(
            "/api/batches/{batch_id}/messages/{message_id}",
            put(batch_chat::edit_message).delete(batch_chat::delete_message),
        )
        .route(
            "/api/batches/{batch_id}/messages/{message_id}/reactions",
            post(batch_chat::set_reaction),
        )
        .route(
            "/api/batches/{batch_id}/messages/{message_id}/read",
            post(batch_chat::mark_read),
        )
        .route("/api/jobs", get(jobs::list_jobs).post(jobs::create_job))
        .route("/api/jobs/{job_id}", get(jobs::get_job))
        .route("/api/jobs/{job_id}/unlock", post(jobs::unlock_job))
        .layer(from_fn_with_state(state.clone(), middleware::require_auth))
        .with_state(state);

    Router::new().merge(public).merge(protected)
}
