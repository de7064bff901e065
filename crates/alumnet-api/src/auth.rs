use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use uuid::Uuid;

use alumnet_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use alumnet_types::models::Role;

use alumnet_db::queries::NewUser;

use crate::AppState;
use crate::error::ApiError;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(ApiError::Validation(
            "Username must be 3-32 characters".into(),
        ));
    }
    if req.password.len() < 8 {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters".into(),
        ));
    }
    if req.display_name.trim().is_empty() {
        return Err(ApiError::Validation("Display name is required".into()));
    }

    if state.db.get_user_by_username(&req.username)?.is_some() {
        return Err(ApiError::Conflict("Username already taken".into()));
    }

    // A (college, graduation year) pair pins the user to a batch, creating
    // it on first sight.
    let batch_id = match (&req.college, req.graduation_year) {
        (Some(college), Some(year)) => Some(state.db.ensure_batch(
            &Uuid::new_v4().to_string(),
            college,
            year,
        )?),
        _ => None,
    };

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();

    let user_id = Uuid::new_v4();

    state.db.create_user(&NewUser {
        id: &user_id.to_string(),
        username: &req.username,
        password_hash: &password_hash,
        role: req.role.as_str(),
        display_name: &req.display_name,
        college: req.college.as_deref(),
        graduation_year: req.graduation_year,
        batch_id: batch_id.as_deref(),
    })?;

    let token = create_token(&state.jwt_secret, user_id, &req.username, req.role)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { user_id, token }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .get_user_by_username(&req.username)?
        .ok_or(ApiError::Unauthorized)?;

    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("stored hash unparsable: {}", e))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt user id '{}': {}", user.id, e))?;
    let role: Role = user
        .role
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt role on user '{}': {}", user.id, e))?;

    let token = create_token(&state.jwt_secret, user_id, &user.username, role)?;

    Ok(Json(LoginResponse {
        user_id,
        username: user.username,
        role,
        token,
    }))
}

fn create_token(secret: &str, user_id: Uuid, username: &str, role: Role) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        role,
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
