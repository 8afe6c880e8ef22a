use axum::{
    extract::{Json, State},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tracing::info;

use super::common::{created, ok};
use crate::{
    auth::AuthUser,
    entities::user,
    services::users::{AuthResponse, LoginRequest, RegisterRequest, UpdateProfileRequest},
    ApiCreated, ApiResult, AppState,
};

#[derive(Debug, Serialize)]
pub struct TokenCheck {
    pub valid: bool,
    pub user: user::Model,
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me).put(update_me))
        .route("/verify-token", post(verify_token))
}

async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiCreated<AuthResponse> {
    let registered = state.services.users.register(payload).await?;
    info!(user_id = %registered.user.id, "account created");
    Ok(created(registered))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<AuthResponse> {
    Ok(ok(state.services.users.login(payload).await?))
}

async fn me(user: AuthUser) -> ApiResult<user::Model> {
    Ok(ok(user.user))
}

async fn update_me(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> ApiResult<user::Model> {
    Ok(ok(state.services.users.update_profile(user.user, payload).await?))
}

/// The extractor already rejected bad tokens; reaching here means valid.
async fn verify_token(user: AuthUser) -> ApiResult<TokenCheck> {
    Ok(ok(TokenCheck {
        valid: true,
        user: user.user,
    }))
}
