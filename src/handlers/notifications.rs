use axum::{
    extract::{Path, Query, State},
    routing::{get, patch},
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::common::{ok, PaginatedResponse, PaginationParams};
use crate::{auth::AuthUser, entities::notification, ApiResult, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct InboxFilter {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub updated: u64,
}

pub fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/unread-count", get(unread_count))
        .route("/read-all", patch(mark_all_read))
        .route("/:id/read", patch(mark_read))
}

async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    Query(filter): Query<InboxFilter>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<notification::Model>> {
    let page = state
        .services
        .notifications
        .list(
            user.id(),
            user.is_admin(),
            filter.unread_only,
            pagination.to_request(&state.config),
        )
        .await?;
    Ok(ok(page.into()))
}

async fn unread_count(State(state): State<AppState>, user: AuthUser) -> ApiResult<UnreadCount> {
    let count = state
        .services
        .notifications
        .unread_count(user.id(), user.is_admin())
        .await?;
    Ok(ok(UnreadCount { count }))
}

async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<notification::Model> {
    Ok(ok(state
        .services
        .notifications
        .mark_read(id, user.id(), user.is_admin())
        .await?))
}

async fn mark_all_read(State(state): State<AppState>, user: AuthUser) -> ApiResult<MarkedRead> {
    let updated = state
        .services
        .notifications
        .mark_all_read(user.id(), user.is_admin())
        .await?;
    Ok(ok(MarkedRead { updated }))
}
