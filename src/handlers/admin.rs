use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, patch, post},
    Router,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::common::{ok, PaginatedResponse, PaginationParams};
use crate::{
    auth::AuthUser,
    entities::{earning, scheduled_job, user},
    models::{JobStatus, UserRole, VerificationStatus},
    services::dashboard::AdminStats,
    services::earnings::MarkPaidRequest,
    services::scheduler::DrainReport,
    ApiResult, AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct RoleFilter {
    pub role: Option<UserRole>,
}

#[derive(Debug, Default, Deserialize)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyUserRequest {
    pub status: VerificationStatus,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

/// Back-office routes. Every handler requires the admin role.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/stats", get(stats))
        .route("/users", get(list_users))
        .route("/users/:id/verify", patch(verify_user))
        .route("/users/:id/active", patch(set_active))
        .route("/jobs", get(list_jobs))
        .route("/jobs/run-due", post(run_due_jobs))
        .route("/earnings/:id/pay", patch(mark_paid))
}

async fn stats(State(state): State<AppState>, user: AuthUser) -> ApiResult<AdminStats> {
    user.require_role(&[UserRole::Admin])?;
    Ok(ok(state.services.dashboard.admin().await?))
}

async fn list_users(
    State(state): State<AppState>,
    user: AuthUser,
    Query(filter): Query<RoleFilter>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<user::Model>> {
    user.require_role(&[UserRole::Admin])?;
    let page = state
        .services
        .users
        .list(filter.role, pagination.to_request(&state.config))
        .await?;
    Ok(ok(page.into()))
}

async fn verify_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<VerifyUserRequest>,
) -> ApiResult<user::Model> {
    user.require_role(&[UserRole::Admin])?;
    Ok(ok(state
        .services
        .users
        .set_verification(id, payload.status)
        .await?))
}

async fn set_active(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetActiveRequest>,
) -> ApiResult<user::Model> {
    user.require_role(&[UserRole::Admin])?;
    Ok(ok(state
        .services
        .users
        .set_active(id, payload.is_active)
        .await?))
}

async fn list_jobs(
    State(state): State<AppState>,
    user: AuthUser,
    Query(filter): Query<JobFilter>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<scheduled_job::Model>> {
    user.require_role(&[UserRole::Admin])?;
    let page = state
        .services
        .jobs
        .list(filter.status, pagination.to_request(&state.config))
        .await?;
    Ok(ok(page.into()))
}

/// Drains due jobs immediately instead of waiting for the next worker tick.
async fn run_due_jobs(State(state): State<AppState>, user: AuthUser) -> ApiResult<DrainReport> {
    user.require_role(&[UserRole::Admin])?;
    let report = state.services.jobs.run_due_jobs().await?;
    info!(admin_id = %user.id(), ?report, "manual job drain");
    Ok(ok(report))
}

async fn mark_paid(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<MarkPaidRequest>,
) -> ApiResult<earning::Model> {
    user.require_role(&[UserRole::Admin])?;
    Ok(ok(state.services.earnings.mark_as_paid(id, payload).await?))
}
