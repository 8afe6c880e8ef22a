use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, patch},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use super::common::{
    earnings_overview, earnings_trend, ok, EarningsOverview, PaginatedResponse,
    PaginationParams, PeriodQuery,
};
use crate::{
    auth::AuthUser,
    entities::user,
    errors::ServiceError,
    models::{DeliveryStatus, UserRole},
    services::delivery::{
        AssignmentView, DeliveryDashboard, LocationUpdate, UpdateDeliveryStatusRequest,
    },
    services::earnings::MonthlyEarnings,
    ApiResult, AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct AssignmentFilter {
    pub status: Option<DeliveryStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    pub is_available: bool,
}

pub fn delivery_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/assignments", get(list_assignments))
        .route("/assignments/available", get(available))
        .route("/assignments/:id/accept", patch(accept))
        .route("/assignments/:id/reject", patch(reject))
        .route("/assignments/:id/status", patch(update_status))
        .route("/assignments/:id/location", patch(update_location))
        .route("/availability", patch(set_availability))
        .route("/earnings", get(earnings))
        .route("/earnings/trend", get(trend))
}

fn partner(user: &AuthUser) -> Result<Uuid, ServiceError> {
    user.require_role(&[UserRole::DeliveryPartner])?;
    Ok(user.id())
}

async fn dashboard(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<DeliveryDashboard> {
    partner(&user)?;
    Ok(ok(state.services.delivery.dashboard(&user.user).await?))
}

async fn available(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Vec<AssignmentView>> {
    let partner_id = partner(&user)?;
    Ok(ok(state
        .services
        .delivery
        .available_assignments(partner_id)
        .await?))
}

async fn list_assignments(
    State(state): State<AppState>,
    user: AuthUser,
    Query(filter): Query<AssignmentFilter>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<AssignmentView>> {
    let partner_id = partner(&user)?;
    let page = state
        .services
        .delivery
        .list_assignments(partner_id, filter.status, pagination.to_request(&state.config))
        .await?;
    Ok(ok(page.into()))
}

async fn accept(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<AssignmentView> {
    partner(&user)?;
    Ok(ok(state.services.delivery.accept(&user.user, id).await?))
}

async fn reject(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<RejectRequest>>,
) -> ApiResult<AssignmentView> {
    let partner_id = partner(&user)?;
    let reason = payload.and_then(|Json(body)| body.reason);
    Ok(ok(state
        .services
        .delivery
        .reject(partner_id, id, reason)
        .await?))
}

async fn update_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateDeliveryStatusRequest>,
) -> ApiResult<AssignmentView> {
    let partner_id = partner(&user)?;
    Ok(ok(state
        .services
        .delivery
        .update_status(partner_id, id, payload)
        .await?))
}

async fn update_location(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<LocationUpdate>,
) -> ApiResult<AssignmentView> {
    let partner_id = partner(&user)?;
    Ok(ok(state
        .services
        .delivery
        .update_location(partner_id, id, payload)
        .await?))
}

async fn set_availability(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AvailabilityRequest>,
) -> ApiResult<user::Model> {
    partner(&user)?;
    Ok(ok(state
        .services
        .delivery
        .set_availability(user.user, payload.is_available)
        .await?))
}

async fn earnings(
    State(state): State<AppState>,
    user: AuthUser,
    Query(period): Query<PeriodQuery>,
) -> ApiResult<EarningsOverview> {
    let partner_id = partner(&user)?;
    Ok(ok(
        earnings_overview(&state.services.earnings, partner_id, period).await?,
    ))
}

async fn trend(
    State(state): State<AppState>,
    user: AuthUser,
    Query(period): Query<PeriodQuery>,
) -> ApiResult<Vec<MonthlyEarnings>> {
    let partner_id = partner(&user)?;
    Ok(ok(
        earnings_trend(&state.services.earnings, partner_id, period).await?,
    ))
}
