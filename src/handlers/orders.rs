use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, patch, post},
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::common::{created, ok, PaginatedResponse, PaginationParams};
use crate::{
    auth::AuthUser,
    entities::{delivery_assignment, order},
    models::{OrderStatus, UserRole},
    services::delivery::{AssignmentView, DeliveryFeedbackRequest},
    services::orders::{CreateOrderRequest, OrderDetails, UpdateOrderStatusRequest},
    ApiCreated, ApiResult, AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct CancelOrderRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AssignDeliveryRequest {
    pub partner_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusFilter {
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub id: Uuid,
    pub deleted: bool,
}

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/my-orders", get(my_orders))
        .route("/:id", get(get_order).delete(delete_order))
        .route("/:id/status", patch(update_status))
        .route("/:id/cancel", patch(cancel_order))
        .route("/:id/assign-delivery", patch(assign_delivery))
        .route("/:id/delivery-feedback", post(delivery_feedback))
}

async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateOrderRequest>,
) -> ApiCreated<OrderDetails> {
    user.require_role(&[UserRole::Customer])?;
    Ok(created(state.services.orders.create(&user.user, payload).await?))
}

async fn my_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<OrderDetails>> {
    let page = state
        .services
        .orders
        .my_orders(user.id(), pagination.to_request(&state.config))
        .await?;
    Ok(ok(page.into()))
}

async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderDetails> {
    Ok(ok(state.services.orders.get(&user.user, id).await?))
}

async fn update_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> ApiResult<order::Model> {
    user.require_role(&[UserRole::Admin])?;
    Ok(ok(state.services.orders.update_status(id, payload).await?))
}

async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<CancelOrderRequest>>,
) -> ApiResult<order::Model> {
    let reason = payload.and_then(|Json(body)| body.reason);
    Ok(ok(state.services.orders.cancel(&user.user, id, reason).await?))
}

async fn assign_delivery(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<AssignDeliveryRequest>>,
) -> ApiResult<delivery_assignment::Model> {
    user.require_role(&[UserRole::Admin])?;
    let partner_id = payload.and_then(|Json(body)| body.partner_id);
    Ok(ok(state
        .services
        .orders
        .assign_delivery(id, partner_id)
        .await?))
}

async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(filter): Query<StatusFilter>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<OrderDetails>> {
    user.require_role(&[UserRole::Admin])?;
    let page = state
        .services
        .orders
        .list_all(filter.status, pagination.to_request(&state.config))
        .await?;
    Ok(ok(page.into()))
}

async fn delete_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Deleted> {
    state.services.orders.delete(&user.user, id).await?;
    Ok(ok(Deleted { id, deleted: true }))
}

async fn delivery_feedback(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<DeliveryFeedbackRequest>,
) -> ApiResult<AssignmentView> {
    user.require_role(&[UserRole::Customer])?;
    Ok(ok(state
        .services
        .delivery
        .submit_feedback(user.id(), id, payload)
        .await?))
}
