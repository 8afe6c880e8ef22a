use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use super::common::{
    created, earnings_overview, earnings_trend, ok, EarningsOverview, PaginatedResponse,
    PaginationParams, PeriodQuery,
};
use super::orders::StatusFilter;
use crate::{
    auth::AuthUser,
    entities::order,
    models::UserRole,
    services::dashboard::VendorDashboard,
    services::earnings::MonthlyEarnings,
    services::inventory::{CreateInventoryRequest, InventoryView, UpdateInventoryRequest},
    services::orders::OrderDetails,
    services::workflow::VendorAction,
    ApiCreated, ApiResult, AppState,
};

#[derive(Debug, Deserialize)]
pub struct VendorResponseRequest {
    pub action: VendorAction,
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InventoryQuery {
    #[serde(default)]
    pub low_stock: bool,
}

/// Every route here is restricted to vendor accounts.
pub fn vendor_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/inventory", get(list_inventory).post(create_inventory))
        .route("/inventory/low-stock", get(low_stock))
        .route(
            "/inventory/:id",
            get(get_inventory)
                .put(update_inventory)
                .delete(delete_inventory),
        )
        .route("/orders", get(vendor_orders))
        .route("/orders/:id/respond", post(respond))
        .route("/earnings", get(earnings))
        .route("/earnings/trend", get(trend))
}

fn vendor(user: &AuthUser) -> Result<Uuid, crate::errors::ServiceError> {
    user.require_role(&[UserRole::Vendor])?;
    Ok(user.id())
}

async fn dashboard(State(state): State<AppState>, user: AuthUser) -> ApiResult<VendorDashboard> {
    let vendor_id = vendor(&user)?;
    Ok(ok(state.services.dashboard.vendor(vendor_id).await?))
}

async fn list_inventory(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<InventoryQuery>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<InventoryView>> {
    let vendor_id = vendor(&user)?;
    let page = state
        .services
        .inventory
        .list(
            vendor_id,
            query.low_stock,
            pagination.to_request(&state.config),
        )
        .await?;
    Ok(ok(page.into()))
}

async fn create_inventory(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateInventoryRequest>,
) -> ApiCreated<InventoryView> {
    let vendor_id = vendor(&user)?;
    Ok(created(
        state.services.inventory.create(vendor_id, payload).await?,
    ))
}

async fn low_stock(State(state): State<AppState>, user: AuthUser) -> ApiResult<Vec<InventoryView>> {
    let vendor_id = vendor(&user)?;
    Ok(ok(state.services.inventory.low_stock_report(vendor_id).await?))
}

async fn get_inventory(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<InventoryView> {
    let vendor_id = vendor(&user)?;
    Ok(ok(state.services.inventory.get(vendor_id, id).await?))
}

async fn update_inventory(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateInventoryRequest>,
) -> ApiResult<InventoryView> {
    let vendor_id = vendor(&user)?;
    Ok(ok(state
        .services
        .inventory
        .update(vendor_id, id, payload)
        .await?))
}

async fn delete_inventory(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Uuid> {
    let vendor_id = vendor(&user)?;
    state.services.inventory.delete(vendor_id, id).await?;
    Ok(ok(id))
}

async fn vendor_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(filter): Query<StatusFilter>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<OrderDetails>> {
    let vendor_id = vendor(&user)?;
    let page = state
        .services
        .orders
        .vendor_orders(vendor_id, filter.status, pagination.to_request(&state.config))
        .await?;
    Ok(ok(page.into()))
}

async fn respond(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<VendorResponseRequest>,
) -> ApiResult<order::Model> {
    let vendor_id = vendor(&user)?;
    Ok(ok(state
        .services
        .workflow
        .handle_vendor_response(id, vendor_id, payload.action, payload.reason)
        .await?))
}

async fn earnings(
    State(state): State<AppState>,
    user: AuthUser,
    Query(period): Query<PeriodQuery>,
) -> ApiResult<EarningsOverview> {
    let vendor_id = vendor(&user)?;
    Ok(ok(
        earnings_overview(&state.services.earnings, vendor_id, period).await?,
    ))
}

async fn trend(
    State(state): State<AppState>,
    user: AuthUser,
    Query(period): Query<PeriodQuery>,
) -> ApiResult<Vec<MonthlyEarnings>> {
    let vendor_id = vendor(&user)?;
    Ok(ok(
        earnings_trend(&state.services.earnings, vendor_id, period).await?,
    ))
}
