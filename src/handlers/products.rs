use axum::{
    extract::{Json, Path, Query, State},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::common::{created, ok, PaginationMeta, PaginationParams};
use crate::{
    auth::AuthUser,
    entities::product,
    errors::ServiceError,
    models::{ProductCategory, UserRole},
    services::products::{
        CategoryStats, CreateProductRequest, ProductFilters, UpdateProductRequest,
    },
    services::Page,
    ApiCreated, ApiResult, AppState,
};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct CatalogPagination {
    pub current_page: u64,
    pub total_pages: u64,
    pub total_products: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

#[derive(Debug, Serialize)]
pub struct ProductList {
    pub products: Vec<product::Model>,
    pub pagination: CatalogPagination,
}

impl From<Page<product::Model>> for ProductList {
    fn from(page: Page<product::Model>) -> Self {
        let meta = PaginationMeta::of(&page);
        Self {
            products: page.items,
            pagination: CatalogPagination {
                current_page: meta.current_page,
                total_pages: meta.total_pages,
                total_products: meta.total,
                has_next: meta.has_next,
                has_prev: meta.has_prev,
            },
        }
    }
}

pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/search", get(search_products))
        .route("/categories/all", get(category_stats))
        .route("/category/:category", get(products_by_category))
        .route("/featured/all", get(featured_products))
        .route(
            "/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
}

async fn list_products(
    State(state): State<AppState>,
    Query(filters): Query<ProductFilters>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<ProductList> {
    let page = state
        .services
        .products
        .list(filters, pagination.to_request(&state.config))
        .await?;
    Ok(ok(page.into()))
}

async fn search_products(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Vec<product::Model>> {
    Ok(ok(state.services.products.search(&query.q).await?))
}

async fn category_stats(State(state): State<AppState>) -> ApiResult<Vec<CategoryStats>> {
    Ok(ok(state.services.products.category_stats().await?))
}

async fn products_by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<ProductList> {
    let category = ProductCategory::from_str(&category.to_ascii_lowercase())
        .map_err(|_| ServiceError::BadRequest(format!("Unknown category: {}", category)))?;
    let page = state
        .services
        .products
        .by_category(category, pagination.to_request(&state.config))
        .await?;
    Ok(ok(page.into()))
}

async fn featured_products(State(state): State<AppState>) -> ApiResult<Vec<product::Model>> {
    Ok(ok(state.services.products.featured().await?))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<product::Model> {
    Ok(ok(state.services.products.get(id).await?))
}

async fn create_product(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateProductRequest>,
) -> ApiCreated<product::Model> {
    user.require_role(&[UserRole::Admin, UserRole::Vendor])?;
    Ok(created(state.services.products.create(&user.user, payload).await?))
}

async fn update_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductRequest>,
) -> ApiResult<product::Model> {
    user.require_role(&[UserRole::Admin, UserRole::Vendor])?;
    Ok(ok(state.services.products.update(&user.user, id, payload).await?))
}

async fn delete_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<product::Model> {
    user.require_role(&[UserRole::Admin])?;
    Ok(ok(state.services.products.deactivate(id).await?))
}
