//! KrushiDoot API library
//!
//! Marketplace backend for agricultural inputs: catalog, vendor inventory,
//! orders, delivery assignments, earnings and in-app notifications.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod models;
pub mod services;
pub mod tracing;

use axum::{
    extract::{FromRef, State},
    http::{HeaderValue, StatusCode},
    response::Json,
    routing::get,
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};

use crate::auth::AuthService;
use crate::errors::ServiceError;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub auth: Arc<AuthService>,
    pub services: handlers::AppServices,
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

// Common response wrappers
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok").with_message("Order placed")
            })
            .await;

        assert!(response.success);
        assert_eq!(response.message.as_deref(), Some("Order placed"));
        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[tokio::test]
    async fn error_response_has_no_data() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-err"), async {
                ApiResponse::<()>::error("oops".into())
            })
            .await;

        assert!(!response.success);
        assert!(response.data.is_none());
        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-err"));
    }

    #[test]
    fn metadata_without_request_scope_omits_id() {
        let body = serde_json::to_value(ApiResponse::success(1)).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"], 1);
        assert!(body["meta"].get("request_id").is_none());
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ServiceError>;

/// Same envelope with an explicit status, used for 201 responses.
pub type ApiCreated<T> = Result<(StatusCode, Json<ApiResponse<T>>), ServiceError>;

/// Everything mounted under `/api`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .nest("/auth", handlers::auth::auth_routes())
        .nest("/products", handlers::products::product_routes())
        .nest("/orders", handlers::orders::order_routes())
        .nest("/vendor", handlers::vendor::vendor_routes())
        .nest("/delivery", handlers::delivery::delivery_routes())
        .nest("/notifications", handlers::notifications::notification_routes())
        .nest("/admin", handlers::admin::admin_routes())
}

async fn api_status(State(state): State<AppState>) -> ApiResult<Value> {
    Ok(Json(ApiResponse::success(json!({
        "status": "ok",
        "service": "krushidoot-api",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "currency": state.config.default_currency,
        "timestamp": Utc::now().to_rfc3339(),
    }))))
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<ApiResponse<Value>>) {
    let db_ok = db::check_connection(&state.db).await.is_ok();
    let scheduler_ok = state.services.jobs.is_alive();
    let pending_jobs = state.services.jobs.pending_count().await.ok();

    let healthy = db_ok && scheduler_ok;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "checks": {
            "database": if db_ok { "healthy" } else { "unhealthy" },
            "scheduler": if scheduler_ok { "healthy" } else { "stalled" },
        },
        "pending_jobs": pending_jobs,
        "last_scheduler_tick": state.services.jobs.last_tick().map(|t| t.to_rfc3339()),
        "timestamp": Utc::now().to_rfc3339(),
    });
    (status, Json(ApiResponse::success(body)))
}

/// CORS from configuration: explicit origins win, permissive only in
/// development or with an explicit override.
pub fn cors_layer(cfg: &config::AppConfig) -> Result<CorsLayer, ServiceError> {
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .filter_map(|origin| HeaderValue::from_str(origin).ok())
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    if let Some(origins) = configured_origins {
        Ok(CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_credentials(cfg.cors_allow_credentials))
    } else if cfg.should_allow_permissive_cors() {
        ::tracing::info!(
            "Using permissive CORS because explicit origins were not configured ({})",
            if cfg.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
        Ok(CorsLayer::permissive())
    } else {
        Err(ServiceError::InternalError(
            "Missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true"
                .to_string(),
        ))
    }
}

/// Full HTTP application with the middleware stack applied.
pub fn build_app(state: AppState) -> Result<Router, ServiceError> {
    let cors = cors_layer(&state.config)?;
    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    Ok(Router::new()
        .route("/", get(|| async { "krushidoot-api up" }))
        .nest("/api", api_routes())
        .layer(TimeoutLayer::new(timeout))
        .layer(crate::tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state))
}

#[cfg(test)]
pub(crate) mod test_support {
    use rust_decimal::Decimal;
    use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use crate::config::{DeliveryConfig, NotificationConfig, WorkflowConfig};
    use crate::entities::{product, user};
    use crate::events::{process_events, EventSender};
    use crate::models::{ProductCategory, ProductUnit, UserRole, VerificationStatus};
    use crate::services::notifications::NotificationService;
    use crate::services::scheduler::JobRunner;
    use crate::services::workflow::WorkflowService;

    /// Migrated SQLite database in a temporary directory. Keep the
    /// directory alive for as long as the connection is used.
    pub async fn test_db() -> (TempDir, DatabaseConnection) {
        let dir = tempfile::tempdir().expect("temp dir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let db = sea_orm::Database::connect(url).await.expect("sqlite connect");
        crate::db::run_migrations(&db).await.expect("migrations");
        (dir, db)
    }

    /// Inserts an active, verified and available user so workflow code
    /// picks vendors and partners up without an onboarding step.
    pub async fn seed_user(db: &DatabaseConnection, role: UserRole, email: &str) -> user::Model {
        let now = chrono::Utc::now();
        user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(email.split('@').next().unwrap_or("user").to_string()),
            email: Set(email.to_string()),
            phone: Set(Some("9876543210".into())),
            password_hash: Set(crate::auth::hash_password("password123").expect("hash")),
            role: Set(role),
            is_verified: Set(true),
            is_active: Set(true),
            street: Set(None),
            city: Set(Some("Pune".into())),
            state: Set(Some("Maharashtra".into())),
            pincode: Set(Some("411001".into())),
            latitude: Set(None),
            longitude: Set(None),
            business_name: Set(None),
            gst_number: Set(None),
            commission_rate: Set(Decimal::TEN),
            vehicle_type: Set(None),
            vehicle_number: Set(None),
            is_available: Set(true),
            service_radius_km: Set(10),
            verification_status: Set(VerificationStatus::Verified),
            rating_average: Set(0.0),
            rating_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .expect("seed user")
    }

    pub async fn seed_product(
        db: &DatabaseConnection,
        vendor_id: Option<Uuid>,
        price: Decimal,
        stock: i32,
    ) -> product::Model {
        let now = chrono::Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            vendor_id: Set(vendor_id),
            name: Set("Urea 45kg".into()),
            description: Set("Nitrogen fertilizer".into()),
            category: Set(ProductCategory::Urea),
            brand: Set(Some("IFFCO".into())),
            price: Set(price),
            stock: Set(stock),
            unit: Set(ProductUnit::Kg),
            image_url: Set(None),
            is_active: Set(true),
            is_featured: Set(false),
            average_rating: Set(0.0),
            rating_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .expect("seed product")
    }

    /// Workflow over default settings; emitted events are drained by a
    /// background logger task.
    pub fn test_workflow(db: Arc<DatabaseConnection>) -> WorkflowService {
        test_workflow_with(db, WorkflowConfig::default())
    }

    pub fn test_workflow_with(db: Arc<DatabaseConnection>, config: WorkflowConfig) -> WorkflowService {
        WorkflowService::new(
            db.clone(),
            NotificationService::new(db, NotificationConfig::default()),
            test_events(),
            config,
            DeliveryConfig::default(),
            "INR".to_string(),
        )
    }

    /// Job runner sharing `config` with the workflow it drives.
    pub fn test_runner(db: Arc<DatabaseConnection>, config: WorkflowConfig) -> JobRunner {
        JobRunner::new(
            db.clone(),
            test_workflow_with(db.clone(), config.clone()),
            NotificationService::new(db, NotificationConfig::default()),
            test_events(),
            config,
        )
    }

    fn test_events() -> EventSender {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(process_events(rx));
        EventSender::new(tx)
    }
}
