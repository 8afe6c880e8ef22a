#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use krushidoot_api::{
    auth::{AuthConfig, AuthService},
    config::AppConfig,
    db,
    entities::user,
    events::{self, EventSender},
    handlers::AppServices,
    models::{UserRole, VerificationStatus},
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// A registered account and its bearer token.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub token: String,
}

/// Application over a throwaway SQLite file, driven through the real router.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("app.db").display());

        let mut cfg = AppConfig::new(
            url,
            "integration-secret-Xy7Qp2Lm9Wz4Kd8Rt5Vb3Nc6".to_string(),
            "127.0.0.1".to_string(),
            5000,
            "development".to_string(),
        );
        cfg.auto_migrate = true;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let auth = Arc::new(AuthService::new(
            AuthConfig::from_app_config(&cfg),
            db.clone(),
        ));
        let services =
            AppServices::new(db.clone(), &cfg, auth.clone(), EventSender::new(event_tx));

        let state = AppState {
            db,
            config: cfg,
            auth,
            services,
        };
        let router = krushidoot_api::build_app(state.clone()).expect("router");

        Self {
            router,
            state,
            _dir: dir,
            _event_task: event_task,
        }
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Same as [`TestApp::request`] with the body decoded as JSON.
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let response = self.request(method, uri, body, token).await;
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body bytes");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// Registers through the API. Vendors and partners are then approved so
    /// the workflow treats them as onboarded.
    pub async fn register(&self, role: &str, email: &str) -> Account {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/auth/register",
                Some(json!({
                    "name": email.split('@').next().unwrap_or("user"),
                    "email": email,
                    "password": "password123",
                    "phone": "9876543210",
                    "role": role,
                    "city": "Pune",
                    "state": "Maharashtra",
                    "pincode": "411001",
                })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");

        let account = Account {
            id: uuid_at(&body["data"]["user"]["id"]),
            token: body["data"]["token"]
                .as_str()
                .expect("token in register response")
                .to_string(),
        };
        if role == "vendor" || role == "delivery_partner" {
            self.state
                .services
                .users
                .set_verification(account.id, VerificationStatus::Verified)
                .await
                .expect("verify account");
        }
        account
    }

    /// Admins cannot self-register; promote a fresh customer instead.
    pub async fn admin(&self) -> Account {
        let account = self.register("customer", "admin@krushidoot.in").await;
        user::ActiveModel {
            id: Set(account.id),
            role: Set(UserRole::Admin),
            ..Default::default()
        }
        .update(&*self.state.db)
        .await
        .expect("promote admin");
        account
    }

    /// Creates a product owned by `vendor` and returns its id.
    pub async fn product(&self, vendor: &Account, price: u32, stock: i32) -> Uuid {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/products",
                Some(json!({
                    "name": "DAP 50kg",
                    "description": "Di-ammonium phosphate",
                    "category": "dap",
                    "brand": "Coromandel",
                    "price": price,
                    "stock": stock,
                })),
                Some(&vendor.token),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "product failed: {body}");
        uuid_at(&body["data"]["id"])
    }

    /// Adds an inventory row for the vendor's product.
    pub async fn stock(&self, vendor: &Account, product_id: Uuid, stock: i32) -> Uuid {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/vendor/inventory",
                Some(json!({
                    "product_id": product_id,
                    "stock": stock,
                    "min_stock_level": 5,
                    "cost_price": 250,
                    "selling_price": 300,
                })),
                Some(&vendor.token),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "inventory failed: {body}");
        uuid_at(&body["data"]["id"])
    }

    /// Places a single-line order as `customer`.
    pub async fn place_order(&self, customer: &Account, product_id: Uuid, quantity: i32) -> (StatusCode, Value) {
        self.call(
            Method::POST,
            "/api/orders",
            Some(json!({
                "items": [{ "product_id": product_id, "quantity": quantity }],
                "delivery_address": {
                    "street": "Survey No. 12, Hadapsar",
                    "city": "Pune",
                    "state": "Maharashtra",
                    "pincode": "411028"
                },
                "payment_method": "cod"
            })),
            Some(&customer.token),
        )
        .await
    }
}

pub fn uuid_at(value: &Value) -> Uuid {
    Uuid::parse_str(value.as_str().expect("uuid string")).expect("valid uuid")
}

pub fn decimal_at(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("not a decimal: {other}"),
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}
