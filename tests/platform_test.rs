//! Accounts, catalog, notifications and the admin back office.

mod common;

use axum::http::{Method, StatusCode};
use common::{uuid_at, TestApp};
use serde_json::json;

#[tokio::test]
async fn register_login_and_token_checks() {
    let app = TestApp::new().await;
    let account = app.register("customer", "asha@farm.in").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/login",
            Some(json!({ "email": "ASHA@farm.in", "password": "password123" })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["token_type"], "Bearer");
    assert_eq!(uuid_at(&body["data"]["user"]["id"]), account.id);
    assert!(body["data"]["user"].get("password_hash").is_none());

    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/login",
            Some(json!({ "email": "asha@farm.in", "password": "wrong-password" })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["request_id"].is_string());

    let (status, _) = app
        .call(
            Method::POST,
            "/api/auth/register",
            Some(json!({
                "name": "Asha Again",
                "email": "asha@farm.in",
                "password": "password123",
            })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/auth/register",
            Some(json!({
                "name": "Root",
                "email": "root@krushidoot.in",
                "password": "password123",
                "role": "admin",
            })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.call(Method::GET, "/api/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app
        .call(Method::GET, "/api/auth/me", None, Some("not-a-jwt"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .call(
            Method::PUT,
            "/api/auth/me",
            Some(json!({ "city": "Nashik" })),
            Some(&account.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["city"], "Nashik");

    let (_, body) = app
        .call(Method::POST, "/api/auth/verify-token", None, Some(&account.token))
        .await;
    assert_eq!(body["data"]["valid"], true);
}

#[tokio::test]
async fn catalog_browsing() {
    let app = TestApp::new().await;
    let vendor = app.register("vendor", "catalog@agro.in").await;
    let customer = app.register("customer", "browser@farm.in").await;
    let dap = app.product(&vendor, 1350, 40).await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/products",
            Some(json!({
                "name": "Neem Cake Organic",
                "category": "organic",
                "price": 420,
                "stock": 15,
                "is_featured": true,
            })),
            Some(&vendor.token),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (status, _) = app
        .call(
            Method::POST,
            "/api/products",
            Some(json!({ "name": "Sneaky", "category": "other", "price": 1, "stock": 1 })),
            Some(&customer.token),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, body) = app
        .call(Method::GET, "/api/products?page=1&limit=1", None, None)
        .await;
    assert_eq!(body["data"]["pagination"]["total_products"], 2);
    assert_eq!(body["data"]["pagination"]["has_next"], true);
    assert_eq!(body["data"]["products"].as_array().unwrap().len(), 1);

    let (_, body) = app
        .call(Method::GET, "/api/products?category=dap&max_price=2000", None, None)
        .await;
    assert_eq!(body["data"]["pagination"]["total_products"], 1);

    let (_, body) = app
        .call(Method::GET, "/api/products/search?q=neem", None, None)
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (_, body) = app
        .call(Method::GET, "/api/products/category/Organic", None, None)
        .await;
    assert_eq!(body["data"]["products"][0]["name"], "Neem Cake Organic");

    let (status, _) = app
        .call(Method::GET, "/api/products/category/pesticide", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = app
        .call(Method::GET, "/api/products/featured/all", None, None)
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (_, body) = app
        .call(Method::GET, "/api/products/categories/all", None, None)
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/products/{dap}"),
            Some(json!({ "price": 1299 })),
            Some(&vendor.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, _) = app
        .call(Method::DELETE, &format!("/api/products/{dap}"), None, Some(&vendor.token))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_reviews_accounts_and_pays_out() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let vendor = app.register("vendor", "payout@agro.in").await;
    let customer = app.register("customer", "buyer@farm.in").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/register",
            Some(json!({
                "name": "New Rider",
                "email": "newrider@ride.in",
                "password": "password123",
                "role": "delivery_partner",
            })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let rider = uuid_at(&body["data"]["user"]["id"]);
    assert_eq!(body["data"]["user"]["verification_status"], "pending");

    let (_, body) = app
        .call(Method::GET, "/api/admin/users?role=delivery_partner", None, Some(&admin.token))
        .await;
    assert_eq!(body["data"]["pagination"]["total"], 1);

    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/api/admin/users/{rider}/verify"),
            Some(json!({ "status": "verified" })),
            Some(&admin.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["is_verified"], true);

    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/api/admin/users/{rider}/active"),
            Some(json!({ "is_active": false })),
            Some(&admin.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["is_active"], false);

    let product_id = app.product(&vendor, 250, 10).await;
    let (_, body) = app.place_order(&customer, product_id, 2).await;
    let order_id = uuid_at(&body["data"]["id"]);
    app.call(
        Method::POST,
        &format!("/api/vendor/orders/{order_id}/respond"),
        Some(json!({ "action": "accept" })),
        Some(&vendor.token),
    )
    .await;

    let (_, body) = app
        .call(Method::GET, "/api/vendor/earnings", None, Some(&vendor.token))
        .await;
    let earning_id = uuid_at(&body["data"]["recent"][0]["id"]);

    let payout = json!({ "payment_method": "upi", "payment_reference": "UTR123456" });
    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/api/admin/earnings/{earning_id}/pay"),
            Some(payout.clone()),
            Some(&admin.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "paid");

    let (status, _) = app
        .call(
            Method::PATCH,
            &format!("/api/admin/earnings/{earning_id}/pay"),
            Some(payout),
            Some(&admin.token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call(Method::GET, "/api/admin/stats", None, Some(&admin.token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["orders_by_status"]["confirmed"], 1);
    assert_eq!(body["data"]["total_products"], 1);

    let (status, _) = app
        .call(Method::GET, "/api/admin/stats", None, Some(&vendor.token))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn notification_inbox() {
    let app = TestApp::new().await;
    let vendor = app.register("vendor", "inbox@agro.in").await;
    let customer = app.register("customer", "reader@farm.in").await;
    let product_id = app.product(&vendor, 100, 10).await;
    app.place_order(&customer, product_id, 1).await;

    let (_, body) = app
        .call(Method::GET, "/api/notifications/unread-count", None, Some(&vendor.token))
        .await;
    assert_eq!(body["data"]["count"], 1);

    let (_, body) = app
        .call(Method::GET, "/api/notifications?unread_only=true", None, Some(&vendor.token))
        .await;
    let first = &body["data"]["items"][0];
    assert_eq!(first["notification_type"], "order_placed");
    let id = uuid_at(&first["id"]);

    // Customers cannot read another account's notification
    let (status, _) = app
        .call(
            Method::PATCH,
            &format!("/api/notifications/{id}/read"),
            None,
            Some(&customer.token),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/api/notifications/{id}/read"),
            None,
            Some(&vendor.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["is_read"], true);

    let (_, body) = app
        .call(Method::PATCH, "/api/notifications/read-all", None, Some(&vendor.token))
        .await;
    assert_eq!(body["data"]["updated"], 0);
}

#[tokio::test]
async fn status_and_health_endpoints() {
    let app = TestApp::new().await;

    let (status, body) = app.call(Method::GET, "/api/status", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["service"], "krushidoot-api");
    assert_eq!(body["data"]["currency"], "INR");

    // The job worker is not running in tests
    let (status, body) = app.call(Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["data"]["checks"]["database"], "healthy");
    assert_eq!(body["data"]["checks"]["scheduler"], "stalled");
    assert_eq!(body["data"]["pending_jobs"], 0);

    let response = app.request(Method::GET, "/api/status", None, None).await;
    assert!(response.headers().contains_key("x-request-id"));

    let (status, _) = app.call(Method::GET, "/api/nowhere", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
