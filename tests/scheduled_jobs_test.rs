mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use common::{uuid_at, TestApp};
use krushidoot_api::{entities::scheduled_job, models::JobKind};
use sea_orm::{sea_query::Expr, ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;
use uuid::Uuid;

/// Pulls every pending job of `kind` for the order into the past.
async fn make_due(app: &TestApp, order_id: Uuid, kind: JobKind) {
    let moved = scheduled_job::Entity::update_many()
        .col_expr(
            scheduled_job::Column::RunAt,
            Expr::value(Utc::now() - Duration::minutes(1)),
        )
        .filter(scheduled_job::Column::OrderId.eq(order_id))
        .filter(scheduled_job::Column::Kind.eq(kind))
        .exec(&*app.state.db)
        .await
        .expect("reschedule job");
    assert_eq!(moved.rows_affected, 1);
}

#[tokio::test]
async fn unanswered_order_expires() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let vendor = app.register("vendor", "slow@agro.in").await;
    let customer = app.register("customer", "waiting@farm.in").await;
    let product_id = app.product(&vendor, 350, 8).await;

    let (_, body) = app.place_order(&customer, product_id, 3).await;
    let order_id = uuid_at(&body["data"]["id"]);

    let (_, body) = app
        .call(Method::GET, "/api/admin/jobs?status=pending", None, Some(&admin.token))
        .await;
    assert_eq!(body["data"]["pagination"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["kind"], "order_expiry");

    // Not due yet: nothing happens
    let (_, body) = app
        .call(Method::POST, "/api/admin/jobs/run-due", None, Some(&admin.token))
        .await;
    assert_eq!(body["data"]["claimed"], 0);

    make_due(&app, order_id, JobKind::OrderExpiry).await;
    let (status, body) = app
        .call(Method::POST, "/api/admin/jobs/run-due", None, Some(&admin.token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["completed"], 1);

    let (_, body) = app
        .call(Method::GET, &format!("/api/orders/{order_id}"), None, Some(&customer.token))
        .await;
    assert_eq!(body["data"]["order_status"], "cancelled");
    assert!(body["data"]["notes"].as_str().unwrap().contains("24 hours"));

    let (_, body) = app
        .call(Method::GET, &format!("/api/products/{product_id}"), None, None)
        .await;
    assert_eq!(body["data"]["stock"], 8);

    // The vendor can no longer answer
    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/vendor/orders/{order_id}/respond"),
            Some(json!({ "action": "accept" })),
            Some(&vendor.token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn accepted_order_is_assigned_after_preparation() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let vendor = app.register("vendor", "quick@agro.in").await;
    let customer = app.register("customer", "kavita@farm.in").await;
    let partner = app.register("delivery_partner", "ready@ride.in").await;
    let product_id = app.product(&vendor, 500, 5).await;

    let (_, body) = app.place_order(&customer, product_id, 1).await;
    let order_id = uuid_at(&body["data"]["id"]);
    app.call(
        Method::POST,
        &format!("/api/vendor/orders/{order_id}/respond"),
        Some(json!({ "action": "accept" })),
        Some(&vendor.token),
    )
    .await;

    // Accepting retires the expiry timer
    let (_, body) = app
        .call(Method::GET, "/api/admin/jobs?status=cancelled", None, Some(&admin.token))
        .await;
    assert_eq!(body["data"]["items"][0]["kind"], "order_expiry");

    make_due(&app, order_id, JobKind::AssignDelivery).await;
    let (_, body) = app
        .call(Method::POST, "/api/admin/jobs/run-due", None, Some(&admin.token))
        .await;
    assert_eq!(body["data"]["completed"], 1);

    let (_, body) = app
        .call(Method::GET, &format!("/api/orders/{order_id}"), None, Some(&customer.token))
        .await;
    assert_eq!(uuid_at(&body["data"]["delivery_partner_id"]), partner.id);

    let (_, body) = app
        .call(Method::GET, "/api/notifications", None, Some(&partner.token))
        .await;
    assert_eq!(body["data"]["items"][0]["notification_type"], "delivery_assigned");
}

#[tokio::test]
async fn job_endpoints_require_admin() {
    let app = TestApp::new().await;
    let customer = app.register("customer", "curious@farm.in").await;

    let (status, _) = app
        .call(Method::POST, "/api/admin/jobs/run-due", None, Some(&customer.token))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.call(Method::GET, "/api/admin/jobs", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
