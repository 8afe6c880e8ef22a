mod common;

use axum::http::{Method, StatusCode};
use common::{uuid_at, Account, TestApp};
use serde_json::json;
use uuid::Uuid;

/// Places and vendor-confirms an order, returning its id.
async fn confirmed_order(app: &TestApp, vendor: &Account, customer: &Account) -> Uuid {
    let product_id = app.product(vendor, 900, 10).await;
    let (_, body) = app.place_order(customer, product_id, 1).await;
    let order_id = uuid_at(&body["data"]["id"]);
    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/vendor/orders/{order_id}/respond"),
            Some(json!({ "action": "accept" })),
            Some(&vendor.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    order_id
}

async fn set_status(app: &TestApp, partner: &Account, assignment: Uuid, status: &str) -> StatusCode {
    app.call(
        Method::PATCH,
        &format!("/api/delivery/assignments/{assignment}/status"),
        Some(json!({ "status": status, "notes": "Gate locked" })),
        Some(&partner.token),
    )
    .await
    .0
}

#[tokio::test]
async fn rejected_assignment_goes_to_the_next_partner() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let vendor = app.register("vendor", "organic@agro.in").await;
    let customer = app.register("customer", "farmer@farm.in").await;
    let first = app.register("delivery_partner", "first@ride.in").await;
    let second = app.register("delivery_partner", "second@ride.in").await;
    let order_id = confirmed_order(&app, &vendor, &customer).await;

    let (_, body) = app
        .call(
            Method::PATCH,
            &format!("/api/orders/{order_id}/assign-delivery"),
            Some(json!({ "partner_id": first.id })),
            Some(&admin.token),
        )
        .await;
    let offered = uuid_at(&body["data"]["id"]);

    // Another partner cannot touch it
    let (status, _) = app
        .call(
            Method::PATCH,
            &format!("/api/delivery/assignments/{offered}/accept"),
            None,
            Some(&second.token),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/api/delivery/assignments/{offered}/reject"),
            Some(json!({ "reason": "Vehicle under repair" })),
            Some(&first.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "cancelled");

    let (status, body) = app
        .call(Method::POST, "/api/admin/jobs/run-due", None, Some(&admin.token))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["completed"], 1);

    let (_, body) = app
        .call(Method::GET, "/api/delivery/assignments/available", None, Some(&first.token))
        .await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let (_, body) = app
        .call(Method::GET, "/api/delivery/assignments/available", None, Some(&second.token))
        .await;
    let offers = body["data"].as_array().unwrap();
    assert_eq!(offers.len(), 1);
    assert_eq!(uuid_at(&offers[0]["order_id"]), order_id);
}

#[tokio::test]
async fn partner_status_updates_follow_the_delivery_lifecycle() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let vendor = app.register("vendor", "npk@agro.in").await;
    let customer = app.register("customer", "lata@farm.in").await;
    let partner = app.register("delivery_partner", "rider@ride.in").await;
    let order_id = confirmed_order(&app, &vendor, &customer).await;

    let (_, body) = app
        .call(
            Method::PATCH,
            &format!("/api/orders/{order_id}/assign-delivery"),
            None,
            Some(&admin.token),
        )
        .await;
    let assignment = uuid_at(&body["data"]["id"]);
    assert_eq!(uuid_at(&body["data"]["delivery_partner_id"]), partner.id);

    // A second assignment is refused while this one is open
    let (status, _) = app
        .call(
            Method::PATCH,
            &format!("/api/orders/{order_id}/assign-delivery"),
            None,
            Some(&admin.token),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    assert_eq!(set_status(&app, &partner, assignment, "delivered").await, StatusCode::BAD_REQUEST);
    assert_eq!(set_status(&app, &partner, assignment, "accepted").await, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(
            Method::PATCH,
            &format!("/api/delivery/assignments/{assignment}/accept"),
            None,
            Some(&partner.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(set_status(&app, &partner, assignment, "in_transit").await, StatusCode::BAD_REQUEST);
    assert_eq!(set_status(&app, &partner, assignment, "picked_up").await, StatusCode::OK);

    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/api/delivery/assignments/{assignment}/location"),
            Some(json!({ "latitude": 18.52, "longitude": 73.85, "speed": 32.5 })),
            Some(&partner.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["current_latitude"], 18.52);

    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/api/delivery/assignments/{assignment}/status"),
            Some(json!({ "status": "delivered", "otp": "not-the-otp" })),
            Some(&partner.token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    assert_eq!(set_status(&app, &partner, assignment, "failed").await, StatusCode::OK);

    let (_, body) = app
        .call(Method::GET, &format!("/api/orders/{order_id}"), None, Some(&customer.token))
        .await;
    assert_eq!(body["data"]["order_status"], "out_for_delivery");

    let (_, body) = app
        .call(Method::GET, "/api/delivery/dashboard", None, Some(&partner.token))
        .await;
    assert_eq!(body["data"]["counts_by_status"]["failed"], 1);

    // Failed is terminal for the assignment
    assert_eq!(set_status(&app, &partner, assignment, "delivered").await, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unavailable_partners_are_not_auto_assigned() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let vendor = app.register("vendor", "urea@agro.in").await;
    let customer = app.register("customer", "mohan@farm.in").await;
    let partner = app.register("delivery_partner", "resting@ride.in").await;
    let order_id = confirmed_order(&app, &vendor, &customer).await;

    let (status, body) = app
        .call(
            Method::PATCH,
            "/api/delivery/availability",
            Some(json!({ "is_available": false })),
            Some(&partner.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["is_available"], false);

    let (status, _) = app
        .call(
            Method::PATCH,
            &format!("/api/orders/{order_id}/assign-delivery"),
            None,
            Some(&admin.token),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .call(Method::GET, "/api/delivery/dashboard", None, Some(&customer.token))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn customer_hands_the_delivery_code_to_the_partner() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let vendor = app.register("vendor", "potash@agro.in").await;
    let customer = app.register("customer", "sunita@farm.in").await;
    let partner = app.register("delivery_partner", "door@ride.in").await;
    let order_id = confirmed_order(&app, &vendor, &customer).await;

    let (_, body) = app
        .call(
            Method::PATCH,
            &format!("/api/orders/{order_id}/assign-delivery"),
            None,
            Some(&admin.token),
        )
        .await;
    let assignment = uuid_at(&body["data"]["id"]);
    assert!(body["data"].get("delivery_otp").is_none());

    let (_, body) = app
        .call(Method::GET, "/api/notifications", None, Some(&customer.token))
        .await;
    let assigned = body["data"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|n| n["notification_type"] == "delivery_assigned")
        .cloned()
        .expect("customer told about the partner");
    let otp = assigned["metadata"]["delivery_otp"].as_str().unwrap().to_string();
    assert_eq!(otp.len(), 4);
    assert!(assigned["message"].as_str().unwrap().contains(&otp));

    app.call(
        Method::PATCH,
        &format!("/api/delivery/assignments/{assignment}/accept"),
        None,
        Some(&partner.token),
    )
    .await;
    assert_eq!(set_status(&app, &partner, assignment, "picked_up").await, StatusCode::OK);
    assert_eq!(set_status(&app, &partner, assignment, "in_transit").await, StatusCode::OK);

    let wrong = format!("{:04}", (otp.parse::<u32>().unwrap() + 1) % 10_000);
    let (status, _) = app
        .call(
            Method::PATCH,
            &format!("/api/delivery/assignments/{assignment}/status"),
            Some(json!({ "status": "delivered", "otp": wrong })),
            Some(&partner.token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/api/delivery/assignments/{assignment}/status"),
            Some(json!({ "status": "delivered", "otp": otp, "received_by": "Sunita" })),
            Some(&partner.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["proof_of_delivery"]["otp_verified"], true);

    let (_, body) = app
        .call(Method::GET, &format!("/api/orders/{order_id}"), None, Some(&customer.token))
        .await;
    assert_eq!(body["data"]["order_status"], "delivered");
}
