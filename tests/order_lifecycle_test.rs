//! End-to-end order lifecycle over the HTTP API:
//! placement, vendor response, delivery assignment, delivery and feedback.

mod common;

use axum::http::{Method, StatusCode};
use common::{decimal_at, uuid_at, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn order_travels_from_placement_to_delivery() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let vendor = app.register("vendor", "ramesh@agro.in").await;
    let customer = app.register("customer", "sunita@farm.in").await;
    let partner = app.register("delivery_partner", "vikas@ride.in").await;

    let product_id = app.product(&vendor, 300, 20).await;
    let inventory_id = app.stock(&vendor, product_id, 50).await;

    // Placement
    let (status, body) = app.place_order(&customer, product_id, 2).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let order = &body["data"];
    let order_id = uuid_at(&order["id"]);
    assert_eq!(order["order_status"], "pending");
    assert!(order["tracking_number"].as_str().unwrap().starts_with("ORD"));
    assert_eq!(decimal_at(&order["total_amount"]), dec!(600));
    assert_eq!(order["items"].as_array().unwrap().len(), 1);

    let (_, body) = app
        .call(Method::GET, &format!("/api/products/{product_id}"), None, None)
        .await;
    assert_eq!(body["data"]["stock"], 18);

    let (_, body) = app
        .call(Method::GET, "/api/vendor/orders", None, Some(&vendor.token))
        .await;
    assert_eq!(body["data"]["pagination"]["total"], 1);

    // Vendor accepts
    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/vendor/orders/{order_id}/respond"),
            Some(json!({ "action": "accept" })),
            Some(&vendor.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["order_status"], "confirmed");

    let (_, body) = app
        .call(
            Method::GET,
            &format!("/api/vendor/inventory/{inventory_id}"),
            None,
            Some(&vendor.token),
        )
        .await;
    assert_eq!(body["data"]["reserved_stock"], 2);
    assert_eq!(body["data"]["available_stock"], 48);

    let (_, body) = app
        .call(Method::GET, "/api/vendor/earnings", None, Some(&vendor.token))
        .await;
    assert_eq!(body["data"]["summary"]["transaction_count"], 1);
    assert_eq!(decimal_at(&body["data"]["summary"]["total_net"]).round_dp(2), dec!(540));

    // Admin assigns a partner
    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/api/orders/{order_id}/assign-delivery"),
            Some(json!({ "partner_id": partner.id })),
            Some(&admin.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let assignment_id = uuid_at(&body["data"]["id"]);
    assert_eq!(body["data"]["status"], "assigned");
    assert_eq!(decimal_at(&body["data"]["delivery_fee"]), dec!(100));

    let (_, body) = app
        .call(
            Method::GET,
            "/api/delivery/assignments/available",
            None,
            Some(&partner.token),
        )
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    // Partner accepts and delivers
    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/api/delivery/assignments/{assignment_id}/accept"),
            None,
            Some(&partner.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "accepted");

    let (_, body) = app
        .call(Method::GET, &format!("/api/orders/{order_id}"), None, Some(&customer.token))
        .await;
    assert_eq!(body["data"]["order_status"], "out_for_delivery");

    for step in ["picked_up", "in_transit"] {
        let (status, body) = app
            .call(
                Method::PATCH,
                &format!("/api/delivery/assignments/{assignment_id}/status"),
                Some(json!({
                    "status": step,
                    "location": { "latitude": 18.50, "longitude": 73.93 }
                })),
                Some(&partner.token),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{step}: {body}");
        assert_eq!(body["data"]["status"], step);
    }

    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/api/delivery/assignments/{assignment_id}/status"),
            Some(json!({ "status": "delivered", "received_by": "Sunita" })),
            Some(&partner.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "delivered");

    let (_, body) = app
        .call(Method::GET, &format!("/api/orders/{order_id}"), None, Some(&customer.token))
        .await;
    assert_eq!(body["data"]["order_status"], "delivered");
    assert_eq!(body["data"]["payment_status"], "completed");

    let (_, body) = app
        .call(
            Method::GET,
            &format!("/api/vendor/inventory/{inventory_id}"),
            None,
            Some(&vendor.token),
        )
        .await;
    assert_eq!(body["data"]["stock"], 48);
    assert_eq!(body["data"]["reserved_stock"], 0);

    let (_, body) = app
        .call(Method::GET, "/api/delivery/earnings", None, Some(&partner.token))
        .await;
    assert_eq!(decimal_at(&body["data"]["summary"]["total_net"]).round_dp(2), dec!(100));

    // Feedback is accepted once
    let feedback = json!({ "rating": 5, "comment": "On time" });
    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/orders/{order_id}/delivery-feedback"),
            Some(feedback.clone()),
            Some(&customer.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/orders/{order_id}/delivery-feedback"),
            Some(feedback),
            Some(&customer.token),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = app
        .call(Method::GET, "/api/auth/me", None, Some(&partner.token))
        .await;
    assert_eq!(body["data"]["rating_count"], 1);

    let (_, body) = app
        .call(Method::GET, "/api/notifications", None, Some(&customer.token))
        .await;
    assert!(body["data"]["pagination"]["total"].as_u64().unwrap() >= 3);
}

#[tokio::test]
async fn vendor_rejection_cancels_and_restores_stock() {
    let app = TestApp::new().await;
    let vendor = app.register("vendor", "kisan@agro.in").await;
    let customer = app.register("customer", "anil@farm.in").await;
    let product_id = app.product(&vendor, 450, 10).await;

    let (_, body) = app.place_order(&customer, product_id, 4).await;
    let order_id = uuid_at(&body["data"]["id"]);

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/vendor/orders/{order_id}/respond"),
            Some(json!({ "action": "reject", "reason": "Out of season" })),
            Some(&vendor.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["order_status"], "cancelled");
    assert_eq!(body["data"]["notes"], "Out of season");

    let (_, body) = app
        .call(Method::GET, &format!("/api/products/{product_id}"), None, None)
        .await;
    assert_eq!(body["data"]["stock"], 10);

    // A second answer is refused
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
async fn ordering_more_than_stock_is_rejected() {
    let app = TestApp::new().await;
    let vendor = app.register("vendor", "seeds@agro.in").await;
    let customer = app.register("customer", "meena@farm.in").await;
    let product_id = app.product(&vendor, 120, 3).await;

    let (status, body) = app.place_order(&customer, product_id, 5).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (_, body) = app
        .call(Method::GET, "/api/orders/my-orders", None, Some(&customer.token))
        .await;
    assert_eq!(body["data"]["pagination"]["total"], 0);
}

#[tokio::test]
async fn customer_cancel_and_admin_status_rules() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let vendor = app.register("vendor", "npk@agro.in").await;
    let customer = app.register("customer", "ravi@farm.in").await;
    let stranger = app.register("customer", "other@farm.in").await;
    let product_id = app.product(&vendor, 200, 10).await;

    let (_, body) = app.place_order(&customer, product_id, 1).await;
    let order_id = uuid_at(&body["data"]["id"]);

    let (status, _) = app
        .call(Method::GET, &format!("/api/orders/{order_id}"), None, Some(&stranger.token))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Pending cannot jump straight to delivered
    let (status, _) = app
        .call(
            Method::PATCH,
            &format!("/api/orders/{order_id}/status"),
            Some(json!({ "status": "delivered" })),
            Some(&admin.token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(
            Method::PATCH,
            &format!("/api/orders/{order_id}/status"),
            Some(json!({ "status": "confirmed" })),
            Some(&customer.token),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/api/orders/{order_id}/cancel"),
            Some(json!({ "reason": "Ordered twice" })),
            Some(&customer.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["order_status"], "cancelled");

    let (_, body) = app
        .call(Method::GET, &format!("/api/products/{product_id}"), None, None)
        .await;
    assert_eq!(body["data"]["stock"], 10);

    let (status, _) = app
        .call(
            Method::PATCH,
            &format!("/api/orders/{order_id}/cancel"),
            None,
            Some(&customer.token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call(
            Method::GET,
            "/api/orders?status=cancelled",
            None,
            Some(&admin.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["pagination"]["total"], 1);

    let (status, _) = app
        .call(Method::DELETE, &format!("/api/orders/{order_id}"), None, Some(&admin.token))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .call(Method::GET, &format!("/api/orders/{order_id}"), None, Some(&admin.token))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
