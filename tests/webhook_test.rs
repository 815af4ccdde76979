mod common;

use axum::http::StatusCode;
use common::{order_request, paystack_sign, paystack_success_body, TestApp};
use sea_orm::EntityTrait;
use serde_json::json;
use uuid::Uuid;

use orderflow_api::entities::{payment_event, product};

const SIG_HEADER: &str = "x-paystack-signature";

#[tokio::test]
async fn signed_webhook_confirms_the_order() {
    let app = TestApp::new().await;
    let widget = app.seed_product("HOOK-W1", 10_000, 5).await;
    let (order, _) = app
        .state
        .orders
        .initialize(order_request(Uuid::new_v4(), vec![(widget.id, 2)], None))
        .await
        .unwrap();
    app.state
        .orders
        .attach_payment_reference(order.id, "paystack", "ref-hook-1")
        .await
        .unwrap();

    let body = paystack_success_body(9001, "ref-hook-1", order.total);
    let signature = paystack_sign(&body);
    let (status, _) = app
        .post_webhook("/webhooks/paystack", SIG_HEADER, &signature, body)
        .await;
    assert_eq!(status, StatusCode::OK);

    let confirmed = app.state.orders.get_order(order.id).await.unwrap();
    assert_eq!(confirmed.status, "processing");
    assert_eq!(confirmed.payment_status, "paid");

    let fresh = product::Entity::find_by_id(widget.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fresh.stock_on_hand, 3);
    assert_eq!(fresh.stock_reserved, 0);
}

#[tokio::test]
async fn duplicate_delivery_is_acknowledged_without_side_effects() {
    let app = TestApp::new().await;
    let widget = app.seed_product("HOOK-W2", 10_000, 5).await;
    let (order, _) = app
        .state
        .orders
        .initialize(order_request(Uuid::new_v4(), vec![(widget.id, 1)], None))
        .await
        .unwrap();
    app.state
        .orders
        .attach_payment_reference(order.id, "paystack", "ref-hook-2")
        .await
        .unwrap();

    let body = paystack_success_body(9002, "ref-hook-2", order.total);
    let signature = paystack_sign(&body);

    for _ in 0..3 {
        let (status, _) = app
            .post_webhook("/webhooks/paystack", SIG_HEADER, &signature, body.clone())
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    // One commit, no matter how many deliveries.
    let fresh = product::Entity::find_by_id(widget.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fresh.stock_on_hand, 4);
    assert_eq!(fresh.stock_reserved, 0);

    let recorded = payment_event::Entity::find().all(&*app.state.db).await.unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].event_id, "9002");

    let claimed = app
        .state
        .idempotency
        .find_event("paystack", "9002")
        .await
        .unwrap();
    assert!(claimed.is_some());
}

#[tokio::test]
async fn invalid_signature_is_rejected_with_401() {
    let app = TestApp::new().await;
    let body = paystack_success_body(9003, "ref-hook-3", 1_000);

    let (status, _) = app
        .post_webhook("/webhooks/paystack", SIG_HEADER, &"0".repeat(128), body.clone())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Nothing gets claimed when the signature fails.
    let recorded = payment_event::Entity::find().all(&*app.state.db).await.unwrap();
    assert!(recorded.is_empty());
}

#[tokio::test]
async fn malformed_payload_with_valid_signature_is_a_400() {
    let app = TestApp::new().await;
    let body = b"not json at all".to_vec();
    let signature = paystack_sign(&body);

    let (status, _) = app
        .post_webhook("/webhooks/paystack", SIG_HEADER, &signature, body)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_reference_is_acknowledged() {
    let app = TestApp::new().await;
    let body = paystack_success_body(9004, "ref-nobody-knows", 1_000);
    let signature = paystack_sign(&body);

    let (status, _) = app
        .post_webhook("/webhooks/paystack", SIG_HEADER, &signature, body)
        .await;
    assert_eq!(status, StatusCode::OK);

    // Claimed (so retries stay no-ops) but no order touched.
    let recorded = payment_event::Entity::find().all(&*app.state.db).await.unwrap();
    assert_eq!(recorded.len(), 1);
}

#[tokio::test]
async fn unknown_provider_is_rejected() {
    let app = TestApp::new().await;
    let (status, _) = app
        .post_webhook("/webhooks/stripe", SIG_HEADER, "sig", b"{}".to_vec())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn order_endpoints_round_trip_over_http() {
    let app = TestApp::new().await;
    let widget = app.seed_product("HOOK-W3", 2_500, 5).await;
    let (order, _) = app
        .state
        .orders
        .initialize(order_request(Uuid::new_v4(), vec![(widget.id, 1)], None))
        .await
        .unwrap();

    let (status, body) = app.get(&format!("/api/v1/orders/{}", order.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["order_number"], json!(order.order_number));

    let (status, body) = app
        .get(&format!("/api/v1/orders/track/{}", order.order_number))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], json!(order.id.to_string()));

    let (status, body) = app
        .post_json(
            &format!("/api/v1/orders/{}/cancel", order.id),
            json!({"reason": "test"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], json!("cancelled"));

    let (status, _) = app.get(&format!("/api/v1/orders/{}", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let app = TestApp::new().await;
    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));
}
