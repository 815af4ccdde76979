//! Shared harness for integration tests: full application state backed by
//! an in-memory SQLite database and the in-process lock backend.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration as ChronoDuration, Utc};
use hmac::{Hmac, Mac};
use sea_orm::{ActiveModelTrait, Set};
use serde_json::{json, Value};
use sha2::Sha512;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use orderflow_api::config::AppConfig;
use orderflow_api::db;
use orderflow_api::entities::{product, promo_code};
use orderflow_api::events::{self, EventSender};
use orderflow_api::services::orders::{InitializeOrderRequest, OrderItemRequest};
use orderflow_api::services::stock_lock::InMemoryLockBackend;
use orderflow_api::{app_router, AppState};

pub const PAYSTACK_SECRET: &str = "sk_test_secret_for_harness";

pub struct TestApp {
    pub state: AppState,
    router: axum::Router,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "redis://127.0.0.1:6379".to_string(),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        cfg.enabled_gateways = vec!["paystack".to_string()];
        cfg.paystack.secret_key = Some(PAYSTACK_SECRET.to_string());

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("test database");
        db::run_migrations(&pool).await.expect("migrations");
        let pool = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::build(
            pool,
            Arc::new(cfg),
            Arc::new(InMemoryLockBackend::new()),
            event_sender,
        )
        .expect("app state");

        Self {
            router: app_router(state.clone()),
            state,
            _event_task: event_task,
        }
    }

    #[allow(dead_code)]
    pub async fn seed_product(&self, sku: &str, price: i64, stock: i32) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(sku.to_string()),
            name: Set(format!("Product {}", sku)),
            price: Set(price),
            currency: Set("NGN".to_string()),
            stock_on_hand: Set(stock),
            stock_reserved: Set(0),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product")
    }

    /// Seeds a percentage promo code valid for the next hour.
    #[allow(dead_code)]
    pub async fn seed_promo(
        &self,
        code: &str,
        percent: i64,
        max_usage: i32,
        max_usage_per_user: i32,
    ) -> promo_code::Model {
        promo_code::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_string()),
            discount_type: Set("percentage".to_string()),
            discount_value: Set(percent),
            max_discount_amount: Set(0),
            min_order_value: Set(0),
            max_usage: Set(max_usage),
            max_usage_per_user: Set(max_usage_per_user),
            usage_count: Set(0),
            starts_at: Set(Utc::now() - ChronoDuration::hours(1)),
            ends_at: Set(Utc::now() + ChronoDuration::hours(1)),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed promo code")
    }

    #[allow(dead_code)]
    pub async fn get(&self, path: &str) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(path)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        read_response(response).await
    }

    #[allow(dead_code)]
    pub async fn post_json(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(path)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        read_response(response).await
    }

    /// Delivers a raw webhook body with the given signature header.
    #[allow(dead_code)]
    pub async fn post_webhook(
        &self,
        path: &str,
        signature_header: &str,
        signature: &str,
        body: Vec<u8>,
    ) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(path)
                    .header("content-type", "application/json")
                    .header(signature_header, signature)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        read_response(response).await
    }
}

async fn read_response(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// Signs a Paystack webhook body the way the provider does: HMAC-SHA512
/// over the raw bytes, hex-encoded.
#[allow(dead_code)]
pub fn paystack_sign(body: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha512>::new_from_slice(PAYSTACK_SECRET.as_bytes()).expect("hmac key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// A signed `charge.success` webhook body for the given reference/amount.
#[allow(dead_code)]
pub fn paystack_success_body(event_id: u64, reference: &str, amount: i64) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "event": "charge.success",
        "data": {
            "id": event_id,
            "status": "success",
            "reference": reference,
            "amount": amount,
            "currency": "NGN"
        }
    }))
    .unwrap()
}

#[allow(dead_code)]
pub fn order_request(
    customer_id: Uuid,
    items: Vec<(Uuid, i32)>,
    promo_code: Option<&str>,
) -> InitializeOrderRequest {
    InitializeOrderRequest {
        customer_id,
        customer_email: "customer@example.com".to_string(),
        items: items
            .into_iter()
            .map(|(product_id, quantity)| OrderItemRequest {
                product_id,
                variant_id: None,
                quantity,
            })
            .collect(),
        promo_code: promo_code.map(String::from),
        payment_gateway: "paystack".to_string(),
        shipping_address: json!({"line1": "1 Test Street", "city": "Lagos"}),
        billing_address: None,
        shipping_amount: 0,
        tax_amount: 0,
    }
}
