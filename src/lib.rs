pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Json, Router,
};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::ToSchema;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::services::idempotency::IdempotencyStore;
use crate::services::orders::OrderService;
use crate::services::payments::GatewayRegistry;
use crate::services::promo_codes::PromoCodeLedger;
use crate::services::stock_lock::{LockBackend, StockLockManager};

/// Standard response envelope for all 2xx API responses.
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

}

/// Shared handler state. Cheap to clone; everything heavy is behind an Arc.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub event_sender: EventSender,
    pub orders: OrderService,
    pub idempotency: IdempotencyStore,
    pub gateways: GatewayRegistry,
}

impl AppState {
    /// Wires the service graph from a live DB pool and a lock backend.
    ///
    /// The lock backend is injected rather than constructed here so tests
    /// can run the full stack against the in-memory backend.
    pub fn build(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        lock_backend: Arc<dyn LockBackend>,
        event_sender: EventSender,
    ) -> Result<Self, ServiceError> {
        let stock_locks = StockLockManager::new(
            lock_backend,
            Duration::from_millis(config.stock_lock_lease_ms),
        );
        let orders = OrderService::new(
            db.clone(),
            stock_locks,
            PromoCodeLedger::new(),
            event_sender.clone(),
            Duration::from_secs(config.reservation_lease_secs),
        );
        let idempotency = IdempotencyStore::new(db.clone());
        let gateways = GatewayRegistry::from_config(&config)?;

        Ok(Self {
            db,
            config,
            event_sender,
            orders,
            idempotency,
            gateways,
        })
    }
}

/// Builds the full HTTP router with middleware layers applied.
pub fn app_router(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(30);

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/v1/orders", post(handlers::orders::create_order))
        .route("/api/v1/orders/:id", get(handlers::orders::get_order))
        .route(
            "/api/v1/orders/track/:order_number",
            get(handlers::orders::track_order),
        )
        .route(
            "/api/v1/orders/:id/cancel",
            post(handlers::orders::cancel_order),
        )
        .route("/webhooks/:provider", post(handlers::webhooks::payment_webhook))
        .route(
            "/openapi.json",
            get(|| async { Json(openapi::openapi_json()) }),
        )
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
