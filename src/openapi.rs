use utoipa::OpenApi;

use crate::handlers;
use crate::services::orders::{
    InitializeOrderRequest, OrderItemRequest, OrderItemResponse, OrderResponse,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Orderflow API",
        version = "1.0.0",
        description = "Order placement pipeline: stock reservation, promo codes, \
                       and payment webhook processing for Paystack and Flutterwave."
    ),
    paths(
        handlers::orders::create_order,
        handlers::orders::get_order,
        handlers::orders::track_order,
        handlers::orders::cancel_order,
        handlers::webhooks::payment_webhook,
        handlers::health::health,
    ),
    components(schemas(
        InitializeOrderRequest,
        OrderItemRequest,
        OrderResponse,
        OrderItemResponse,
        handlers::orders::CheckoutResponse,
        handlers::orders::CancelOrderRequest,
        handlers::health::HealthResponse,
        crate::errors::ErrorResponse,
    )),
    tags(
        (name = "Orders", description = "Order placement and lifecycle"),
        (name = "Webhooks", description = "Payment provider callbacks"),
        (name = "Health", description = "Service health"),
    )
)]
pub struct ApiDoc;

pub fn openapi_json() -> serde_json::Value {
    serde_json::to_value(ApiDoc::openapi()).unwrap_or_else(|_| serde_json::json!({}))
}
