use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::services::orders::{InitializeOrderRequest, OrderResponse};
use crate::services::payments::PaymentInit;
use crate::{ApiResponse, AppState};

/// A freshly initialized order together with the provider redirect the
/// customer completes payment through.
#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub order: OrderResponse,
    #[schema(value_type = Object)]
    pub payment: Option<PaymentInit>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelOrderRequest {
    pub reason: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Create order",
    description = "Reserve stock, apply any promo code, and initialize a payment transaction",
    request_body = InitializeOrderRequest,
    responses(
        (status = 201, description = "Order created and stock reserved", body = ApiResponse<CheckoutResponse>),
        (status = 400, description = "Invalid request or insufficient stock", body = crate::errors::ErrorResponse),
        (status = 409, description = "Stock contention, retry later", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment provider unavailable", body = crate::errors::ErrorResponse),
    ),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<InitializeOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutResponse>>), ServiceError> {
    // Fail fast on an unknown provider before touching stock.
    let gateway = state.gateways.get(&request.payment_gateway)?;
    let customer_email = request.customer_email.clone();

    let (order, items) = state.orders.initialize(request).await?;

    // The provider round trip runs outside the stock locks. If it fails
    // the order stays pending with its reservation intact; the caller can
    // retry payment or let the reservation lapse.
    let payment = match gateway.initialize_transaction(&order, &customer_email).await {
        Ok(init) => {
            state
                .orders
                .attach_payment_reference(order.id, gateway.provider(), &init.reference)
                .await?;
            Some(init)
        }
        Err(e) => {
            error!(order_id = %order.id, "payment initialization failed: {}", e);
            None
        }
    };

    let mut order = order;
    if let Some(init) = &payment {
        order.payment_gateway = Some(gateway.provider().to_string());
        order.payment_reference = Some(init.reference.clone());
    }

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(CheckoutResponse {
            order: OrderResponse::from_model(order, items),
            payment,
        })),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get order",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order retrieved", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state.orders.get_order(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/track/{order_number}",
    summary = "Track order by number",
    params(("order_number" = String, Path, description = "Public order number, e.g. ORD-1A2B3C4D5E6F")),
    responses(
        (status = 200, description = "Order retrieved", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "Orders"
)]
pub async fn track_order(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state.orders.get_order_by_number(&order_number).await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    summary = "Cancel order",
    description = "Cancel an order; reserved stock is released, paid stock restocked and refunded",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = CancelOrderRequest,
    responses(
        (status = 200, description = "Order cancelled", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order can no longer be cancelled", body = crate::errors::ErrorResponse),
    ),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CancelOrderRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let reason = request.reason.as_deref().unwrap_or("customer request");
    if let Err(e) = state.orders.cancel(id, reason).await {
        warn!(order_id = %id, "cancel rejected: {}", e);
        return Err(e);
    }
    let order = state.orders.get_order(id).await?;
    Ok(Json(ApiResponse::success(order)))
}
