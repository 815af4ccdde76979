//! Inbound payment webhooks.
//!
//! Contract with the providers: 401 means the signature failed, 400 means
//! the payload was malformed, anything else is acknowledged with 200 once
//! the event id is durably claimed. Duplicates and events for unknown
//! references are acknowledged without side effects so the provider stops
//! retrying; reconciliation picks up anything that fell through.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use bytes::Bytes;
use tracing::{error, info, warn};

use crate::errors::ServiceError;
use crate::events::Event;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/webhooks/{provider}",
    summary = "Payment provider webhook",
    params(("provider" = String, Path, description = "Provider id: paystack or flutterwave")),
    request_body = String,
    responses(
        (status = 200, description = "Event accepted (or duplicate ignored)"),
        (status = 400, description = "Malformed payload or unknown provider", body = crate::errors::ErrorResponse),
        (status = 401, description = "Signature verification failed", body = crate::errors::ErrorResponse),
    ),
    tag = "Webhooks"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ServiceError> {
    let gateway = state.gateways.get(&provider)?;

    // Signature first; payload fields are untrusted until this passes.
    let event = gateway.parse_webhook(&body, &headers)?;

    // Durable claim on (provider, event_id). Losing the claim means some
    // delivery of this exact event already got here first.
    if !state.idempotency.claim_event(&event).await? {
        info!(provider = %event.provider, event_id = %event.event_id, "duplicate webhook ignored");
        state
            .event_sender
            .send(Event::DuplicateWebhookIgnored {
                provider: event.provider.clone(),
                event_id: event.event_id.clone(),
            })
            .await;
        return Ok(StatusCode::OK);
    }

    let order = match state
        .orders
        .find_by_payment_reference(&event.order_reference)
        .await?
    {
        Some(order) => order,
        None => {
            // Acknowledge so the provider stops retrying; flagged for
            // reconciliation rather than bounced.
            warn!(
                provider = %event.provider,
                reference = %event.order_reference,
                "webhook for unknown payment reference"
            );
            return Ok(StatusCode::OK);
        }
    };

    match state.orders.confirm_payment(order.id, &event).await {
        Ok(()) => Ok(StatusCode::OK),
        Err(ServiceError::IllegalTransition { .. }) => {
            // Out-of-order or late delivery (e.g. success after the order
            // already expired). Alerted inside the ledger; acknowledged so
            // the provider does not retry into the same wall.
            Ok(StatusCode::OK)
        }
        Err(e) => {
            error!(order_id = %order.id, "failed to apply payment event: {}", e);
            Err(e)
        }
    }
}
