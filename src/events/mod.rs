use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted by the order pipeline.
///
/// Events are advisory (logging, notification hooks); correctness-critical
/// state lives in the database, never in this channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        order_number: String,
        total: i64,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelled {
        order_id: Uuid,
        reason: String,
    },
    OrderExpired {
        order_id: Uuid,
    },
    PaymentConfirmed {
        order_id: Uuid,
        provider: String,
        reference: String,
        amount: i64,
    },
    PaymentFailed {
        order_id: Uuid,
        provider: String,
        reference: String,
    },
    StockReserved {
        product_id: Uuid,
        sku: String,
        quantity: i32,
        order_id: Uuid,
    },
    StockReleased {
        product_id: Uuid,
        sku: String,
        quantity: i32,
        order_id: Uuid,
    },
    StockCommitted {
        product_id: Uuid,
        sku: String,
        quantity: i32,
        order_id: Uuid,
    },
    PromoCodeApplied {
        code: String,
        order_id: Uuid,
        discount_amount: i64,
    },
    DuplicateWebhookIgnored {
        provider: String,
        event_id: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, logging (not failing) when the channel is closed.
    /// Delivery is best-effort; ordering and durability come from the DB.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!("event channel closed, dropping event: {}", e);
        }
    }
}

/// Background task draining the event channel.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderCreated {
                order_id,
                order_number,
                total,
            } => {
                info!(%order_id, %order_number, total, "order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "order status changed");
            }
            Event::OrderCancelled { order_id, reason } => {
                info!(%order_id, %reason, "order cancelled");
            }
            Event::OrderExpired { order_id } => {
                info!(%order_id, "order reservation expired");
            }
            Event::PaymentConfirmed {
                order_id,
                provider,
                reference,
                amount,
            } => {
                info!(%order_id, %provider, %reference, amount, "payment confirmed");
            }
            Event::PaymentFailed {
                order_id,
                provider,
                reference,
            } => {
                warn!(%order_id, %provider, %reference, "payment failed");
            }
            Event::DuplicateWebhookIgnored { provider, event_id } => {
                info!(%provider, %event_id, "duplicate webhook delivery ignored");
            }
            other => {
                info!(?other, "event");
            }
        }
    }
    info!("event channel closed, processor exiting");
}
