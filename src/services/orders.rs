//! The order ledger: the only writer of order rows and stock counters.
//!
//! Reservation and permanent decrement are deliberately distinct steps.
//! `initialize` reserves stock while payment is pending, which is what
//! stops two simultaneous checkouts from both seeing the last unit as
//! available; `confirm_payment` converts the reservation into a permanent
//! decrement, which is what stops abandoned carts from leaking stock --
//! unpaid reservations lapse and the sweep returns them to the pool.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::entities::{order, order_item, product};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::order_state::{self, OrderEvent, OrderStatus, PaymentStatus, SideEffect};
use crate::services::payments::{PaymentEvent, PaymentOutcome};
use crate::services::promo_codes::PromoCodeLedger;
use crate::services::stock_lock::StockLockManager;

/// Checkout request from the cart layer.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, utoipa::ToSchema)]
pub struct InitializeOrderRequest {
    pub customer_id: Uuid,
    #[validate(email(message = "A valid customer email is required"))]
    pub customer_email: String,
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<OrderItemRequest>,
    pub promo_code: Option<String>,
    /// Provider id the customer will pay through ("paystack", ...).
    pub payment_gateway: String,
    #[schema(value_type = Object)]
    pub shipping_address: serde_json::Value,
    #[schema(value_type = Object)]
    pub billing_address: Option<serde_json::Value>,
    /// Shipping quote from the fulfillment layer, minor units.
    #[serde(default)]
    pub shipping_amount: i64,
    /// Tax quote from the tax layer, minor units.
    #[serde(default)]
    pub tax_amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub status: String,
    pub payment_status: String,
    pub payment_gateway: Option<String>,
    pub payment_reference: Option<String>,
    pub currency: String,
    pub subtotal: i64,
    pub tax_amount: i64,
    pub shipping_amount: i64,
    pub discount_amount: i64,
    pub total: i64,
    pub promo_code: Option<String>,
    pub items: Vec<OrderItemResponse>,
    pub reservation_expires_at: chrono::DateTime<Utc>,
    pub created_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub sku: String,
    pub product_name: String,
    pub unit_price: i64,
    pub quantity: i32,
    pub line_total: i64,
}

impl OrderResponse {
    pub fn from_model(order: order::Model, items: Vec<order_item::Model>) -> Self {
        Self {
            id: order.id,
            order_number: order.order_number,
            customer_id: order.customer_id,
            status: order.status,
            payment_status: order.payment_status,
            payment_gateway: order.payment_gateway,
            payment_reference: order.payment_reference,
            currency: order.currency,
            subtotal: order.subtotal,
            tax_amount: order.tax_amount,
            shipping_amount: order.shipping_amount,
            discount_amount: order.discount_amount,
            total: order.total,
            promo_code: order.promo_code,
            items: items
                .into_iter()
                .map(|i| OrderItemResponse {
                    product_id: i.product_id,
                    variant_id: i.variant_id,
                    sku: i.sku,
                    product_name: i.product_name,
                    unit_price: i.unit_price,
                    quantity: i.quantity,
                    line_total: i.line_total,
                })
                .collect(),
            reservation_expires_at: order.reservation_expires_at,
            created_at: order.created_at,
        }
    }
}

/// Result of one expiry sweep pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResult {
    pub expired_count: u64,
    pub swept_at: chrono::DateTime<Utc>,
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    stock_locks: StockLockManager,
    promo_ledger: PromoCodeLedger,
    event_sender: EventSender,
    reservation_lease: Duration,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        stock_locks: StockLockManager,
        promo_ledger: PromoCodeLedger,
        event_sender: EventSender,
        reservation_lease: Duration,
    ) -> Self {
        Self {
            db,
            stock_locks,
            promo_ledger,
            event_sender,
            reservation_lease,
        }
    }

    /// Creates a provisional order and reserves stock for every line.
    ///
    /// The critical section runs under sorted per-SKU locks and a single
    /// transaction: stock checks, promo accounting, and the order insert
    /// either all commit or all roll back. A failed stock check on any
    /// line fails the whole cart.
    #[instrument(skip(self, request), fields(customer_id = %request.customer_id))]
    pub async fn initialize(
        &self,
        request: InitializeOrderRequest,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        for item in &request.items {
            if item.quantity <= 0 {
                return Err(ServiceError::ValidationError(format!(
                    "quantity for product {} must be positive",
                    item.product_id
                )));
            }
        }

        // Load and validate products up front; the authoritative stock
        // check happens conditionally inside the transaction below.
        let product_ids: Vec<Uuid> = request.items.iter().map(|i| i.product_id).collect();
        let products = product::Entity::find()
            .filter(product::Column::Id.is_in(product_ids.clone()))
            .all(&*self.db)
            .await?;

        let mut lines: Vec<(product::Model, OrderItemRequest)> = Vec::new();
        for item in &request.items {
            let product = products
                .iter()
                .find(|p| p.id == item.product_id)
                .cloned()
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", item.product_id))
                })?;
            if !product.is_active {
                return Err(ServiceError::InvalidOperation(format!(
                    "Product {} is not purchasable",
                    product.sku
                )));
            }
            lines.push((product, item.clone()));
        }

        let currency = lines[0].0.currency.clone();
        if lines.iter().any(|(p, _)| p.currency != currency) {
            return Err(ServiceError::ValidationError(
                "All items in an order must share a currency".to_string(),
            ));
        }

        let subtotal: i64 = lines
            .iter()
            .map(|(p, i)| p.price * i.quantity as i64)
            .sum();

        let skus: Vec<String> = lines.iter().map(|(p, _)| p.sku.clone()).collect();
        let order_id = Uuid::new_v4();
        let order_number = generate_order_number();
        let now = Utc::now();
        let reservation_expires_at =
            now + chrono::Duration::seconds(self.reservation_lease.as_secs() as i64);

        let db = self.db.clone();
        let promo_ledger = self.promo_ledger.clone();
        let promo_code = request.promo_code.clone();
        let req = request.clone();
        let txn_lines = lines.clone();
        let txn_order_number = order_number.clone();
        let txn_currency = currency.clone();

        let (created_order, created_items) = self
            .stock_locks
            .with_locks(&skus, || async move {
                let txn = db.begin().await?;

                for (product, item) in &txn_lines {
                    reserve_stock_line(&txn, product, item.quantity).await?;
                }

                let discount_amount = match &promo_code {
                    Some(code) => {
                        promo_ledger
                            .apply(&txn, code, order_id, req.customer_id, subtotal)
                            .await?
                    }
                    None => 0,
                };

                let total = subtotal + req.tax_amount + req.shipping_amount - discount_amount;

                let order_model = order::ActiveModel {
                    id: Set(order_id),
                    order_number: Set(txn_order_number),
                    customer_id: Set(req.customer_id),
                    status: Set(OrderStatus::Pending.to_string()),
                    payment_status: Set(PaymentStatus::Pending.to_string()),
                    payment_gateway: Set(None),
                    payment_reference: Set(None),
                    currency: Set(txn_currency),
                    subtotal: Set(subtotal),
                    tax_amount: Set(req.tax_amount),
                    shipping_amount: Set(req.shipping_amount),
                    discount_amount: Set(discount_amount),
                    total: Set(total),
                    promo_code: Set(promo_code.clone()),
                    shipping_address: Set(req.shipping_address.to_string()),
                    billing_address: Set(req.billing_address.map(|a| a.to_string())),
                    reservation_expires_at: Set(reservation_expires_at),
                    notes: Set(None),
                    created_at: Set(now),
                    updated_at: Set(None),
                    version: Set(1),
                };
                let created_order = order_model.insert(&txn).await?;

                let mut created_items = Vec::with_capacity(txn_lines.len());
                for (product, item) in &txn_lines {
                    let item_model = order_item::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        order_id: Set(order_id),
                        product_id: Set(product.id),
                        variant_id: Set(item.variant_id),
                        sku: Set(product.sku.clone()),
                        product_name: Set(product.name.clone()),
                        unit_price: Set(product.price),
                        quantity: Set(item.quantity),
                        line_total: Set(product.price * item.quantity as i64),
                    };
                    created_items.push(item_model.insert(&txn).await?);
                }

                txn.commit().await?;
                Ok((created_order, created_items))
            })
            .await?;

        self.event_sender
            .send(Event::OrderCreated {
                order_id,
                order_number: created_order.order_number.clone(),
                total: created_order.total,
            })
            .await;
        for (product, item) in &lines {
            self.event_sender
                .send(Event::StockReserved {
                    product_id: product.id,
                    sku: product.sku.clone(),
                    quantity: item.quantity,
                    order_id,
                })
                .await;
        }
        if let Some(code) = &created_order.promo_code {
            self.event_sender
                .send(Event::PromoCodeApplied {
                    code: code.clone(),
                    order_id,
                    discount_amount: created_order.discount_amount,
                })
                .await;
        }

        info!(%order_id, order_number = %created_order.order_number, "order initialized");
        Ok((created_order, created_items))
    }

    /// Records the provider transaction reference, exactly once.
    ///
    /// The second writer loses: a reserved order can never be hijacked by
    /// a second payment attempt with a different reference.
    #[instrument(skip(self))]
    pub async fn attach_payment_reference(
        &self,
        order_id: Uuid,
        gateway: &str,
        reference: &str,
    ) -> Result<(), ServiceError> {
        let result = order::Entity::update_many()
            .col_expr(
                order::Column::PaymentGateway,
                Expr::value(Some(gateway.to_string())),
            )
            .col_expr(
                order::Column::PaymentReference,
                Expr::value(Some(reference.to_string())),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::PaymentReference.is_null())
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            let existing = order::Entity::find_by_id(order_id).one(&*self.db).await?;
            return match existing {
                None => Err(ServiceError::NotFound(format!("Order {} not found", order_id))),
                Some(_) => Err(ServiceError::Conflict(format!(
                    "Order {} already has a payment reference",
                    order_id
                ))),
            };
        }
        Ok(())
    }

    /// Applies a claimed payment event to the order.
    ///
    /// Callers must have won the idempotency claim first; this method
    /// assumes the event is being processed for the first time. The state
    /// transition and the stock movement commit in one transaction.
    #[instrument(skip(self, event), fields(%order_id, provider = %event.provider))]
    pub async fn confirm_payment(
        &self,
        order_id: Uuid,
        event: &PaymentEvent,
    ) -> Result<(), ServiceError> {
        let mut outcome = event.outcome;
        if outcome == PaymentOutcome::Pending {
            info!("pending payment event, nothing to apply");
            return Ok(());
        }

        let (order_model, items) = self.load_order_with_items(order_id).await?;

        // A success notification that does not cover the order total is
        // treated as a failed payment, not a partial success.
        if outcome == PaymentOutcome::Succeeded
            && (event.amount < order_model.total || event.currency != order_model.currency)
        {
            warn!(
                event_amount = event.amount,
                order_total = order_model.total,
                "payment amount mismatch, treating as failed"
            );
            outcome = PaymentOutcome::Failed;
        }

        let machine_event = match outcome {
            PaymentOutcome::Succeeded => OrderEvent::PaymentSucceeded,
            PaymentOutcome::Failed => OrderEvent::PaymentFailed,
            PaymentOutcome::Pending => unreachable!(),
        };
        let payment_status = match outcome {
            PaymentOutcome::Succeeded => PaymentStatus::Paid,
            PaymentOutcome::Failed => PaymentStatus::Failed,
            PaymentOutcome::Pending => unreachable!(),
        };

        self.apply_transition(order_model, items.clone(), machine_event, Some(payment_status))
            .await?;

        match outcome {
            PaymentOutcome::Succeeded => {
                self.event_sender
                    .send(Event::PaymentConfirmed {
                        order_id,
                        provider: event.provider.clone(),
                        reference: event.order_reference.clone(),
                        amount: event.amount,
                    })
                    .await;
                for item in &items {
                    self.event_sender
                        .send(Event::StockCommitted {
                            product_id: item.product_id,
                            sku: item.sku.clone(),
                            quantity: item.quantity,
                            order_id,
                        })
                        .await;
                }
            }
            PaymentOutcome::Failed => {
                self.event_sender
                    .send(Event::PaymentFailed {
                        order_id,
                        provider: event.provider.clone(),
                        reference: event.order_reference.clone(),
                    })
                    .await;
            }
            PaymentOutcome::Pending => {}
        }
        Ok(())
    }

    /// Cancels an order on user/admin request. Legal only before delivery.
    #[instrument(skip(self))]
    pub async fn cancel(&self, order_id: Uuid, reason: &str) -> Result<(), ServiceError> {
        let (order_model, items) = self.load_order_with_items(order_id).await?;
        self.apply_transition(order_model, items, OrderEvent::Cancel, None)
            .await?;
        self.event_sender
            .send(Event::OrderCancelled {
                order_id,
                reason: reason.to_string(),
            })
            .await;
        Ok(())
    }

    /// Expires one unpaid order whose reservation lease has lapsed.
    #[instrument(skip(self))]
    pub async fn expire(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let (order_model, items) = self.load_order_with_items(order_id).await?;
        self.apply_transition(order_model, items, OrderEvent::Expire, None)
            .await?;
        self.event_sender.send(Event::OrderExpired { order_id }).await;
        Ok(())
    }

    /// Sweeps all pending orders past their reservation expiry.
    ///
    /// Races with a concurrent `confirm_payment` are resolved by the state
    /// machine: whichever transition commits first wins and the loser is
    /// rejected as illegal; the sweep just skips those and moves on.
    #[instrument(skip(self))]
    pub async fn expire_lapsed(&self) -> Result<SweepResult, ServiceError> {
        let now = Utc::now();
        let lapsed = order::Entity::find()
            .filter(order::Column::Status.eq(OrderStatus::Pending.to_string()))
            .filter(order::Column::ReservationExpiresAt.lt(now))
            .all(&*self.db)
            .await?;

        let mut expired_count = 0u64;
        for stale in lapsed {
            match self.expire(stale.id).await {
                Ok(()) => expired_count += 1,
                Err(ServiceError::IllegalTransition { .. }) => {
                    // Paid or cancelled between the scan and the expiry.
                    continue;
                }
                Err(e) => {
                    warn!(order_id = %stale.id, "failed to expire order: {}", e);
                }
            }
        }

        Ok(SweepResult {
            expired_count,
            swept_at: now,
        })
    }

    /// Moves a paid order into the shipped state.
    #[instrument(skip(self))]
    pub async fn ship(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let (order_model, items) = self.load_order_with_items(order_id).await?;
        self.apply_transition(order_model, items, OrderEvent::Ship, None)
            .await
    }

    /// Marks a shipped order delivered.
    #[instrument(skip(self))]
    pub async fn deliver(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let (order_model, items) = self.load_order_with_items(order_id).await?;
        self.apply_transition(order_model, items, OrderEvent::Deliver, None)
            .await
    }

    /// Refunds an order after fulfillment started; restocks and requests a
    /// gateway refund.
    #[instrument(skip(self))]
    pub async fn refund(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let (order_model, items) = self.load_order_with_items(order_id).await?;
        self.apply_transition(order_model, items, OrderEvent::Refund, Some(PaymentStatus::Refunded))
            .await
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let (order_model, items) = self.load_order_with_items(order_id).await?;
        Ok(OrderResponse::from_model(order_model, items))
    }

    pub async fn get_order_by_number(
        &self,
        order_number: &str,
    ) -> Result<OrderResponse, ServiceError> {
        let order_model = order::Entity::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order {} not found", order_number))
            })?;
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_model.id))
            .all(&*self.db)
            .await?;
        Ok(OrderResponse::from_model(order_model, items))
    }

    /// Correlates an inbound payment event with its order.
    pub async fn find_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        order::Entity::find()
            .filter(order::Column::PaymentReference.eq(reference))
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    async fn load_order_with_items(
        &self,
        order_id: Uuid,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
        let order_model = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;
        Ok((order_model, items))
    }

    /// Runs one state-machine transition and its stock side effects in a
    /// single transaction under the order's SKU locks.
    async fn apply_transition(
        &self,
        order_model: order::Model,
        items: Vec<order_item::Model>,
        machine_event: OrderEvent,
        payment_status: Option<PaymentStatus>,
    ) -> Result<(), ServiceError> {
        let current = OrderStatus::parse(&order_model.status)?;
        let transition = order_state::next(order_model.id, current, machine_event)?;

        let skus: Vec<String> = items.iter().map(|i| i.sku.clone()).collect();
        let db = self.db.clone();
        let old_status = order_model.status.clone();
        let order_id = order_model.id;
        let next_status = transition.next;

        let released: Vec<order_item::Model> = self
            .stock_locks
            .with_locks(&skus, || async move {
                let txn = db.begin().await?;

                // Re-read under the transaction: a concurrent transition may
                // have won between the load and the lock acquisition.
                let fresh = order::Entity::find_by_id(order_id)
                    .one(&txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Order {} not found", order_id))
                    })?;
                let fresh_status = OrderStatus::parse(&fresh.status)?;
                let transition = order_state::next(order_id, fresh_status, machine_event)?;

                let mut released = Vec::new();
                for effect in &transition.effects {
                    match effect {
                        SideEffect::CommitReservation => {
                            for item in &items {
                                commit_stock_line(&txn, item).await?;
                            }
                        }
                        SideEffect::ReleaseReservation => {
                            for item in &items {
                                release_stock_line(&txn, item).await?;
                            }
                            released = items.clone();
                        }
                        SideEffect::Restock => {
                            for item in &items {
                                restock_line(&txn, item).await?;
                            }
                        }
                        SideEffect::RequestRefund => {
                            // Executed asynchronously by the payments side;
                            // recorded here so it commits with the state write.
                            info!(%order_id, "refund requested");
                        }
                    }
                }

                let mut active: order::ActiveModel = fresh.clone().into();
                active.status = Set(transition.next.to_string());
                if let Some(ps) = payment_status {
                    active.payment_status = Set(ps.to_string());
                }
                active.updated_at = Set(Some(Utc::now()));
                active.version = Set(fresh.version + 1);
                active.update(&txn).await?;

                txn.commit().await?;
                Ok(released)
            })
            .await?;

        self.event_sender
            .send(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status: next_status.to_string(),
            })
            .await;
        for item in &released {
            self.event_sender
                .send(Event::StockReleased {
                    product_id: item.product_id,
                    sku: item.sku.clone(),
                    quantity: item.quantity,
                    order_id,
                })
                .await;
        }

        Ok(())
    }
}

/// Conditionally bumps the reservation counter for one line.
///
/// The guard `stock_reserved <= stock_on_hand - qty` is evaluated by the
/// database inside the transaction, so overselling is impossible even if
/// the pre-read product row was stale.
async fn reserve_stock_line(
    txn: &DatabaseTransaction,
    product_model: &product::Model,
    quantity: i32,
) -> Result<(), ServiceError> {
    let result = product::Entity::update_many()
        .col_expr(
            product::Column::StockReserved,
            Expr::col(product::Column::StockReserved).add(quantity),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(Some(Utc::now())))
        .filter(product::Column::Id.eq(product_model.id))
        .filter(
            Expr::col(product::Column::StockReserved)
                .lte(Expr::col(product::Column::StockOnHand).sub(quantity)),
        )
        .exec(txn)
        .await?;

    if result.rows_affected == 0 {
        let available = product::Entity::find_by_id(product_model.id)
            .one(txn)
            .await?
            .map(|p| p.available_stock())
            .unwrap_or(0);
        return Err(ServiceError::InsufficientStock {
            sku: product_model.sku.clone(),
            requested: quantity,
            available,
        });
    }
    Ok(())
}

/// Converts a reservation into a permanent decrement.
async fn commit_stock_line(
    txn: &DatabaseTransaction,
    item: &order_item::Model,
) -> Result<(), ServiceError> {
    let result = product::Entity::update_many()
        .col_expr(
            product::Column::StockOnHand,
            Expr::col(product::Column::StockOnHand).sub(item.quantity),
        )
        .col_expr(
            product::Column::StockReserved,
            Expr::col(product::Column::StockReserved).sub(item.quantity),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(Some(Utc::now())))
        .filter(product::Column::Id.eq(item.product_id))
        .filter(product::Column::StockReserved.gte(item.quantity))
        .exec(txn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::InternalError(format!(
            "reservation accounting out of sync for SKU {}",
            item.sku
        )));
    }
    Ok(())
}

/// Returns reserved stock to the available pool.
async fn release_stock_line(
    txn: &DatabaseTransaction,
    item: &order_item::Model,
) -> Result<(), ServiceError> {
    let result = product::Entity::update_many()
        .col_expr(
            product::Column::StockReserved,
            Expr::col(product::Column::StockReserved).sub(item.quantity),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(Some(Utc::now())))
        .filter(product::Column::Id.eq(item.product_id))
        .filter(product::Column::StockReserved.gte(item.quantity))
        .exec(txn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::InternalError(format!(
            "reservation accounting out of sync for SKU {}",
            item.sku
        )));
    }
    Ok(())
}

/// Compensating restock after a permanent decrement (cancel/refund).
async fn restock_line(
    txn: &DatabaseTransaction,
    item: &order_item::Model,
) -> Result<(), ServiceError> {
    product::Entity::update_many()
        .col_expr(
            product::Column::StockOnHand,
            Expr::col(product::Column::StockOnHand).add(item.quantity),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(Some(Utc::now())))
        .filter(product::Column::Id.eq(item.product_id))
        .exec(txn)
        .await?;
    Ok(())
}

fn generate_order_number() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("ORD-{}", &suffix[..12].to_uppercase())
}
