//! Payment reconciliation: recovery for confirmations the webhook path
//! could not apply.
//!
//! A webhook can be durably claimed and acknowledged without its payment
//! landing on the order: it may arrive before `attach_payment_reference`
//! commits, or processing may fail after the claim. Every provider retry
//! is then absorbed as a duplicate, so the webhook path alone can never
//! recover. This sweep re-verifies pending orders that carry a payment
//! reference against the provider API and applies whatever outcome the
//! provider reports.

use std::sync::Arc;
use std::time::Duration;

use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use tokio::time::interval;
use tracing::{error, info, instrument, warn};

use crate::entities::order;
use crate::errors::ServiceError;
use crate::services::order_state::{OrderStatus, PaymentStatus};
use crate::services::orders::OrderService;
use crate::services::payments::{GatewayRegistry, PaymentOutcome};

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileResult {
    pub checked: u64,
    pub applied: u64,
}

#[derive(Clone)]
pub struct PaymentReconciler {
    db: Arc<DatabaseConnection>,
    orders: OrderService,
    gateways: GatewayRegistry,
}

impl PaymentReconciler {
    pub fn new(
        db: Arc<DatabaseConnection>,
        orders: OrderService,
        gateways: GatewayRegistry,
    ) -> Self {
        Self {
            db,
            orders,
            gateways,
        }
    }

    /// Re-verifies every pending order with an attached payment reference.
    ///
    /// Races with a concurrent webhook are resolved by the state machine:
    /// whichever transition commits first wins and the loser is rejected
    /// as illegal, which the sweep treats as already reconciled.
    #[instrument(skip(self))]
    pub async fn reconcile_pending(&self) -> Result<ReconcileResult, ServiceError> {
        let candidates = order::Entity::find()
            .filter(order::Column::Status.eq(OrderStatus::Pending.to_string()))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending.to_string()))
            .filter(order::Column::PaymentReference.is_not_null())
            .all(&*self.db)
            .await?;

        let checked = candidates.len() as u64;
        let mut applied = 0u64;

        for order_model in candidates {
            let (Some(gateway_id), Some(reference)) = (
                order_model.payment_gateway.as_deref(),
                order_model.payment_reference.as_deref(),
            ) else {
                continue;
            };

            let gateway = match self.gateways.get(gateway_id) {
                Ok(gateway) => gateway,
                Err(e) => {
                    warn!(order_id = %order_model.id, %gateway_id, "cannot reconcile: {}", e);
                    continue;
                }
            };

            match gateway.verify_transaction(reference).await {
                Ok(event) if event.outcome == PaymentOutcome::Pending => {
                    // The customer has not completed payment; leave the
                    // order to its reservation lease.
                }
                Ok(event) => match self.orders.confirm_payment(order_model.id, &event).await {
                    Ok(()) => {
                        info!(order_id = %order_model.id, outcome = %event.outcome, "payment reconciled");
                        applied += 1;
                    }
                    Err(ServiceError::IllegalTransition { .. }) => {
                        // A webhook or cancellation got there first.
                    }
                    Err(e) => {
                        warn!(order_id = %order_model.id, "failed to apply reconciled payment: {}", e);
                    }
                },
                Err(e) => {
                    warn!(order_id = %order_model.id, %reference, "verification failed: {}", e);
                }
            }
        }

        Ok(ReconcileResult { checked, applied })
    }
}

/// Runs the reconciliation sweep on a fixed interval until shutdown.
pub async fn run_reconciliation_sweep(reconciler: PaymentReconciler, period: Duration) {
    let mut ticker = interval(period);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match reconciler.reconcile_pending().await {
            Ok(result) if result.applied > 0 => {
                info!(
                    checked = result.checked,
                    applied = result.applied,
                    "reconciled pending payments"
                );
            }
            Ok(_) => {}
            Err(e) => {
                error!("payment reconciliation sweep failed: {}", e);
            }
        }
    }
}
