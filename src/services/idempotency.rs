//! Webhook idempotency via the durable `(provider, event_id)` unique index.
//!
//! Providers deliver webhooks at least once; the first insert of an event
//! wins and every duplicate collides with the unique constraint. "Already
//! processed" is a normal typed result (`Ok(false)`), not an error: the
//! caller answers the provider with 200 and runs no side effects.

use std::sync::Arc;

use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, SqlErr};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::payment_event;
use crate::errors::ServiceError;
use crate::services::payments::PaymentEvent;

#[derive(Clone)]
pub struct IdempotencyStore {
    db: Arc<DatabaseConnection>,
}

impl IdempotencyStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Records the event, returning whether this delivery was the first.
    ///
    /// The insert is the serialization point for concurrent deliveries of
    /// the same event across instances: exactly one caller sees `true`.
    #[instrument(skip(self, event), fields(provider = %event.provider, event_id = %event.event_id))]
    pub async fn claim_event(&self, event: &PaymentEvent) -> Result<bool, ServiceError> {
        let record = payment_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            provider: Set(event.provider.clone()),
            event_id: Set(event.event_id.clone()),
            order_reference: Set(event.order_reference.clone()),
            amount: Set(event.amount),
            currency: Set(event.currency.clone()),
            outcome: Set(event.outcome.to_string()),
            signature_verified: Set(event.signature_verified),
            received_at: Set(event.received_at),
        };

        match record.insert(&*self.db).await {
            Ok(_) => Ok(true),
            Err(e) => match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => {
                    info!("event already claimed, treating as duplicate");
                    Ok(false)
                }
                _ => Err(ServiceError::DatabaseError(e)),
            },
        }
    }

    /// Audit lookup of a processed event.
    pub async fn find_event(
        &self,
        provider: &str,
        event_id: &str,
    ) -> Result<Option<payment_event::Model>, ServiceError> {
        payment_event::Entity::find()
            .filter(payment_event::Column::Provider.eq(provider))
            .filter(payment_event::Column::EventId.eq(event_id))
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }
}
