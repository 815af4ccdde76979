use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Normalized payment-provider webhook delivery.
///
/// The unique index on (provider, event_id) is what makes webhook
/// processing idempotent: the first insert wins, duplicates surface as a
/// unique-constraint violation and are answered as no-ops. Rows are kept
/// forever for audit and replay protection.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub provider: String,
    /// Provider-assigned event/transaction id, never derived from payload amounts.
    pub event_id: String,
    pub order_reference: String,
    pub amount: i64,
    pub currency: String,
    /// "succeeded", "failed" or "pending"
    pub outcome: String,
    pub signature_verified: bool,
    pub received_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
