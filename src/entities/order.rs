use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// One checkout attempt. Monetary fields are integer minor-currency units
/// and must satisfy `total = subtotal + tax_amount + shipping_amount -
/// discount_amount` at all times. `payment_reference` is set at most once.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[validate(length(
        min = 1,
        max = 50,
        message = "Order number must be between 1 and 50 characters"
    ))]
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
    /// Address snapshots stored as JSON; the catalog layer owns the live records.
    pub shipping_address: String,
    pub billing_address: Option<String>,
    /// Lease on the stock reservation; the sweep cancels pending orders past this.
    pub reservation_expires_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
