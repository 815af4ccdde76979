use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sellable SKU with its stock counters.
///
/// `stock_on_hand` is the catalog quantity; `stock_reserved` is the sum of
/// active reservations held by pending orders. Available stock is the
/// difference and must never go negative; both counters are mutated only
/// through conditional updates inside OrderLedger transactions.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub sku: String,

    pub name: String,
    pub price: i64,
    pub currency: String,
    pub stock_on_hand: i32,
    pub stock_reserved: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    pub fn available_stock(&self) -> i32 {
        self.stock_on_hand - self.stock_reserved
    }
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
