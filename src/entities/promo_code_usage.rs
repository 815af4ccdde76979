use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row per (promo code, order): the audit trail behind the usage caps.
/// Unique on (promo_code_id, order_id) so a code applies at most once per
/// order, and on (promo_code_id, customer_id, usage_ordinal) so two
/// transactions claiming the same per-user slot cannot both commit.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "promo_code_usages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub promo_code_id: Uuid,
    pub order_id: Uuid,
    pub customer_id: Uuid,
    /// 1-based position among this customer's uses of the code.
    pub usage_ordinal: i32,
    pub discount_amount: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::promo_code::Entity",
        from = "Column::PromoCodeId",
        to = "super::promo_code::Column::Id"
    )]
    PromoCode,
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::promo_code::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PromoCode.def()
    }
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
