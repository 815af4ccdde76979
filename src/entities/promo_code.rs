use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Promotional code with usage caps.
///
/// `usage_count` is bumped with a conditional update guarded by
/// `usage_count < max_usage` in the same transaction that reserves stock,
/// so the global cap holds under concurrent checkouts on any backend.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "promo_codes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub code: String,

    /// "percentage" or "fixed_amount"
    pub discount_type: String,
    /// Percent (0-100) for percentage codes, minor units for fixed codes.
    pub discount_value: i64,
    /// Cap on the computed discount, minor units. Zero means uncapped.
    pub max_discount_amount: i64,
    pub min_order_value: i64,
    pub max_usage: i32,
    pub max_usage_per_user: i32,
    pub usage_count: i32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    FixedAmount,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::promo_code_usage::Entity")]
    Usage,
}

impl Related<super::promo_code_usage::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Usage.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
