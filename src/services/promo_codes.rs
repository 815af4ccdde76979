//! Promo code validation and usage accounting.
//!
//! `apply` runs inside the caller's order-creation transaction, so a code
//! is only ever consumed together with the order that used it. Usage caps
//! are enforced with a conditional counter update re-read under the
//! transaction, not with cached values, so two simultaneous orders racing
//! for the last use of a capped code cannot both win.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Set, SqlErr,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::promo_code::{self, DiscountType};
use crate::entities::promo_code_usage;
use crate::errors::ServiceError;

#[derive(Clone, Default)]
pub struct PromoCodeLedger;

impl PromoCodeLedger {
    pub fn new() -> Self {
        Self
    }

    /// Validates `code` and records one usage for `order_id`, returning the
    /// discount in minor units. Must be called on the same transaction that
    /// reserves stock and inserts the order; every failure rolls the whole
    /// checkout back.
    #[instrument(skip(self, conn), fields(%code, %order_id))]
    pub async fn apply<C: ConnectionTrait>(
        &self,
        conn: &C,
        code: &str,
        order_id: Uuid,
        customer_id: Uuid,
        cart_subtotal: i64,
    ) -> Result<i64, ServiceError> {
        let promo = promo_code::Entity::find()
            .filter(promo_code::Column::Code.eq(code))
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::InvalidPromoCode(code.to_string()))?;

        let now = Utc::now();
        if !promo.is_active || promo.starts_at > now || promo.ends_at < now {
            return Err(ServiceError::InvalidPromoCode(code.to_string()));
        }
        if cart_subtotal < promo.min_order_value {
            return Err(ServiceError::InvalidPromoCode(format!(
                "{} requires a minimum order value of {}",
                code, promo.min_order_value
            )));
        }

        let discount = compute_discount(&promo, cart_subtotal)?;

        // Per-user cap. The count decides the ordinal this transaction
        // claims; the unique (promo_code_id, customer_id, usage_ordinal)
        // index makes the claim exclusive, so two transactions that
        // counted the same prior usages cannot both commit.
        let user_usages = promo_code_usage::Entity::find()
            .filter(promo_code_usage::Column::PromoCodeId.eq(promo.id))
            .filter(promo_code_usage::Column::CustomerId.eq(customer_id))
            .count(conn)
            .await?;
        if user_usages >= promo.max_usage_per_user as u64 {
            return Err(ServiceError::PromoCodeLimitReached(code.to_string()));
        }
        let usage_ordinal = user_usages as i32 + 1;

        // Global cap: the conditional update is atomic on the row, so the
        // last remaining use goes to exactly one concurrent transaction.
        let update = promo_code::Entity::update_many()
            .col_expr(
                promo_code::Column::UsageCount,
                Expr::col(promo_code::Column::UsageCount).add(1),
            )
            .col_expr(promo_code::Column::UpdatedAt, Expr::value(now))
            .filter(promo_code::Column::Id.eq(promo.id))
            .filter(promo_code::Column::UsageCount.lt(promo.max_usage))
            .exec(conn)
            .await?;
        if update.rows_affected == 0 {
            return Err(ServiceError::PromoCodeLimitReached(code.to_string()));
        }

        let usage = promo_code_usage::ActiveModel {
            id: Set(Uuid::new_v4()),
            promo_code_id: Set(promo.id),
            order_id: Set(order_id),
            customer_id: Set(customer_id),
            usage_ordinal: Set(usage_ordinal),
            discount_amount: Set(discount),
            created_at: Set(now),
        };
        if let Err(e) = promo_code_usage::Entity::insert(usage).exec(conn).await {
            // A concurrent order from the same customer won this ordinal.
            // The whole checkout rolls back; the cap is never over-granted.
            return match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => {
                    Err(ServiceError::PromoCodeLimitReached(code.to_string()))
                }
                _ => Err(ServiceError::DatabaseError(e)),
            };
        }

        info!(discount, "promo code applied");
        Ok(discount)
    }
}

/// Computes the discount for a validated code, clamped to the subtotal.
pub fn compute_discount(
    promo: &promo_code::Model,
    cart_subtotal: i64,
) -> Result<i64, ServiceError> {
    let kind: DiscountType = promo
        .discount_type
        .parse()
        .map_err(|_| ServiceError::InvalidPromoCode(promo.code.clone()))?;

    let raw = match kind {
        DiscountType::Percentage => cart_subtotal * promo.discount_value / 100,
        DiscountType::FixedAmount => promo.discount_value,
    };

    let capped = if promo.max_discount_amount > 0 {
        raw.min(promo.max_discount_amount)
    } else {
        raw
    };

    Ok(capped.clamp(0, cart_subtotal))
}
