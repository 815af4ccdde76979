pub mod expiry;
pub mod idempotency;
pub mod order_state;
pub mod orders;
pub mod payments;
pub mod promo_codes;
pub mod reconciliation;
pub mod stock_lock;
