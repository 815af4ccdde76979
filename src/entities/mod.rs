pub mod order;
pub mod order_item;
pub mod payment_event;
pub mod product;
pub mod promo_code;
pub mod promo_code_usage;
