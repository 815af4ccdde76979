//! Background sweep that expires unpaid orders with lapsed reservations.

use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info};

use crate::services::orders::OrderService;

/// Runs the expiry sweep on a fixed interval until the process shuts down.
///
/// Spawned once at startup. Each pass scans for pending orders whose
/// reservation lease has lapsed and cancels them through the state
/// machine, returning reserved stock to the pool.
pub async fn run_expiry_sweep(orders: OrderService, period: Duration) {
    let mut ticker = interval(period);
    // The first tick fires immediately; skip it so startup is not
    // dominated by a sweep before the server is serving.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match orders.expire_lapsed().await {
            Ok(result) if result.expired_count > 0 => {
                info!(expired = result.expired_count, "expired lapsed reservations");
            }
            Ok(_) => {}
            Err(e) => {
                error!("expiry sweep failed: {}", e);
            }
        }
    }
}
