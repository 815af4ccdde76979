mod common;

use common::{order_request, TestApp};
use sea_orm::EntityTrait;
use uuid::Uuid;

use orderflow_api::entities::product;
use orderflow_api::errors::ServiceError;

/// Two checkouts race for the last unit; exactly one may win.
#[tokio::test]
async fn racing_checkouts_never_oversell_the_last_unit() {
    let app = TestApp::new().await;
    let widget = app.seed_product("RACE-W1", 9_999, 1).await;

    let orders_a = app.state.orders.clone();
    let orders_b = app.state.orders.clone();
    let widget_id = widget.id;

    let a = tokio::spawn(async move {
        orders_a
            .initialize(order_request(Uuid::new_v4(), vec![(widget_id, 1)], None))
            .await
    });
    let b = tokio::spawn(async move {
        orders_b
            .initialize(order_request(Uuid::new_v4(), vec![(widget_id, 1)], None))
            .await
    });

    let results = [a.await.unwrap(), b.await.unwrap()];
    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(ServiceError::InsufficientStock { .. })
    )));

    let fresh = product::Entity::find_by_id(widget.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fresh.stock_reserved, 1);
    assert_eq!(fresh.stock_on_hand, 1);
}

/// Many concurrent checkouts against a small pool: total reservations must
/// equal the stock, never more.
#[tokio::test]
async fn concurrent_checkouts_respect_the_stock_ceiling() {
    let app = TestApp::new().await;
    let widget = app.seed_product("RACE-W2", 1_000, 10).await;

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let orders = app.state.orders.clone();
        let widget_id = widget.id;
        tasks.push(tokio::spawn(async move {
            orders
                .initialize(order_request(Uuid::new_v4(), vec![(widget_id, 1)], None))
                .await
        }));
    }

    let mut successes = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => successes += 1,
            // Losing on stock or on lock contention are both legal
            // outcomes; reserving an eleventh unit is not.
            Err(ServiceError::InsufficientStock { .. })
            | Err(ServiceError::StockLockTimeout(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert!(successes <= 10, "oversold: {successes} reservations");
    assert!(successes > 0);

    let fresh = product::Entity::find_by_id(widget.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fresh.stock_reserved, successes);
}
