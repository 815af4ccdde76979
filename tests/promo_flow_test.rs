mod common;

use assert_matches::assert_matches;
use common::{order_request, TestApp};
use sea_orm::{ActiveModelTrait, EntityTrait, Set, SqlErr};
use uuid::Uuid;

use orderflow_api::entities::{product, promo_code, promo_code_usage};
use orderflow_api::errors::ServiceError;

async fn product_by_id(app: &TestApp, id: Uuid) -> product::Model {
    product::Entity::find_by_id(id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn percentage_discount_reduces_the_total() {
    let app = TestApp::new().await;
    let widget = app.seed_product("PROMO-W1", 10_000, 10).await;
    app.seed_promo("TENOFF", 10, 100, 5).await;

    let (order, _) = app
        .state
        .orders
        .initialize(order_request(
            Uuid::new_v4(),
            vec![(widget.id, 2)],
            Some("TENOFF"),
        ))
        .await
        .unwrap();

    assert_eq!(order.subtotal, 20_000);
    assert_eq!(order.discount_amount, 2_000);
    assert_eq!(order.total, 18_000);
    assert_eq!(order.promo_code.as_deref(), Some("TENOFF"));
}

#[tokio::test]
async fn unknown_promo_code_fails_the_order_and_rolls_back_stock() {
    let app = TestApp::new().await;
    let widget = app.seed_product("PROMO-W2", 5_000, 5).await;

    let err = app
        .state
        .orders
        .initialize(order_request(
            Uuid::new_v4(),
            vec![(widget.id, 2)],
            Some("NOSUCHCODE"),
        ))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidPromoCode(_));

    // The stock reserved earlier in the same transaction must roll back.
    assert_eq!(product_by_id(&app, widget.id).await.stock_reserved, 0);
}

#[tokio::test]
async fn global_usage_cap_is_enforced() {
    let app = TestApp::new().await;
    let widget = app.seed_product("PROMO-W3", 5_000, 50).await;
    app.seed_promo("ONCE", 20, 1, 1).await;

    app.state
        .orders
        .initialize(order_request(Uuid::new_v4(), vec![(widget.id, 1)], Some("ONCE")))
        .await
        .unwrap();

    let err = app
        .state
        .orders
        .initialize(order_request(Uuid::new_v4(), vec![(widget.id, 1)], Some("ONCE")))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::PromoCodeLimitReached(_));

    // Only the first order's reservation survives the second rollback.
    assert_eq!(product_by_id(&app, widget.id).await.stock_reserved, 1);

    let code = promo_code::Entity::find()
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(code.usage_count, 1);
}

#[tokio::test]
async fn per_user_usage_cap_is_enforced() {
    let app = TestApp::new().await;
    let widget = app.seed_product("PROMO-W4", 5_000, 50).await;
    app.seed_promo("PERUSER", 20, 100, 1).await;

    let repeat_customer = Uuid::new_v4();
    app.state
        .orders
        .initialize(order_request(
            repeat_customer,
            vec![(widget.id, 1)],
            Some("PERUSER"),
        ))
        .await
        .unwrap();

    let err = app
        .state
        .orders
        .initialize(order_request(
            repeat_customer,
            vec![(widget.id, 1)],
            Some("PERUSER"),
        ))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::PromoCodeLimitReached(_));

    // A different customer is still within the global cap.
    app.state
        .orders
        .initialize(order_request(
            Uuid::new_v4(),
            vec![(widget.id, 1)],
            Some("PERUSER"),
        ))
        .await
        .unwrap();
}

/// Same customer racing two checkouts for the last per-user slot: at most
/// one order may consume it.
#[tokio::test]
async fn per_user_cap_holds_under_concurrent_checkouts() {
    let app = TestApp::new().await;
    let widget = app.seed_product("PROMO-W5", 5_000, 50).await;
    app.seed_promo("RACEUSER", 20, 100, 1).await;

    let repeat_customer = Uuid::new_v4();
    let orders_a = app.state.orders.clone();
    let orders_b = app.state.orders.clone();
    let widget_id = widget.id;

    let a = tokio::spawn(async move {
        orders_a
            .initialize(order_request(
                repeat_customer,
                vec![(widget_id, 1)],
                Some("RACEUSER"),
            ))
            .await
    });
    let b = tokio::spawn(async move {
        orders_b
            .initialize(order_request(
                repeat_customer,
                vec![(widget_id, 1)],
                Some("RACEUSER"),
            ))
            .await
    });

    let results = [a.await.unwrap(), b.await.unwrap()];
    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(ServiceError::PromoCodeLimitReached(_))
    )));

    let usages = promo_code_usage::Entity::find()
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(usages.len(), 1);
    // Only the winning order's reservation survives.
    assert_eq!(product_by_id(&app, widget.id).await.stock_reserved, 1);
}

/// The (promo_code_id, customer_id, usage_ordinal) unique index is the
/// transactional backstop: two rows claiming the same per-user slot
/// cannot both exist, regardless of what the application counted.
#[tokio::test]
async fn duplicate_per_user_slot_is_rejected_by_the_schema() {
    let app = TestApp::new().await;
    let promo = app.seed_promo("SLOTTED", 10, 100, 5).await;
    let customer = Uuid::new_v4();

    let usage_row = |order_id: Uuid| promo_code_usage::ActiveModel {
        id: Set(Uuid::new_v4()),
        promo_code_id: Set(promo.id),
        order_id: Set(order_id),
        customer_id: Set(customer),
        usage_ordinal: Set(1),
        discount_amount: Set(500),
        created_at: Set(chrono::Utc::now()),
    };

    usage_row(Uuid::new_v4()).insert(&*app.state.db).await.unwrap();

    let err = usage_row(Uuid::new_v4())
        .insert(&*app.state.db)
        .await
        .unwrap_err();
    assert_matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)));
}
