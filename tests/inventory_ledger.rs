mod common;

use common::{date, spawn_app};
use uuid::Uuid;

use stockroom_api::{
    errors::ServiceError,
    events::EventSender,
    services::{allocation::WarehouseScope, inventory},
};

#[tokio::test]
async fn reservation_moves_available_to_reserved_and_back() {
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let warehouse = Uuid::new_v4();
    let batch = app
        .seed_batch(product, warehouse, 10, date(2026, 1, 1), None)
        .await;

    let plan = app.state.services.inventory.reserve(product, 4).await.unwrap();
    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].quantity, 4);

    let level = app
        .state
        .services
        .inventory
        .stock_level(batch.id, warehouse)
        .await
        .unwrap();
    assert_eq!(level.available, 6);
    assert_eq!(level.reserved, 4);

    app.state
        .services
        .inventory
        .reserve_cancel(batch.id, warehouse, 4)
        .await
        .unwrap();

    let level = app
        .state
        .services
        .inventory
        .stock_level(batch.id, warehouse)
        .await
        .unwrap();
    assert_eq!(level.available, 10);
    assert_eq!(level.reserved, 0);
}

#[tokio::test]
async fn reservation_writes_no_ledger_entry() {
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let warehouse = Uuid::new_v4();
    app.seed_batch(product, warehouse, 10, date(2026, 1, 1), None)
        .await;

    app.state.services.inventory.reserve(product, 5).await.unwrap();

    let history = app
        .state
        .services
        .transactions
        .movement_history(product)
        .await
        .unwrap();
    // Only the seeding receipt is on the ledger.
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].transaction.transaction_type, "incoming");
}

#[tokio::test]
async fn oversell_is_rejected_with_shortfall() {
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let warehouse = Uuid::new_v4();
    app.seed_batch(product, warehouse, 3, date(2026, 1, 1), None)
        .await;

    let err = app
        .state
        .services
        .inventory
        .reserve(product, 5)
        .await
        .unwrap_err();
    match err {
        ServiceError::InsufficientStock(msg) => {
            assert!(msg.contains("short by 2"), "unexpected message: {msg}")
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    // Nothing was partially reserved.
    let rows = stockroom_api::services::allocation::fetch_stock_rows(&*app.db, product)
        .await
        .unwrap();
    assert_eq!(rows[0].available, 3);
    assert_eq!(rows[0].reserved, 0);
}

#[tokio::test]
async fn reserve_cancel_rejects_more_than_reserved() {
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let warehouse = Uuid::new_v4();
    let batch = app
        .seed_batch(product, warehouse, 10, date(2026, 1, 1), None)
        .await;

    app.state.services.inventory.reserve(product, 2).await.unwrap();

    let err = app
        .state
        .services
        .inventory
        .reserve_cancel(batch.id, warehouse, 3)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InsufficientReserved(_)));
}

#[tokio::test]
async fn racing_reservations_never_oversell() {
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let warehouse = Uuid::new_v4();
    let batch = app
        .seed_batch(product, warehouse, 10, date(2026, 1, 1), None)
        .await;

    // Two reservations of 6 against 10 available units; only one can win.
    let first = tokio::spawn({
        let inventory = app.state.services.inventory.clone();
        async move { inventory.reserve(product, 6).await }
    });
    let second = tokio::spawn({
        let inventory = app.state.services.inventory.clone();
        async move { inventory.reserve(product, 6).await }
    });
    let results = [first.await.unwrap(), second.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(ServiceError::InsufficientStock(_)))));

    let level = app
        .state
        .services
        .inventory
        .stock_level(batch.id, warehouse)
        .await
        .unwrap();
    assert_eq!(level.available, 4);
    assert_eq!(level.reserved, 6);
}

#[tokio::test]
async fn adjustment_succeeds_when_event_channel_is_closed() {
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let warehouse = Uuid::new_v4();
    let batch = app
        .seed_batch(product, warehouse, 10, date(2026, 1, 1), None)
        .await;

    let (tx, rx) = tokio::sync::mpsc::channel(1);
    drop(rx);
    let detached = inventory::InventoryService::new(app.db.clone(), EventSender::new(tx));

    // The send failure is logged, not surfaced.
    let level = detached
        .adjust(batch.id, warehouse, -2, app.user_id)
        .await
        .unwrap();
    assert_eq!(level.available, 8);
}

#[tokio::test]
async fn adjustment_pairs_counter_change_with_ledger_entry() {
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let warehouse = Uuid::new_v4();
    let batch = app
        .seed_batch(product, warehouse, 10, date(2026, 1, 1), None)
        .await;

    let level = app
        .state
        .services
        .inventory
        .adjust(batch.id, warehouse, -4, app.user_id)
        .await
        .unwrap();
    assert_eq!(level.available, 6);

    let history = app
        .state
        .services
        .transactions
        .movement_history(product)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    let adjustment = &history[1];
    assert_eq!(adjustment.transaction.transaction_type, "adjustment");
    assert_eq!(adjustment.transaction.change_quantity, -4);
    assert_eq!(adjustment.transaction.previous_quantity, 10);
    assert_eq!(adjustment.new_quantity, 6);
}

#[tokio::test]
async fn adjustment_below_zero_is_rejected_and_unlogged() {
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let warehouse = Uuid::new_v4();
    let batch = app
        .seed_batch(product, warehouse, 5, date(2026, 1, 1), None)
        .await;

    let err = app
        .state
        .services
        .inventory
        .adjust(batch.id, warehouse, -8, app.user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NegativeResult(_)));

    let level = app
        .state
        .services
        .inventory
        .stock_level(batch.id, warehouse)
        .await
        .unwrap();
    assert_eq!(level.available, 5);

    let history = app
        .state
        .services
        .transactions
        .movement_history(product)
        .await
        .unwrap();
    assert_eq!(history.len(), 1, "failed adjustment must not be logged");
}

#[tokio::test]
async fn set_available_books_the_difference() {
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let warehouse = Uuid::new_v4();
    let batch = app
        .seed_batch(product, warehouse, 10, date(2026, 1, 1), None)
        .await;

    let level = app
        .state
        .services
        .inventory
        .set_available(batch.id, warehouse, 7, app.user_id)
        .await
        .unwrap();
    assert_eq!(level.available, 7);

    let history = app
        .state
        .services
        .transactions
        .movement_history(product)
        .await
        .unwrap();
    assert_eq!(history.last().unwrap().transaction.change_quantity, -3);
}

#[tokio::test]
async fn replaying_ledger_reconstructs_on_hand_quantity() {
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let warehouse = Uuid::new_v4();
    let batch = app
        .seed_batch(product, warehouse, 20, date(2026, 1, 1), None)
        .await;

    app.state
        .services
        .inventory
        .adjust(batch.id, warehouse, -3, app.user_id)
        .await
        .unwrap();
    app.state
        .services
        .inventory
        .adjust(batch.id, warehouse, 5, app.user_id)
        .await
        .unwrap();

    let history = app
        .state
        .services
        .transactions
        .movement_history(product)
        .await
        .unwrap();
    let replayed: i64 = history.iter().map(|e| e.transaction.change_quantity).sum();

    let level = app
        .state
        .services
        .inventory
        .stock_level(batch.id, warehouse)
        .await
        .unwrap();
    assert_eq!(replayed, level.available + level.reserved);
    // Each entry's running quantity is consistent with the next one.
    for pair in history.windows(2) {
        assert_eq!(pair[0].new_quantity, pair[1].transaction.previous_quantity);
    }
}

#[tokio::test]
async fn fifo_allocation_prefers_soonest_expiry_across_warehouses() {
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let wh_a = Uuid::new_v4();
    let wh_b = Uuid::new_v4();
    let soon = app
        .seed_batch(product, wh_a, 5, date(2025, 12, 1), Some(date(2026, 1, 10)))
        .await;
    let later = app
        .seed_batch(product, wh_b, 5, date(2025, 12, 1), Some(date(2026, 1, 20)))
        .await;

    let plan = app
        .state
        .services
        .allocation
        .allocate(product, WarehouseScope::Any, 7)
        .await
        .unwrap();

    assert_eq!(plan.len(), 2);
    assert_eq!(plan[0].batch_id, soon.id);
    assert_eq!(plan[0].quantity, 5);
    assert_eq!(plan[1].batch_id, later.id);
    assert_eq!(plan[1].quantity, 2);
}

#[tokio::test]
async fn manual_entry_applies_delta_and_logs() {
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let warehouse = Uuid::new_v4();
    let batch = app
        .seed_batch(product, warehouse, 10, date(2026, 1, 1), None)
        .await;

    let entry = app
        .state
        .services
        .inventory
        .apply_manual_entry(
            stockroom_api::entities::stock_transaction::TransactionType::Adjustment,
            batch.id,
            warehouse,
            -2,
            None,
            app.user_id,
        )
        .await
        .unwrap();
    assert_eq!(entry.change_quantity, -2);
    assert_eq!(entry.product_id, product);

    let level = app
        .state
        .services
        .inventory
        .stock_level(batch.id, warehouse)
        .await
        .unwrap();
    assert_eq!(level.available, 8);
}

#[tokio::test]
async fn purge_removes_only_aged_zero_records() {
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let warehouse = Uuid::new_v4();
    app.seed_batch(product, warehouse, 5, date(2026, 1, 1), None)
        .await;

    // The record is non-zero and fresh, so nothing qualifies.
    let removed = app
        .state
        .services
        .inventory
        .purge_stale_records(chrono::Duration::zero())
        .await
        .unwrap();
    assert_eq!(removed, 0);
}

#[tokio::test]
async fn record_created_lazily_on_first_movement_to_new_warehouse() {
    let app = spawn_app().await;
    let product = Uuid::new_v4();
    let warehouse = Uuid::new_v4();
    let other_warehouse = Uuid::new_v4();
    let batch = app
        .seed_batch(product, warehouse, 10, date(2026, 1, 1), None)
        .await;

    let previous = inventory::apply_delta_in(&*app.db, batch.id, other_warehouse, 3)
        .await
        .unwrap();
    assert_eq!(previous, 0);

    let level = app
        .state
        .services
        .inventory
        .stock_level(batch.id, other_warehouse)
        .await
        .unwrap();
    assert_eq!(level.available, 3);
}
