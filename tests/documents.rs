mod common;

use common::{date, spawn_app};
use rust_decimal::Decimal;
use sea_orm::EntityTrait;
use uuid::Uuid;

use stockroom_api::{
    entities::{
        batch::Entity as BatchEntity,
        document::{DocKind, Entity as DocumentEntity},
        document_item::Entity as DocumentItemEntity,
        inventory_record::Entity as InventoryRecordEntity,
        stock_transaction::Entity as StockTransactionEntity,
    },
    errors::ServiceError,
    services::fulfillment::{NewDocument, NewDocumentItem},
};

fn item(product_id: Uuid, quantity: i64) -> NewDocumentItem {
    NewDocumentItem {
        product_id,
        quantity,
        unit_price: Decimal::from(5),
        bonus_stock: 0,
        expiration_date: None,
        preferred_warehouse_id: None,
    }
}

fn incoming(warehouse_id: Uuid, items: Vec<NewDocumentItem>, user_id: Uuid) -> NewDocument {
    NewDocument {
        kind: DocKind::Incoming {
            supplier_id: Uuid::new_v4(),
            exchange_rate: None,
            expenses: None,
            vendor_code: None,
        },
        warehouse_id,
        order_num: None,
        doc_date: None,
        as_draft: false,
        items,
        user_id,
    }
}

fn outgoing(warehouse_id: Uuid, items: Vec<NewDocumentItem>, user_id: Uuid) -> NewDocument {
    NewDocument {
        kind: DocKind::Outgoing {
            customer_id: Uuid::new_v4(),
        },
        warehouse_id,
        order_num: None,
        doc_date: None,
        as_draft: false,
        items,
        user_id,
    }
}

#[tokio::test]
async fn incoming_document_seeds_batches_and_ledger() {
    let app = spawn_app().await;
    let warehouse = Uuid::new_v4();
    let product = Uuid::new_v4();

    let created = app
        .state
        .services
        .fulfillment
        .create_document(incoming(warehouse, vec![item(product, 25)], app.user_id))
        .await
        .unwrap();

    assert_eq!(created.document.doc_status, "shipped");
    assert!(created.document.doc_num.starts_with("INC-"));
    let batch_id = created.items[0].batch_id.expect("line stamped with batch");

    let level = app
        .state
        .services
        .inventory
        .stock_level(batch_id, warehouse)
        .await
        .unwrap();
    assert_eq!(level.available, 25);

    let entries = app
        .state
        .services
        .transactions
        .entries_for_document(created.document.id)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].change_quantity, 25);
}

#[tokio::test]
async fn document_numbers_are_sequential_per_prefix() {
    let app = spawn_app().await;
    let warehouse = Uuid::new_v4();

    let first = app
        .state
        .services
        .fulfillment
        .create_document(incoming(warehouse, vec![item(Uuid::new_v4(), 1)], app.user_id))
        .await
        .unwrap();
    let second = app
        .state
        .services
        .fulfillment
        .create_document(incoming(warehouse, vec![item(Uuid::new_v4(), 1)], app.user_id))
        .await
        .unwrap();

    assert_eq!(first.document.doc_num, "INC-000001");
    assert_eq!(second.document.doc_num, "INC-000002");
}

#[tokio::test]
async fn outgoing_document_ships_fifo_from_its_warehouse() {
    let app = spawn_app().await;
    let warehouse = Uuid::new_v4();
    let product = Uuid::new_v4();
    let old = app
        .seed_batch(product, warehouse, 5, date(2025, 11, 1), Some(date(2026, 2, 1)))
        .await;
    let new = app
        .seed_batch(product, warehouse, 5, date(2025, 12, 1), Some(date(2026, 6, 1)))
        .await;

    let created = app
        .state
        .services
        .fulfillment
        .create_document(outgoing(warehouse, vec![item(product, 7)], app.user_id))
        .await
        .unwrap();
    assert_eq!(created.document.doc_status, "shipped");

    let old_level = app
        .state
        .services
        .inventory
        .stock_level(old.id, warehouse)
        .await
        .unwrap();
    let new_level = app
        .state
        .services
        .inventory
        .stock_level(new.id, warehouse)
        .await
        .unwrap();
    assert_eq!(old_level.available, 0);
    assert_eq!(new_level.available, 3);
}

#[tokio::test]
async fn failed_outgoing_leaves_no_trace() {
    let app = spawn_app().await;
    let warehouse = Uuid::new_v4();
    let plentiful = Uuid::new_v4();
    let scarce = Uuid::new_v4();
    let batch = app
        .seed_batch(plentiful, warehouse, 50, date(2026, 1, 1), None)
        .await;
    app.seed_batch(scarce, warehouse, 1, date(2026, 1, 1), None)
        .await;

    // Second line cannot be covered, so the whole document must fail.
    let err = app
        .state
        .services
        .fulfillment
        .create_document(outgoing(
            warehouse,
            vec![item(plentiful, 10), item(scarce, 5)],
            app.user_id,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InsufficientStock(_)));

    // The first line's decrement was rolled back.
    let level = app
        .state
        .services
        .inventory
        .stock_level(batch.id, warehouse)
        .await
        .unwrap();
    assert_eq!(level.available, 50);

    // No document, items, or ledger entries survived.
    assert_eq!(DocumentEntity::find().all(&*app.db).await.unwrap().len(), 0);
    assert_eq!(
        DocumentItemEntity::find().all(&*app.db).await.unwrap().len(),
        0
    );
    let entries = StockTransactionEntity::find().all(&*app.db).await.unwrap();
    // Only the two seeding receipts remain.
    assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn transfer_moves_stock_between_warehouses() {
    let app = spawn_app().await;
    let source = Uuid::new_v4();
    let destination = Uuid::new_v4();
    let product = Uuid::new_v4();
    let batch = app
        .seed_batch(product, source, 10, date(2026, 1, 1), None)
        .await;

    let created = app
        .state
        .services
        .fulfillment
        .create_document(NewDocument {
            kind: DocKind::Transfer {
                from_warehouse_id: source,
                to_warehouse_id: destination,
            },
            warehouse_id: source,
            order_num: None,
            doc_date: None,
            as_draft: false,
            items: vec![item(product, 6)],
            user_id: app.user_id,
        })
        .await
        .unwrap();
    assert_eq!(created.document.doc_status, "in_transit");
    assert!(created.document.doc_num.starts_with("TRF-"));

    let at_source = app
        .state
        .services
        .inventory
        .stock_level(batch.id, source)
        .await
        .unwrap();
    let at_destination = app
        .state
        .services
        .inventory
        .stock_level(batch.id, destination)
        .await
        .unwrap();
    assert_eq!(at_source.available, 4);
    assert_eq!(at_destination.available, 6);

    // Debit and credit entries, one per side.
    let entries = app
        .state
        .services
        .transactions
        .entries_for_document(created.document.id)
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries.iter().map(|e| e.change_quantity).sum::<i64>(), 0);
}

#[tokio::test]
async fn cancelling_outgoing_restores_stock_and_clears_entries() {
    let app = spawn_app().await;
    let warehouse = Uuid::new_v4();
    let product = Uuid::new_v4();
    let batch = app
        .seed_batch(product, warehouse, 10, date(2026, 1, 1), None)
        .await;

    let created = app
        .state
        .services
        .fulfillment
        .create_document(outgoing(warehouse, vec![item(product, 6)], app.user_id))
        .await
        .unwrap();

    let cancelled = app
        .state
        .services
        .fulfillment
        .cancel_document(created.document.id)
        .await
        .unwrap();
    assert_eq!(cancelled.doc_status, "canceled");

    let level = app
        .state
        .services
        .inventory
        .stock_level(batch.id, warehouse)
        .await
        .unwrap();
    assert_eq!(level.available, 10);

    let entries = app
        .state
        .services
        .transactions
        .entries_for_document(created.document.id)
        .await
        .unwrap();
    assert!(entries.is_empty());
}

#[tokio::test]
async fn cancelling_incoming_retires_unused_batch() {
    let app = spawn_app().await;
    let warehouse = Uuid::new_v4();
    let product = Uuid::new_v4();

    let created = app
        .state
        .services
        .fulfillment
        .create_document(incoming(warehouse, vec![item(product, 30)], app.user_id))
        .await
        .unwrap();
    let batch_id = created.items[0].batch_id.unwrap();

    app.state
        .services
        .fulfillment
        .cancel_document(created.document.id)
        .await
        .unwrap();

    // The batch and its record are gone, along with the document's entries.
    assert!(BatchEntity::find_by_id(batch_id)
        .one(&*app.db)
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        InventoryRecordEntity::find().all(&*app.db).await.unwrap().len(),
        0
    );
}

#[tokio::test]
async fn cancelling_incoming_keeps_partially_consumed_batch() {
    let app = spawn_app().await;
    let warehouse = Uuid::new_v4();
    let product = Uuid::new_v4();

    let created = app
        .state
        .services
        .fulfillment
        .create_document(incoming(warehouse, vec![item(product, 30)], app.user_id))
        .await
        .unwrap();
    let batch_id = created.items[0].batch_id.unwrap();

    // Another document consumed part of the batch.
    app.state
        .services
        .fulfillment
        .create_document(outgoing(warehouse, vec![item(product, 10)], app.user_id))
        .await
        .unwrap();

    // Reversal would drive the record negative, so cancellation fails and
    // nothing changes.
    let err = app
        .state
        .services
        .fulfillment
        .cancel_document(created.document.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NegativeResult(_)));

    let level = app
        .state
        .services
        .inventory
        .stock_level(batch_id, warehouse)
        .await
        .unwrap();
    assert_eq!(level.available, 20);
}

#[tokio::test]
async fn cancelling_twice_is_idempotent() {
    let app = spawn_app().await;
    let warehouse = Uuid::new_v4();
    let product = Uuid::new_v4();
    app.seed_batch(product, warehouse, 10, date(2026, 1, 1), None)
        .await;

    let created = app
        .state
        .services
        .fulfillment
        .create_document(outgoing(warehouse, vec![item(product, 2)], app.user_id))
        .await
        .unwrap();

    app.state
        .services
        .fulfillment
        .cancel_document(created.document.id)
        .await
        .unwrap();
    let again = app
        .state
        .services
        .fulfillment
        .cancel_document(created.document.id)
        .await
        .unwrap();
    assert_eq!(again.doc_status, "canceled");
}

#[tokio::test]
async fn draft_document_has_no_stock_effects() {
    let app = spawn_app().await;
    let warehouse = Uuid::new_v4();
    let product = Uuid::new_v4();

    let mut request = incoming(warehouse, vec![item(product, 10)], app.user_id);
    request.as_draft = true;
    let created = app
        .state
        .services
        .fulfillment
        .create_document(request)
        .await
        .unwrap();

    assert_eq!(created.document.doc_status, "draft");
    assert!(created.items[0].batch_id.is_none());
    assert_eq!(BatchEntity::find().all(&*app.db).await.unwrap().len(), 0);
}
