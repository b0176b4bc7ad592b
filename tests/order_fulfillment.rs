mod common;

use common::{date, spawn_app};
use rust_decimal::Decimal;
use uuid::Uuid;

use stockroom_api::{
    entities::document::DocKind,
    errors::ServiceError,
    services::fulfillment::{DocumentWithItems, NewDocument, NewDocumentItem},
};

fn order_request(
    warehouse: Uuid,
    items: Vec<NewDocumentItem>,
    user_id: Uuid,
) -> NewDocument {
    NewDocument {
        kind: DocKind::Order {
            customer_id: Uuid::new_v4(),
            priority: 1,
            expenses: None,
        },
        warehouse_id: warehouse,
        order_num: None,
        doc_date: None,
        as_draft: false,
        items,
        user_id,
    }
}

fn line(product: Uuid, quantity: i64, preferred: Option<Uuid>) -> NewDocumentItem {
    NewDocumentItem {
        product_id: product,
        quantity,
        unit_price: Decimal::from(8),
        bonus_stock: 0,
        expiration_date: None,
        preferred_warehouse_id: preferred,
    }
}

async fn create_order(
    app: &common::TestApp,
    warehouse: Uuid,
    items: Vec<NewDocumentItem>,
) -> DocumentWithItems {
    app.state
        .services
        .fulfillment
        .create_document(order_request(warehouse, items, app.user_id))
        .await
        .unwrap()
}

#[tokio::test]
async fn order_creation_moves_no_stock() {
    let app = spawn_app().await;
    let warehouse = Uuid::new_v4();
    let product = Uuid::new_v4();
    let batch = app
        .seed_batch(product, warehouse, 10, date(2026, 1, 1), None)
        .await;

    let order = create_order(&app, warehouse, vec![line(product, 5, None)]).await;
    assert_eq!(order.document.doc_status, "new");
    assert!(order.document.doc_num.starts_with("ORD-"));

    let level = app
        .state
        .services
        .inventory
        .stock_level(batch.id, warehouse)
        .await
        .unwrap();
    assert_eq!(level.available, 10);
}

#[tokio::test]
async fn full_coverage_fulfills_order_in_one_pass() {
    let app = spawn_app().await;
    let warehouse = Uuid::new_v4();
    let product = Uuid::new_v4();
    app.seed_batch(product, warehouse, 20, date(2026, 1, 1), None)
        .await;

    let order = create_order(&app, warehouse, vec![line(product, 8, None)]).await;

    let outcome = app
        .state
        .services
        .fulfillment
        .create_fulfillment_docs(order.document.id, app.user_id)
        .await
        .unwrap();

    assert_eq!(outcome.order.doc_status, "fulfilled");
    assert_eq!(outcome.generated.len(), 1);
    let generated = &outcome.generated[0];
    assert_eq!(generated.document.doc_status, "shipped");
    assert_eq!(generated.document.order_num.as_deref(), Some(order.document.doc_num.as_str()));
    assert_eq!(generated.items[0].quantity, 8);
}

#[tokio::test]
async fn partial_coverage_leaves_order_partially_fulfilled() {
    let app = spawn_app().await;
    let warehouse = Uuid::new_v4();
    let product = Uuid::new_v4();
    app.seed_batch(product, warehouse, 3, date(2026, 1, 1), None)
        .await;

    let order = create_order(&app, warehouse, vec![line(product, 10, None)]).await;

    let outcome = app
        .state
        .services
        .fulfillment
        .create_fulfillment_docs(order.document.id, app.user_id)
        .await
        .unwrap();
    assert_eq!(outcome.order.doc_status, "partially_fulfilled");

    let refreshed = app
        .state
        .services
        .fulfillment
        .get_document(order.document.id)
        .await
        .unwrap();
    assert_eq!(refreshed.items[0].quantity_fulfilled, 3);

    // Restock and finish the remainder in a second pass.
    app.seed_batch(product, warehouse, 10, date(2026, 2, 1), None)
        .await;
    let outcome = app
        .state
        .services
        .fulfillment
        .create_fulfillment_docs(order.document.id, app.user_id)
        .await
        .unwrap();
    assert_eq!(outcome.order.doc_status, "fulfilled");
    assert_eq!(outcome.generated[0].items[0].quantity, 7);
}

#[tokio::test]
async fn allocations_group_into_one_document_per_warehouse() {
    let app = spawn_app().await;
    let wh_a = Uuid::new_v4();
    let wh_b = Uuid::new_v4();
    let product = Uuid::new_v4();
    app.seed_batch(product, wh_a, 4, date(2026, 1, 1), None).await;
    app.seed_batch(product, wh_b, 10, date(2026, 1, 1), None).await;

    // Preferred warehouse holds only part of the requested quantity.
    let order = create_order(&app, wh_a, vec![line(product, 9, Some(wh_a))]).await;

    let outcome = app
        .state
        .services
        .fulfillment
        .create_fulfillment_docs(order.document.id, app.user_id)
        .await
        .unwrap();

    assert_eq!(outcome.order.doc_status, "fulfilled");
    assert_eq!(outcome.generated.len(), 2);

    let mut shipped: Vec<(Uuid, i64)> = outcome
        .generated
        .iter()
        .map(|g| (g.document.warehouse_id, g.items.iter().map(|i| i.quantity).sum()))
        .collect();
    shipped.sort();
    let mut expected = vec![(wh_a, 4), (wh_b, 5)];
    expected.sort();
    assert_eq!(shipped, expected);
}

#[tokio::test]
async fn duplicate_product_lines_share_the_available_pool() {
    let app = spawn_app().await;
    let warehouse = Uuid::new_v4();
    let product = Uuid::new_v4();
    app.seed_batch(product, warehouse, 10, date(2026, 1, 1), None)
        .await;

    // Two lines of the same product against 10 available units: the second
    // line must only see what the first one left over.
    let order = create_order(
        &app,
        warehouse,
        vec![line(product, 6, None), line(product, 6, None)],
    )
    .await;

    let outcome = app
        .state
        .services
        .fulfillment
        .create_fulfillment_docs(order.document.id, app.user_id)
        .await
        .unwrap();
    assert_eq!(outcome.order.doc_status, "partially_fulfilled");

    let shipped: i64 = outcome
        .generated
        .iter()
        .flat_map(|g| g.items.iter().map(|i| i.quantity))
        .sum();
    assert_eq!(shipped, 10);

    let refreshed = app
        .state
        .services
        .fulfillment
        .get_document(order.document.id)
        .await
        .unwrap();
    let mut fulfilled: Vec<i64> = refreshed
        .items
        .iter()
        .map(|i| i.quantity_fulfilled)
        .collect();
    fulfilled.sort();
    assert_eq!(fulfilled, vec![4, 6]);
}

#[tokio::test]
async fn no_stock_leaves_order_untouched() {
    let app = spawn_app().await;
    let warehouse = Uuid::new_v4();
    let product = Uuid::new_v4();

    let order = create_order(&app, warehouse, vec![line(product, 5, None)]).await;

    let outcome = app
        .state
        .services
        .fulfillment
        .create_fulfillment_docs(order.document.id, app.user_id)
        .await
        .unwrap();
    assert_eq!(outcome.order.doc_status, "new");
    assert!(outcome.generated.is_empty());
}

#[tokio::test]
async fn fulfilling_a_non_order_document_is_rejected() {
    let app = spawn_app().await;
    let warehouse = Uuid::new_v4();
    let product = Uuid::new_v4();

    let incoming = app
        .state
        .services
        .fulfillment
        .create_document(NewDocument {
            kind: DocKind::Incoming {
                supplier_id: Uuid::new_v4(),
                exchange_rate: None,
                expenses: None,
                vendor_code: None,
            },
            warehouse_id: warehouse,
            order_num: None,
            doc_date: None,
            as_draft: false,
            items: vec![line(product, 5, None)],
            user_id: app.user_id,
        })
        .await
        .unwrap();

    let err = app
        .state
        .services
        .fulfillment
        .create_fulfillment_docs(incoming.document.id, app.user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn fulfilled_order_cannot_be_fulfilled_again() {
    let app = spawn_app().await;
    let warehouse = Uuid::new_v4();
    let product = Uuid::new_v4();
    app.seed_batch(product, warehouse, 10, date(2026, 1, 1), None)
        .await;

    let order = create_order(&app, warehouse, vec![line(product, 5, None)]).await;
    app.state
        .services
        .fulfillment
        .create_fulfillment_docs(order.document.id, app.user_id)
        .await
        .unwrap();

    let err = app
        .state
        .services
        .fulfillment
        .create_fulfillment_docs(order.document.id, app.user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
}
