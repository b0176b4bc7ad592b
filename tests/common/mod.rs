#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{ConnectOptions, Database};
use uuid::Uuid;

use stockroom_api::{
    config::AppConfig,
    db::{run_migrations, DbPool},
    entities::batch,
    events::spawn_event_processor,
    services::batches::{create_batch_in, NewBatch},
    AppState,
};

/// Test fixture backed by an in-memory SQLite database. The pool is capped
/// at one connection so every query sees the same database.
pub struct TestApp {
    pub db: Arc<DbPool>,
    pub state: AppState,
    pub user_id: Uuid,
}

pub async fn spawn_app() -> TestApp {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1);
    let db = Arc::new(
        Database::connect(options)
            .await
            .expect("failed to open in-memory database"),
    );
    run_migrations(&db).await.expect("migrations failed");

    let (event_sender, _event_handle) = spawn_event_processor(64);
    let config = AppConfig::new(
        "sqlite::memory:".into(),
        "127.0.0.1".into(),
        0,
        "test".into(),
    );
    let state = AppState::new(db.clone(), config, event_sender);

    TestApp {
        db,
        state,
        user_id: Uuid::new_v4(),
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

impl TestApp {
    /// Registers a batch with seeded availability, outside any document.
    pub async fn seed_batch(
        &self,
        product_id: Uuid,
        warehouse_id: Uuid,
        quantity: i64,
        receipt: NaiveDate,
        expiry: Option<NaiveDate>,
    ) -> batch::Model {
        create_batch_in(
            &*self.db,
            NewBatch {
                product_id,
                supplier_id: None,
                warehouse_id,
                quantity_received: quantity,
                purchase_price: Decimal::from(10),
                receipt_date: receipt,
                expiration_date: expiry,
                document_id: None,
                user_id: self.user_id,
            },
        )
        .await
        .expect("batch seeding failed")
    }
}
