use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use tracing::warn;
use uuid::Uuid;

use crate::{
    entities::{
        batch::{self, BatchStatus, Entity as BatchEntity},
        inventory_record::{self, Entity as InventoryRecordEntity},
        stock_transaction::TransactionType,
    },
    errors::ServiceError,
    services::transaction_log::{self, NewEntry},
};

/// Input for registering one received batch.
#[derive(Debug, Clone)]
pub struct NewBatch {
    pub product_id: Uuid,
    pub supplier_id: Option<Uuid>,
    pub warehouse_id: Uuid,
    pub quantity_received: i64,
    pub purchase_price: Decimal,
    pub receipt_date: NaiveDate,
    pub expiration_date: Option<NaiveDate>,
    pub document_id: Option<Uuid>,
    pub user_id: Uuid,
}

/// Registers a batch inside the caller's transaction: the batch row, its
/// initial inventory record (available = received) and the incoming ledger
/// entry land together or not at all.
pub async fn create_batch_in<C: ConnectionTrait>(
    conn: &C,
    input: NewBatch,
) -> Result<batch::Model, ServiceError> {
    if input.quantity_received <= 0 {
        return Err(ServiceError::ValidationError(format!(
            "batch quantity must be positive, got {}",
            input.quantity_received
        )));
    }
    if let (Some(expiry), receipt) = (input.expiration_date, input.receipt_date) {
        if expiry < receipt {
            return Err(ServiceError::ValidationError(format!(
                "expiration date {} precedes receipt date {}",
                expiry, receipt
            )));
        }
    }

    let now = Utc::now();
    let model = batch::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(input.product_id),
        supplier_id: Set(input.supplier_id),
        warehouse_id: Set(input.warehouse_id),
        quantity_received: Set(input.quantity_received),
        purchase_price: Set(input.purchase_price),
        receipt_date: Set(input.receipt_date),
        expiration_date: Set(input.expiration_date),
        status: Set(BatchStatus::Active.as_str().to_string()),
        created_at: Set(now),
        updated_at: Set(now),
    };
    let created = model.insert(conn).await.map_err(ServiceError::db_error)?;

    let record = inventory_record::ActiveModel {
        id: Set(Uuid::new_v4()),
        batch_id: Set(created.id),
        warehouse_id: Set(input.warehouse_id),
        quantity_available: Set(input.quantity_received),
        quantity_reserved: Set(0),
        last_update: Set(now),
    };
    record.insert(conn).await.map_err(ServiceError::db_error)?;

    transaction_log::record_in(
        conn,
        NewEntry {
            transaction_type: TransactionType::Incoming,
            product_id: input.product_id,
            batch_id: created.id,
            warehouse_id: input.warehouse_id,
            previous_quantity: 0,
            change_quantity: input.quantity_received,
            document_id: input.document_id,
            user_id: input.user_id,
        },
    )
    .await?;

    Ok(created)
}

/// Deletes a batch during cancellation reversal, but only when nothing else
/// depends on it: no ledger entry from another document references it and
/// every one of its records is fully zeroed. Returns whether it was removed.
pub async fn retire_if_unused_in<C: ConnectionTrait>(
    conn: &C,
    batch_id: Uuid,
    cancelling_document_id: Uuid,
) -> Result<bool, ServiceError> {
    if transaction_log::batch_referenced_elsewhere_in(conn, batch_id, cancelling_document_id)
        .await?
    {
        return Ok(false);
    }

    let records = InventoryRecordEntity::find()
        .filter(inventory_record::Column::BatchId.eq(batch_id))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if records
        .iter()
        .any(|r| r.quantity_available != 0 || r.quantity_reserved != 0)
    {
        warn!(batch_id = %batch_id, "batch still holds stock after reversal, leaving in place");
        return Ok(false);
    }

    InventoryRecordEntity::delete_many()
        .filter(inventory_record::Column::BatchId.eq(batch_id))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    BatchEntity::delete_by_id(batch_id)
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(true)
}
