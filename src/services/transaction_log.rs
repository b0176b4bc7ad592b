use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::stock_transaction::{self, Entity as StockTransactionEntity, TransactionType},
    errors::ServiceError,
};

/// Input for one ledger entry. `previous_quantity` is the (batch, warehouse)
/// on-hand quantity before the movement; `change_quantity` is the signed
/// delta applied to it.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub transaction_type: TransactionType,
    pub product_id: Uuid,
    pub batch_id: Uuid,
    pub warehouse_id: Uuid,
    pub previous_quantity: i64,
    pub change_quantity: i64,
    pub document_id: Option<Uuid>,
    pub user_id: Uuid,
}

/// A history row with the running quantity computed from the entry itself.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct MovementEntry {
    #[serde(flatten)]
    pub transaction: stock_transaction::Model,
    pub new_quantity: i64,
}

/// Appends one ledger entry inside the caller's transaction. Pure append,
/// no business validation; callers own the pairing with counter mutations.
pub async fn record_in<C: ConnectionTrait>(
    conn: &C,
    entry: NewEntry,
) -> Result<stock_transaction::Model, ServiceError> {
    let model = stock_transaction::ActiveModel {
        id: Set(Uuid::new_v4()),
        transaction_type: Set(entry.transaction_type.as_str().to_string()),
        product_id: Set(entry.product_id),
        batch_id: Set(entry.batch_id),
        warehouse_id: Set(entry.warehouse_id),
        previous_quantity: Set(entry.previous_quantity),
        change_quantity: Set(entry.change_quantity),
        document_id: Set(entry.document_id),
        user_id: Set(entry.user_id),
        created_at: Set(Utc::now()),
    };

    model.insert(conn).await.map_err(ServiceError::db_error)
}

/// All entries tied to a document, newest first.
pub async fn entries_for_document_in<C: ConnectionTrait>(
    conn: &C,
    document_id: Uuid,
) -> Result<Vec<stock_transaction::Model>, ServiceError> {
    StockTransactionEntity::find()
        .filter(stock_transaction::Column::DocumentId.eq(document_id))
        .order_by_desc(stock_transaction::Column::CreatedAt)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

/// Deletes one entry by id. Only the cancellation reversal path may call
/// this, after applying the entry's negated delta to the live counters.
pub async fn delete_entry_in<C: ConnectionTrait>(
    conn: &C,
    entry_id: Uuid,
) -> Result<(), ServiceError> {
    StockTransactionEntity::delete_by_id(entry_id)
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;
    Ok(())
}

/// Whether any entry from a different document still references the batch.
pub async fn batch_referenced_elsewhere_in<C: ConnectionTrait>(
    conn: &C,
    batch_id: Uuid,
    excluding_document_id: Uuid,
) -> Result<bool, ServiceError> {
    use sea_orm::PaginatorTrait;

    let mut query = StockTransactionEntity::find()
        .filter(stock_transaction::Column::BatchId.eq(batch_id));
    query = query.filter(
        sea_orm::Condition::any()
            .add(stock_transaction::Column::DocumentId.is_null())
            .add(stock_transaction::Column::DocumentId.ne(excluding_document_id)),
    );

    let count = query.count(conn).await.map_err(ServiceError::db_error)?;
    Ok(count > 0)
}

/// Append-only audit trail of stock movements.
#[derive(Clone)]
pub struct TransactionLogService {
    db_pool: Arc<DbPool>,
}

impl TransactionLogService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Appends a single entry outside any orchestrated operation (used by
    /// the admin transaction endpoint; the caller has already applied the
    /// matching counter change in the same database transaction).
    pub async fn record(&self, entry: NewEntry) -> Result<stock_transaction::Model, ServiceError> {
        record_in(&*self.db_pool, entry).await
    }

    /// Movement history for a product in chronological order, with the
    /// running quantity computed per row.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn movement_history(
        &self,
        product_id: Uuid,
    ) -> Result<Vec<MovementEntry>, ServiceError> {
        let rows = StockTransactionEntity::find()
            .filter(stock_transaction::Column::ProductId.eq(product_id))
            .order_by_asc(stock_transaction::Column::CreatedAt)
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(rows
            .into_iter()
            .map(|t| {
                let new_quantity = t.previous_quantity + t.change_quantity;
                MovementEntry {
                    transaction: t,
                    new_quantity,
                }
            })
            .collect())
    }

    /// All entries tied to a document, newest first.
    pub async fn entries_for_document(
        &self,
        document_id: Uuid,
    ) -> Result<Vec<stock_transaction::Model>, ServiceError> {
        entries_for_document_in(&*self.db_pool, document_id).await
    }
}
