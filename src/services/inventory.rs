use chrono::{Duration, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{
        batch::Entity as BatchEntity,
        inventory_record::{self, Entity as InventoryRecordEntity},
        stock_transaction::TransactionType,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        allocation::{self, Allocation, WarehouseScope},
        transaction_log::{self, NewEntry},
    },
};

/// Current counters for one (batch, warehouse) pair.
#[derive(Debug, Clone, Copy, serde::Serialize, utoipa::ToSchema)]
pub struct StockLevel {
    pub batch_id: Uuid,
    pub warehouse_id: Uuid,
    pub available: i64,
    pub reserved: i64,
}

/// Moves `quantity` units from available to reserved on one record.
/// The availability guard is part of the UPDATE itself, so a concurrent
/// depletion makes the statement match zero rows instead of going negative.
async fn shift_available_to_reserved<C: ConnectionTrait>(
    conn: &C,
    record_id: Uuid,
    quantity: i64,
) -> Result<(), ServiceError> {
    let result = InventoryRecordEntity::update_many()
        .col_expr(
            inventory_record::Column::QuantityAvailable,
            Expr::col(inventory_record::Column::QuantityAvailable).sub(quantity),
        )
        .col_expr(
            inventory_record::Column::QuantityReserved,
            Expr::col(inventory_record::Column::QuantityReserved).add(quantity),
        )
        .col_expr(inventory_record::Column::LastUpdate, Expr::value(Utc::now()))
        .filter(inventory_record::Column::Id.eq(record_id))
        .filter(inventory_record::Column::QuantityAvailable.gte(quantity))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if result.rows_affected == 0 {
        return Err(ServiceError::InsufficientStock(format!(
            "record {} no longer has {} available units",
            record_id, quantity
        )));
    }
    Ok(())
}

/// Moves `quantity` units back from reserved to available on one record.
async fn shift_reserved_to_available<C: ConnectionTrait>(
    conn: &C,
    record_id: Uuid,
    quantity: i64,
) -> Result<(), ServiceError> {
    let result = InventoryRecordEntity::update_many()
        .col_expr(
            inventory_record::Column::QuantityReserved,
            Expr::col(inventory_record::Column::QuantityReserved).sub(quantity),
        )
        .col_expr(
            inventory_record::Column::QuantityAvailable,
            Expr::col(inventory_record::Column::QuantityAvailable).add(quantity),
        )
        .col_expr(inventory_record::Column::LastUpdate, Expr::value(Utc::now()))
        .filter(inventory_record::Column::Id.eq(record_id))
        .filter(inventory_record::Column::QuantityReserved.gte(quantity))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if result.rows_affected == 0 {
        return Err(ServiceError::InsufficientReserved(format!(
            "record {} no longer has {} reserved units",
            record_id, quantity
        )));
    }
    Ok(())
}

/// Removes `quantity` units from the reserved counter.
async fn consume_from_reserved<C: ConnectionTrait>(
    conn: &C,
    record_id: Uuid,
    quantity: i64,
) -> Result<(), ServiceError> {
    let result = InventoryRecordEntity::update_many()
        .col_expr(
            inventory_record::Column::QuantityReserved,
            Expr::col(inventory_record::Column::QuantityReserved).sub(quantity),
        )
        .col_expr(inventory_record::Column::LastUpdate, Expr::value(Utc::now()))
        .filter(inventory_record::Column::Id.eq(record_id))
        .filter(inventory_record::Column::QuantityReserved.gte(quantity))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if result.rows_affected == 0 {
        return Err(ServiceError::InsufficientReserved(format!(
            "record {} no longer has {} reserved units",
            record_id, quantity
        )));
    }
    Ok(())
}

async fn find_record<C: ConnectionTrait>(
    conn: &C,
    batch_id: Uuid,
    warehouse_id: Uuid,
) -> Result<Option<inventory_record::Model>, ServiceError> {
    InventoryRecordEntity::find()
        .filter(inventory_record::Column::BatchId.eq(batch_id))
        .filter(inventory_record::Column::WarehouseId.eq(warehouse_id))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)
}

/// Finds the record for the pair, creating a zeroed one on first movement.
pub async fn find_or_create_record_in<C: ConnectionTrait>(
    conn: &C,
    batch_id: Uuid,
    warehouse_id: Uuid,
) -> Result<inventory_record::Model, ServiceError> {
    if let Some(record) = find_record(conn, batch_id, warehouse_id).await? {
        return Ok(record);
    }

    let record = inventory_record::ActiveModel {
        id: Set(Uuid::new_v4()),
        batch_id: Set(batch_id),
        warehouse_id: Set(warehouse_id),
        quantity_available: Set(0),
        quantity_reserved: Set(0),
        last_update: Set(Utc::now()),
    };
    record.insert(conn).await.map_err(ServiceError::db_error)
}

/// Reserves `quantity` units of a product FIFO across the given scope.
/// Moves available into reserved on each allocated record; no ledger entry
/// is written because the physical on-hand quantity does not change.
pub async fn reserve_in<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    scope: WarehouseScope,
    quantity: i64,
) -> Result<Vec<Allocation>, ServiceError> {
    let plan = allocation::allocate_in(conn, product_id, scope, quantity).await?;
    for line in &plan {
        shift_available_to_reserved(conn, line.record_id, line.quantity).await?;
    }
    Ok(plan)
}

/// Returns `quantity` reserved units of one (batch, warehouse) pair back
/// to available.
pub async fn reserve_cancel_in<C: ConnectionTrait>(
    conn: &C,
    batch_id: Uuid,
    warehouse_id: Uuid,
    quantity: i64,
) -> Result<(), ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(format!(
            "reservation cancel quantity must be positive, got {}",
            quantity
        )));
    }
    let record = find_record(conn, batch_id, warehouse_id)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!(
                "no inventory record for batch {} in warehouse {}",
                batch_id, warehouse_id
            ))
        })?;
    if record.quantity_reserved < quantity {
        return Err(ServiceError::InsufficientReserved(format!(
            "batch {} in warehouse {} has {} reserved, {} requested",
            batch_id, warehouse_id, record.quantity_reserved, quantity
        )));
    }
    shift_reserved_to_available(conn, record.id, quantity).await
}

/// Releases `quantity` reserved units of a product in one warehouse back to
/// available, walking records in FIFO order. Used when a reserved document
/// is canceled; the walk stays inside the document's warehouse so another
/// document's reservation elsewhere is never touched.
pub async fn release_reserved_in<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    warehouse_id: Uuid,
    quantity: i64,
) -> Result<(), ServiceError> {
    let mut rows = allocation::fetch_stock_rows(conn, product_id).await?;
    rows.retain(|r| r.warehouse_id == warehouse_id && r.reserved > 0);

    let total_reserved: i64 = rows.iter().map(|r| r.reserved).sum();
    if total_reserved < quantity {
        return Err(ServiceError::InsufficientReserved(format!(
            "product {} has {} reserved in warehouse {}, {} requested",
            product_id, total_reserved, warehouse_id, quantity
        )));
    }

    allocation::sort_fifo(&mut rows, WarehouseScope::Any);
    let mut remaining = quantity;
    for row in rows {
        if remaining == 0 {
            break;
        }
        let take = row.reserved.min(remaining);
        shift_reserved_to_available(conn, row.record_id, take).await?;
        remaining -= take;
    }
    Ok(())
}

/// Consumes `quantity` reserved units of a product in one warehouse
/// (shipment of a reserved document). Each consumed slice lowers the
/// on-hand quantity, so an outgoing ledger entry is written per record
/// touched. Scoped to the warehouse whose reservation the document holds.
pub async fn consume_reserved_in<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    warehouse_id: Uuid,
    quantity: i64,
    document_id: Uuid,
    user_id: Uuid,
) -> Result<(), ServiceError> {
    let mut rows = allocation::fetch_stock_rows(conn, product_id).await?;
    rows.retain(|r| r.warehouse_id == warehouse_id && r.reserved > 0);

    let total_reserved: i64 = rows.iter().map(|r| r.reserved).sum();
    if total_reserved < quantity {
        return Err(ServiceError::InsufficientReserved(format!(
            "product {} has {} reserved in warehouse {}, {} requested",
            product_id, total_reserved, warehouse_id, quantity
        )));
    }

    allocation::sort_fifo(&mut rows, WarehouseScope::Any);
    let mut remaining = quantity;
    for row in rows {
        if remaining == 0 {
            break;
        }
        let take = row.reserved.min(remaining);
        consume_from_reserved(conn, row.record_id, take).await?;
        transaction_log::record_in(
            conn,
            NewEntry {
                transaction_type: TransactionType::Outgoing,
                product_id,
                batch_id: row.batch_id,
                warehouse_id: row.warehouse_id,
                previous_quantity: row.available + row.reserved,
                change_quantity: -take,
                document_id: Some(document_id),
                user_id,
            },
        )
        .await?;
        remaining -= take;
    }
    Ok(())
}

/// Applies a raw signed delta to the available counter of one pair,
/// creating the record on first use. Returns the on-hand quantity before
/// the change so the caller can write the matching ledger entry.
pub async fn apply_delta_in<C: ConnectionTrait>(
    conn: &C,
    batch_id: Uuid,
    warehouse_id: Uuid,
    delta: i64,
) -> Result<i64, ServiceError> {
    let record = find_or_create_record_in(conn, batch_id, warehouse_id).await?;
    let previous_on_hand = record.quantity_available + record.quantity_reserved;

    if delta >= 0 {
        InventoryRecordEntity::update_many()
            .col_expr(
                inventory_record::Column::QuantityAvailable,
                Expr::col(inventory_record::Column::QuantityAvailable).add(delta),
            )
            .col_expr(inventory_record::Column::LastUpdate, Expr::value(Utc::now()))
            .filter(inventory_record::Column::Id.eq(record.id))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;
    } else {
        let debit = -delta;
        let result = InventoryRecordEntity::update_many()
            .col_expr(
                inventory_record::Column::QuantityAvailable,
                Expr::col(inventory_record::Column::QuantityAvailable).sub(debit),
            )
            .col_expr(inventory_record::Column::LastUpdate, Expr::value(Utc::now()))
            .filter(inventory_record::Column::Id.eq(record.id))
            .filter(inventory_record::Column::QuantityAvailable.gte(debit))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NegativeResult(format!(
                "batch {} in warehouse {} has {} available, delta {} would go negative",
                batch_id, warehouse_id, record.quantity_available, delta
            )));
        }
    }

    Ok(previous_on_hand)
}

/// Manual stock adjustment: applies the delta and writes the paired
/// adjustment ledger entry in the caller's transaction.
pub async fn adjust_in<C: ConnectionTrait>(
    conn: &C,
    batch_id: Uuid,
    warehouse_id: Uuid,
    delta: i64,
    document_id: Option<Uuid>,
    user_id: Uuid,
) -> Result<StockLevel, ServiceError> {
    if delta == 0 {
        return Err(ServiceError::ValidationError(
            "adjustment delta must be non-zero".to_string(),
        ));
    }

    let batch = BatchEntity::find_by_id(batch_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("batch {} not found", batch_id)))?;

    let previous_on_hand = apply_delta_in(conn, batch_id, warehouse_id, delta).await?;

    transaction_log::record_in(
        conn,
        NewEntry {
            transaction_type: TransactionType::Adjustment,
            product_id: batch.product_id,
            batch_id,
            warehouse_id,
            previous_quantity: previous_on_hand,
            change_quantity: delta,
            document_id,
            user_id,
        },
    )
    .await?;

    let record = find_record(conn, batch_id, warehouse_id)
        .await?
        .ok_or_else(|| {
            ServiceError::InternalError(format!(
                "inventory record for batch {} vanished mid-transaction",
                batch_id
            ))
        })?;
    Ok(StockLevel {
        batch_id,
        warehouse_id,
        available: record.quantity_available,
        reserved: record.quantity_reserved,
    })
}

/// The inventory ledger: the only writer of stock counters. All public
/// methods run in their own database transaction; the orchestrator composes
/// the `_in` functions inside its own instead.
#[derive(Clone)]
pub struct InventoryService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

impl InventoryService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Reserves stock FIFO across all warehouses.
    #[instrument(skip(self), fields(product_id = %product_id, quantity = quantity))]
    pub async fn reserve(
        &self,
        product_id: Uuid,
        quantity: i64,
    ) -> Result<Vec<Allocation>, ServiceError> {
        let plan = self
            .db_pool
            .transaction::<_, Vec<Allocation>, ServiceError>(|txn| {
                Box::pin(async move {
                    reserve_in(txn, product_id, WarehouseScope::Any, quantity).await
                })
            })
            .await
            .map_err(ServiceError::from_txn_error)?;

        if let Err(e) = self
            .event_sender
            .send(Event::StockReserved {
                product_id,
                quantity,
            })
            .await
        {
            warn!(error = %e, "failed to emit stock reserved event");
        }
        Ok(plan)
    }

    /// Returns reserved units of one (batch, warehouse) pair to available.
    #[instrument(skip(self), fields(batch_id = %batch_id, warehouse_id = %warehouse_id))]
    pub async fn reserve_cancel(
        &self,
        batch_id: Uuid,
        warehouse_id: Uuid,
        quantity: i64,
    ) -> Result<(), ServiceError> {
        self.db_pool
            .transaction::<_, (), ServiceError>(|txn| {
                Box::pin(
                    async move { reserve_cancel_in(txn, batch_id, warehouse_id, quantity).await },
                )
            })
            .await
            .map_err(ServiceError::from_txn_error)
    }

    /// Manual adjustment with its paired ledger entry.
    #[instrument(skip(self), fields(batch_id = %batch_id, warehouse_id = %warehouse_id, delta = delta))]
    pub async fn adjust(
        &self,
        batch_id: Uuid,
        warehouse_id: Uuid,
        delta: i64,
        user_id: Uuid,
    ) -> Result<StockLevel, ServiceError> {
        let level = self
            .db_pool
            .transaction::<_, StockLevel, ServiceError>(|txn| {
                Box::pin(async move {
                    adjust_in(txn, batch_id, warehouse_id, delta, None, user_id).await
                })
            })
            .await
            .map_err(ServiceError::from_txn_error)?;

        if let Err(e) = self
            .event_sender
            .send(Event::StockAdjusted {
                batch_id,
                warehouse_id,
                change_quantity: delta,
            })
            .await
        {
            warn!(error = %e, "failed to emit stock adjusted event");
        }
        Ok(level)
    }

    /// Corrects the available counter to an absolute target quantity,
    /// recording the difference as an adjustment.
    #[instrument(skip(self), fields(batch_id = %batch_id, warehouse_id = %warehouse_id, new_quantity = new_quantity))]
    pub async fn set_available(
        &self,
        batch_id: Uuid,
        warehouse_id: Uuid,
        new_quantity: i64,
        user_id: Uuid,
    ) -> Result<StockLevel, ServiceError> {
        if new_quantity < 0 {
            return Err(ServiceError::ValidationError(format!(
                "target quantity must be non-negative, got {}",
                new_quantity
            )));
        }

        let (level, delta) = self
            .db_pool
            .transaction::<_, (StockLevel, i64), ServiceError>(|txn| {
                Box::pin(async move {
                    let current = find_record(txn, batch_id, warehouse_id)
                        .await?
                        .map(|r| r.quantity_available)
                        .unwrap_or(0);
                    let delta = new_quantity - current;
                    if delta == 0 {
                        let record =
                            find_or_create_record_in(txn, batch_id, warehouse_id).await?;
                        let level = StockLevel {
                            batch_id,
                            warehouse_id,
                            available: record.quantity_available,
                            reserved: record.quantity_reserved,
                        };
                        return Ok((level, 0));
                    }
                    let level =
                        adjust_in(txn, batch_id, warehouse_id, delta, None, user_id).await?;
                    Ok((level, delta))
                })
            })
            .await
            .map_err(ServiceError::from_txn_error)?;

        if delta != 0 {
            if let Err(e) = self
                .event_sender
                .send(Event::StockAdjusted {
                    batch_id,
                    warehouse_id,
                    change_quantity: delta,
                })
                .await
            {
                warn!(error = %e, "failed to emit stock adjusted event");
            }
        }
        Ok(level)
    }

    /// Applies a raw ledger entry: mutates the available counter by the
    /// entry's delta and appends the matching row, atomically. Admin path.
    #[instrument(skip(self), fields(batch_id = %batch_id, warehouse_id = %warehouse_id, delta = delta))]
    pub async fn apply_manual_entry(
        &self,
        entry_type: TransactionType,
        batch_id: Uuid,
        warehouse_id: Uuid,
        delta: i64,
        document_id: Option<Uuid>,
        user_id: Uuid,
    ) -> Result<crate::entities::stock_transaction::Model, ServiceError> {
        if delta == 0 {
            return Err(ServiceError::ValidationError(
                "ledger entry delta must be non-zero".to_string(),
            ));
        }

        self.db_pool
            .transaction::<_, crate::entities::stock_transaction::Model, ServiceError>(|txn| {
                Box::pin(async move {
                    let batch = BatchEntity::find_by_id(batch_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("batch {} not found", batch_id))
                        })?;

                    let previous = apply_delta_in(txn, batch_id, warehouse_id, delta).await?;
                    transaction_log::record_in(
                        txn,
                        NewEntry {
                            transaction_type: entry_type,
                            product_id: batch.product_id,
                            batch_id,
                            warehouse_id,
                            previous_quantity: previous,
                            change_quantity: delta,
                            document_id,
                            user_id,
                        },
                    )
                    .await
                })
            })
            .await
            .map_err(ServiceError::from_txn_error)
    }

    /// Current counters for one pair.
    #[instrument(skip(self), fields(batch_id = %batch_id, warehouse_id = %warehouse_id))]
    pub async fn stock_level(
        &self,
        batch_id: Uuid,
        warehouse_id: Uuid,
    ) -> Result<StockLevel, ServiceError> {
        let record = find_record(&*self.db_pool, batch_id, warehouse_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "no inventory record for batch {} in warehouse {}",
                    batch_id, warehouse_id
                ))
            })?;
        Ok(StockLevel {
            batch_id,
            warehouse_id,
            available: record.quantity_available,
            reserved: record.quantity_reserved,
        })
    }

    /// Deletes fully zeroed records untouched for longer than the grace
    /// period. Keeping fresh zero rows avoids churn when stock cycles.
    #[instrument(skip(self))]
    pub async fn purge_stale_records(&self, grace: Duration) -> Result<u64, ServiceError> {
        let cutoff = Utc::now() - grace;
        let result = InventoryRecordEntity::delete_many()
            .filter(inventory_record::Column::QuantityAvailable.eq(0))
            .filter(inventory_record::Column::QuantityReserved.eq(0))
            .filter(inventory_record::Column::LastUpdate.lt(cutoff))
            .exec(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ConnectOptions, Database};

    async fn test_db() -> DbPool {
        let mut options = ConnectOptions::new("sqlite::memory:");
        options.max_connections(1).min_connections(1);
        let db = Database::connect(options)
            .await
            .expect("failed to open in-memory database");
        crate::db::run_migrations(&db).await.expect("migrations failed");
        db
    }

    async fn counters(db: &DbPool, batch_id: Uuid, warehouse_id: Uuid) -> (i64, i64) {
        let record = find_record(db, batch_id, warehouse_id)
            .await
            .unwrap()
            .expect("record exists");
        (record.quantity_available, record.quantity_reserved)
    }

    #[tokio::test]
    async fn reserve_shift_matches_zero_rows_when_availability_is_gone() {
        let db = test_db().await;
        let batch_id = Uuid::new_v4();
        let warehouse_id = Uuid::new_v4();
        let record = find_or_create_record_in(&db, batch_id, warehouse_id)
            .await
            .unwrap();
        apply_delta_in(&db, batch_id, warehouse_id, 5).await.unwrap();

        let err = shift_available_to_reserved(&db, record.id, 6)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientStock(_)));
        assert_eq!(counters(&db, batch_id, warehouse_id).await, (5, 0));

        shift_available_to_reserved(&db, record.id, 5).await.unwrap();
        assert_eq!(counters(&db, batch_id, warehouse_id).await, (0, 5));
    }

    #[tokio::test]
    async fn reserved_counter_shifts_guard_against_underflow() {
        let db = test_db().await;
        let batch_id = Uuid::new_v4();
        let warehouse_id = Uuid::new_v4();
        let record = find_or_create_record_in(&db, batch_id, warehouse_id)
            .await
            .unwrap();
        apply_delta_in(&db, batch_id, warehouse_id, 4).await.unwrap();
        shift_available_to_reserved(&db, record.id, 3).await.unwrap();

        let err = shift_reserved_to_available(&db, record.id, 4)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientReserved(_)));
        let err = consume_from_reserved(&db, record.id, 4).await.unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientReserved(_)));
        assert_eq!(counters(&db, batch_id, warehouse_id).await, (1, 3));

        consume_from_reserved(&db, record.id, 3).await.unwrap();
        assert_eq!(counters(&db, batch_id, warehouse_id).await, (1, 0));
    }
}
