use chrono::NaiveDate;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{
        batch::{self, BatchStatus, Entity as BatchEntity},
        inventory_record::Entity as InventoryRecordEntity,
    },
    errors::ServiceError,
};

/// Warehouse scope of an allocation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarehouseScope {
    /// Only records in this warehouse.
    Single(Uuid),
    /// Exhaust this warehouse first, then fall back to all others in
    /// deterministic FIFO order (warehouse id breaks remaining ties).
    Preferred(Uuid),
    /// Global FIFO walk across all warehouses.
    Any,
}

/// One line of an allocation plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Allocation {
    pub record_id: Uuid,
    pub batch_id: Uuid,
    pub warehouse_id: Uuid,
    pub quantity: i64,
}

/// A stock row eligible for allocation: the live counter joined with the
/// batch attributes that drive FIFO ordering.
#[derive(Debug, Clone)]
pub struct StockRow {
    pub record_id: Uuid,
    pub batch_id: Uuid,
    pub warehouse_id: Uuid,
    pub available: i64,
    pub reserved: i64,
    pub expiration_date: Option<NaiveDate>,
    pub receipt_date: NaiveDate,
}

/// Sorts rows into FIFO consumption order for the given scope.
///
/// Oldest stock first: expiration ascending (no expiration sorts last),
/// then receipt date ascending, then warehouse id and record id so the
/// order is fully deterministic across backends.
pub fn sort_fifo(rows: &mut [StockRow], scope: WarehouseScope) {
    rows.sort_by_key(|r| {
        let preferred_rank = match scope {
            WarehouseScope::Preferred(preferred) if r.warehouse_id == preferred => 0u8,
            _ => 1,
        };
        (
            preferred_rank,
            r.expiration_date.unwrap_or(NaiveDate::MAX),
            r.receipt_date,
            r.warehouse_id,
            r.record_id,
        )
    });
}

/// Greedy FIFO planning over the supplied rows. Pure function so the
/// ordering rules are testable without a database.
pub fn plan_allocations(
    mut rows: Vec<StockRow>,
    product_id: Uuid,
    scope: WarehouseScope,
    quantity: i64,
) -> Result<Vec<Allocation>, ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(format!(
            "allocation quantity must be positive, got {}",
            quantity
        )));
    }

    if let WarehouseScope::Single(warehouse_id) = scope {
        rows.retain(|r| r.warehouse_id == warehouse_id);
    }
    rows.retain(|r| r.available > 0);

    let total_available: i64 = rows.iter().map(|r| r.available).sum();
    if total_available < quantity {
        return Err(ServiceError::InsufficientStock(format!(
            "product {} short by {} units ({} requested, {} available)",
            product_id,
            quantity - total_available,
            quantity,
            total_available
        )));
    }

    sort_fifo(&mut rows, scope);

    let mut remaining = quantity;
    let mut plan = Vec::new();
    for row in rows {
        if remaining == 0 {
            break;
        }
        let take = row.available.min(remaining);
        plan.push(Allocation {
            record_id: row.record_id,
            batch_id: row.batch_id,
            warehouse_id: row.warehouse_id,
            quantity: take,
        });
        remaining -= take;
    }

    debug_assert_eq!(remaining, 0);
    Ok(plan)
}

/// Loads the live stock rows for a product (active batches only), joined
/// with the batch FIFO attributes.
pub async fn fetch_stock_rows<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<Vec<StockRow>, ServiceError> {
    let rows = InventoryRecordEntity::find()
        .find_also_related(BatchEntity)
        .filter(batch::Column::ProductId.eq(product_id))
        .filter(batch::Column::Status.eq(BatchStatus::Active.as_str()))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let mut stock = Vec::with_capacity(rows.len());
    for (record, maybe_batch) in rows {
        let batch = maybe_batch.ok_or_else(|| {
            ServiceError::InternalError(format!(
                "inventory record {} references missing batch {}",
                record.id, record.batch_id
            ))
        })?;
        stock.push(StockRow {
            record_id: record.id,
            batch_id: record.batch_id,
            warehouse_id: record.warehouse_id,
            available: record.quantity_available,
            reserved: record.quantity_reserved,
            expiration_date: batch.expiration_date,
            receipt_date: batch.receipt_date,
        });
    }
    Ok(stock)
}

/// Computes an allocation plan inside the caller's transaction.
pub async fn allocate_in<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    scope: WarehouseScope,
    quantity: i64,
) -> Result<Vec<Allocation>, ServiceError> {
    let rows = fetch_stock_rows(conn, product_id).await?;
    plan_allocations(rows, product_id, scope, quantity)
}

/// FIFO allocation planning over live inventory.
#[derive(Clone)]
pub struct AllocationService {
    db_pool: Arc<DbPool>,
}

impl AllocationService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Returns an ordered allocation plan summing exactly to `quantity`,
    /// or `InsufficientStock` naming the shortfall. Read-only: callers
    /// apply the plan through the inventory ledger.
    #[instrument(skip(self), fields(product_id = %product_id, quantity = quantity))]
    pub async fn allocate(
        &self,
        product_id: Uuid,
        scope: WarehouseScope,
        quantity: i64,
    ) -> Result<Vec<Allocation>, ServiceError> {
        allocate_in(&*self.db_pool, product_id, scope, quantity).await
    }
}
