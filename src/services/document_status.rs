use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{
        document::{self, DocStatus, DocType, Entity as DocumentEntity},
        document_item::{self, Entity as DocumentItemEntity},
        stock_transaction::TransactionType,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        allocation::{self, WarehouseScope},
        batches::{self, NewBatch},
        inventory,
        transaction_log::{self, NewEntry},
    },
};

/// Statuses reachable from `from` for the given document type. Terminal
/// statuses (and unreachable ones) return an empty slice.
pub fn allowed_transitions(doc_type: DocType, from: DocStatus) -> &'static [DocStatus] {
    use DocStatus::*;
    match (doc_type, from) {
        (DocType::Outgoing, Draft) => &[Reserved, Canceled],
        (DocType::Outgoing, Reserved) => &[Shipped, Canceled],
        (DocType::Outgoing, Shipped) => &[Completed, Canceled],

        (DocType::Incoming, Draft) => &[Shipped, Canceled],
        (DocType::Incoming, Shipped) => &[InTransitHub, Canceled],
        (DocType::Incoming, InTransitHub) => &[InTransitDestination, Canceled],
        (DocType::Incoming, InTransitDestination) => &[Delivered, Canceled],
        (DocType::Incoming, Delivered) => &[Completed, Canceled],

        (DocType::Transfer, Draft) => &[InTransit, Canceled],
        (DocType::Transfer, InTransit) => &[Completed, Canceled],

        (DocType::Order, Draft) => &[New, Canceled],
        (DocType::Order, New) => &[PartiallyFulfilled, Fulfilled, Canceled],
        (DocType::Order, PartiallyFulfilled) => &[Fulfilled, Canceled],
        (DocType::Order, Fulfilled) => &[Completed, Canceled],

        _ => &[],
    }
}

pub fn can_transition(doc_type: DocType, from: DocStatus, to: DocStatus) -> bool {
    allowed_transitions(doc_type, from).contains(&to)
}

/// Result of a status update.
#[derive(Debug, Clone)]
pub struct StatusOutcome {
    pub document: document::Model,
    /// False for the idempotent same-status no-op.
    pub changed: bool,
    /// Ledger entries reversed, non-zero only on cancellation.
    pub reversed_transactions: usize,
}

/// Units a line moves through stock: ordered quantity plus bonus units.
pub fn item_units(item: &document_item::Model) -> i64 {
    item.quantity + item.bonus_stock
}

pub async fn load_document_in<C: ConnectionTrait>(
    conn: &C,
    document_id: Uuid,
) -> Result<document::Model, ServiceError> {
    DocumentEntity::find_by_id(document_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("document {} not found", document_id)))
}

pub async fn load_items_in<C: ConnectionTrait>(
    conn: &C,
    document_id: Uuid,
) -> Result<Vec<document_item::Model>, ServiceError> {
    DocumentItemEntity::find()
        .filter(document_item::Column::DocumentId.eq(document_id))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

async fn persist_status<C: ConnectionTrait>(
    conn: &C,
    doc: document::Model,
    status: DocStatus,
) -> Result<document::Model, ServiceError> {
    let mut active: document::ActiveModel = doc.into();
    active.doc_status = Set(status.as_str().to_string());
    active.updated_at = Set(Some(chrono::Utc::now()));
    active.update(conn).await.map_err(ServiceError::db_error)
}

/// Creates one batch per line of an incoming document, seeding availability
/// and the receipt ledger entry. Lines are stamped with their batch id.
pub async fn post_incoming_items_in<C: ConnectionTrait>(
    conn: &C,
    doc: &document::Model,
    items: &[document_item::Model],
    user_id: Uuid,
) -> Result<(), ServiceError> {
    for item in items {
        let created = batches::create_batch_in(
            conn,
            NewBatch {
                product_id: item.product_id,
                supplier_id: doc.supplier_id,
                warehouse_id: doc.warehouse_id,
                quantity_received: item_units(item),
                purchase_price: item.unit_price,
                receipt_date: doc.doc_date.date_naive(),
                expiration_date: item.expiration_date,
                document_id: Some(doc.id),
                user_id,
            },
        )
        .await?;

        let mut line: document_item::ActiveModel = item.clone().into();
        line.batch_id = Set(Some(created.id));
        line.update(conn).await.map_err(ServiceError::db_error)?;
    }
    Ok(())
}

/// Ships the lines of an outgoing document straight from available stock
/// in the document's warehouse, FIFO, writing one outgoing entry per
/// (batch, warehouse) touched. Fails whole on any shortfall.
pub async fn post_outgoing_items_in<C: ConnectionTrait>(
    conn: &C,
    doc: &document::Model,
    items: &[document_item::Model],
    user_id: Uuid,
) -> Result<(), ServiceError> {
    for item in items {
        let plan = allocation::allocate_in(
            conn,
            item.product_id,
            WarehouseScope::Single(doc.warehouse_id),
            item_units(item),
        )
        .await?;
        for line in plan {
            let previous =
                inventory::apply_delta_in(conn, line.batch_id, line.warehouse_id, -line.quantity)
                    .await?;
            transaction_log::record_in(
                conn,
                NewEntry {
                    transaction_type: TransactionType::Outgoing,
                    product_id: item.product_id,
                    batch_id: line.batch_id,
                    warehouse_id: line.warehouse_id,
                    previous_quantity: previous,
                    change_quantity: -line.quantity,
                    document_id: Some(doc.id),
                    user_id,
                },
            )
            .await?;
        }
    }
    Ok(())
}

/// Moves the lines of a transfer document between warehouses: FIFO debit
/// from the source, credit of the same batch at the destination, one
/// transfer entry on each side.
pub async fn post_transfer_items_in<C: ConnectionTrait>(
    conn: &C,
    doc: &document::Model,
    items: &[document_item::Model],
    user_id: Uuid,
) -> Result<(), ServiceError> {
    let from = doc.from_warehouse_id.ok_or_else(|| {
        ServiceError::InternalError(format!("transfer {} has no source warehouse", doc.id))
    })?;
    let to = doc.to_warehouse_id.ok_or_else(|| {
        ServiceError::InternalError(format!("transfer {} has no destination warehouse", doc.id))
    })?;

    for item in items {
        let plan = allocation::allocate_in(
            conn,
            item.product_id,
            WarehouseScope::Single(from),
            item_units(item),
        )
        .await?;
        for line in plan {
            let debited =
                inventory::apply_delta_in(conn, line.batch_id, from, -line.quantity).await?;
            transaction_log::record_in(
                conn,
                NewEntry {
                    transaction_type: TransactionType::Transfer,
                    product_id: item.product_id,
                    batch_id: line.batch_id,
                    warehouse_id: from,
                    previous_quantity: debited,
                    change_quantity: -line.quantity,
                    document_id: Some(doc.id),
                    user_id,
                },
            )
            .await?;

            let credited =
                inventory::apply_delta_in(conn, line.batch_id, to, line.quantity).await?;
            transaction_log::record_in(
                conn,
                NewEntry {
                    transaction_type: TransactionType::Transfer,
                    product_id: item.product_id,
                    batch_id: line.batch_id,
                    warehouse_id: to,
                    previous_quantity: credited,
                    change_quantity: line.quantity,
                    document_id: Some(doc.id),
                    user_id,
                },
            )
            .await?;
        }
    }
    Ok(())
}

/// Undoes every ledger entry of a document: applies the negated delta back
/// to the record, deletes the entry, then retires batches the document
/// created if nothing else uses them. Returns the number of reversed
/// entries.
pub async fn reverse_movements_in<C: ConnectionTrait>(
    conn: &C,
    document_id: Uuid,
) -> Result<usize, ServiceError> {
    let entries = transaction_log::entries_for_document_in(conn, document_id).await?;
    let mut created_batches = Vec::new();

    for entry in &entries {
        inventory::apply_delta_in(conn, entry.batch_id, entry.warehouse_id, -entry.change_quantity)
            .await?;
        if entry.transaction_type == TransactionType::Incoming.as_str() {
            created_batches.push(entry.batch_id);
        }
        transaction_log::delete_entry_in(conn, entry.id).await?;
    }

    created_batches.sort();
    created_batches.dedup();
    for batch_id in created_batches {
        batches::retire_if_unused_in(conn, batch_id, document_id).await?;
    }

    Ok(entries.len())
}

/// Releases the open reservations behind a reserved outgoing document,
/// scoped to the warehouse the reservation was taken in.
async fn release_reservations_in<C: ConnectionTrait>(
    conn: &C,
    warehouse_id: Uuid,
    items: &[document_item::Model],
) -> Result<(), ServiceError> {
    for item in items {
        inventory::release_reserved_in(conn, item.product_id, warehouse_id, item_units(item))
            .await?;
    }
    Ok(())
}

/// Applies a legal transition inside the caller's transaction: runs the
/// type-specific side effects first, persists the status only after they
/// all succeed.
pub async fn update_status_in<C: ConnectionTrait>(
    conn: &C,
    document_id: Uuid,
    new_status: DocStatus,
    user_id: Uuid,
) -> Result<StatusOutcome, ServiceError> {
    let doc = load_document_in(conn, document_id).await?;
    let doc_type = doc.doc_type()?;
    let current = doc.status()?;

    if current == new_status {
        return Ok(StatusOutcome {
            document: doc,
            changed: false,
            reversed_transactions: 0,
        });
    }

    if !can_transition(doc_type, current, new_status) {
        return Err(ServiceError::IllegalTransition(format!(
            "{} document: {} -> {}",
            doc_type.as_str(),
            current.as_str(),
            new_status.as_str()
        )));
    }

    let items = load_items_in(conn, document_id).await?;
    let already_posted = !transaction_log::entries_for_document_in(conn, document_id)
        .await?
        .is_empty();

    let mut reversed = 0usize;
    match (doc_type, current, new_status) {
        (DocType::Outgoing, DocStatus::Draft, DocStatus::Reserved) => {
            for item in &items {
                inventory::reserve_in(
                    conn,
                    item.product_id,
                    WarehouseScope::Single(doc.warehouse_id),
                    item_units(item),
                )
                .await?;
            }
        }
        (DocType::Outgoing, DocStatus::Reserved, DocStatus::Shipped) => {
            for item in &items {
                inventory::consume_reserved_in(
                    conn,
                    item.product_id,
                    doc.warehouse_id,
                    item_units(item),
                    doc.id,
                    user_id,
                )
                .await?;
            }
        }
        (DocType::Outgoing, DocStatus::Reserved, DocStatus::Canceled) => {
            release_reservations_in(conn, doc.warehouse_id, &items).await?;
        }
        (DocType::Incoming, DocStatus::Draft, DocStatus::Shipped) if !already_posted => {
            post_incoming_items_in(conn, &doc, &items, user_id).await?;
        }
        (DocType::Transfer, DocStatus::Draft, DocStatus::InTransit) if !already_posted => {
            post_transfer_items_in(conn, &doc, &items, user_id).await?;
        }
        (_, _, DocStatus::Canceled) => {
            reversed = reverse_movements_in(conn, document_id).await?;
        }
        _ => {}
    }

    let updated = persist_status(conn, doc, new_status).await?;
    Ok(StatusOutcome {
        document: updated,
        changed: true,
        reversed_transactions: reversed,
    })
}

/// Drives the per-type document state machines.
#[derive(Clone)]
pub struct DocumentStatusService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

impl DocumentStatusService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Applies one transition atomically with its stock side effects.
    /// A same-status request succeeds without touching anything.
    #[instrument(skip(self), fields(document_id = %document_id, new_status = new_status.as_str()))]
    pub async fn update_status(
        &self,
        document_id: Uuid,
        new_status: DocStatus,
        user_id: Uuid,
    ) -> Result<StatusOutcome, ServiceError> {
        let old_status = load_document_in(&*self.db_pool, document_id)
            .await?
            .doc_status;

        let outcome = self
            .db_pool
            .transaction::<_, StatusOutcome, ServiceError>(move |txn| {
                Box::pin(
                    async move { update_status_in(txn, document_id, new_status, user_id).await },
                )
            })
            .await
            .map_err(ServiceError::from_txn_error)?;

        if outcome.changed {
            info!(document_id = %document_id, from = %old_status, to = new_status.as_str(), "status updated");
            if let Err(e) = self
                .event_sender
                .send(Event::DocumentStatusChanged {
                    document_id,
                    old_status,
                    new_status: new_status.as_str().to_string(),
                })
                .await
            {
                warn!(error = %e, "failed to emit status change event");
            }
            if new_status == DocStatus::Canceled {
                if let Err(e) = self
                    .event_sender
                    .send(Event::DocumentCancelled {
                        document_id,
                        reversed_transactions: outcome.reversed_transactions,
                    })
                    .await
                {
                    warn!(error = %e, "failed to emit document cancelled event");
                }
            }
        }
        Ok(outcome)
    }
}
