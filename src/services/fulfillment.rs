use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{
        document::{self, DocKind, DocStatus, DocType},
        document_counter::{self, Entity as DocumentCounterEntity},
        document_item::{self, Entity as DocumentItemEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        allocation::{self, WarehouseScope},
        document_status::{self, item_units},
        inventory,
        transaction_log::{self, NewEntry},
    },
};

/// One line of a document creation request.
#[derive(Debug, Clone)]
pub struct NewDocumentItem {
    pub product_id: Uuid,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub bonus_stock: i64,
    pub expiration_date: Option<NaiveDate>,
    pub preferred_warehouse_id: Option<Uuid>,
}

/// A document creation request, already shaped per type by the handler.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub kind: DocKind,
    pub warehouse_id: Uuid,
    pub order_num: Option<String>,
    pub doc_date: Option<DateTime<Utc>>,
    /// Persist the document and items only; no stock side effects. The
    /// state machine picks the document up from Draft later.
    pub as_draft: bool,
    pub items: Vec<NewDocumentItem>,
    pub user_id: Uuid,
}

/// A document together with its line items.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct DocumentWithItems {
    pub document: document::Model,
    pub items: Vec<document_item::Model>,
}

/// Result of one fulfillment pass over an order.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct FulfillmentOutcome {
    pub order: document::Model,
    pub generated: Vec<DocumentWithItems>,
}

/// Draws the next number for a prefix: `INC-000042`. The increment and the
/// read happen on the same row inside the caller's transaction, so
/// concurrent draws serialize on the row and never duplicate.
pub async fn next_doc_number_in<C: ConnectionTrait>(
    conn: &C,
    prefix: &str,
) -> Result<String, ServiceError> {
    let seed = document_counter::ActiveModel {
        prefix: Set(prefix.to_string()),
        value: Set(0),
        updated_at: Set(Utc::now()),
    };
    match DocumentCounterEntity::insert(seed)
        .on_conflict(
            OnConflict::column(document_counter::Column::Prefix)
                .do_nothing()
                .to_owned(),
        )
        .exec(conn)
        .await
    {
        Ok(_) | Err(DbErr::RecordNotInserted) => {}
        Err(e) => return Err(ServiceError::db_error(e)),
    }

    DocumentCounterEntity::update_many()
        .col_expr(
            document_counter::Column::Value,
            Expr::col(document_counter::Column::Value).add(1),
        )
        .col_expr(document_counter::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(document_counter::Column::Prefix.eq(prefix))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let counter = DocumentCounterEntity::find_by_id(prefix.to_string())
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| {
            ServiceError::InternalError(format!("counter row for prefix {} vanished", prefix))
        })?;

    Ok(format!("{}-{:06}", prefix, counter.value))
}

fn validate_request(request: &NewDocument) -> Result<(), ServiceError> {
    if request.items.is_empty() {
        return Err(ServiceError::ValidationError(
            "document must have at least one item".to_string(),
        ));
    }
    for item in &request.items {
        if item.quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "item quantity must be positive, got {} for product {}",
                item.quantity, item.product_id
            )));
        }
        if item.bonus_stock < 0 {
            return Err(ServiceError::ValidationError(format!(
                "bonus stock must be non-negative, got {} for product {}",
                item.bonus_stock, item.product_id
            )));
        }
        if item.unit_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "unit price must be non-negative for product {}",
                item.product_id
            )));
        }
    }
    if let DocKind::Transfer {
        from_warehouse_id,
        to_warehouse_id,
    } = &request.kind
    {
        if from_warehouse_id == to_warehouse_id {
            return Err(ServiceError::ValidationError(
                "transfer source and destination warehouses must differ".to_string(),
            ));
        }
    }
    Ok(())
}

/// Status a freshly created document lands in when its stock effects are
/// applied at creation time.
fn post_creation_status(doc_type: DocType) -> DocStatus {
    match doc_type {
        DocType::Incoming | DocType::Outgoing => DocStatus::Shipped,
        DocType::Transfer => DocStatus::InTransit,
        DocType::Order => DocStatus::New,
    }
}

fn document_sum(items: &[NewDocumentItem]) -> Decimal {
    items
        .iter()
        .map(|i| i.unit_price * Decimal::from(i.quantity))
        .sum()
}

async fn insert_document_in<C: ConnectionTrait>(
    conn: &C,
    request: &NewDocument,
    doc_num: String,
) -> Result<document::Model, ServiceError> {
    let now = Utc::now();
    let doc_type = request.kind.doc_type();

    let mut active = document::ActiveModel {
        id: Set(Uuid::new_v4()),
        doc_num: Set(doc_num),
        order_num: Set(request.order_num.clone()),
        doc_date: Set(request.doc_date.unwrap_or(now)),
        doc_type: Set(doc_type.as_str().to_string()),
        doc_status: Set(DocStatus::Draft.as_str().to_string()),
        warehouse_id: Set(request.warehouse_id),
        user_id: Set(request.user_id),
        sum: Set(document_sum(&request.items)),
        customer_id: Set(None),
        supplier_id: Set(None),
        from_warehouse_id: Set(None),
        to_warehouse_id: Set(None),
        exchange_rate: Set(None),
        expenses: Set(None),
        vendor_code: Set(None),
        priority: Set(None),
        created_at: Set(now),
        updated_at: Set(None),
    };

    match &request.kind {
        DocKind::Incoming {
            supplier_id,
            exchange_rate,
            expenses,
            vendor_code,
        } => {
            active.supplier_id = Set(Some(*supplier_id));
            active.exchange_rate = Set(*exchange_rate);
            active.expenses = Set(*expenses);
            active.vendor_code = Set(vendor_code.clone());
        }
        DocKind::Outgoing { customer_id } => {
            active.customer_id = Set(Some(*customer_id));
        }
        DocKind::Transfer {
            from_warehouse_id,
            to_warehouse_id,
        } => {
            active.warehouse_id = Set(*from_warehouse_id);
            active.from_warehouse_id = Set(Some(*from_warehouse_id));
            active.to_warehouse_id = Set(Some(*to_warehouse_id));
        }
        DocKind::Order {
            customer_id,
            priority,
            expenses,
        } => {
            active.customer_id = Set(Some(*customer_id));
            active.priority = Set(Some(*priority));
            active.expenses = Set(*expenses);
        }
    }

    active.insert(conn).await.map_err(ServiceError::db_error)
}

async fn insert_items_in<C: ConnectionTrait>(
    conn: &C,
    document_id: Uuid,
    items: &[NewDocumentItem],
) -> Result<Vec<document_item::Model>, ServiceError> {
    let mut created = Vec::with_capacity(items.len());
    for item in items {
        let line = document_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            document_id: Set(document_id),
            product_id: Set(item.product_id),
            quantity: Set(item.quantity),
            unit_price: Set(item.unit_price),
            bonus_stock: Set(item.bonus_stock),
            expiration_date: Set(item.expiration_date),
            batch_id: Set(None),
            quantity_fulfilled: Set(0),
            preferred_warehouse_id: Set(item.preferred_warehouse_id),
        };
        created.push(line.insert(conn).await.map_err(ServiceError::db_error)?);
    }
    Ok(created)
}

async fn create_document_in<C: ConnectionTrait>(
    conn: &C,
    request: &NewDocument,
) -> Result<DocumentWithItems, ServiceError> {
    let doc_type = request.kind.doc_type();
    let doc_num = next_doc_number_in(conn, doc_type.number_prefix()).await?;
    let doc = insert_document_in(conn, request, doc_num).await?;
    let items = insert_items_in(conn, doc.id, &request.items).await?;

    if request.as_draft {
        return Ok(DocumentWithItems {
            document: doc,
            items,
        });
    }

    match doc_type {
        DocType::Incoming => {
            document_status::post_incoming_items_in(conn, &doc, &items, request.user_id).await?
        }
        DocType::Outgoing => {
            document_status::post_outgoing_items_in(conn, &doc, &items, request.user_id).await?
        }
        DocType::Transfer => {
            document_status::post_transfer_items_in(conn, &doc, &items, request.user_id).await?
        }
        DocType::Order => {}
    }

    let mut active: document::ActiveModel = doc.into();
    active.doc_status = Set(post_creation_status(doc_type).as_str().to_string());
    active.updated_at = Set(Some(Utc::now()));
    let doc = active.update(conn).await.map_err(ServiceError::db_error)?;

    // Incoming lines were stamped with their batch ids during posting.
    let items = document_status::load_items_in(conn, doc.id).await?;
    Ok(DocumentWithItems {
        document: doc,
        items,
    })
}

/// Generates outgoing documents for the unfulfilled remainder of an order
/// inside the caller's transaction.
async fn fulfill_order_in<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    user_id: Uuid,
) -> Result<FulfillmentOutcome, ServiceError> {
    let order = document_status::load_document_in(conn, order_id).await?;
    if order.doc_type()? != DocType::Order {
        return Err(ServiceError::ValidationError(format!(
            "document {} is not an order",
            order_id
        )));
    }
    let status = order.status()?;
    if !matches!(status, DocStatus::New | DocStatus::PartiallyFulfilled) {
        return Err(ServiceError::Conflict(format!(
            "order {} in status {} cannot be fulfilled",
            order.doc_num,
            status.as_str()
        )));
    }
    let customer_id = match order.kind()? {
        DocKind::Order { customer_id, .. } => customer_id,
        _ => unreachable!("type checked above"),
    };

    let items = document_status::load_items_in(conn, order_id).await?;

    // Allocation lines grouped by source warehouse; each group becomes one
    // generated outgoing document.
    let mut by_warehouse: BTreeMap<Uuid, Vec<(document_item::Model, allocation::Allocation)>> =
        BTreeMap::new();
    // Decrements happen after planning, so quantities already promised to
    // earlier lines must be subtracted from each fresh stock snapshot.
    let mut planned: BTreeMap<Uuid, i64> = BTreeMap::new();

    for item in &items {
        let target = item_units(item);
        let remaining = target - item.quantity_fulfilled;
        if remaining <= 0 {
            continue;
        }

        let scope = match item.preferred_warehouse_id {
            Some(warehouse) => WarehouseScope::Preferred(warehouse),
            None => WarehouseScope::Preferred(order.warehouse_id),
        };

        let mut rows = allocation::fetch_stock_rows(conn, item.product_id).await?;
        for row in &mut rows {
            if let Some(taken) = planned.get(&row.record_id) {
                row.available -= taken;
            }
        }
        rows.retain(|r| r.available > 0);
        let available: i64 = rows.iter().map(|r| r.available).sum();
        let take = remaining.min(available);
        if take <= 0 {
            continue;
        }

        let plan = allocation::plan_allocations(rows, item.product_id, scope, take)?;
        for line in plan {
            *planned.entry(line.record_id).or_default() += line.quantity;
            by_warehouse
                .entry(line.warehouse_id)
                .or_default()
                .push((item.clone(), line));
        }
    }

    let mut generated = Vec::new();
    let mut fulfilled_by_item: BTreeMap<Uuid, i64> = BTreeMap::new();

    for (warehouse_id, lines) in by_warehouse {
        let doc_num = next_doc_number_in(conn, DocType::Outgoing.number_prefix()).await?;
        let now = Utc::now();
        let sum: Decimal = lines
            .iter()
            .map(|(item, line)| item.unit_price * Decimal::from(line.quantity))
            .sum();

        let outgoing = document::ActiveModel {
            id: Set(Uuid::new_v4()),
            doc_num: Set(doc_num),
            order_num: Set(Some(order.doc_num.clone())),
            doc_date: Set(now),
            doc_type: Set(DocType::Outgoing.as_str().to_string()),
            doc_status: Set(DocStatus::Shipped.as_str().to_string()),
            warehouse_id: Set(warehouse_id),
            user_id: Set(user_id),
            sum: Set(sum),
            customer_id: Set(Some(customer_id)),
            supplier_id: Set(None),
            from_warehouse_id: Set(None),
            to_warehouse_id: Set(None),
            exchange_rate: Set(None),
            expenses: Set(None),
            vendor_code: Set(None),
            priority: Set(None),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)?;

        let mut out_items = Vec::with_capacity(lines.len());
        for (order_item, line) in &lines {
            let previous =
                inventory::apply_delta_in(conn, line.batch_id, line.warehouse_id, -line.quantity)
                    .await?;
            transaction_log::record_in(
                conn,
                NewEntry {
                    transaction_type: crate::entities::stock_transaction::TransactionType::Outgoing,
                    product_id: order_item.product_id,
                    batch_id: line.batch_id,
                    warehouse_id: line.warehouse_id,
                    previous_quantity: previous,
                    change_quantity: -line.quantity,
                    document_id: Some(outgoing.id),
                    user_id,
                },
            )
            .await?;

            let out_item = document_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                document_id: Set(outgoing.id),
                product_id: Set(order_item.product_id),
                quantity: Set(line.quantity),
                unit_price: Set(order_item.unit_price),
                bonus_stock: Set(0),
                expiration_date: Set(None),
                batch_id: Set(Some(line.batch_id)),
                quantity_fulfilled: Set(line.quantity),
                preferred_warehouse_id: Set(None),
            }
            .insert(conn)
            .await
            .map_err(ServiceError::db_error)?;
            out_items.push(out_item);

            *fulfilled_by_item.entry(order_item.id).or_default() += line.quantity;
        }

        generated.push(DocumentWithItems {
            document: outgoing,
            items: out_items,
        });
    }

    for (item_id, shipped) in &fulfilled_by_item {
        DocumentItemEntity::update_many()
            .col_expr(
                document_item::Column::QuantityFulfilled,
                Expr::col(document_item::Column::QuantityFulfilled).add(*shipped),
            )
            .filter(document_item::Column::Id.eq(*item_id))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;
    }

    // Aggregate status over the refreshed counters.
    let items = document_status::load_items_in(conn, order_id).await?;
    let all_done = items
        .iter()
        .all(|i| i.quantity_fulfilled >= item_units(i));
    let any_done = items.iter().any(|i| i.quantity_fulfilled > 0);
    let new_status = if all_done {
        DocStatus::Fulfilled
    } else if any_done {
        DocStatus::PartiallyFulfilled
    } else {
        DocStatus::New
    };

    let outcome = document_status::update_status_in(conn, order_id, new_status, user_id).await?;

    Ok(FulfillmentOutcome {
        order: outcome.document,
        generated,
    })
}

async fn cancel_document_in<C: ConnectionTrait>(
    conn: &C,
    document_id: Uuid,
) -> Result<(document::Model, usize), ServiceError> {
    let doc = document_status::load_document_in(conn, document_id).await?;
    let status = doc.status()?;
    let doc_type = doc.doc_type()?;

    if status == DocStatus::Canceled {
        return Ok((doc, 0));
    }

    let mut reversed = 0usize;
    match (doc_type, status) {
        (_, DocStatus::Draft) | (DocType::Order, DocStatus::New) => {}
        (DocType::Outgoing, DocStatus::Reserved) => {
            let items = document_status::load_items_in(conn, document_id).await?;
            for item in &items {
                inventory::release_reserved_in(
                    conn,
                    item.product_id,
                    doc.warehouse_id,
                    item_units(item),
                )
                .await?;
            }
        }
        _ => {
            reversed = document_status::reverse_movements_in(conn, document_id).await?;
        }
    }

    let mut active: document::ActiveModel = doc.into();
    active.doc_status = Set(DocStatus::Canceled.as_str().to_string());
    active.updated_at = Set(Some(Utc::now()));
    let doc = active.update(conn).await.map_err(ServiceError::db_error)?;

    Ok((doc, reversed))
}

/// Orchestrates document creation, order fulfillment and cancellation.
/// Every operation runs in a single database transaction; on failure
/// nothing is externally visible and the original error surfaces.
#[derive(Clone)]
pub struct FulfillmentService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

impl FulfillmentService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates a document of any type together with its stock effects.
    #[instrument(skip(self, request), fields(doc_type = request.kind.doc_type().as_str(), items = request.items.len()))]
    pub async fn create_document(
        &self,
        request: NewDocument,
    ) -> Result<DocumentWithItems, ServiceError> {
        validate_request(&request)?;

        let created = self
            .db_pool
            .transaction::<_, DocumentWithItems, ServiceError>(move |txn| {
                Box::pin(async move { create_document_in(txn, &request).await })
            })
            .await
            .map_err(ServiceError::from_txn_error)?;

        if let Err(e) = self
            .event_sender
            .send(Event::DocumentCreated {
                document_id: created.document.id,
                doc_type: created.document.doc_type.clone(),
                doc_num: created.document.doc_num.clone(),
            })
            .await
        {
            warn!(error = %e, "failed to emit document created event");
        }
        for item in &created.items {
            if let Some(batch_id) = item.batch_id {
                if let Err(e) = self
                    .event_sender
                    .send(Event::BatchCreated {
                        batch_id,
                        product_id: item.product_id,
                        warehouse_id: created.document.warehouse_id,
                        quantity: item_units(item),
                    })
                    .await
                {
                    warn!(error = %e, "failed to emit batch created event");
                }
            }
        }
        Ok(created)
    }

    /// A document with its line items.
    pub async fn get_document(&self, document_id: Uuid) -> Result<DocumentWithItems, ServiceError> {
        let document = document_status::load_document_in(&*self.db_pool, document_id).await?;
        let items = document_status::load_items_in(&*self.db_pool, document_id).await?;
        Ok(DocumentWithItems { document, items })
    }

    /// Ships as much of an order's unfulfilled remainder as current stock
    /// allows, one generated outgoing document per source warehouse.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn create_fulfillment_docs(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<FulfillmentOutcome, ServiceError> {
        let outcome = self
            .db_pool
            .transaction::<_, FulfillmentOutcome, ServiceError>(move |txn| {
                Box::pin(async move { fulfill_order_in(txn, order_id, user_id).await })
            })
            .await
            .map_err(ServiceError::from_txn_error)?;

        if let Err(e) = self
            .event_sender
            .send(Event::OrderFulfillmentProgressed {
                order_id,
                status: outcome.order.doc_status.clone(),
                generated_documents: outcome.generated.len(),
            })
            .await
        {
            warn!(error = %e, "failed to emit order fulfillment event");
        }
        Ok(outcome)
    }

    /// Cancels a document, undoing whatever it did to stock: nothing for
    /// drafts, reservation release for reserved outgoing documents, full
    /// ledger reversal otherwise. Already canceled documents are a no-op.
    /// Documents generated by an order's fulfillment are independent and
    /// must be canceled on their own.
    #[instrument(skip(self), fields(document_id = %document_id))]
    pub async fn cancel_document(
        &self,
        document_id: Uuid,
    ) -> Result<document::Model, ServiceError> {
        let (doc, reversed) = self
            .db_pool
            .transaction::<_, (document::Model, usize), ServiceError>(move |txn| {
                Box::pin(async move { cancel_document_in(txn, document_id).await })
            })
            .await
            .map_err(ServiceError::from_txn_error)?;

        if let Err(e) = self
            .event_sender
            .send(Event::DocumentCancelled {
                document_id,
                reversed_transactions: reversed,
            })
            .await
        {
            warn!(error = %e, "failed to emit document cancelled event");
        }
        Ok(doc)
    }
}
