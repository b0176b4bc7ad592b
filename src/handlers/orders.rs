use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthUser,
    entities::document::{DocKind, DocType},
    errors::ServiceError,
    services::fulfillment::{DocumentWithItems, FulfillmentOutcome, NewDocument, NewDocumentItem},
    ApiResponse, AppState,
};

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateDocumentItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i64,
    pub unit_price: Decimal,
    #[serde(default)]
    pub bonus_stock: i64,
    pub expiration_date: Option<NaiveDate>,
    pub preferred_warehouse_id: Option<Uuid>,
}

/// Flat creation payload; which optional fields are required depends on
/// `doc_type`.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateDocumentRequest {
    /// incoming | outgoing | transfer | order
    pub doc_type: String,
    pub warehouse_id: Option<Uuid>,
    pub order_num: Option<String>,
    pub doc_date: Option<DateTime<Utc>>,
    /// Persist without stock side effects; document starts in draft.
    #[serde(default)]
    pub as_draft: bool,
    pub customer_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    pub from_warehouse_id: Option<Uuid>,
    pub to_warehouse_id: Option<Uuid>,
    pub exchange_rate: Option<Decimal>,
    pub expenses: Option<Decimal>,
    pub vendor_code: Option<String>,
    pub priority: Option<i32>,
    // Per-item bounds are re-checked by the orchestrator's own validation.
    #[validate(length(min = 1))]
    pub items: Vec<CreateDocumentItemRequest>,
}

impl CreateDocumentRequest {
    fn require<T>(value: Option<T>, field: &str, doc_type: &str) -> Result<T, ServiceError> {
        value.ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "{} is required for {} documents",
                field, doc_type
            ))
        })
    }

    /// Shapes the flat payload into the typed request the orchestrator
    /// takes, enforcing the per-type required fields.
    pub fn into_new_document(self, user_id: Uuid) -> Result<NewDocument, ServiceError> {
        let doc_type = DocType::parse(&self.doc_type).ok_or_else(|| {
            ServiceError::ValidationError(format!("unknown document type '{}'", self.doc_type))
        })?;

        let kind = match doc_type {
            DocType::Incoming => DocKind::Incoming {
                supplier_id: Self::require(self.supplier_id, "supplier_id", "incoming")?,
                exchange_rate: self.exchange_rate,
                expenses: self.expenses,
                vendor_code: self.vendor_code,
            },
            DocType::Outgoing => DocKind::Outgoing {
                customer_id: Self::require(self.customer_id, "customer_id", "outgoing")?,
            },
            DocType::Transfer => DocKind::Transfer {
                from_warehouse_id: Self::require(
                    self.from_warehouse_id,
                    "from_warehouse_id",
                    "transfer",
                )?,
                to_warehouse_id: Self::require(
                    self.to_warehouse_id,
                    "to_warehouse_id",
                    "transfer",
                )?,
            },
            DocType::Order => DocKind::Order {
                customer_id: Self::require(self.customer_id, "customer_id", "order")?,
                priority: self.priority.unwrap_or(0),
                expenses: self.expenses,
            },
        };

        let warehouse_id = match &kind {
            DocKind::Transfer {
                from_warehouse_id, ..
            } => *from_warehouse_id,
            _ => Self::require(self.warehouse_id, "warehouse_id", doc_type.as_str())?,
        };

        let items = self
            .items
            .into_iter()
            .map(|i| NewDocumentItem {
                product_id: i.product_id,
                quantity: i.quantity,
                unit_price: i.unit_price,
                bonus_stock: i.bonus_stock,
                expiration_date: i.expiration_date,
                preferred_warehouse_id: i.preferred_warehouse_id,
            })
            .collect();

        Ok(NewDocument {
            kind,
            warehouse_id,
            order_num: self.order_num,
            doc_date: self.doc_date,
            as_draft: self.as_draft,
            items,
            user_id,
        })
    }
}

pub fn orders_router() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_document))
        .route("/orders/:id", get(get_document))
        .route("/orders/:id/fulfill", post(fulfill_order))
}

/// Create a document of any type
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateDocumentRequest,
    responses(
        (status = 201, description = "Document created", body = ApiResponse<DocumentWithItems>),
        (status = 400, description = "Invalid payload"),
        (status = 422, description = "Insufficient stock")
    ),
    tag = "documents"
)]
pub async fn create_document(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateDocumentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<DocumentWithItems>>), ServiceError> {
    payload.validate()?;
    let request = payload.into_new_document(user.user_id)?;
    let created = state.services.fulfillment.create_document(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

/// Fetch a document with its line items
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "Document retrieved", body = ApiResponse<DocumentWithItems>),
        (status = 404, description = "Document not found")
    ),
    tag = "documents"
)]
pub async fn get_document(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<DocumentWithItems>>, ServiceError> {
    let found = state.services.fulfillment.get_document(id).await?;
    Ok(Json(ApiResponse::success(found)))
}

/// Generate fulfillment documents for an order
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/fulfill",
    params(("id" = Uuid, Path, description = "Order document id")),
    responses(
        (status = 200, description = "Fulfillment pass executed", body = ApiResponse<FulfillmentOutcome>),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Order not fulfillable in its status")
    ),
    tag = "documents"
)]
pub async fn fulfill_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<FulfillmentOutcome>>, ServiceError> {
    let outcome = state
        .services
        .fulfillment
        .create_fulfillment_docs(id, user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request(doc_type: &str) -> CreateDocumentRequest {
        CreateDocumentRequest {
            doc_type: doc_type.to_string(),
            warehouse_id: Some(Uuid::new_v4()),
            order_num: None,
            doc_date: None,
            as_draft: false,
            customer_id: Some(Uuid::new_v4()),
            supplier_id: Some(Uuid::new_v4()),
            from_warehouse_id: Some(Uuid::new_v4()),
            to_warehouse_id: Some(Uuid::new_v4()),
            exchange_rate: None,
            expenses: None,
            vendor_code: None,
            priority: None,
            items: vec![CreateDocumentItemRequest {
                product_id: Uuid::new_v4(),
                quantity: 2,
                unit_price: Decimal::from(5),
                bonus_stock: 0,
                expiration_date: None,
                preferred_warehouse_id: None,
            }],
        }
    }

    #[test]
    fn maps_outgoing_request() {
        let request = base_request("outgoing");
        let mapped = request.into_new_document(Uuid::new_v4()).unwrap();
        assert!(matches!(mapped.kind, DocKind::Outgoing { .. }));
    }

    #[test]
    fn rejects_unknown_doc_type() {
        let request = base_request("restock");
        let err = request.into_new_document(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[test]
    fn outgoing_requires_customer() {
        let mut request = base_request("outgoing");
        request.customer_id = None;
        let err = request.into_new_document(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[test]
    fn transfer_takes_warehouse_from_source() {
        let mut request = base_request("transfer");
        request.warehouse_id = None;
        let from = request.from_warehouse_id.unwrap();
        let mapped = request.into_new_document(Uuid::new_v4()).unwrap();
        assert_eq!(mapped.warehouse_id, from);
    }

    #[test]
    fn empty_items_fail_validation() {
        let mut request = base_request("order");
        request.items.clear();
        assert!(request.validate().is_err());
    }

    #[test]
    fn populated_request_passes_validation() {
        let request = base_request("incoming");
        assert!(request.validate().is_ok());

        let mut bad_quantity = base_request("incoming");
        bad_quantity.items[0].quantity = 0;
        assert!(bad_quantity.items[0].validate().is_err());
    }
}
