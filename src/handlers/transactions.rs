use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::stock_transaction::{self, TransactionType},
    errors::ServiceError,
    services::transaction_log::MovementEntry,
    ApiResponse, AppState,
};

/// Direct ledger entry. The counter mutation and the entry are applied
/// together, keeping the replay invariant intact.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTransactionRequest {
    /// incoming | outgoing | transfer | adjustment
    pub transaction_type: String,
    pub batch_id: Uuid,
    pub warehouse_id: Uuid,
    /// Signed delta applied to the available counter
    pub change_quantity: i64,
    pub document_id: Option<Uuid>,
}

pub fn transactions_router() -> Router<AppState> {
    Router::new()
        .route("/transactions", post(create_transaction))
        .route("/transactions/:product_id", get(movement_history))
}

/// Record a manual ledger entry (admin tool)
#[utoipa::path(
    post,
    path = "/api/v1/transactions",
    request_body = CreateTransactionRequest,
    responses(
        (status = 201, description = "Entry recorded", body = ApiResponse<stock_transaction::Model>),
        (status = 400, description = "Invalid entry"),
        (status = 404, description = "Batch not found")
    ),
    tag = "transactions"
)]
pub async fn create_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateTransactionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<stock_transaction::Model>>), ServiceError> {
    let entry_type = TransactionType::parse(&payload.transaction_type).ok_or_else(|| {
        ServiceError::ValidationError(format!(
            "unknown transaction type '{}'",
            payload.transaction_type
        ))
    })?;

    let entry = state
        .services
        .inventory
        .apply_manual_entry(
            entry_type,
            payload.batch_id,
            payload.warehouse_id,
            payload.change_quantity,
            payload.document_id,
            user.user_id,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(entry))))
}

/// Movement history for a product with running quantities
#[utoipa::path(
    get,
    path = "/api/v1/transactions/{product_id}",
    params(("product_id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "History returned", body = ApiResponse<Vec<MovementEntry>>)
    ),
    tag = "transactions"
)]
pub async fn movement_history(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(product_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<MovementEntry>>>, ServiceError> {
    let history = state
        .services
        .transactions
        .movement_history(product_id)
        .await?;
    Ok(Json(ApiResponse::success(history)))
}
