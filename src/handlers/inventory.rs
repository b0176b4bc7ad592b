use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthUser, errors::ServiceError, services::inventory::StockLevel, ApiResponse, AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AdjustStockRequest {
    pub batch_id: Uuid,
    pub warehouse_id: Uuid,
    /// New absolute available quantity; the difference is booked as an
    /// adjustment.
    #[validate(range(min = 0))]
    pub new_quantity: i64,
}

pub fn inventory_router() -> Router<AppState> {
    Router::new()
        .route("/inventory/adjust", put(adjust_stock))
        .route("/inventory/:batch_id/:warehouse_id", get(get_stock_level))
}

/// Correct the available quantity of a (batch, warehouse) pair
#[utoipa::path(
    put,
    path = "/api/v1/inventory/adjust",
    request_body = AdjustStockRequest,
    responses(
        (status = 200, description = "Stock corrected", body = ApiResponse<StockLevel>),
        (status = 400, description = "Invalid target quantity"),
        (status = 404, description = "Batch not found")
    ),
    tag = "inventory"
)]
pub async fn adjust_stock(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AdjustStockRequest>,
) -> Result<Json<ApiResponse<StockLevel>>, ServiceError> {
    payload.validate()?;
    let level = state
        .services
        .inventory
        .set_available(
            payload.batch_id,
            payload.warehouse_id,
            payload.new_quantity,
            user.user_id,
        )
        .await?;
    Ok(Json(ApiResponse::success(level)))
}

/// Current available/reserved counters for a pair
#[utoipa::path(
    get,
    path = "/api/v1/inventory/{batch_id}/{warehouse_id}",
    params(
        ("batch_id" = Uuid, Path, description = "Batch id"),
        ("warehouse_id" = Uuid, Path, description = "Warehouse id")
    ),
    responses(
        (status = 200, description = "Counters returned", body = ApiResponse<StockLevel>),
        (status = 404, description = "No record for the pair")
    ),
    tag = "inventory"
)]
pub async fn get_stock_level(
    State(state): State<AppState>,
    _user: AuthUser,
    Path((batch_id, warehouse_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<StockLevel>>, ServiceError> {
    let level = state
        .services
        .inventory
        .stock_level(batch_id, warehouse_id)
        .await?;
    Ok(Json(ApiResponse::success(level)))
}
