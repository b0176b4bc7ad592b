use axum::{
    extract::{Path, State},
    routing::{patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::document::{self, DocStatus},
    errors::ServiceError,
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    /// Target status, e.g. "reserved", "shipped", "canceled"
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub document: document::Model,
    /// False when the document was already in the requested status.
    pub changed: bool,
    pub reversed_transactions: usize,
}

pub fn documents_router() -> Router<AppState> {
    Router::new()
        .route("/documents/:id/status", patch(update_status))
        .route("/documents/:id/cancel", post(cancel_document))
}

/// Drive a document's state machine
#[utoipa::path(
    patch,
    path = "/api/v1/documents/{id}/status",
    params(("id" = Uuid, Path, description = "Document id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Transition applied", body = ApiResponse<StatusResponse>),
        (status = 400, description = "Illegal transition"),
        (status = 404, description = "Document not found")
    ),
    tag = "documents"
)]
pub async fn update_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<StatusResponse>>, ServiceError> {
    let status = DocStatus::parse(&payload.status).ok_or_else(|| {
        ServiceError::ValidationError(format!("unknown status '{}'", payload.status))
    })?;

    let outcome = state
        .services
        .document_status
        .update_status(id, status, user.user_id)
        .await?;

    Ok(Json(ApiResponse::success(StatusResponse {
        document: outcome.document,
        changed: outcome.changed,
        reversed_transactions: outcome.reversed_transactions,
    })))
}

/// Cancel a document, reversing its stock effects
#[utoipa::path(
    post,
    path = "/api/v1/documents/{id}/cancel",
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "Document canceled", body = ApiResponse<document::Model>),
        (status = 404, description = "Document not found")
    ),
    tag = "documents"
)]
pub async fn cancel_document(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<document::Model>>, ServiceError> {
    let doc = state.services.fulfillment.cancel_document(id).await?;
    Ok(Json(ApiResponse::success(doc)))
}
